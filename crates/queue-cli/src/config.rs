//! Deployment-scoped configuration: an explicit value loaded once at
//! startup and threaded through component constructors rather than a
//! re-init-on-nil global. Loaded from a TOML file (`--config` / the
//! `QUEUE_CONFIG` env var) with nested `Postgres`/`Redis`/`App` sections,
//! plus CLI/env overrides via `clap`.

use std::path::PathBuf;

use serde::Deserialize;

#[derive(Debug, Clone, Deserialize, Default)]
struct TomlConfig {
    app: Option<AppSection>,
    postgres: Option<PostgresSection>,
    redis: Option<RedisSection>,
}

#[derive(Debug, Clone, Deserialize)]
struct AppSection {
    name_slug: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct PostgresSection {
    url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct RedisSection {
    url: Option<String>,
}

/// The fully-resolved configuration every component constructor receives
/// explicitly.
#[derive(Debug, Clone)]
pub struct Config {
    /// The deployment-wide slug prefixed onto every fast-store key.
    pub app_prefix: String,
    pub postgres_url: String,
    pub redis_url: String,
    pub log: String,
}

const DEFAULT_APP_PREFIX: &str = "app";
const DEFAULT_POSTGRES_URL: &str = "postgres://localhost/queue";
const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379";
const DEFAULT_LOG: &str = "info";

impl Config {
    /// Priority (highest to lowest): CLI/env override, TOML file, built-in
    /// default — same ordering `clawd`'s `DaemonConfig::new` documents.
    pub fn load(
        config_path: Option<PathBuf>,
        app_prefix: Option<String>,
        postgres_url: Option<String>,
        redis_url: Option<String>,
        log: Option<String>,
    ) -> anyhow::Result<Self> {
        let toml_config = match config_path {
            Some(path) => {
                let contents = std::fs::read_to_string(&path)
                    .map_err(|err| anyhow::anyhow!("reading config file {}: {err}", path.display()))?;
                toml::from_str::<TomlConfig>(&contents)
                    .map_err(|err| anyhow::anyhow!("parsing config file {}: {err}", path.display()))?
            }
            None => TomlConfig::default(),
        };

        Ok(Config {
            app_prefix: app_prefix
                .or_else(|| toml_config.app.as_ref().and_then(|a| a.name_slug.clone()))
                .unwrap_or_else(|| DEFAULT_APP_PREFIX.to_string()),
            postgres_url: postgres_url
                .or_else(|| toml_config.postgres.as_ref().and_then(|p| p.url.clone()))
                .unwrap_or_else(|| DEFAULT_POSTGRES_URL.to_string()),
            redis_url: redis_url
                .or_else(|| toml_config.redis.as_ref().and_then(|r| r.url.clone()))
                .unwrap_or_else(|| DEFAULT_REDIS_URL.to_string()),
            log: log.unwrap_or_else(|| DEFAULT_LOG.to_string()),
        })
    }
}
