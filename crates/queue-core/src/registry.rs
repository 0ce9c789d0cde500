use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::value::RawValue;

/// The single operation every job handler implements: `handle()` returns
/// `Ok(())` on success or an error that becomes the failure message
/// recorded on the job's error trail.
#[async_trait]
pub trait JobHandler: Send {
    async fn handle(&mut self) -> anyhow::Result<()>;
}

/// A factory-then-decode construction would need to deserialize into an
/// already-built trait object's private fields, which Rust has no
/// ergonomic way to do. Instead the registry stores one deserializing
/// constructor per handler name — `payload -> Box<dyn JobHandler>` in a
/// single step. The externally observable contract (unknown name ->
/// "handler not found", bad payload -> decode error, both terminal failed
/// attempts) stays the same either way.
type Constructor = dyn Fn(&RawValue) -> Result<Box<dyn JobHandler>, serde_json::Error> + Send + Sync;

#[derive(Clone, Default)]
pub struct HandlerRegistry {
    constructors: HashMap<String, Arc<Constructor>>,
}

/// Why lookup failed.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("handler not found")]
    NotFound,
    #[error("payload decode error: {0}")]
    Decode(#[source] serde_json::Error),
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `H` under `name`. Panics on a duplicate registration —
    /// the registry is built once at startup, before any job traffic, so
    /// a collision is a programming error, not a runtime condition.
    pub fn register<H>(&mut self, name: impl Into<String>)
    where
        H: JobHandler + DeserializeOwned + 'static,
    {
        let name = name.into();
        let constructor: Arc<Constructor> = Arc::new(|payload: &RawValue| {
            let handler: H = serde_json::from_str(payload.get())?;
            Ok(Box::new(handler) as Box<dyn JobHandler>)
        });
        if self.constructors.insert(name.clone(), constructor).is_some() {
            panic!("handler `{name}` registered more than once");
        }
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.constructors.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.constructors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constructors.is_empty()
    }

    /// Looks up `name`, then decodes `payload` into a fresh handler
    /// instance.
    pub fn construct(&self, name: &str, payload: &RawValue) -> Result<Box<dyn JobHandler>, RegistryError> {
        let constructor = self.constructors.get(name).ok_or(RegistryError::NotFound)?;
        constructor(payload).map_err(RegistryError::Decode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Deserialize)]
    struct Echo {
        data: String,
    }

    #[async_trait]
    impl JobHandler for Echo {
        async fn handle(&mut self) -> anyhow::Result<()> {
            if self.data.is_empty() {
                anyhow::bail!("empty data");
            }
            Ok(())
        }
    }

    #[test]
    fn unknown_handler_is_not_found() {
        let registry = HandlerRegistry::new();
        let payload = RawValue::from_string("{}".to_string()).unwrap();
        let err = registry.construct("Echo", &payload).unwrap_err();
        assert!(matches!(err, RegistryError::NotFound));
    }

    #[test]
    fn bad_payload_is_decode_error() {
        let mut registry = HandlerRegistry::new();
        registry.register::<Echo>("Echo");
        let payload = RawValue::from_string("not json".to_string()).unwrap();
        let err = registry.construct("Echo", &payload).unwrap_err();
        assert!(matches!(err, RegistryError::Decode(_)));
    }

    #[tokio::test]
    async fn good_payload_constructs_and_runs() {
        let mut registry = HandlerRegistry::new();
        registry.register::<Echo>("Echo");
        let payload = RawValue::from_string(r#"{"data":"hi"}"#.to_string()).unwrap();
        let mut handler = registry.construct("Echo", &payload).unwrap();
        handler.handle().await.unwrap();
    }

    #[test]
    #[should_panic(expected = "registered more than once")]
    fn duplicate_registration_panics() {
        let mut registry = HandlerRegistry::new();
        registry.register::<Echo>("Echo");
        registry.register::<Echo>("Echo");
    }
}
