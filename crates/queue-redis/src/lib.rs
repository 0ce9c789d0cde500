//! `FastListStore` over Redis: the low-latency list-store half of the
//! queue. `BLMOVE` is the atomic primitive the crash-safety property of
//! dequeue depends on; everything else is a thin wrapper over the
//! matching list command.

use std::time::Duration;

use async_trait::async_trait;
use queue_core::{FastListStore, ListEnd, ScanPage};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

/// Wraps a [`ConnectionManager`] (auto-reconnecting, cheaply `Clone`-able —
/// every call below clones it rather than holding a lock across an await)
/// the same way `nucleus-std`'s `RedisBackend` wraps a client per call.
pub struct RedisListStore {
    manager: ConnectionManager,
}

impl RedisListStore {
    /// Opens a client against `url` and eagerly establishes the managed
    /// connection, so construction fails fast if Redis is unreachable
    /// rather than on the first queue operation.
    pub async fn connect(url: &str) -> anyhow::Result<Self> {
        let client = redis::Client::open(url)?;
        let manager = client.get_connection_manager().await?;
        Ok(RedisListStore { manager })
    }

    fn end_str(end: ListEnd) -> &'static str {
        match end {
            ListEnd::Left => "LEFT",
            ListEnd::Right => "RIGHT",
        }
    }
}

#[async_trait]
impl FastListStore for RedisListStore {
    async fn push_left(&self, key: &str, value: Vec<u8>) -> anyhow::Result<()> {
        let mut con = self.manager.clone();
        let _: i64 = con.lpush(key, value).await?;
        Ok(())
    }

    async fn push_right(&self, key: &str, value: Vec<u8>) -> anyhow::Result<()> {
        let mut con = self.manager.clone();
        let _: i64 = con.rpush(key, value).await?;
        Ok(())
    }

    async fn pop_left(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>> {
        let mut con = self.manager.clone();
        Ok(con.lpop(key, None).await?)
    }

    async fn pop_right(&self, key: &str) -> anyhow::Result<Option<Vec<u8>>> {
        let mut con = self.manager.clone();
        Ok(con.rpop(key, None).await?)
    }

    async fn blocking_move(
        &self,
        src: &str,
        dst: &str,
        from_end: ListEnd,
        to_end: ListEnd,
        timeout: Duration,
    ) -> anyhow::Result<Option<Vec<u8>>> {
        let mut con = self.manager.clone();
        let moved: Option<Vec<u8>> = redis::cmd("BLMOVE")
            .arg(src)
            .arg(dst)
            .arg(Self::end_str(from_end))
            .arg(Self::end_str(to_end))
            .arg(timeout.as_secs_f64())
            .query_async(&mut con)
            .await?;
        Ok(moved)
    }

    async fn remove_first(&self, key: &str, value: &[u8], count: i64) -> anyhow::Result<i64> {
        let mut con = self.manager.clone();
        let removed: i64 = con.lrem(key, count, value).await?;
        Ok(removed)
    }

    async fn range(&self, key: &str, start: i64, stop: i64) -> anyhow::Result<Vec<Vec<u8>>> {
        let mut con = self.manager.clone();
        let values: Vec<Vec<u8>> = con.lrange(key, start as isize, stop as isize).await?;
        Ok(values)
    }

    async fn length(&self, key: &str) -> anyhow::Result<i64> {
        let mut con = self.manager.clone();
        let length: i64 = con.llen(key).await?;
        Ok(length)
    }

    async fn delete(&self, key: &str) -> anyhow::Result<i64> {
        let mut con = self.manager.clone();
        let prior: i64 = con.llen(key).await?;
        let _: i64 = con.del(key).await?;
        Ok(prior)
    }

    async fn scan(&self, cursor: u64, pattern: &str, batch_hint: usize) -> anyhow::Result<ScanPage> {
        let mut con = self.manager.clone();
        let (next_cursor, keys): (u64, Vec<String>) = redis::cmd("SCAN")
            .arg(cursor)
            .arg("MATCH")
            .arg(pattern)
            .arg("COUNT")
            .arg(batch_hint)
            .query_async(&mut con)
            .await?;
        Ok((next_cursor, keys))
    }
}
