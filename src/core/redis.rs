use std::sync::Arc;

use redis::aio::ConnectionManager;
use redis::{cmd, Client, RedisError};
use tokio::sync::RwLock;

/// Fixed-window counter: first hit in a window starts its expiry clock.
const FIXED_WINDOW_SCRIPT: &str = r#"
local hits = redis.call("INCR", KEYS[1])
if hits == 1 then
    redis.call("EXPIRE", KEYS[1], ARGV[1])
end
return hits
"#;

/// Shared handle around an optional connection manager. Every operation
/// degrades gracefully while Redis is unreachable.
#[derive(Clone)]
pub(crate) struct RedisHandle {
    url: String,
    conn: Arc<RwLock<Option<ConnectionManager>>>,
}

#[derive(Debug, Clone)]
pub(crate) enum RedisHealth {
    Healthy,
    Disconnected,
    Unhealthy(String),
}

impl RedisHandle {
    pub(crate) fn new(url: String) -> Self {
        Self { url, conn: Arc::new(RwLock::new(None)) }
    }

    pub(crate) async fn connect(&self) -> Result<(), RedisError> {
        let client = Client::open(self.url.clone())?;
        let manager = ConnectionManager::new(client).await?;
        *self.conn.write().await = Some(manager);
        Ok(())
    }

    pub(crate) async fn disconnect(&self) {
        *self.conn.write().await = None;
    }

    async fn connection(&self) -> Option<ConnectionManager> {
        self.conn.read().await.clone()
    }

    pub(crate) async fn health(&self) -> RedisHealth {
        let Some(mut conn) = self.connection().await else {
            return RedisHealth::Disconnected;
        };

        match cmd("PING").query_async::<_, String>(&mut conn).await {
            Ok(_) => RedisHealth::Healthy,
            Err(err) => RedisHealth::Unhealthy(err.to_string()),
        }
    }

    /// True while the key's counter is at or under `limit` for the current
    /// window. Allows everything while Redis is disconnected.
    pub(crate) async fn rate_limit(
        &self,
        key: &str,
        limit: u64,
        window_seconds: u64,
    ) -> Result<bool, RedisError> {
        let Some(mut conn) = self.connection().await else {
            return Ok(true);
        };

        let hits: i64 = redis::Script::new(FIXED_WINDOW_SCRIPT)
            .key(key)
            .arg(window_seconds as i64)
            .invoke_async(&mut conn)
            .await?;

        Ok(hits <= limit as i64)
    }
}
