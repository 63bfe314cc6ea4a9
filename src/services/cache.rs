//! Redis cache used for link previews and OAuth handshake state.
//!
//! Values are stored as JSON with a TTL. Read failures are logged and
//! treated as misses so the cache never takes a request down with it.
//! A cache built with [`RedisCache::offline`] has no connection at all:
//! reads miss and writes fail.

use anyhow::{anyhow, Context, Result};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::{de::DeserializeOwned, Serialize};
use std::time::Duration;
use tracing::{debug, error, instrument, warn};

/// Redis cache client with connection pooling.
#[derive(Clone)]
pub struct RedisCache {
    conn: Option<ConnectionManager>,
    default_ttl: Duration,
}

impl RedisCache {
    /// Create a new Redis cache connection.
    pub async fn new(redis_url: &str, default_ttl_seconds: u64) -> Result<Self> {
        let client = redis::Client::open(redis_url).context("Failed to create Redis client")?;

        let conn = ConnectionManager::new(client)
            .await
            .context("Failed to connect to Redis")?;

        tracing::info!("Redis cache connected");

        Ok(Self {
            conn: Some(conn),
            default_ttl: Duration::from_secs(default_ttl_seconds),
        })
    }

    /// Cache with no Redis behind it, for exercising routes in tests.
    #[cfg(test)]
    pub fn offline(default_ttl_seconds: u64) -> Self {
        Self {
            conn: None,
            default_ttl: Duration::from_secs(default_ttl_seconds),
        }
    }

    fn connection(&self) -> Result<ConnectionManager> {
        self.conn.clone().ok_or_else(|| anyhow!("Redis is not connected"))
    }

    /// Get a value from cache.
    #[instrument(skip(self), fields(cache_hit))]
    pub async fn get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let Some(mut conn) = self.conn.clone() else {
            debug!(key = key, "Cache offline");
            return None;
        };

        let hit = match conn.get::<_, Option<String>>(key).await {
            Ok(Some(data)) => match serde_json::from_str(&data) {
                Ok(value) => {
                    debug!(key = key, "Cache hit");
                    Some(value)
                }
                Err(e) => {
                    warn!(key = key, error = %e, "Failed to deserialize cached value");
                    None
                }
            },
            Ok(None) => {
                debug!(key = key, "Cache miss");
                None
            }
            Err(e) => {
                error!(key = key, error = %e, "Redis get error");
                None
            }
        };

        tracing::Span::current().record("cache_hit", hit.is_some());
        hit
    }

    /// Set a value in cache with the default TTL.
    pub async fn set<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        self.set_with_ttl(key, value, self.default_ttl).await
    }

    /// Set a value in cache with a custom TTL.
    #[instrument(skip(self, value))]
    pub async fn set_with_ttl<T: Serialize>(
        &self,
        key: &str,
        value: &T,
        ttl: Duration,
    ) -> Result<()> {
        let mut conn = self.connection()?;

        let data = serde_json::to_string(value).context("Failed to serialize value for cache")?;

        conn.set_ex::<_, _, ()>(key, data, ttl.as_secs())
            .await
            .context("Failed to set cache value")?;

        debug!(key = key, ttl_secs = ttl.as_secs(), "Cached value");
        Ok(())
    }

    /// Read and delete a key atomically (one-shot tokens).
    #[instrument(skip(self))]
    pub async fn take<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let mut conn = self.connection()?;

        let data: Option<String> = redis::cmd("GETDEL")
            .arg(key)
            .query_async(&mut conn)
            .await
            .context("Failed to take cache value")?;

        data.map(|d| serde_json::from_str(&d).context("Failed to deserialize cached value"))
            .transpose()
    }

    /// Check if Redis is healthy.
    pub async fn health_check(&self) -> Result<()> {
        let mut conn = self.connection()?;
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .context("Redis health check failed")?;
        Ok(())
    }
}

/// Cache key builders for consistent key formats.
pub mod keys {
    /// Link preview metadata for a URL
    pub fn link_preview(url: &str) -> String {
        format!("link-preview:{}", url)
    }

    /// Pending Xero OAuth `state` value
    pub fn xero_oauth_state(state: &str) -> String {
        format!("xero:oauth-state:{}", state)
    }
}

#[cfg(test)]
mod tests {
    use super::{keys, RedisCache};

    #[tokio::test]
    async fn offline_cache_misses_and_refuses_writes() {
        let cache = RedisCache::offline(60);

        assert_eq!(cache.get::<String>("link-preview:x").await, None);
        assert!(cache.set("link-preview:x", &"value").await.is_err());
        assert!(cache.take::<String>("xero:oauth-state:x").await.is_err());
        assert!(cache.health_check().await.is_err());
    }

    #[test]
    fn keys_are_namespaced() {
        assert_eq!(
            keys::link_preview("https://vimeo.com/1"),
            "link-preview:https://vimeo.com/1"
        );
        assert_eq!(keys::xero_oauth_state("abc"), "xero:oauth-state:abc");
    }
}
