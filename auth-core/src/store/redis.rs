//! Redis-backed revocation store.

use async_trait::async_trait;
use redis::{aio::ConnectionManager, Client};

use super::{RevocationStore, StoreError, StoreResult};

const REVOKED_KEY_PREFIX: &str = "revoked:";

impl From<redis::RedisError> for StoreError {
    fn from(err: redis::RedisError) -> Self {
        StoreError::Unavailable(err.to_string())
    }
}

/// Revocation entries live in Redis with a TTL equal to the remaining
/// token lifetime, so the set never grows past the tokens still in flight.
#[derive(Clone)]
pub struct RedisRevocationStore {
    manager: ConnectionManager,
}

impl RedisRevocationStore {
    pub async fn connect(url: &str) -> StoreResult<Self> {
        tracing::info!(url = %url, "Connecting to Redis");
        let client = Client::open(url).map_err(StoreError::from)?;

        // ConnectionManager reconnects on its own after a dropped link.
        let manager = client.get_connection_manager().await.map_err(|e| {
            tracing::error!("Failed to get Redis connection manager: {}", e);
            StoreError::Unavailable(format!("Failed to connect to Redis: {}", e))
        })?;

        tracing::info!("Successfully connected to Redis");
        Ok(Self { manager })
    }

    fn key(jti: &str) -> String {
        format!("{}{}", REVOKED_KEY_PREFIX, jti)
    }
}

#[async_trait]
impl RevocationStore for RedisRevocationStore {
    async fn revoke(&self, jti: &str, ttl_seconds: i64) -> StoreResult<()> {
        let mut conn = self.manager.clone();
        redis::cmd("SET")
            .arg(Self::key(jti))
            .arg("revoked")
            .arg("EX")
            // A token at the edge of expiry still gets a minimal hold.
            .arg(ttl_seconds.max(1))
            .query_async::<_, ()>(&mut conn)
            .await?;
        Ok(())
    }

    async fn is_revoked(&self, jti: &str) -> StoreResult<bool> {
        let mut conn = self.manager.clone();
        let exists: bool = redis::cmd("EXISTS")
            .arg(Self::key(jti))
            .query_async(&mut conn)
            .await?;
        Ok(exists)
    }
}
