//! Redis-backed user-role cache
//!
//! The notifier resolves `(clientId, productId, userId)` to the guid triple
//! addressing the user's notification document. Mappings live in the
//! `USER_ROLE_ACCESS` hash; misses fall through to the client service and are
//! written back.

use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{info, warn};

use crate::clients::user_role::{UserRoleAccess, UserRoleClient};
use crate::error::ExportError;

const USER_ROLE_CONFIG_KEY: &str = "USER_ROLE_ACCESS";

/// Hash field for one user's role mapping.
fn role_hash_key(client_id: i64, product_id: i64, user_id: i64) -> String {
    format!(
        "CLIENT_{}_PRODUCT_{}_USERID_{}",
        client_id, product_id, user_id
    )
}

/// JSON-serializing wrapper over a shared redis connection.
#[derive(Clone)]
pub struct RedisStore {
    conn: ConnectionManager,
}

impl RedisStore {
    pub async fn connect(url: &str) -> anyhow::Result<Self> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self { conn })
    }

    pub async fn hget_json<T: DeserializeOwned>(
        &self,
        key: &str,
        field: &str,
    ) -> Result<Option<T>, ExportError> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn
            .hget(key, field)
            .await
            .map_err(|e| ExportError::Upstream(format!("redis HGET {key}/{field} failed: {e}")))?;
        match raw {
            Some(json) => serde_json::from_str(&json)
                .map(Some)
                .map_err(|e| ExportError::Upstream(format!("cache entry {key}/{field} corrupt: {e}"))),
            None => Ok(None),
        }
    }

    pub async fn hset_json<T: Serialize>(
        &self,
        key: &str,
        field: &str,
        value: &T,
    ) -> Result<(), ExportError> {
        let json = serde_json::to_string(value)
            .map_err(|e| ExportError::Upstream(format!("cache serialize failed: {e}")))?;
        let mut conn = self.conn.clone();
        conn.hset::<_, _, _, ()>(key, field, json)
            .await
            .map_err(|e| ExportError::Upstream(format!("redis HSET {key}/{field} failed: {e}")))
    }
}

/// Role-mapping lookup with write-through fetch on miss.
pub struct UserRoleCache {
    store: RedisStore,
    client: UserRoleClient,
}

impl UserRoleCache {
    pub fn new(store: RedisStore, client: UserRoleClient) -> Self {
        Self { store, client }
    }

    pub async fn find(
        &self,
        user_id: i64,
        client_id: i64,
        product_id: i64,
    ) -> Result<Option<UserRoleAccess>, ExportError> {
        let field = role_hash_key(client_id, product_id, user_id);

        match self
            .store
            .hget_json::<UserRoleAccess>(USER_ROLE_CONFIG_KEY, &field)
            .await
        {
            Ok(Some(access)) => return Ok(Some(access)),
            Ok(None) => {
                info!("Role mapping for user {} not found in cache", user_id);
            }
            Err(e) => {
                // A broken cache must not block notification delivery.
                warn!("Role cache read failed, falling back to service: {}", e);
            }
        }

        let loaded = self
            .client
            .load_by_user_id(user_id, client_id, product_id)
            .await?;

        if let Some(access) = &loaded {
            if let Err(e) = self
                .store
                .hset_json(USER_ROLE_CONFIG_KEY, &field, access)
                .await
            {
                warn!("Role cache write-back failed for user {}: {}", user_id, e);
            }
        }
        Ok(loaded)
    }
}
