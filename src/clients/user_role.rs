//! User-role mapping lookup against the client service
//!
//! Backs the cache miss path of `cache::UserRoleCache`: the client service
//! answers with the guid triple the notifier needs to address a user's
//! notification document.

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::clients::http::{envelope_data, ServiceClient};
use crate::error::ExportError;

const USER_ROLE_BY_ID_ENDPOINT: &str = "/api/v1/product-service/access/cache/user-id/";

/// Guid triple resolving a `(clientId, productId, userId)` to its document
/// tree location.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRoleAccess {
    #[serde(rename = "userGuid")]
    pub user_guid: String,
    #[serde(rename = "clientGuid")]
    pub client_guid: String,
    #[serde(rename = "productGuid")]
    pub product_guid: String,
}

#[derive(Clone)]
pub struct UserRoleClient {
    http: ServiceClient,
    host: String,
}

impl UserRoleClient {
    pub fn new(http: ServiceClient, host: &str) -> Self {
        Self {
            http,
            host: host.to_string(),
        }
    }

    pub async fn load_by_user_id(
        &self,
        user_id: i64,
        client_id: i64,
        product_id: i64,
    ) -> Result<Option<UserRoleAccess>, ExportError> {
        info!(
            "Loading user role mapping for user {} (client {}, product {})",
            user_id, client_id, product_id
        );
        let endpoint = format!(
            "{}{}/{}/{}",
            USER_ROLE_BY_ID_ENDPOINT, user_id, client_id, product_id
        );
        let envelope = self.http.get_envelope(&self.host, &endpoint).await?;
        Ok(envelope_data(envelope, "user role mapping"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_role_access_wire_names() {
        let raw = serde_json::json!({
            "userGuid": "u-guid",
            "clientGuid": "c-guid",
            "productGuid": "p-guid"
        });
        let access: UserRoleAccess = serde_json::from_value(raw).unwrap();
        assert_eq!(access.user_guid, "u-guid");
        assert_eq!(access.product_guid, "p-guid");
    }
}
