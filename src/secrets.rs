//! Secrets Manager loader
//!
//! Secrets are fetched once at boot (the Firebase service account); the
//! client is a process-wide singleton like the other AWS clients.

use anyhow::{Context, Result};
use tracing::info;

pub struct SecretsManager {
    client: aws_sdk_secretsmanager::Client,
}

impl SecretsManager {
    pub fn new(config: &aws_config::SdkConfig) -> Self {
        Self {
            client: aws_sdk_secretsmanager::Client::new(config),
        }
    }

    pub async fn get_secret_string(&self, secret_name: &str) -> Result<String> {
        info!("Loading secret {}", secret_name);
        let response = self
            .client
            .get_secret_value()
            .secret_id(secret_name)
            .send()
            .await
            .with_context(|| format!("failed to fetch secret {secret_name}"))?;

        response
            .secret_string()
            .map(|s| s.to_string())
            .with_context(|| format!("secret {secret_name} has no string payload"))
    }
}
