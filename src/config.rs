//! Configuration management
//!
//! Everything comes from the environment and is frozen at process start.

use anyhow::{Context, Result};

/// Batch size used for every paginated analytics call.
pub const BATCH_SIZE: usize = 100;

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Bind host for the health endpoint (kept for parity with the platform
    /// deployment manifests)
    pub app_host: String,
    pub app_port: u16,

    /// SQS queue carrying export job requests
    pub queue_url: String,

    /// S3 bucket holding export artifacts
    pub s3_bucket: String,

    /// MongoDB connection string + audit database name
    pub mongo_url: String,
    pub audit_db: String,

    /// Redis connection URL for the user-role cache
    pub redis_url: String,

    /// Analytics service host (insights + usage logs APIs)
    pub analytics_host: String,

    /// Client service host (user-role mapping fallback)
    pub client_service_host: String,

    /// Protocol prefix for outbound service calls
    pub http_protocol: String,

    /// Verify TLS certificates on outbound HTTP. Defaults to on; can be
    /// switched off for environments with internal CAs.
    pub tls_verify: bool,

    /// Secrets Manager path of the Firebase service-account JSON
    pub firebase_secret_path: String,

    /// Presigned download URL lifetime
    pub export_expiry_hours: u64,

    /// Upper bound on a single export artifact
    pub max_export_size_mb: u64,

    /// Queue receive tuning
    pub max_messages: i32,
    pub wait_time_seconds: i32,
    pub visibility_timeout: i32,

    /// Default tracing filter when RUST_LOG is not set
    pub log_level: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        // Load .env file if present
        dotenvy::dotenv().ok();

        let app_host = std::env::var("APP_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
        let app_port = env_parse("APP_PORT", 8087)?;

        let queue_url = std::env::var("DATA_REPORTING_SQS_QUEUE_URL")
            .context("DATA_REPORTING_SQS_QUEUE_URL must be set")?;

        let s3_bucket =
            std::env::var("AWS_S3_BUCKET").unwrap_or_else(|_| "sifthub-exports".to_string());

        let mongo_url = std::env::var("MONGO_DATASOURCE_URL")
            .context("MONGO_DATASOURCE_URL must be set")?;
        let audit_db =
            std::env::var("AUDIT_LOG_MONGO_DATABASE").unwrap_or_else(|_| "auditlogs".to_string());

        let redis_url = redis_url_from_env();

        let analytics_host =
            std::env::var("ANALYTICS_SERVICE_HOST").unwrap_or_else(|_| "localhost:8080".to_string());
        let client_service_host =
            std::env::var("CLIENT_SERVICE_HOST").unwrap_or_else(|_| "localhost:8086".to_string());
        let http_protocol =
            std::env::var("HTTP_PROTOCOL").unwrap_or_else(|_| "https://".to_string());

        let tls_verify = std::env::var("HTTP_TLS_VERIFY")
            .map(|v| v != "false" && v != "0")
            .unwrap_or(true);

        let firebase_secret_path = std::env::var("FIREBASE_SECRETS_PATH")
            .unwrap_or_else(|_| "notifications/internal/FIREBASE".to_string());

        let export_expiry_hours = env_parse("EXPORT_FILE_EXPIRY_HOURS", 24)?;
        let max_export_size_mb = env_parse("MAX_EXPORT_SIZE_MB", 100)?;

        let max_messages = env_parse("SQS_MAX_MESSAGES", 10)?;
        let wait_time_seconds = env_parse("SQS_WAIT_TIME_SECONDS", 20)?;
        let visibility_timeout = env_parse("SQS_VISIBILITY_TIMEOUT", 300)?;

        let log_level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        Ok(Self {
            app_host,
            app_port,
            queue_url,
            s3_bucket,
            mongo_url,
            audit_db,
            redis_url,
            analytics_host,
            client_service_host,
            http_protocol,
            tls_verify,
            firebase_secret_path,
            export_expiry_hours,
            max_export_size_mb,
            max_messages,
            wait_time_seconds,
            visibility_timeout,
            log_level,
        })
    }
}

/// Assemble a redis URL from the PRIMARY_REDIS_* variables, falling back to a
/// local instance.
fn redis_url_from_env() -> String {
    if let Ok(url) = std::env::var("PRIMARY_REDIS_URL") {
        return url;
    }
    let host = std::env::var("PRIMARY_REDIS_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
    let port = std::env::var("PRIMARY_REDIS_PORT").unwrap_or_else(|_| "6379".to_string());
    match std::env::var("PRIMARY_REDIS_PASSWORD") {
        Ok(password) if !password.is_empty() => format!("redis://:{}@{}:{}", password, host, port),
        _ => format!("redis://{}:{}", host, port),
    }
}

fn env_parse<T: std::str::FromStr>(name: &str, default: T) -> Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .parse::<T>()
            .with_context(|| format!("{} must be a number, got {:?}", name, raw)),
        Err(_) => Ok(default),
    }
}
