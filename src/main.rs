//! SiftHub Reporting Worker - queue-driven report export service
//!
//! Consumes export jobs from SQS, assembles spreadsheet reports from the
//! analytics services, streams them into S3 and notifies the requesting user.

mod audit;
mod cache;
mod cli;
mod clients;
mod config;
mod consumer;
mod delivery;
mod error;
mod notify;
mod reports;
mod router;
mod secrets;
mod storage;
mod types;

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::audit::MongoAuditStore;
use crate::cache::{RedisStore, UserRoleCache};
use crate::clients::http::ServiceClient;
use crate::clients::insights::InsightsClient;
use crate::clients::usage_logs::UsageLogsClient;
use crate::clients::user_role::UserRoleClient;
use crate::consumer::SqsConsumer;
use crate::delivery::download::DownloadSink;
use crate::delivery::email::EmailSink;
use crate::delivery::SinkRegistry;
use crate::notify::{FirebaseCredentials, FirestoreNotifier};
use crate::reports::faq::FaqReportBuilder;
use crate::reports::usage_logs::{UsageKind, UsageLogsReportBuilder};
use crate::reports::{BuilderRegistry, RouteKey};
use crate::router::JobRouter;
use crate::secrets::SecretsManager;
use crate::storage::{ObjectStorage, S3ObjectStore};
use crate::types::{ExportMode, ExportModule};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = cli::Cli::parse();

    dotenvy::dotenv().ok();

    let config = config::Config::from_env()?;

    match cli.command {
        Some(cli::Command::Serve) | None => run_worker(config).await,
    }
}

async fn run_worker(config: config::Config) -> Result<()> {
    let logs_dir = std::env::var("LOGS_DIR").unwrap_or_else(|_| "./logs".to_string());
    std::fs::create_dir_all(&logs_dir).ok();

    let file_appender = RollingFileAppender::new(Rotation::DAILY, &logs_dir, "reporting-worker.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| {
                format!("{},sifthub_reporting_worker=debug", config.log_level)
            }),
        ))
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::fmt::layer().with_writer(non_blocking).with_ansi(false))
        .init();

    info!("Starting SiftHub Reporting Worker...");
    info!("Configuration loaded ({}:{})", config.app_host, config.app_port);

    // AWS clients share one SdkConfig and live for the whole process.
    let aws_config = aws_config::load_from_env().await;
    let sqs_client = aws_sdk_sqs::Client::new(&aws_config);
    let s3_client = aws_sdk_s3::Client::new(&aws_config);
    let secrets = SecretsManager::new(&aws_config);

    let mongo_client = mongodb::Client::with_uri_str(&config.mongo_url)
        .await
        .context("failed to connect to MongoDB")?;
    let audit_db = mongo_client.database(&config.audit_db);
    let audit = Arc::new(MongoAuditStore::new(&audit_db));
    info!("Connected to MongoDB (audit db {})", config.audit_db);

    let http = ServiceClient::new(&config.http_protocol, config.tls_verify)
        .map_err(|e| anyhow::anyhow!("{e}"))?;
    let insights = InsightsClient::new(http.clone(), &config.analytics_host);
    let usage_logs = UsageLogsClient::new(http.clone(), &config.analytics_host);
    let user_role = UserRoleClient::new(http.clone(), &config.client_service_host);

    let redis = RedisStore::connect(&config.redis_url)
        .await
        .context("failed to connect to Redis")?;
    let roles = UserRoleCache::new(redis, user_role);
    info!("Connected to Redis");

    let firebase_secret = secrets
        .get_secret_string(&config.firebase_secret_path)
        .await?;
    let credentials = FirebaseCredentials::from_json(&firebase_secret)
        .context("firebase service-account secret is malformed")?;
    info!("Notifier ready (project {})", credentials.project_id);
    let notifier = Arc::new(FirestoreNotifier::new(http.raw().clone(), credentials, roles));

    let store: Arc<dyn ObjectStorage> = Arc::new(S3ObjectStore::new(s3_client, &config.s3_bucket));

    let mut builders = BuilderRegistry::new();
    builders.register(
        RouteKey::exact(ExportModule::Insights, "responseGeneration", "frequentAskedQuestions"),
        Arc::new(FaqReportBuilder::new(
            insights,
            store.clone(),
            config.export_expiry_hours,
            config.max_export_size_mb,
        )),
    );
    for (kind, report_type) in [
        (UsageKind::Answer, "answer"),
        (UsageKind::Autofill, "autofill"),
        (UsageKind::Teammate, "AITeammate"),
    ] {
        builders.register(
            RouteKey::any_sub_type(ExportModule::UsageLogs, report_type),
            Arc::new(UsageLogsReportBuilder::new(
                kind,
                usage_logs.clone(),
                store.clone(),
                config.export_expiry_hours,
                config.max_export_size_mb,
            )),
        );
    }

    let mut sinks = SinkRegistry::new();
    sinks.register(
        ExportMode::Download,
        Arc::new(DownloadSink::new(store.clone(), config.export_expiry_hours)),
    );
    sinks.register(
        ExportMode::Email,
        Arc::new(EmailSink::new(store.clone(), config.export_expiry_hours)),
    );

    let router = Arc::new(JobRouter::new(builders, sinks, audit, notifier));

    let consumer = SqsConsumer::new(
        sqs_client,
        &config.queue_url,
        router,
        config.max_messages,
        config.wait_time_seconds,
        config.visibility_timeout,
    );

    let shutdown = CancellationToken::new();
    spawn_signal_handler(shutdown.clone());

    if let Err(e) = consumer.run(shutdown).await {
        error!("Consumer error: {}", e);
        return Err(e);
    }

    Ok(())
}

fn spawn_signal_handler(shutdown: CancellationToken) {
    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();

        #[cfg(unix)]
        {
            let mut sigterm =
                tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                    .expect("failed to install SIGTERM handler");
            tokio::select! {
                _ = ctrl_c => info!("Received SIGINT, shutting down..."),
                _ = sigterm.recv() => info!("Received SIGTERM, shutting down..."),
            }
        }

        #[cfg(not(unix))]
        {
            let _ = ctrl_c.await;
            info!("Received interrupt, shutting down...");
        }

        shutdown.cancel();
    });
}
