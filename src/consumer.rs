//! SQS export-job consumer
//!
//! Long-polls the reporting queue in batches and runs one pipeline per
//! message. Successful and poison messages are deleted; transient failures
//! are left in flight so the broker redrives them after the visibility
//! timeout. Each batch also yields the `{batchItemFailures}` report the
//! broker driver contract expects.
//!
//! Shutdown is graceful: SIGINT/SIGTERM stops new receives, in-flight
//! pipelines run to completion. A pipeline that outlives the visibility
//! timeout is abandoned at its next checkpoint, never killed mid-step.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::error::ExportError;
use crate::reports::JobContext;
use crate::router::JobRouter;
use crate::types::{ExportJob, REQUIRED_JOB_FIELDS};

/// Broker driver reply: per-message failures for selective redrive.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SqsBatchResponse {
    pub batch_item_failures: Vec<BatchItemFailure>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BatchItemFailure {
    pub item_identifier: String,
}

/// What to do with a broker message once its pipeline finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageDisposition {
    /// Delete the message: success, or poison that must not redrive.
    Ack,
    /// Leave the message for redrive after the visibility timeout.
    Retry,
}

pub fn disposition_for(result: &Result<(), ExportError>) -> MessageDisposition {
    match result {
        Ok(()) => MessageDisposition::Ack,
        Err(err) if err.is_poison() => MessageDisposition::Ack,
        Err(_) => MessageDisposition::Retry,
    }
}

/// One message pulled off the queue.
#[derive(Debug, Clone)]
pub struct ReceivedMessage {
    pub id: String,
    pub receipt: String,
    pub body: String,
}

// ==========================================================================
// Envelope parsing
// ==========================================================================

/// Decode a broker message body into a job.
///
/// Two shapes are accepted: the job payload itself, or a fan-out wrapper
/// `{Message: <stringified job>, MessageAttributes: {...}}` whose `Message`
/// is JSON-decoded for as long as it remains a string.
pub fn parse_envelope(body: &str) -> Result<ExportJob, ExportError> {
    let outer: serde_json::Value = serde_json::from_str(body)
        .map_err(|e| ExportError::InvalidMessage(format!("body is not JSON: {e}")))?;

    let payload = match outer.get("Message") {
        Some(message) => {
            let mut inner = message.clone();
            while let Some(raw) = inner.as_str() {
                inner = serde_json::from_str(raw).map_err(|e| {
                    ExportError::InvalidMessage(format!("wrapped Message is not JSON: {e}"))
                })?;
            }
            if let Some(event_type) = outer
                .pointer("/MessageAttributes/event_type/Value")
                .and_then(|v| v.as_str())
            {
                info!("Received wrapped export event of type {}", event_type);
            }
            inner
        }
        None => outer,
    };

    validate_required(&payload)?;

    serde_json::from_value(payload)
        .map_err(|e| ExportError::InvalidMessage(format!("malformed export job: {e}")))
}

fn validate_required(payload: &serde_json::Value) -> Result<(), ExportError> {
    let Some(object) = payload.as_object() else {
        return Err(ExportError::InvalidMessage("payload is not an object".into()));
    };
    for field in REQUIRED_JOB_FIELDS {
        let present = match field {
            // user_id arrives under either naming convention
            "user_id" => {
                object.get("user_id").map_or(false, |v| !v.is_null())
                    || object.get("userId").map_or(false, |v| !v.is_null())
            }
            _ => object.get(field).map_or(false, |v| !v.is_null()),
        };
        if !present {
            return Err(ExportError::InvalidMessage(format!(
                "missing required field: {field}"
            )));
        }
    }
    Ok(())
}

// ==========================================================================
// Pipelines
// ==========================================================================

/// Run every message of a batch through the router concurrently and collect
/// dispositions. Each pipeline gets its own cancellation signal tied to the
/// visibility timeout.
pub async fn run_pipelines(
    router: Arc<JobRouter>,
    messages: Vec<ReceivedMessage>,
    visibility_timeout: Duration,
) -> Vec<(ReceivedMessage, MessageDisposition)> {
    let mut tasks = JoinSet::new();

    for message in messages {
        let router = router.clone();
        tasks.spawn(async move {
            let disposition = process_message(router, &message, visibility_timeout).await;
            (message, disposition)
        });
    }

    let mut outcomes = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok(outcome) => outcomes.push(outcome),
            Err(e) => error!("Export pipeline task panicked: {}", e),
        }
    }
    outcomes
}

async fn process_message(
    router: Arc<JobRouter>,
    message: &ReceivedMessage,
    visibility_timeout: Duration,
) -> MessageDisposition {
    info!("Processing message {}", message.id);

    let job = match parse_envelope(&message.body) {
        Ok(job) => job,
        Err(e) => {
            // Poison: drop without audit writes or notifications.
            warn!("Dropping message {}: {}", message.id, e);
            return MessageDisposition::Ack;
        }
    };

    // The job is abandoned, not aborted, when the broker would redeliver it:
    // the token flips at the visibility deadline and the pipeline stops at
    // its next checkpoint, letting the current storage call finish cleanly.
    let token = CancellationToken::new();
    let deadline = tokio::spawn({
        let token = token.clone();
        async move {
            tokio::time::sleep(visibility_timeout).await;
            token.cancel();
        }
    });

    let result = router.process(&job, &JobContext::new(token)).await;
    deadline.abort();

    match &result {
        Ok(()) => info!("Message {} processed", message.id),
        Err(e) if e.is_poison() => warn!("Message {} is unprocessable: {}", message.id, e),
        Err(e) => error!("Message {} failed, leaving for redrive: {}", message.id, e),
    }
    disposition_for(&result)
}

/// Assemble the broker driver reply from pipeline outcomes.
pub fn batch_response(
    outcomes: &[(ReceivedMessage, MessageDisposition)],
) -> SqsBatchResponse {
    SqsBatchResponse {
        batch_item_failures: outcomes
            .iter()
            .filter(|(_, disposition)| *disposition == MessageDisposition::Retry)
            .map(|(message, _)| BatchItemFailure {
                item_identifier: message.id.clone(),
            })
            .collect(),
    }
}

// ==========================================================================
// Consumer loop
// ==========================================================================

pub struct SqsConsumer {
    client: aws_sdk_sqs::Client,
    queue_url: String,
    router: Arc<JobRouter>,
    max_messages: i32,
    wait_time_seconds: i32,
    visibility_timeout: i32,
}

impl SqsConsumer {
    pub fn new(
        client: aws_sdk_sqs::Client,
        queue_url: &str,
        router: Arc<JobRouter>,
        max_messages: i32,
        wait_time_seconds: i32,
        visibility_timeout: i32,
    ) -> Self {
        Self {
            client,
            queue_url: queue_url.to_string(),
            router,
            max_messages,
            wait_time_seconds,
            visibility_timeout,
        }
    }

    /// Poll until the shutdown token fires. Each batch runs to completion
    /// before the next receive, so cancellation never strands a pipeline.
    pub async fn run(&self, shutdown: CancellationToken) -> anyhow::Result<()> {
        info!("Starting SQS consumer for queue {}", self.queue_url);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Shutdown requested, ceasing receives");
                    break;
                }
                received = self.receive() => {
                    match received {
                        Ok(messages) if messages.is_empty() => continue,
                        Ok(messages) => self.handle_batch(messages).await,
                        Err(e) => {
                            error!("Queue receive failed: {}", e);
                            tokio::time::sleep(Duration::from_secs(5)).await;
                        }
                    }
                }
            }
        }

        info!("SQS consumer stopped");
        Ok(())
    }

    async fn receive(&self) -> anyhow::Result<Vec<ReceivedMessage>> {
        let output = self
            .client
            .receive_message()
            .queue_url(&self.queue_url)
            .max_number_of_messages(self.max_messages)
            .wait_time_seconds(self.wait_time_seconds)
            .visibility_timeout(self.visibility_timeout)
            .message_attribute_names("All")
            .send()
            .await?;

        let messages = output
            .messages()
            .iter()
            .filter_map(|m| {
                Some(ReceivedMessage {
                    id: m.message_id()?.to_string(),
                    receipt: m.receipt_handle()?.to_string(),
                    body: m.body().unwrap_or_default().to_string(),
                })
            })
            .collect::<Vec<_>>();

        if !messages.is_empty() {
            info!("Received {} messages", messages.len());
        }
        Ok(messages)
    }

    async fn handle_batch(&self, messages: Vec<ReceivedMessage>) {
        let visibility = Duration::from_secs(self.visibility_timeout.max(0) as u64);
        let outcomes = run_pipelines(self.router.clone(), messages, visibility).await;

        for (message, disposition) in &outcomes {
            if *disposition == MessageDisposition::Ack {
                if let Err(e) = self
                    .client
                    .delete_message()
                    .queue_url(&self.queue_url)
                    .receipt_handle(&message.receipt)
                    .send()
                    .await
                {
                    error!("Failed to delete message {}: {}", message.id, e);
                }
            }
        }

        let response = batch_response(&outcomes);
        info!(
            "Batch complete: {} failures of {}",
            response.batch_item_failures.len(),
            outcomes.len()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ExportMode, ExportModule};

    fn direct_body() -> String {
        serde_json::json!({
            "eventId": "evt-1",
            "mode": "download",
            "module": "usageLogs",
            "type": "answer",
            "subType": "logs",
            "user_id": 42,
            "clientId": 7,
            "productId": 3
        })
        .to_string()
    }

    #[test]
    fn test_parse_direct_payload() {
        let job = parse_envelope(&direct_body()).unwrap();
        assert_eq!(job.event_id, "evt-1");
        assert_eq!(job.module, ExportModule::UsageLogs);
        assert_eq!(job.mode, ExportMode::Download);
    }

    #[test]
    fn test_parse_wrapped_payload() {
        let wrapped = serde_json::json!({
            "Message": direct_body(),
            "MessageAttributes": {"event_type": {"Value": "EXPORT_REQUEST"}}
        })
        .to_string();

        let job = parse_envelope(&wrapped).unwrap();
        assert_eq!(job.event_id, "evt-1");
    }

    #[test]
    fn test_parse_doubly_encoded_message() {
        // Some producers stringify the already-stringified payload.
        let once = serde_json::Value::String(direct_body());
        let twice = serde_json::Value::String(once.to_string());
        let wrapped = format!("{{\"Message\": {}}}", twice);
        let job = parse_envelope(&wrapped).unwrap();
        assert_eq!(job.event_id, "evt-1");
    }

    #[test]
    fn test_missing_event_id_is_invalid() {
        let mut value: serde_json::Value = serde_json::from_str(&direct_body()).unwrap();
        value.as_object_mut().unwrap().remove("eventId");
        let err = parse_envelope(&value.to_string()).unwrap_err();
        assert!(matches!(err, ExportError::InvalidMessage(_)));
        assert!(err.to_string().contains("eventId"));
    }

    #[test]
    fn test_null_required_field_is_invalid() {
        let mut value: serde_json::Value = serde_json::from_str(&direct_body()).unwrap();
        value["clientId"] = serde_json::Value::Null;
        assert!(parse_envelope(&value.to_string()).is_err());
    }

    #[test]
    fn test_user_id_alias_passes_validation() {
        let mut value: serde_json::Value = serde_json::from_str(&direct_body()).unwrap();
        let obj = value.as_object_mut().unwrap();
        let uid = obj.remove("user_id").unwrap();
        obj.insert("userId".into(), uid);
        assert!(parse_envelope(&value.to_string()).is_ok());
    }

    #[test]
    fn test_non_json_body_is_invalid() {
        assert!(parse_envelope("not json at all").is_err());
    }

    #[test]
    fn test_disposition_rules() {
        assert_eq!(disposition_for(&Ok(())), MessageDisposition::Ack);
        assert_eq!(
            disposition_for(&Err(ExportError::InvalidMessage("x".into()))),
            MessageDisposition::Ack
        );
        assert_eq!(
            disposition_for(&Err(ExportError::Upstream("x".into()))),
            MessageDisposition::Retry
        );
        assert_eq!(
            disposition_for(&Err(ExportError::Cancelled("deadline".into()))),
            MessageDisposition::Retry
        );
    }

    #[test]
    fn test_batch_response_lists_only_retries() {
        let ok = ReceivedMessage {
            id: "m1".into(),
            receipt: "r1".into(),
            body: String::new(),
        };
        let failed = ReceivedMessage {
            id: "m2".into(),
            receipt: "r2".into(),
            body: String::new(),
        };
        let outcomes = vec![
            (ok, MessageDisposition::Ack),
            (failed, MessageDisposition::Retry),
        ];

        let response = batch_response(&outcomes);
        assert_eq!(response.batch_item_failures.len(), 1);
        assert_eq!(response.batch_item_failures[0].item_identifier, "m2");
    }

    #[test]
    fn test_batch_response_serializes_to_broker_contract() {
        let response = SqsBatchResponse {
            batch_item_failures: vec![BatchItemFailure {
                item_identifier: "m2".into(),
            }],
        };
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"batchItemFailures": [{"itemIdentifier": "m2"}]})
        );
    }
}
