//! SQS binding driven through the AWS CLI
//!
//! Uses the same `aws` executable as the S3 mirror, so credentials come from
//! the CLI's usual profile/instance-role chain.

use super::{Notification, QueueService};
use crate::config::schema::SqsConfig;
use crate::error::{RefresherError, RefresherResult};
use crate::exec::{CommandRunner, CommandSpec};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

const SERVICE: &str = "SQS";

/// Stderr fragments the AWS CLI prints for credential problems
const AUTH_MARKERS: &[&str] = &[
    "Unable to locate credentials",
    "InvalidClientTokenId",
    "ExpiredToken",
    "AccessDenied",
    "SignatureDoesNotMatch",
];

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ReceiveResponse {
    #[serde(default)]
    messages: Vec<SqsMessage>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SqsMessage {
    message_id: String,
    receipt_handle: String,
    #[serde(default)]
    attributes: HashMap<String, String>,
}

/// SQS queue accessed with `aws sqs ...`
pub struct SqsQueue {
    runner: Arc<dyn CommandRunner>,
    aws: String,
    url: String,
    region: Option<String>,
    profile: Option<String>,
}

impl SqsQueue {
    pub fn new(runner: Arc<dyn CommandRunner>, aws: impl Into<String>, config: &SqsConfig) -> Self {
        Self {
            runner,
            aws: aws.into(),
            url: config.url.clone(),
            region: config.region.clone(),
            profile: config.profile.clone(),
        }
    }

    /// `aws sqs <operation> --queue-url ...` with region/profile applied
    fn command(&self, operation: &str) -> CommandSpec {
        let mut spec = CommandSpec::new(&self.aws)
            .args(["sqs", operation])
            .arg("--queue-url")
            .arg(&self.url)
            .quiet();
        if let Some(region) = &self.region {
            spec = spec.arg("--region").arg(region);
        }
        if let Some(profile) = &self.profile {
            spec = spec.arg("--profile").arg(profile);
        }
        spec
    }

    async fn call(&self, spec: CommandSpec) -> RefresherResult<String> {
        match self.runner.run(&spec).await {
            Ok(output) => Ok(output.stdout),
            Err(RefresherError::CommandExecution { stderr, .. })
                if AUTH_MARKERS.iter().any(|m| stderr.contains(m)) =>
            {
                Err(RefresherError::Unauthorized {
                    service: SERVICE,
                    reason: stderr,
                })
            }
            Err(e) => Err(RefresherError::transport(SERVICE, e.to_string())),
        }
    }
}

/// Parse `receive-message` JSON output; the CLI prints nothing when the queue is empty
fn parse_receive(stdout: &str) -> RefresherResult<Vec<Notification>> {
    if stdout.trim().is_empty() {
        return Ok(Vec::new());
    }

    let response: ReceiveResponse = serde_json::from_str(stdout)?;
    Ok(response
        .messages
        .into_iter()
        .map(|m| Notification {
            delivery_count: m
                .attributes
                .get("ApproximateReceiveCount")
                .and_then(|c| c.parse().ok()),
            id: m.message_id,
            handle: m.receipt_handle,
        })
        .collect())
}

#[async_trait]
impl QueueService for SqsQueue {
    fn service_name(&self) -> &'static str {
        SERVICE
    }

    fn describe(&self) -> String {
        self.url.clone()
    }

    async fn connect(&self) -> RefresherResult<()> {
        let spec = self
            .command("get-queue-attributes")
            .args(["--attribute-names", "QueueArn", "--output", "json"]);
        self.call(spec).await?;
        debug!("Connected to {}", self.url);
        Ok(())
    }

    async fn receive(&self, max: u32, wait: Duration) -> RefresherResult<Vec<Notification>> {
        let spec = self
            .command("receive-message")
            .arg("--max-number-of-messages")
            .arg(max.to_string())
            .arg("--wait-time-seconds")
            .arg(wait.as_secs().to_string())
            .args(["--attribute-names", "ApproximateReceiveCount", "--output", "json"]);

        let stdout = self.call(spec).await?;
        parse_receive(&stdout)
    }

    async fn acknowledge(&self, notification: &Notification) -> RefresherResult<()> {
        let spec = self
            .command("delete-message")
            .arg("--receipt-handle")
            .arg(&notification.handle);
        self.call(spec).await.map(|_| ())
    }

    async fn abandon(&self, notification: &Notification) -> RefresherResult<()> {
        let spec = self
            .command("change-message-visibility")
            .arg("--receipt-handle")
            .arg(&notification.handle)
            .args(["--visibility-timeout", "0"]);
        self.call(spec).await.map(|_| ())
    }
}
