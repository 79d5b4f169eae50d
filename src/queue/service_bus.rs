//! Azure Service Bus binding over the REST peek-lock API
//!
//! Messages are received from a topic subscription with a lock; the lock URL
//! returned in the `Location` header is the settlement handle. DELETE on it
//! completes the message, PUT unlocks it for immediate redelivery.

use super::{Notification, QueueService};
use crate::config::schema::{ServiceBusConfig, MAX_WAIT_SECS};
use crate::error::{RefresherError, RefresherResult};
use async_trait::async_trait;
use base64::prelude::{Engine as _, BASE64_STANDARD};
use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use std::time::Duration;
use tracing::debug;
use url::form_urlencoded::byte_serialize;

const SERVICE: &str = "Service Bus";

/// Lifetime of each signed request token
const TOKEN_TTL_SECS: i64 = 3600;

/// Extra time the HTTP client waits beyond the server-side long poll
const HTTP_GRACE: Duration = Duration::from_secs(10);

/// Parsed namespace connection string
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionString {
    /// `https://<namespace>.servicebus.windows.net`
    pub endpoint: String,
    pub key_name: String,
    pub key: String,
}

impl ConnectionString {
    /// Parse `Endpoint=sb://...;SharedAccessKeyName=...;SharedAccessKey=...`
    pub fn parse(raw: &str) -> Result<Self, String> {
        let mut endpoint = None;
        let mut key_name = None;
        let mut key = None;

        for part in raw.split(';').map(str::trim).filter(|p| !p.is_empty()) {
            let (name, value) = part
                .split_once('=')
                .ok_or("connection string segment without '='")?;
            match name {
                "Endpoint" => endpoint = Some(value.to_string()),
                "SharedAccessKeyName" => key_name = Some(value.to_string()),
                "SharedAccessKey" => key = Some(value.to_string()),
                _ => {}
            }
        }

        let endpoint = endpoint.ok_or("connection string has no Endpoint")?;
        let host = endpoint
            .strip_prefix("sb://")
            .or_else(|| endpoint.strip_prefix("https://"))
            .ok_or_else(|| format!("unsupported endpoint scheme in '{}'", endpoint))?
            .trim_end_matches('/');
        if host.is_empty() {
            return Err("connection string endpoint has no host".to_string());
        }

        Ok(Self {
            endpoint: format!("https://{}", host),
            key_name: key_name.ok_or("connection string has no SharedAccessKeyName")?,
            key: key.ok_or("connection string has no SharedAccessKey")?,
        })
    }
}

/// Build a SharedAccessSignature authorization header value
pub fn sas_token(resource: &str, key_name: &str, key: &str, expiry: i64) -> RefresherResult<String> {
    let encoded: String = byte_serialize(resource.to_lowercase().as_bytes()).collect();
    let to_sign = format!("{}\n{}", encoded, expiry);

    let mut mac = Hmac::<Sha256>::new_from_slice(key.as_bytes())
        .map_err(|e| RefresherError::Internal(format!("HMAC key rejected: {}", e)))?;
    mac.update(to_sign.as_bytes());
    let signature = BASE64_STANDARD.encode(mac.finalize().into_bytes());
    let signature: String = byte_serialize(signature.as_bytes()).collect();

    Ok(format!(
        "SharedAccessSignature sr={}&sig={}&se={}&skn={}",
        encoded, signature, expiry, key_name
    ))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct BrokerProperties {
    #[serde(default)]
    message_id: String,
    lock_token: String,
    #[serde(default)]
    delivery_count: Option<u32>,
}

/// What a receive request produced
enum Received {
    Empty,
    Locked {
        broker_properties: String,
        location: Option<String>,
    },
}

/// Topic subscription on an Azure Service Bus namespace
pub struct ServiceBusQueue {
    agent: ureq::Agent,
    connection: ConnectionString,
    topic: String,
    subscription: String,
}

impl ServiceBusQueue {
    pub fn from_config(config: &ServiceBusConfig) -> RefresherResult<Self> {
        let connection =
            ConnectionString::parse(&config.connection_string).map_err(|reason| {
                RefresherError::transport(SERVICE, format!("invalid connection string: {}", reason))
            })?;
        Ok(Self::new(connection, &config.topic, &config.subscription))
    }

    pub fn new(
        connection: ConnectionString,
        topic: impl Into<String>,
        subscription: impl Into<String>,
    ) -> Self {
        let config = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .timeout_global(Some(Duration::from_secs(MAX_WAIT_SECS) + HTTP_GRACE))
            .build();
        Self {
            agent: ureq::Agent::new_with_config(config),
            connection,
            topic: topic.into(),
            subscription: subscription.into(),
        }
    }

    /// `https://<ns>/<topic>/subscriptions/<subscription>`
    pub fn entity_url(&self) -> String {
        format!(
            "{}/{}/subscriptions/{}",
            self.connection.endpoint, self.topic, self.subscription
        )
    }

    fn authorization(&self) -> RefresherResult<String> {
        sas_token(
            &self.entity_url(),
            &self.connection.key_name,
            &self.connection.key,
            Utc::now().timestamp() + TOKEN_TTL_SECS,
        )
    }

    /// Run a blocking HTTP exchange off the async workers
    async fn blocking<T, F>(&self, call: F) -> RefresherResult<T>
    where
        T: Send + 'static,
        F: FnOnce(ureq::Agent) -> RefresherResult<T> + Send + 'static,
    {
        let agent = self.agent.clone();
        tokio::task::spawn_blocking(move || call(agent))
            .await
            .map_err(|e| RefresherError::Internal(format!("HTTP worker failed: {}", e)))?
    }

    /// Settle a locked message with DELETE (complete) or PUT (unlock)
    async fn settle(&self, notification: &Notification, complete: bool) -> RefresherResult<()> {
        let url = notification.handle.clone();
        let token = self.authorization()?;
        let status = self
            .blocking(move |agent| {
                let response = if complete {
                    agent.delete(&url).header("Authorization", &token).call()
                } else {
                    agent.put(&url).header("Authorization", &token).send_empty()
                };
                response
                    .map(|r| r.status().as_u16())
                    .map_err(|e| RefresherError::transport(SERVICE, e.to_string()))
            })
            .await?;

        check_status(status, if complete { "complete" } else { "abandon" })
    }
}

/// Map a non-success HTTP status onto the error taxonomy
fn check_status(status: u16, operation: &str) -> RefresherResult<()> {
    match status {
        200..=299 => Ok(()),
        401 | 403 => Err(RefresherError::Unauthorized {
            service: SERVICE,
            reason: format!("{} returned HTTP {}", operation, status),
        }),
        404 | 410 => Err(RefresherError::transport(
            SERVICE,
            format!("{}: message lock lost (HTTP {})", operation, status),
        )),
        _ => Err(RefresherError::transport(
            SERVICE,
            format!("{} returned HTTP {}", operation, status),
        )),
    }
}

/// Turn a locked message's headers into a notification
fn parse_locked(
    entity_url: &str,
    broker_properties: &str,
    location: Option<String>,
) -> RefresherResult<Notification> {
    let props: BrokerProperties = serde_json::from_str(broker_properties)?;
    let handle = location.unwrap_or_else(|| {
        format!(
            "{}/messages/{}/{}",
            entity_url, props.message_id, props.lock_token
        )
    });

    Ok(Notification {
        id: props.message_id,
        handle,
        delivery_count: props.delivery_count,
    })
}

#[async_trait]
impl QueueService for ServiceBusQueue {
    fn service_name(&self) -> &'static str {
        SERVICE
    }

    fn describe(&self) -> String {
        format!("topic {} / subscription {}", self.topic, self.subscription)
    }

    async fn connect(&self) -> RefresherResult<()> {
        self.authorization()?;
        debug!("Service Bus credentials ready for {}", self.entity_url());
        Ok(())
    }

    async fn receive(&self, max: u32, wait: Duration) -> RefresherResult<Vec<Notification>> {
        // The REST API locks one message per request.
        let max = max.max(1);
        let url = format!(
            "{}/messages/head?timeout={}",
            self.entity_url(),
            wait.as_secs()
        );
        let mut received = Vec::new();

        for _ in 0..max {
            let url = url.clone();
            let token = self.authorization()?;
            let outcome = self
                .blocking(move |agent| {
                    let response = agent
                        .post(&url)
                        .header("Authorization", &token)
                        .send_empty()
                        .map_err(|e| RefresherError::transport(SERVICE, e.to_string()))?;

                    match response.status().as_u16() {
                        201 => {
                            let header = |name: &str| {
                                response
                                    .headers()
                                    .get(name)
                                    .and_then(|v| v.to_str().ok())
                                    .map(str::to_string)
                            };
                            let broker_properties = header("BrokerProperties").ok_or_else(|| {
                                RefresherError::transport(SERVICE, "locked message without BrokerProperties")
                            })?;
                            Ok(Received::Locked {
                                broker_properties,
                                location: header("Location"),
                            })
                        }
                        204 => Ok(Received::Empty),
                        status => check_status(status, "receive").map(|_| Received::Empty),
                    }
                })
                .await?;

            match outcome {
                Received::Empty => break,
                Received::Locked {
                    broker_properties,
                    location,
                } => received.push(parse_locked(
                    &self.entity_url(),
                    &broker_properties,
                    location,
                )?),
            }
        }

        Ok(received)
    }

    async fn acknowledge(&self, notification: &Notification) -> RefresherResult<()> {
        self.settle(notification, true).await
    }

    async fn abandon(&self, notification: &Notification) -> RefresherResult<()> {
        self.settle(notification, false).await
    }
}
