use std::future::Future;
use std::time::Duration;

use anyhow::{Context, Result};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::WebhookConfig;
use crate::notify::WebhookMessage;
use crate::scanner::Notifier;

/// Result of delivering one notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Delivered,
    Failed(String),
}

impl DispatchOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, DispatchOutcome::Delivered)
    }
}

/// How rate-limited (429) deliveries are retried.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the first rate-limited attempt before giving up.
    pub max_retries: u32,
    /// Server-supplied delays are clamped to this.
    pub max_wait: Duration,
    /// Delay when the response carries no usable `retry_after`.
    pub default_wait: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 10,
            max_wait: Duration::from_secs(60),
            default_wait: Duration::from_millis(1500),
        }
    }
}

impl From<&WebhookConfig> for RetryPolicy {
    /// Values that do not fit a `Duration` (negative, NaN, overflowing) fall back to the defaults.
    fn from(config: &WebhookConfig) -> Self {
        let fallback = Self::default();
        Self {
            max_retries: config.max_rate_limit_retries,
            max_wait: Duration::try_from_secs_f64(config.max_retry_after_secs)
                .unwrap_or(fallback.max_wait),
            default_wait: Duration::try_from_secs_f64(config.default_retry_after_secs)
                .unwrap_or(fallback.default_wait),
        }
    }
}

/// Status and body of one webhook POST.
#[derive(Debug, Clone)]
pub struct WebhookReply {
    pub status: u16,
    pub body: String,
}

/// Delay requested by a 429 body (`{"retry_after": 2.5}`), clamped to the policy ceiling.
pub fn retry_delay(body: &str, policy: &RetryPolicy) -> Duration {
    let requested = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("retry_after").and_then(Value::as_f64));
    match requested {
        Some(secs) if secs.is_finite() && secs >= 0.0 => {
            Duration::from_secs_f64(secs.min(policy.max_wait.as_secs_f64()))
        }
        _ => policy.default_wait,
    }
}

/// Run `attempt` until it is delivered, rejected, or the rate-limit budget runs out.
///
/// Only 429 replies are retried, after sleeping for the server's `retry_after`.
/// Any 2xx reply counts as delivered. Transport errors and other statuses fail
/// immediately.
pub async fn deliver_with_backoff<F, Fut>(policy: &RetryPolicy, mut attempt: F) -> DispatchOutcome
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<WebhookReply>>,
{
    let mut retries = 0u32;
    loop {
        let reply = match attempt().await {
            Ok(reply) => reply,
            Err(e) => {
                warn!("Webhook request failed: {e:#}");
                return DispatchOutcome::Failed(format!("request failed: {e:#}"));
            }
        };

        match reply.status {
            200..=299 => {
                debug!("Webhook accepted message ({})", reply.status);
                return DispatchOutcome::Delivered;
            }
            429 => {
                if retries >= policy.max_retries {
                    warn!("Still rate limited after {retries} retries, dropping message");
                    return DispatchOutcome::Failed(format!(
                        "rate limited, gave up after {retries} retries"
                    ));
                }
                retries += 1;
                let delay = retry_delay(&reply.body, policy);
                info!(
                    "Rate limited by webhook, retrying in {:.2}s ({retries}/{})",
                    delay.as_secs_f64(),
                    policy.max_retries,
                );
                tokio::time::sleep(delay).await;
            }
            status => {
                warn!("Webhook rejected message ({status}): {}", reply.body);
                return DispatchOutcome::Failed(format!("webhook returned status {status}"));
            }
        }
    }
}

/// Posts notifications to a chat webhook.
pub struct WebhookDispatcher {
    client: reqwest::Client,
    url: String,
    policy: RetryPolicy,
}

impl WebhookDispatcher {
    pub fn new(url: impl Into<String>, policy: RetryPolicy) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
            policy,
        }
    }

    /// Deliver one message, honoring rate limits.
    pub async fn deliver(&self, message: &WebhookMessage) -> DispatchOutcome {
        deliver_with_backoff(&self.policy, || self.post_once(message)).await
    }

    async fn post_once(&self, message: &WebhookMessage) -> Result<WebhookReply> {
        let resp = self
            .client
            .post(&self.url)
            .json(message)
            .send()
            .await
            .context("webhook POST failed")?;
        let status = resp.status().as_u16();
        let body = resp.text().await.unwrap_or_default();
        Ok(WebhookReply { status, body })
    }
}

impl Notifier for WebhookDispatcher {
    async fn send(&self, message: &WebhookMessage) -> DispatchOutcome {
        self.deliver(message).await
    }
}
