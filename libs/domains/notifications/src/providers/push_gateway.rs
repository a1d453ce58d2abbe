//! Push delivery through an HTTP push gateway.
//!
//! One batch request per notification:
//!
//! ```text
//! POST {base_url}/v1/push
//! {"recipients": [1, 2], "title": "...", "body": "..."}
//!
//! 200 {"results": [{"userId": 1, "ok": true}, {"userId": 2, "ok": false, "error": "..."}]}
//! ```
//!
//! Recipients missing from `results` count as failed.

use super::PushProvider;
use crate::error::{NotificationError, NotificationResult};
use crate::models::{DeliveryReport, PushMessage, UserId};
use async_trait::async_trait;
use core_config::{env_optional, env_parse, env_required, ConfigError, FromEnv};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct PushGatewayConfig {
    pub base_url: String,
    pub api_token: Option<String>,
    pub timeout: Duration,
}

impl PushGatewayConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            api_token: None,
            timeout: Duration::from_secs(5),
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.api_token = Some(token.into());
        self
    }

    fn push_url(&self) -> String {
        format!("{}/v1/push", self.base_url.trim_end_matches('/'))
    }
}

impl FromEnv for PushGatewayConfig {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            base_url: env_required("PUSH_GATEWAY_URL")?,
            api_token: env_optional("PUSH_GATEWAY_TOKEN"),
            timeout: Duration::from_millis(env_parse("PUSH_GATEWAY_TIMEOUT_MS", 5_000u64)?),
        })
    }
}

#[derive(Serialize)]
struct PushRequest<'a> {
    recipients: &'a [UserId],
    title: &'a str,
    body: &'a str,
}

#[derive(Deserialize)]
struct PushResponse {
    #[serde(default)]
    results: Vec<RecipientResult>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RecipientResult {
    user_id: UserId,
    ok: bool,
    #[serde(default)]
    error: Option<String>,
}

pub struct PushGatewayProvider {
    client: reqwest::Client,
    config: PushGatewayConfig,
}

impl PushGatewayProvider {
    pub fn new(config: PushGatewayConfig) -> NotificationResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| {
                NotificationError::ConfigError(format!("Failed to build HTTP client: {}", e))
            })?;

        Ok(Self { client, config })
    }

    fn report(recipients: &[UserId], response: PushResponse) -> DeliveryReport {
        let results: HashMap<UserId, RecipientResult> = response
            .results
            .into_iter()
            .map(|result| (result.user_id, result))
            .collect();

        let mut report = DeliveryReport::default();
        for &user_id in recipients {
            match results.get(&user_id) {
                Some(result) if result.ok => report.delivered.push(user_id),
                Some(result) => report.failed.push((
                    user_id,
                    result
                        .error
                        .clone()
                        .unwrap_or_else(|| "rejected".to_string()),
                )),
                None => report
                    .failed
                    .push((user_id, "no result from gateway".to_string())),
            }
        }
        report
    }
}

#[async_trait]
impl PushProvider for PushGatewayProvider {
    async fn send(
        &self,
        recipients: &[UserId],
        message: &PushMessage,
    ) -> NotificationResult<DeliveryReport> {
        if recipients.is_empty() {
            return Ok(DeliveryReport::default());
        }

        debug!(recipients = recipients.len(), title = %message.title, "Sending push");

        let mut request = self.client.post(self.config.push_url()).json(&PushRequest {
            recipients,
            title: &message.title,
            body: &message.body,
        });
        if let Some(token) = &self.config.api_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = %status, body = %body, "Push gateway rejected request");
            return Err(NotificationError::ProviderError(format!(
                "Push gateway returned {}: {}",
                status, body
            )));
        }

        let report = Self::report(recipients, response.json().await?);
        if !report.is_complete() {
            warn!(
                failed = report.failed.len(),
                total = report.total(),
                "Push partially delivered"
            );
        }
        Ok(report)
    }

    fn name(&self) -> &'static str {
        "PushGateway"
    }
}
