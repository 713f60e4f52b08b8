//! Response-URL webhook used to notify a command's origin after the
//! synchronous request/response cycle has already completed.

use std::time::Duration;

use lgtm_core::truncate_for_error;
use serde::Serialize;

use crate::api_client::SlackApiError;

const ERROR_BODY_MAX_CHARS: usize = 800;

#[derive(Debug, Clone, Serialize)]
/// Payload posted to a command's response_url.
pub struct WebhookMessage {
    pub response_type: String,
    pub text: String,
}

impl WebhookMessage {
    /// Message visible only to the invoking user.
    pub fn ephemeral(text: impl Into<String>) -> Self {
        Self {
            response_type: "ephemeral".to_string(),
            text: text.into(),
        }
    }
}

/// Posts notifications to one command's response_url.
pub struct SlackWebhook {
    http: reqwest::Client,
    url: String,
}

impl SlackWebhook {
    pub fn new(url: impl Into<String>, request_timeout_ms: u64) -> Result<Self, SlackApiError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(request_timeout_ms.max(1)))
            .build()
            .map_err(|error| SlackApiError::InvalidConfig(error.to_string()))?;
        Ok(Self {
            http,
            url: url.into(),
        })
    }

    pub async fn notify(&self, message: &WebhookMessage) -> Result<(), SlackApiError> {
        let response = match self.http.post(&self.url).json(message).send().await {
            Ok(response) => response,
            Err(error) => {
                tracing::warn!(url = %self.url, "webhook transport failure: {error}");
                return Err(SlackApiError::Transport {
                    status: 500,
                    message: error.to_string(),
                });
            }
        };
        let status = response.status().as_u16();
        if status != 200 {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(
                url = %self.url,
                status,
                body = %truncate_for_error(&body, ERROR_BODY_MAX_CHARS),
                "webhook delivery failed"
            );
            return Err(SlackApiError::Status {
                method: "response_url".to_string(),
                status,
                body,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use httpmock::prelude::*;
    use serde_json::json;

    use super::{SlackWebhook, WebhookMessage};

    #[tokio::test]
    async fn notify_posts_the_message_as_json() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST).path("/hook").json_body(json!({
                    "response_type": "ephemeral",
                    "text": "Oops! Something went wrong. :sob:",
                }));
                then.status(200).body("ok");
            })
            .await;

        let webhook = SlackWebhook::new(server.url("/hook"), 2_000).expect("webhook");
        webhook
            .notify(&WebhookMessage::ephemeral("Oops! Something went wrong. :sob:"))
            .await
            .expect("notify");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn notify_surfaces_failed_delivery() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/hook");
                then.status(410).body("expired");
            })
            .await;

        let webhook = SlackWebhook::new(server.url("/hook"), 2_000).expect("webhook");
        let error = webhook
            .notify(&WebhookMessage::ephemeral("hello"))
            .await
            .expect_err("410 must fail");
        assert!(error.to_string().contains("410"));
    }
}
