//! Slack Web API client used by the command pipeline.

use std::{collections::HashMap, time::Duration};

use lgtm_core::truncate_for_error;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;

pub const DEFAULT_SLACK_API_BASE: &str = "https://slack.com/api";

/// Error string Slack returns when the acting credential lacks channel
/// membership.
const NOT_IN_CHANNEL_ERROR: &str = "not_in_channel";

const ERROR_BODY_MAX_CHARS: usize = 800;

#[derive(Debug, Error)]
/// Failure taxonomy for Slack Web API calls.
pub enum SlackApiError {
    #[error("transport failure (status {status}): {message}")]
    Transport { status: u16, message: String },
    #[error("slack api {method} failed with status {status}: {body}")]
    Status {
        method: String,
        status: u16,
        body: String,
    },
    /// The acting credential is not a member of the target channel. The
    /// pipeline recognizes this by type and answers with an invite
    /// instruction instead of the generic failure message.
    #[error("acting credential is not a member of the target channel")]
    NotInChannel,
    #[error("slack api {method} failed: {error}")]
    Api { method: String, error: String },
    #[error("invalid slack response from {method}: {message}")]
    InvalidResponse { method: String, message: String },
    #[error("invalid client configuration: {0}")]
    InvalidConfig(String),
}

#[derive(Debug, Clone, Deserialize)]
/// One per-channel share event for an uploaded file.
pub struct ShareEntry {
    pub ts: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
/// Per-channel share metadata attached to an uploaded file.
pub struct FileShares {
    #[serde(default)]
    pub public: HashMap<String, Vec<ShareEntry>>,
    #[serde(default)]
    pub private: HashMap<String, Vec<ShareEntry>>,
}

#[derive(Debug, Clone, Deserialize)]
/// File metadata returned after posting or promoting a file.
pub struct ChatFileRecord {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub url_private: Option<String>,
    #[serde(default)]
    pub permalink_public: Option<String>,
    #[serde(default)]
    pub shares: FileShares,
}

impl ChatFileRecord {
    /// Timestamp of the share event in `channel`, checking public shares
    /// before private ones. Locates the message for later comment updates.
    pub fn share_ts(&self, channel: &str) -> Option<&str> {
        self.shares
            .public
            .get(channel)
            .and_then(|entries| entries.first())
            .or_else(|| {
                self.shares
                    .private
                    .get(channel)
                    .and_then(|entries| entries.first())
            })
            .map(|entry| entry.ts.as_str())
    }

    /// Externally reachable URL with the public secret embedded; the secret
    /// is the trailing `-` segment of the public permalink.
    pub fn public_file_url(&self) -> Option<String> {
        let url_private = self.url_private.as_deref()?;
        let permalink_public = self.permalink_public.as_deref()?;
        let pub_secret = permalink_public.rsplit('-').next()?;
        Some(format!("{url_private}?pub_secret={pub_secret}"))
    }
}

#[derive(Debug, Clone)]
/// The invoking bot's own identity.
pub struct BotIdentity {
    pub user_id: String,
}

#[derive(Debug, Clone, Deserialize)]
/// Subset of a Slack user record the pipeline cares about.
pub struct SlackUser {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub locale: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SlackAuthTestResponse {
    ok: bool,
    #[serde(default)]
    user_id: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SlackUsersInfoResponse {
    ok: bool,
    #[serde(default)]
    user: Option<SlackUser>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SlackFileResponse {
    ok: bool,
    #[serde(default)]
    file: Option<ChatFileRecord>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SlackChatUpdateResponse {
    ok: bool,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Clone)]
/// Slack Web API client bound to one credential. The pipeline holds two:
/// the bot token for posting and a user token for public-link promotion.
pub struct SlackApiClient {
    http: reqwest::Client,
    api_base: String,
    token: String,
}

impl SlackApiClient {
    pub fn new(
        api_base: impl Into<String>,
        token: impl Into<String>,
        request_timeout_ms: u64,
    ) -> Result<Self, SlackApiError> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::ACCEPT,
            reqwest::header::HeaderValue::from_static("application/json"),
        );
        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_millis(request_timeout_ms.max(1)))
            .build()
            .map_err(|error| SlackApiError::InvalidConfig(error.to_string()))?;
        Ok(Self {
            http,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            token: token.into().trim().to_string(),
        })
    }

    /// Resolves the acting credential's own user id.
    pub async fn auth_test(&self) -> Result<BotIdentity, SlackApiError> {
        let request = self
            .http
            .post(format!("{}/auth.test", self.api_base))
            .bearer_auth(&self.token);
        let response: SlackAuthTestResponse = self.request_json("auth.test", request).await?;
        if !response.ok {
            return Err(self.api_failure("auth.test", response.error));
        }
        let user_id = response
            .user_id
            .filter(|value| !value.trim().is_empty())
            .ok_or_else(|| SlackApiError::InvalidResponse {
                method: "auth.test".to_string(),
                message: "missing user_id".to_string(),
            })?;
        Ok(BotIdentity { user_id })
    }

    /// Looks up a user, primarily for their locale.
    pub async fn users_info(&self, user: &str) -> Result<SlackUser, SlackApiError> {
        let request = self
            .http
            .get(format!("{}/users.info", self.api_base))
            .bearer_auth(&self.token)
            .query(&[("user", user), ("include_locale", "true")]);
        let response: SlackUsersInfoResponse = self.request_json("users.info", request).await?;
        if !response.ok {
            return Err(self.api_failure("users.info", response.error));
        }
        response.user.ok_or_else(|| SlackApiError::InvalidResponse {
            method: "users.info".to_string(),
            message: "missing user".to_string(),
        })
    }

    /// Posts a binary blob into `channel` and returns the file record,
    /// including the per-channel share timestamp used for later updates.
    pub async fn files_upload(
        &self,
        channel: &str,
        bytes: Vec<u8>,
        filename: &str,
        filetype: &str,
        title: &str,
        initial_comment: &str,
    ) -> Result<ChatFileRecord, SlackApiError> {
        if filename.trim().is_empty() {
            return Err(SlackApiError::InvalidConfig(
                "file upload requires a non-empty filename".to_string(),
            ));
        }
        if bytes.is_empty() {
            return Err(SlackApiError::InvalidConfig(
                "file upload requires a non-empty payload".to_string(),
            ));
        }
        let part = reqwest::multipart::Part::bytes(bytes).file_name(filename.to_string());
        let form = reqwest::multipart::Form::new()
            .text("channels", channel.to_string())
            .text("filename", filename.to_string())
            .text("filetype", filetype.to_string())
            .text("title", title.to_string())
            .text("initial_comment", initial_comment.to_string())
            .part("file", part);
        let request = self
            .http
            .post(format!("{}/files.upload", self.api_base))
            .bearer_auth(&self.token)
            .multipart(form);
        let response: SlackFileResponse = self.request_json("files.upload", request).await?;
        if !response.ok {
            return Err(self.api_failure("files.upload", response.error));
        }
        response.file.ok_or_else(|| SlackApiError::InvalidResponse {
            method: "files.upload".to_string(),
            message: "missing file".to_string(),
        })
    }

    /// Rewrites the text of an existing message located by channel + ts.
    pub async fn chat_update(
        &self,
        channel: &str,
        ts: &str,
        text: &str,
    ) -> Result<(), SlackApiError> {
        let payload = json!({
            "channel": channel,
            "ts": ts,
            "text": text,
        });
        let request = self
            .http
            .post(format!("{}/chat.update", self.api_base))
            .bearer_auth(&self.token)
            .json(&payload);
        let response: SlackChatUpdateResponse = self.request_json("chat.update", request).await?;
        if !response.ok {
            return Err(self.api_failure("chat.update", response.error));
        }
        Ok(())
    }

    /// Promotes a file to a public externally-reachable link. Requires an
    /// elevated (user) credential.
    pub async fn files_shared_public_url(
        &self,
        file_id: &str,
    ) -> Result<ChatFileRecord, SlackApiError> {
        let request = self
            .http
            .post(format!("{}/files.sharedPublicURL", self.api_base))
            .bearer_auth(&self.token)
            .form(&[("file", file_id)]);
        let response: SlackFileResponse =
            self.request_json("files.sharedPublicURL", request).await?;
        if !response.ok {
            return Err(self.api_failure("files.sharedPublicURL", response.error));
        }
        response.file.ok_or_else(|| SlackApiError::InvalidResponse {
            method: "files.sharedPublicURL".to_string(),
            message: "missing file".to_string(),
        })
    }

    async fn request_json<T>(
        &self,
        method: &str,
        request: reqwest::RequestBuilder,
    ) -> Result<T, SlackApiError>
    where
        T: DeserializeOwned,
    {
        let response = match request.send().await {
            Ok(response) => response,
            Err(error) => {
                tracing::warn!(method, "slack transport failure: {error}");
                return Err(SlackApiError::Transport {
                    status: 500,
                    message: error.to_string(),
                });
            }
        };
        let status = response.status().as_u16();
        let body = match response.text().await {
            Ok(body) => body,
            Err(error) => {
                tracing::warn!(method, status, "failed to read slack response: {error}");
                return Err(SlackApiError::Transport {
                    status: 500,
                    message: error.to_string(),
                });
            }
        };
        if status != 200 {
            tracing::warn!(
                method,
                status,
                body = %truncate_for_error(&body, ERROR_BODY_MAX_CHARS),
                "slack api call failed"
            );
            return Err(SlackApiError::Status {
                method: method.to_string(),
                status,
                body,
            });
        }
        serde_json::from_str(&body).map_err(|error| SlackApiError::InvalidResponse {
            method: method.to_string(),
            message: error.to_string(),
        })
    }

    fn api_failure(&self, method: &str, error: Option<String>) -> SlackApiError {
        let error = error.unwrap_or_else(|| "unknown error".to_string());
        if error == NOT_IN_CHANNEL_ERROR {
            return SlackApiError::NotInChannel;
        }
        tracing::warn!(method, error, "slack api returned failure");
        SlackApiError::Api {
            method: method.to_string(),
            error,
        }
    }
}
