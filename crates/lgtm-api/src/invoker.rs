//! Single-call JSON API invoker shared by the asset and search clients.

use std::time::Duration;

use lgtm_core::truncate_for_error;
use serde_json::Value;

use crate::error::ApiError;

const ERROR_BODY_MAX_CHARS: usize = 800;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// HTTP method used for an invocation; parameters become the query string
/// for `Get` and the form body for `PostForm`.
pub enum ApiMethod {
    Get,
    PostForm,
}

impl ApiMethod {
    fn as_str(self) -> &'static str {
        match self {
            Self::Get => "get",
            Self::PostForm => "post",
        }
    }
}

#[derive(Clone)]
/// Performs one HTTP call against a JSON API and maps the outcome to a
/// parsed `Value` or an [`ApiError`]. No retry, no schema validation —
/// schema trust is pushed to callers.
pub struct JsonApiInvoker {
    http: reqwest::Client,
}

impl JsonApiInvoker {
    pub fn new(request_timeout_ms: u64) -> Result<Self, ApiError> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::ACCEPT,
            reqwest::header::HeaderValue::from_static("application/json"),
        );
        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_millis(request_timeout_ms.max(1)))
            .build()
            .map_err(|error| ApiError::InvalidConfig(error.to_string()))?;
        Ok(Self { http })
    }

    /// Invokes `endpoint` and returns the parsed 200 body. Any other
    /// outcome is logged at warn level with the full call context before
    /// being raised.
    pub async fn invoke(
        &self,
        endpoint: &str,
        method: ApiMethod,
        params: &[(String, String)],
    ) -> Result<Value, ApiError> {
        let request = match method {
            ApiMethod::Get => self.http.get(endpoint).query(params),
            ApiMethod::PostForm => self.http.post(endpoint).form(params),
        };

        let response = match request.send().await {
            Ok(response) => response,
            Err(error) => {
                tracing::warn!(
                    endpoint,
                    method = method.as_str(),
                    payload = ?params,
                    "transport failure: {error}"
                );
                return Err(ApiError::transport(error.to_string()));
            }
        };

        let status = response.status().as_u16();
        let body = match response.text().await {
            Ok(body) => body,
            Err(error) => {
                tracing::warn!(
                    endpoint,
                    method = method.as_str(),
                    status,
                    payload = ?params,
                    "failed to read response body: {error}"
                );
                return Err(ApiError::transport(error.to_string()));
            }
        };

        if status != 200 {
            tracing::warn!(
                endpoint,
                method = method.as_str(),
                status,
                body = %truncate_for_error(&body, ERROR_BODY_MAX_CHARS),
                payload = ?params,
                "api call failed"
            );
            return Err(ApiError::Status { status, body });
        }

        Ok(serde_json::from_str(&body)?)
    }

    /// Downloads a binary body, used when republishing derived images.
    pub async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, ApiError> {
        let response = match self.http.get(url).send().await {
            Ok(response) => response,
            Err(error) => {
                tracing::warn!(endpoint = url, method = "get", "transport failure: {error}");
                return Err(ApiError::transport(error.to_string()));
            }
        };

        let status = response.status().as_u16();
        if status != 200 {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(
                endpoint = url,
                method = "get",
                status,
                body = %truncate_for_error(&body, ERROR_BODY_MAX_CHARS),
                "binary fetch failed"
            );
            return Err(ApiError::Status { status, body });
        }

        match response.bytes().await {
            Ok(bytes) => Ok(bytes.to_vec()),
            Err(error) => {
                tracing::warn!(endpoint = url, method = "get", "failed to read bytes: {error}");
                Err(ApiError::transport(error.to_string()))
            }
        }
    }
}
