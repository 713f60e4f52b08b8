//! Asset-management API client: signed upload/destroy plus the
//! preset-authorized unsigned upload used by less privileged callers.

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::{
    error::ApiError,
    invoker::{ApiMethod, JsonApiInvoker},
    signer::{RequestSigner, SignedPayload},
};

pub const DEFAULT_API_BASE: &str = "https://api.cloudinary.com/v1_1";
pub const DEFAULT_DELIVERY_BASE: &str = "https://res.cloudinary.com";

/// This system only ever manages image assets.
const RESOURCE: &str = "image";

#[derive(Debug, Clone)]
/// Construction-time configuration for [`AssetClient`].
pub struct AssetClientConfig {
    pub cloud_name: String,
    pub api_key: String,
    pub api_secret: String,
    pub api_base: String,
    pub delivery_base: String,
    pub request_timeout_ms: u64,
}

impl AssetClientConfig {
    pub fn new(
        cloud_name: impl Into<String>,
        api_key: impl Into<String>,
        api_secret: impl Into<String>,
    ) -> Self {
        Self {
            cloud_name: cloud_name.into(),
            api_key: api_key.into(),
            api_secret: api_secret.into(),
            api_base: DEFAULT_API_BASE.to_string(),
            delivery_base: DEFAULT_DELIVERY_BASE.to_string(),
            request_timeout_ms: 30_000,
        }
    }
}

#[derive(Debug, Clone, Default)]
/// Optional upload parameters; serialized as form fields.
pub struct UploadOptions {
    /// Incoming transformation chain applied at upload time.
    pub transformation: Option<String>,
    /// Requests dominant-color extraction in the upload result.
    pub colors: bool,
}

#[derive(Debug, Clone, Deserialize)]
/// Derived-transformation descriptor attached to an upload result.
pub struct DerivedTransformation {
    #[serde(default)]
    pub transformation: Option<String>,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
    #[serde(default)]
    pub bytes: Option<u64>,
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub secure_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
/// Upload result returned by the asset-management API. Created by an upload
/// call and explicitly destroyed by public id before a pipeline run ends.
pub struct AssetRecord {
    pub public_id: String,
    #[serde(default)]
    pub asset_id: Option<String>,
    pub format: String,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub secure_url: Option<String>,
    #[serde(default)]
    pub original_filename: Option<String>,
    /// Dominant-color samples as `[hex, percentage]` pairs, most dominant
    /// first. Present only when the upload requested color extraction.
    #[serde(default)]
    pub colors: Option<Vec<(String, f64)>>,
    #[serde(default)]
    pub eager: Option<Vec<DerivedTransformation>>,
}

impl AssetRecord {
    /// Hex string of the most dominant extracted color, when available.
    pub fn dominant_color(&self) -> Option<&str> {
        self.colors
            .as_deref()
            .and_then(|samples| samples.first())
            .map(|(hex, _)| hex.as_str())
    }
}

#[derive(Debug, Clone, Deserialize)]
/// Outcome of a destroy call.
pub struct DestroyOutcome {
    pub result: String,
}

#[derive(Clone)]
/// Client for the asset-management API's upload/destroy surface.
pub struct AssetClient {
    invoker: JsonApiInvoker,
    signer: RequestSigner,
    config: AssetClientConfig,
}

impl AssetClient {
    pub fn new(config: AssetClientConfig) -> Result<Self, ApiError> {
        if config.cloud_name.trim().is_empty() {
            return Err(ApiError::InvalidConfig(
                "asset client requires a cloud name".to_string(),
            ));
        }
        let invoker = JsonApiInvoker::new(config.request_timeout_ms)?;
        let signer = RequestSigner::new(config.api_key.clone(), config.api_secret.clone());
        Ok(Self {
            invoker,
            signer,
            config,
        })
    }

    pub fn cloud_name(&self) -> &str {
        &self.config.cloud_name
    }

    /// Uploads a remote FTP/HTTP/HTTPS source URL as a signed operation.
    pub async fn upload(
        &self,
        source_url: &str,
        options: &UploadOptions,
    ) -> Result<AssetRecord, ApiError> {
        let mut params = BTreeMap::new();
        params.insert("file".to_string(), source_url.to_string());
        if let Some(transformation) = options.transformation.as_deref() {
            params.insert("transformation".to_string(), transformation.to_string());
        }
        if options.colors {
            params.insert("colors".to_string(), "true".to_string());
        }
        let payload = self.signer.sign(params);
        let value = self
            .invoker
            .invoke(&self.endpoint("upload"), ApiMethod::PostForm, &to_form(payload))
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Uploads through a pre-authorized preset instead of a signature.
    pub async fn unsigned_upload(
        &self,
        source_url: &str,
        upload_preset: &str,
    ) -> Result<AssetRecord, ApiError> {
        let params = vec![
            ("file".to_string(), source_url.to_string()),
            ("upload_preset".to_string(), upload_preset.to_string()),
        ];
        let value = self
            .invoker
            .invoke(&self.endpoint("upload"), ApiMethod::PostForm, &params)
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Destroys an uploaded asset by its public id (signed operation).
    pub async fn destroy(&self, public_id: &str) -> Result<DestroyOutcome, ApiError> {
        let mut params = BTreeMap::new();
        params.insert("public_id".to_string(), public_id.to_string());
        let payload = self.signer.sign(params);
        let value = self
            .invoker
            .invoke(&self.endpoint("destroy"), ApiMethod::PostForm, &to_form(payload))
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Builds a delivery URL for an on-the-fly derived view of an asset.
    /// The derived view is computed by the delivery host and never stored
    /// separately.
    pub fn delivery_url(&self, transformation: &str, public_id: &str, format: &str) -> String {
        format!(
            "{}/{}/{}/upload/{}/{}.{}",
            self.config.delivery_base.trim_end_matches('/'),
            self.config.cloud_name,
            RESOURCE,
            transformation,
            public_id,
            format
        )
    }

    fn endpoint(&self, action: &str) -> String {
        format!(
            "{}/{}/{}/{}",
            self.config.api_base.trim_end_matches('/'),
            self.config.cloud_name,
            RESOURCE,
            action
        )
    }
}

fn to_form(payload: SignedPayload) -> Vec<(String, String)> {
    payload.into_iter().collect()
}
