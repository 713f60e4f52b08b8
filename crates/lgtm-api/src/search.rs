//! Keyword image search client. One call returns one page of candidates;
//! there is no cursor, a new call simply re-queries.

use serde::Deserialize;

use crate::{
    error::ApiError,
    invoker::{ApiMethod, JsonApiInvoker},
};

pub const DEFAULT_SEARCH_API_BASE: &str = "https://www.googleapis.com/customsearch/v1";

/// Results per page; also the pagination stride.
const PAGE_SIZE: u32 = 10;

/// Search-language fallback when the locale has no mapping.
const DEFAULT_SEARCH_LANGUAGE: &str = "lang_ja";

#[derive(Debug, Clone)]
/// Construction-time configuration for [`ImageSearchClient`].
pub struct ImageSearchConfig {
    pub api_key: String,
    pub search_engine_id: String,
    pub api_base: String,
    pub request_timeout_ms: u64,
}

impl ImageSearchConfig {
    pub fn new(api_key: impl Into<String>, search_engine_id: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            search_engine_id: search_engine_id.into(),
            api_base: DEFAULT_SEARCH_API_BASE.to_string(),
            request_timeout_ms: 30_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
/// One image search result.
pub struct ImageCandidate {
    pub link: String,
    pub mime: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub thumbnail_link: Option<String>,
    pub thumbnail_width: Option<u32>,
    pub thumbnail_height: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<SearchItem>,
}

#[derive(Debug, Deserialize)]
struct SearchItem {
    link: String,
    #[serde(default)]
    mime: Option<String>,
    #[serde(default)]
    image: Option<SearchItemImage>,
}

#[derive(Debug, Default, Deserialize)]
struct SearchItemImage {
    #[serde(default)]
    width: Option<u32>,
    #[serde(default)]
    height: Option<u32>,
    #[serde(default, rename = "thumbnailLink")]
    thumbnail_link: Option<String>,
    #[serde(default, rename = "thumbnailWidth")]
    thumbnail_width: Option<u32>,
    #[serde(default, rename = "thumbnailHeight")]
    thumbnail_height: Option<u32>,
}

impl From<SearchItem> for ImageCandidate {
    fn from(item: SearchItem) -> Self {
        let image = item.image.unwrap_or_default();
        Self {
            link: item.link,
            mime: item.mime,
            width: image.width,
            height: image.height,
            thumbnail_link: image.thumbnail_link,
            thumbnail_width: image.thumbnail_width,
            thumbnail_height: image.thumbnail_height,
        }
    }
}

#[derive(Clone)]
/// Client for the keyword image search API.
pub struct ImageSearchClient {
    invoker: JsonApiInvoker,
    config: ImageSearchConfig,
}

impl ImageSearchClient {
    pub fn new(config: ImageSearchConfig) -> Result<Self, ApiError> {
        let invoker = JsonApiInvoker::new(config.request_timeout_ms)?;
        Ok(Self { invoker, config })
    }

    /// Returns one page (up to [`PAGE_SIZE`]) of image candidates for
    /// `keyword`. `page` counts from 1. Missing `items` means an empty
    /// result set, not an error.
    pub async fn search(
        &self,
        keyword: &str,
        locale: Option<&str>,
        page: u32,
    ) -> Result<Vec<ImageCandidate>, ApiError> {
        let start = PAGE_SIZE
            .saturating_mul(page.max(1).saturating_sub(1))
            .saturating_add(1);
        let params = vec![
            ("key".to_string(), self.config.api_key.clone()),
            ("cx".to_string(), self.config.search_engine_id.clone()),
            ("searchType".to_string(), "image".to_string()),
            ("q".to_string(), keyword.to_string()),
            ("safe".to_string(), "active".to_string()),
            ("lr".to_string(), search_language(locale).to_string()),
            ("num".to_string(), PAGE_SIZE.to_string()),
            ("start".to_string(), start.to_string()),
        ];
        let value = self
            .invoker
            .invoke(&self.config.api_base, ApiMethod::Get, &params)
            .await?;
        let response = serde_json::from_value::<SearchResponse>(value)?;
        Ok(response.items.into_iter().map(ImageCandidate::from).collect())
    }
}

fn search_language(locale: Option<&str>) -> &'static str {
    match locale {
        Some("ja-JP") => "lang_ja",
        Some("en-US") => "lang_en",
        _ => DEFAULT_SEARCH_LANGUAGE,
    }
}
