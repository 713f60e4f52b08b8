//! Asset-management and image-search API clients for lgtm-bridge.
//!
//! The asset-management client signs its write operations with the canonical
//! parameter-string protocol; the search client is read-only. Both route
//! their HTTP traffic through [`JsonApiInvoker`] and surface failures as
//! [`ApiError`].

mod asset;
mod error;
mod invoker;
mod search;
mod signer;

pub use asset::{
    AssetClient, AssetClientConfig, AssetRecord, DerivedTransformation, DestroyOutcome,
    UploadOptions, DEFAULT_API_BASE, DEFAULT_DELIVERY_BASE,
};
pub use error::ApiError;
pub use invoker::{ApiMethod, JsonApiInvoker};
pub use search::{ImageCandidate, ImageSearchClient, ImageSearchConfig, DEFAULT_SEARCH_API_BASE};
pub use signer::{RequestSigner, SignedPayload};
