//! # void_cache - Resource Cache
//!
//! Content-addressed cache for the binary assets an environment references:
//! - One fetch per canonical key, results fanned out to every waiting request
//! - Failed fetches roll back so a later request retries cleanly
//! - Pluggable retry policy (authorization expiry by default)
//! - Reference counting by entity, with a delete action on eviction
//! - Library manifests that map URLs and relative paths to files on disk
//!
//! ## Example
//!
//! ```ignore
//! use void_cache::prelude::*;
//!
//! let mut cache = ResourceCache::new().with_retry_policy(AuthExpiryRetry::new(3));
//! let fetch = pipeline.fetch_fn(url, "glb", None);
//! cache.request(
//!     CacheRequest::new(url, fetch)
//!         .referrer(entity)
//!         .on_success(|mesh| attach(mesh))
//!         .on_failure(|e| log::error!("{}", e)),
//! )?;
//!
//! // Each tick
//! cache.process();
//! ```

pub mod cache;
pub mod decoder;
pub mod error;
pub mod fetch;
pub mod key;
pub mod manifest;
pub mod pipeline;
pub mod retry;

pub use cache::{
    CacheRequest, CacheStats, DeleteAction, EntryState, ExtractFn, FetchFn, FetchFuture,
    RequestStatus, Requested, ResourceCache,
};
pub use decoder::{AssetBundle, DecodeContext, Decoder, DecoderRegistry, FnDecoder};
pub use error::{CacheError, CacheResult, TransportError, TransportResult};
pub use fetch::{FileFetcher, Fetcher, HttpFetcher};
pub use key::{normalize_relative, CacheKey, LibraryIndex};
pub use manifest::{LibraryFile, LibraryManifest};
pub use pipeline::AssetPipeline;
pub use retry::{AuthExpiryRetry, NoRetry, RetryPolicy};

/// Prelude - commonly used types
pub mod prelude {
    pub use crate::cache::{CacheRequest, EntryState, RequestStatus, ResourceCache};
    pub use crate::decoder::{DecodeContext, Decoder, DecoderRegistry};
    pub use crate::error::{CacheError, CacheResult, TransportError};
    pub use crate::key::CacheKey;
    pub use crate::pipeline::AssetPipeline;
    pub use crate::retry::{AuthExpiryRetry, NoRetry, RetryPolicy};
}
