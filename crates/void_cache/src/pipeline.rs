//! Fetch-then-decode pipeline
//!
//! [`AssetPipeline`] turns a resource URL into a cache fetch function: each
//! attempt reads the current authorization, fetches the bytes over HTTP or
//! from disk, and hands them to the decoder registered for the extension.
//! Authorization is read per attempt so a refreshed credential is picked up
//! by retries.

use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::RwLock;
use void_core::NativeHandle;

use crate::cache::{FetchFn, FetchFuture};
use crate::decoder::{DecodeContext, DecoderRegistry};
use crate::error::CacheResult;
use crate::fetch::{FileFetcher, Fetcher, HttpFetcher};

/// Fetchers, decoders and credentials shared by every fetch function
#[derive(Clone)]
pub struct AssetPipeline {
    network: Arc<dyn Fetcher>,
    files: Arc<FileFetcher>,
    decoders: Arc<DecoderRegistry>,
    authorization: Arc<RwLock<Option<String>>>,
}

impl AssetPipeline {
    pub fn new(decoders: DecoderRegistry) -> Self {
        Self {
            network: Arc::new(HttpFetcher::default()),
            files: Arc::new(FileFetcher::new()),
            decoders: Arc::new(decoders),
            authorization: Arc::new(RwLock::new(None)),
        }
    }

    /// Replace the fetcher used for network URLs
    pub fn with_fetcher(mut self, fetcher: impl Fetcher + 'static) -> Self {
        self.network = Arc::new(fetcher);
        self
    }

    /// Root for relative library paths
    pub fn with_library_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.files = Arc::new(FileFetcher::with_root(root));
        self
    }

    pub fn with_authorization(self, authorization: impl Into<String>) -> Self {
        self.set_authorization(Some(authorization.into()));
        self
    }

    pub fn set_authorization(&self, authorization: Option<String>) {
        *self.authorization.write() = authorization;
    }

    pub fn authorization(&self) -> Option<String> {
        self.authorization.read().clone()
    }

    pub fn decoders(&self) -> &DecoderRegistry {
        &self.decoders
    }

    /// Fetch function for `url`, decoded by `extension`.
    ///
    /// `local` overrides the source with a file already on disk, as for
    /// files shipped in a library.
    pub fn fetch_fn(&self, url: &str, extension: &str, local: Option<PathBuf>) -> FetchFn {
        let pipeline = self.clone();
        let url = url.to_string();
        let extension = extension.to_lowercase();
        Box::new(move |attempt| pipeline.fetch(url.clone(), extension.clone(), local.clone(), attempt))
    }

    fn fetch(
        &self,
        url: String,
        extension: String,
        local: Option<PathBuf>,
        attempt: u32,
    ) -> FetchFuture {
        let network = self.network.clone();
        let files = self.files.clone();
        let decoders = self.decoders.clone();
        let authorization = self.authorization();
        Box::pin(async move {
            if attempt > 1 {
                log::debug!("Fetching {} again (attempt {})", url, attempt);
            }
            let bytes = match &local {
                Some(path) => {
                    let path = path.to_string_lossy();
                    files.fetch(&path, None).await?
                }
                None if is_network_url(&url) => network.fetch(&url, authorization.as_deref()).await?,
                None => files.fetch(&url, None).await?,
            };
            decode(&decoders, &url, &extension, &bytes)
        })
    }
}

fn is_network_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

fn decode(
    decoders: &DecoderRegistry,
    url: &str,
    extension: &str,
    bytes: &[u8],
) -> CacheResult<NativeHandle> {
    decoders.decode(&DecodeContext::new(url, extension, bytes))
}

impl core::fmt::Debug for AssetPipeline {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AssetPipeline")
            .field("decoders", &self.decoders)
            .field("files", &self.files)
            .field("authorized", &self.authorization.read().is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::FnDecoder;
    use crate::error::{CacheError, TransportError, TransportResult};
    use parking_lot::Mutex;

    /// Fails with an expired credential until the authorization is "fresh"
    struct TokenCheckingFetcher {
        seen: Mutex<Vec<Option<String>>>,
    }

    #[async_trait::async_trait]
    impl Fetcher for TokenCheckingFetcher {
        async fn fetch(&self, url: &str, authorization: Option<&str>) -> TransportResult<Vec<u8>> {
            self.seen.lock().push(authorization.map(str::to_string));
            match authorization {
                Some("Bearer fresh") => Ok(b"payload".to_vec()),
                _ => Err(TransportError::AuthorizationExpired(url.to_string())),
            }
        }
    }

    fn pipeline() -> AssetPipeline {
        const EXT: &[&str] = &["bin"];
        AssetPipeline::new(
            DecoderRegistry::new().with(FnDecoder::new(EXT, |ctx| Ok(NativeHandle::new(ctx.bytes.to_vec())))),
        )
    }

    #[test]
    fn test_retry_sees_refreshed_authorization() {
        let fetcher = Arc::new(TokenCheckingFetcher {
            seen: Mutex::new(Vec::new()),
        });
        let pipeline = pipeline().with_authorization("Bearer stale");
        let pipeline = AssetPipeline {
            network: fetcher.clone(),
            ..pipeline
        };

        let mut fetch = pipeline.fetch_fn("http://h/a.bin", "BIN", None);
        let first = pollster::block_on(fetch(1));
        assert!(matches!(
            first,
            Err(CacheError::Transport(TransportError::AuthorizationExpired(_)))
        ));

        pipeline.set_authorization(Some("Bearer fresh".into()));
        let second = pollster::block_on(fetch(2)).unwrap();
        assert_eq!(second.downcast_ref::<Vec<u8>>().map(|b| b.as_slice()), Some(&b"payload"[..]));
        assert_eq!(
            *fetcher.seen.lock(),
            vec![Some("Bearer stale".to_string()), Some("Bearer fresh".to_string())]
        );
    }

    #[test]
    fn test_local_file_source() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.bin");
        std::fs::write(&path, [1u8, 2, 3]).unwrap();

        let pipeline = pipeline();
        let mut fetch = pipeline.fetch_fn("https://h/a.bin", "bin", Some(path));
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let native = rt.block_on(fetch(1)).unwrap();
        assert_eq!(native.downcast_ref::<Vec<u8>>(), Some(&vec![1u8, 2, 3]));
    }

    #[test]
    fn test_unknown_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.png");
        std::fs::write(&path, [0u8]).unwrap();

        let mut fetch = pipeline().fetch_fn("a.png", "png", Some(path));
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        assert_eq!(rt.block_on(fetch(1)).err(), Some(CacheError::NoDecoder("png".into())));
    }
}
