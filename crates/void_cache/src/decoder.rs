//! Decoder registry
//!
//! Decoders turn fetched bytes into native objects (meshes, textures, audio
//! clips, bundles). They are selected by lower-cased file extension; when
//! several decoders claim an extension they are tried in registration order
//! until one succeeds.

use std::collections::{BTreeMap, HashMap};

use void_core::NativeHandle;

use crate::error::{CacheError, CacheResult};

/// Input handed to a decoder
#[derive(Debug)]
pub struct DecodeContext<'a> {
    /// Source URL or path, for diagnostics
    pub url: &'a str,
    /// Lower-cased extension used to pick the decoder
    pub extension: &'a str,
    pub bytes: &'a [u8],
}

impl<'a> DecodeContext<'a> {
    pub fn new(url: &'a str, extension: &'a str, bytes: &'a [u8]) -> Self {
        Self {
            url,
            extension,
            bytes,
        }
    }

    /// Read the bytes as UTF-8
    pub fn read_string(&self) -> CacheResult<&str> {
        core::str::from_utf8(self.bytes).map_err(|e| self.error(format!("invalid UTF-8: {}", e)))
    }

    /// Build a decode error for this input
    pub fn error(&self, message: impl Into<String>) -> CacheError {
        CacheError::Decode {
            url: self.url.to_string(),
            message: message.into(),
        }
    }
}

/// Turns bytes of one or more formats into a native object
pub trait Decoder: Send + Sync {
    /// Extensions handled, without the dot
    fn extensions(&self) -> &[&str];

    fn decode(&self, ctx: &DecodeContext<'_>) -> CacheResult<NativeHandle>;
}

type DecodeFn = Box<dyn Fn(&DecodeContext<'_>) -> CacheResult<NativeHandle> + Send + Sync>;

/// Decoder backed by a closure
pub struct FnDecoder {
    extensions: &'static [&'static str],
    decode: DecodeFn,
}

impl FnDecoder {
    pub fn new<F>(extensions: &'static [&'static str], decode: F) -> Self
    where
        F: Fn(&DecodeContext<'_>) -> CacheResult<NativeHandle> + Send + Sync + 'static,
    {
        Self {
            extensions,
            decode: Box::new(decode),
        }
    }
}

impl Decoder for FnDecoder {
    fn extensions(&self) -> &[&str] {
        self.extensions
    }

    fn decode(&self, ctx: &DecodeContext<'_>) -> CacheResult<NativeHandle> {
        (self.decode)(ctx)
    }
}

/// Named sub-assets decoded from one bundle file
///
/// A bundle is cached once; each request picks the object it wants with
/// [`AssetBundle::extract`].
#[derive(Clone, Debug, Default)]
pub struct AssetBundle {
    assets: HashMap<String, NativeHandle>,
}

impl AssetBundle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, asset: NativeHandle) {
        self.assets.insert(name.into(), asset);
    }

    pub fn with(mut self, name: impl Into<String>, asset: NativeHandle) -> Self {
        self.insert(name, asset);
        self
    }

    pub fn get(&self, name: &str) -> Option<&NativeHandle> {
        self.assets.get(name)
    }

    pub fn len(&self) -> usize {
        self.assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }

    /// Pick `name` out of a cached value holding a bundle
    pub fn extract(value: &NativeHandle, name: &str) -> CacheResult<NativeHandle> {
        value
            .downcast_ref::<AssetBundle>()
            .and_then(|bundle| bundle.get(name))
            .cloned()
            .ok_or_else(|| CacheError::SubAssetNotFound(name.to_string()))
    }
}

/// Decoders by extension
#[derive(Default)]
pub struct DecoderRegistry {
    by_extension: BTreeMap<String, Vec<usize>>,
    decoders: Vec<Box<dyn Decoder>>,
}

impl DecoderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<D: Decoder + 'static>(&mut self, decoder: D) {
        let idx = self.decoders.len();
        for ext in decoder.extensions() {
            self.by_extension
                .entry(ext.trim_start_matches('.').to_lowercase())
                .or_default()
                .push(idx);
        }
        self.decoders.push(Box::new(decoder));
    }

    /// Builder-style [`register`](Self::register)
    pub fn with<D: Decoder + 'static>(mut self, decoder: D) -> Self {
        self.register(decoder);
        self
    }

    pub fn supports_extension(&self, ext: &str) -> bool {
        self.by_extension.contains_key(&ext.to_lowercase())
    }

    pub fn extensions(&self) -> impl Iterator<Item = &str> {
        self.by_extension.keys().map(|s| s.as_str())
    }

    pub fn decode(&self, ctx: &DecodeContext<'_>) -> CacheResult<NativeHandle> {
        let ext = ctx.extension.to_lowercase();
        let indices = self
            .by_extension
            .get(&ext)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| CacheError::NoDecoder(ext.clone()))?;

        let mut last_error = None;
        for &idx in indices {
            match self.decoders[idx].decode(ctx) {
                Ok(native) => return Ok(native),
                Err(e) => {
                    log::debug!("Decoder {} rejected {}: {}", idx, ctx.url, e);
                    last_error = Some(e);
                }
            }
        }
        Err(last_error.unwrap_or(CacheError::NoDecoder(ext)))
    }
}

impl core::fmt::Debug for DecoderRegistry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("DecoderRegistry")
            .field("extensions", &self.by_extension.keys().collect::<Vec<_>>())
            .finish()
    }
}
