//! Cache key canonicalisation
//!
//! Two requests share an entry when their keys canonicalise to the same
//! string. URL keys ignore scheme, port, fragment and host case but keep the
//! path and query. Relative paths are normalised to forward slashes. Files
//! shipped in a library resolve to `library:<key>/<relative>` whether they are
//! requested by URL or by relative path.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use url::Url;

use crate::error::{CacheError, CacheResult};
use crate::manifest::LibraryManifest;

const LIBRARY_PREFIX: &str = "library:";
const PATH_PREFIX: &str = "path:";
const FILE_PREFIX: &str = "file:";

/// Canonical cache key
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    /// Canonicalise a URL or relative path
    pub fn parse(raw: &str) -> CacheResult<Self> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(CacheError::InvalidKey("empty key".into()));
        }

        match Url::parse(raw) {
            Ok(url) => Self::from_url(&url),
            Err(url::ParseError::RelativeUrlWithoutBase) => {
                Ok(Self(format!("{}{}", PATH_PREFIX, normalize_relative(raw))))
            }
            Err(e) => Err(CacheError::InvalidKey(format!("{}: {}", raw, e))),
        }
    }

    fn from_url(url: &Url) -> CacheResult<Self> {
        if url.scheme() == "file" {
            return Ok(Self(format!("{}{}", FILE_PREFIX, url.path())));
        }
        let host = url
            .host_str()
            .ok_or_else(|| CacheError::InvalidKey(format!("{} has no host", url)))?
            .to_ascii_lowercase();
        let mut key = format!("{}{}", host, url.path());
        if let Some(query) = url.query() {
            key.push('?');
            key.push_str(query);
        }
        Ok(Self(key))
    }

    /// Key of a file shipped in a library
    pub fn library(library: &str, relative: &str) -> Self {
        Self(format!(
            "{}{}/{}",
            LIBRARY_PREFIX,
            library,
            normalize_relative(relative)
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_library(&self) -> bool {
        self.0.starts_with(LIBRARY_PREFIX)
    }

    fn relative_path(&self) -> Option<&str> {
        self.0.strip_prefix(PATH_PREFIX)
    }
}

impl core::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Normalise a relative path: forward slashes, no leading `./` or `/`,
/// no empty segments
pub fn normalize_relative(path: &str) -> String {
    path.replace('\\', "/")
        .split('/')
        .filter(|segment| !segment.is_empty() && *segment != ".")
        .collect::<Vec<_>>()
        .join("/")
}

#[derive(Clone, Debug)]
struct LibraryFileEntry {
    library: String,
    key: CacheKey,
}

/// Index of files shipped in locally persisted libraries
#[derive(Debug, Default)]
pub struct LibraryIndex {
    by_url: HashMap<CacheKey, LibraryFileEntry>,
    by_relative: HashMap<String, Vec<LibraryFileEntry>>,
    local_paths: HashMap<CacheKey, PathBuf>,
}

impl LibraryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index every file of a library, replacing a previous version of it
    pub fn add_library(&mut self, manifest: &LibraryManifest) {
        self.remove_library(&manifest.key);

        let root = Path::new(&manifest.path);
        for file in &manifest.files {
            let relative = normalize_relative(&file.relative_path);
            let entry = LibraryFileEntry {
                library: manifest.key.clone(),
                key: CacheKey::library(&manifest.key, &relative),
            };

            if !file.url.is_empty() {
                match CacheKey::parse(&file.url) {
                    Ok(url_key) => {
                        self.by_url.insert(url_key, entry.clone());
                    }
                    Err(e) => log::warn!("Library {}: skipping url of {}: {}", manifest.key, relative, e),
                }
            }
            if !file.local_path.is_empty() {
                self.local_paths
                    .insert(entry.key.clone(), root.join(&file.local_path));
            }
            self.by_relative.entry(relative).or_default().push(entry);
        }
        log::debug!(
            "Indexed library {} ({} files)",
            manifest.key,
            manifest.files.len()
        );
    }

    pub fn remove_library(&mut self, library: &str) {
        self.by_url.retain(|_, e| e.library != library);
        self.by_relative.retain(|_, entries| {
            entries.retain(|e| e.library != library);
            !entries.is_empty()
        });
        let prefix = format!("{}{}/", LIBRARY_PREFIX, library);
        self.local_paths.retain(|k, _| !k.as_str().starts_with(&prefix));
    }

    /// Canonical key for a request.
    ///
    /// `library` scopes relative-path matches; without it a relative path
    /// only matches when exactly one library ships it.
    pub fn resolve(&self, raw: &str, library: Option<&str>) -> CacheResult<CacheKey> {
        let canonical = CacheKey::parse(raw)?;
        if let Some(entry) = self.by_url.get(&canonical) {
            return Ok(entry.key.clone());
        }

        if let Some(relative) = canonical.relative_path() {
            if let Some(entries) = self.by_relative.get(relative) {
                let scoped = match library {
                    Some(lib) => entries.iter().find(|e| e.library == lib),
                    None if entries.len() == 1 => entries.first(),
                    None => None,
                };
                if let Some(entry) = scoped {
                    return Ok(entry.key.clone());
                }
            }
        }
        Ok(canonical)
    }

    /// Local file backing a library key
    pub fn local_path(&self, key: &CacheKey) -> Option<&Path> {
        self.local_paths.get(key).map(|p| p.as_path())
    }

    pub fn is_empty(&self) -> bool {
        self.by_relative.is_empty()
    }
}
