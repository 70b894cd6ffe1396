//! Content fetch primitive
//!
//! [`Fetcher`] is the asynchronous `fetch(url, authorization) -> bytes`
//! contract the cache builds its fetch functions on. Two implementations are
//! provided: [`HttpFetcher`] speaks plain HTTP/1.1 over a tokio socket and
//! [`FileFetcher`] reads `file://` URLs and library-relative paths.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use url::Url;

use crate::error::{TransportError, TransportResult};

/// Asynchronous byte fetcher
#[async_trait::async_trait]
pub trait Fetcher: Send + Sync {
    /// Fetch the bytes behind `url`, sending `authorization` if given
    async fn fetch(&self, url: &str, authorization: Option<&str>) -> TransportResult<Vec<u8>>;
}

/// HTTP/1.1 GET over tokio TCP
#[derive(Clone, Debug)]
pub struct HttpFetcher {
    timeout: Duration,
    user_agent: String,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            user_agent: concat!("void_cache/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    async fn get(&self, url: &str, authorization: Option<&str>) -> TransportResult<Vec<u8>> {
        let parsed = Url::parse(url).map_err(|e| TransportError::InvalidUrl(format!("{}: {}", url, e)))?;
        if parsed.scheme() != "http" {
            return Err(TransportError::UnsupportedScheme(parsed.scheme().to_string()));
        }
        let host = parsed
            .host_str()
            .ok_or_else(|| TransportError::InvalidUrl(format!("{} has no host", url)))?;
        let port = parsed.port_or_known_default().unwrap_or(80);

        let mut stream = TcpStream::connect((host, port))
            .await
            .map_err(|e| TransportError::ConnectionFailed(format!("{}:{}: {}", host, port, e)))?;

        let target = &parsed[url::Position::BeforePath..url::Position::AfterQuery];
        let host_header = match parsed.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        };
        let mut request = format!(
            "GET {} HTTP/1.1\r\nHost: {}\r\nUser-Agent: {}\r\nAccept: */*\r\nConnection: close\r\n",
            target, host_header, self.user_agent
        );
        if let Some(auth) = authorization {
            request.push_str("Authorization: ");
            request.push_str(auth);
            request.push_str("\r\n");
        }
        request.push_str("\r\n");

        log::debug!("GET {}", url);
        stream.write_all(request.as_bytes()).await?;
        let mut raw = Vec::new();
        stream.read_to_end(&mut raw).await?;
        parse_response(url, &raw)
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}

#[async_trait::async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str, authorization: Option<&str>) -> TransportResult<Vec<u8>> {
        tokio::time::timeout(self.timeout, self.get(url, authorization))
            .await
            .map_err(|_| TransportError::Timeout(url.to_string()))?
    }
}

/// Split a raw HTTP/1.1 response and map its status
pub fn parse_response(url: &str, raw: &[u8]) -> TransportResult<Vec<u8>> {
    let split = raw
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .ok_or_else(|| TransportError::Protocol("missing header terminator".into()))?;
    let head = core::str::from_utf8(&raw[..split])
        .map_err(|_| TransportError::Protocol("non UTF-8 headers".into()))?;
    let body = &raw[split + 4..];

    let mut lines = head.split("\r\n");
    let status_line = lines.next().unwrap_or_default();
    let status: u16 = status_line
        .split_whitespace()
        .nth(1)
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| TransportError::Protocol(format!("bad status line '{}'", status_line)))?;

    let mut chunked = false;
    let mut content_length = None;
    for line in lines {
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim();
        if name.eq_ignore_ascii_case("transfer-encoding") {
            chunked = value.to_ascii_lowercase().contains("chunked");
        } else if name.eq_ignore_ascii_case("content-length") {
            content_length = value.parse::<usize>().ok();
        }
    }

    match status {
        200..=299 => {}
        401 | 403 => return Err(TransportError::AuthorizationExpired(url.to_string())),
        404 | 410 => return Err(TransportError::NotFound(url.to_string())),
        _ => {
            return Err(TransportError::Status {
                status,
                url: url.to_string(),
            })
        }
    }

    if chunked {
        return decode_chunked(body);
    }
    match content_length {
        Some(len) if len > body.len() => Err(TransportError::Protocol(format!(
            "body truncated: {} of {} bytes",
            body.len(),
            len
        ))),
        Some(len) => Ok(body[..len].to_vec()),
        None => Ok(body.to_vec()),
    }
}

fn decode_chunked(mut body: &[u8]) -> TransportResult<Vec<u8>> {
    let mut out = Vec::new();
    loop {
        let line_end = body
            .windows(2)
            .position(|w| w == b"\r\n")
            .ok_or_else(|| TransportError::Protocol("unterminated chunk size".into()))?;
        let size_line = core::str::from_utf8(&body[..line_end])
            .map_err(|_| TransportError::Protocol("bad chunk size".into()))?;
        let size_hex = size_line.split(';').next().unwrap_or_default().trim();
        let size = usize::from_str_radix(size_hex, 16)
            .map_err(|_| TransportError::Protocol(format!("bad chunk size '{}'", size_hex)))?;
        body = &body[line_end + 2..];
        if size == 0 {
            return Ok(out);
        }
        if body.len() < size + 2 {
            return Err(TransportError::Protocol("chunk truncated".into()));
        }
        out.extend_from_slice(&body[..size]);
        body = &body[size + 2..];
    }
}

/// Reads `file://` URLs and paths relative to a root directory
#[derive(Clone, Debug, Default)]
pub struct FileFetcher {
    root: Option<PathBuf>,
}

impl FileFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self {
            root: Some(root.into()),
        }
    }

    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    /// Local path a URL or relative path refers to
    pub fn resolve(&self, url: &str) -> TransportResult<PathBuf> {
        match Url::parse(url) {
            Ok(parsed) if parsed.scheme() == "file" => parsed
                .to_file_path()
                .map_err(|_| TransportError::InvalidUrl(url.to_string())),
            Ok(parsed) => Err(TransportError::UnsupportedScheme(parsed.scheme().to_string())),
            Err(_) => {
                let path = Path::new(url);
                Ok(match &self.root {
                    Some(root) if path.is_relative() => root.join(path),
                    _ => path.to_path_buf(),
                })
            }
        }
    }
}

#[async_trait::async_trait]
impl Fetcher for FileFetcher {
    async fn fetch(&self, url: &str, _authorization: Option<&str>) -> TransportResult<Vec<u8>> {
        let path = self.resolve(url)?;
        tokio::fs::read(&path).await.map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => TransportError::NotFound(path.display().to_string()),
            _ => TransportError::Io(format!("{}: {}", path.display(), e)),
        })
    }
}
