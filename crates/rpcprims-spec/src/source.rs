use std::fmt;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::time::Duration;

use rpcprims_types::{Result, RpcError};
use serde_json::Value;
use tracing::debug;
use url::Url;

/// Limits applied while loading a descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceLimits {
    /// Maximum descriptor size in bytes.
    pub max_descriptor_size: usize,
    /// Deadline for fetching a remote descriptor, headers and body together.
    pub fetch_timeout: Duration,
}

impl Default for SourceLimits {
    fn default() -> Self {
        Self {
            max_descriptor_size: 4 * 1024 * 1024,
            fetch_timeout: Duration::from_secs(30),
        }
    }
}

/// Where a specification descriptor comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DescriptorSource {
    /// A JSON file on disk. Symlinks are refused.
    Path(PathBuf),
    /// A JSON document held in memory.
    Inline(String),
    /// A JSON document fetched over HTTP(S).
    Url(Url),
}

impl DescriptorSource {
    pub fn path(path: impl Into<PathBuf>) -> Self {
        Self::Path(path.into())
    }

    pub fn inline(document: impl Into<String>) -> Self {
        Self::Inline(document.into())
    }

    /// Interpret `raw` as a URL when it has an http(s) scheme, else as a path.
    pub fn from_reference(raw: &str) -> Self {
        match Url::parse(raw) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => Self::Url(url),
            _ => Self::Path(PathBuf::from(raw)),
        }
    }

    /// Load and decode the descriptor as JSON.
    pub async fn load(&self, limits: SourceLimits) -> Result<Value> {
        let text = match self {
            Self::Inline(document) => {
                check_size(document.len(), limits, "inline descriptor")?;
                document.clone()
            }
            Self::Path(path) => {
                let path = path.clone();
                tokio::task::spawn_blocking(move || read_descriptor_file(&path, limits))
                    .await
                    .map_err(|err| {
                        RpcError::internal(format!("descriptor load task failed: {err}"))
                            .with_source(err)
                    })??
            }
            Self::Url(url) => fetch_descriptor(url, limits).await?,
        };

        serde_json::from_str(&text).map_err(|err| {
            RpcError::bad_specification(format!("descriptor {self} is not valid JSON: {err}"))
                .with_source(err)
        })
    }
}

impl fmt::Display for DescriptorSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Path(path) => write!(f, "{}", path.display()),
            Self::Inline(_) => f.write_str("<inline>"),
            Self::Url(url) => write!(f, "{url}"),
        }
    }
}

fn check_size(len: usize, limits: SourceLimits, what: &str) -> Result<()> {
    if len > limits.max_descriptor_size {
        return Err(RpcError::bad_specification(format!(
            "{what} too large ({len} bytes, max {})",
            limits.max_descriptor_size
        )));
    }
    Ok(())
}

fn read_descriptor_file(path: &Path, limits: SourceLimits) -> Result<String> {
    if path.as_os_str().is_empty() {
        return Err(RpcError::bad_specification("no descriptor path supplied"));
    }

    let load_failed = |err: std::io::Error| {
        RpcError::bad_specification(format!("failed loading descriptor {}: {err}", path.display()))
            .with_source(err)
    };

    let path_metadata = std::fs::symlink_metadata(path).map_err(load_failed)?;
    if path_metadata.file_type().is_symlink() {
        return Err(RpcError::bad_specification(format!(
            "refusing to load descriptor symlink: {}",
            path.display()
        )));
    }
    if !path_metadata.is_file() {
        return Err(RpcError::bad_specification(format!(
            "descriptor is not a regular file: {}",
            path.display()
        )));
    }

    let file = std::fs::File::open(path).map_err(load_failed)?;
    let opened_metadata = file.metadata().map_err(load_failed)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::MetadataExt;
        if path_metadata.dev() != opened_metadata.dev()
            || path_metadata.ino() != opened_metadata.ino()
        {
            return Err(RpcError::bad_specification(format!(
                "descriptor changed during load: {}",
                path.display()
            )));
        }
    }

    let len = usize::try_from(opened_metadata.len()).unwrap_or(usize::MAX);
    check_size(len, limits, "descriptor file")?;

    let read_limit = u64::try_from(limits.max_descriptor_size.saturating_add(1)).unwrap_or(u64::MAX);
    let mut text = String::new();
    file.take(read_limit)
        .read_to_string(&mut text)
        .map_err(load_failed)?;
    check_size(text.len(), limits, "descriptor file")?;

    debug!(path = %path.display(), bytes = text.len(), "descriptor loaded");
    Ok(text)
}

async fn fetch_descriptor(url: &Url, limits: SourceLimits) -> Result<String> {
    let fetch_failed = |err: reqwest::Error| {
        RpcError::bad_specification(format!("failed fetching descriptor {url}: {err}"))
            .with_source(err)
    };

    let client = reqwest::Client::builder()
        .timeout(limits.fetch_timeout)
        .build()
        .map_err(fetch_failed)?;
    let mut response = client.get(url.clone()).send().await.map_err(fetch_failed)?;
    let status = response.status();
    if !status.is_success() {
        return Err(RpcError::bad_specification(format!(
            "fetching descriptor {url} returned {status}"
        )));
    }
    if let Some(len) = response.content_length() {
        check_size(usize::try_from(len).unwrap_or(usize::MAX), limits, "remote descriptor")?;
    }

    // Chunked bodies carry no length up front; stop as soon as the limit is crossed.
    let mut body = Vec::new();
    while let Some(chunk) = response.chunk().await.map_err(fetch_failed)? {
        body.extend_from_slice(&chunk);
        check_size(body.len(), limits, "remote descriptor")?;
    }

    let text = String::from_utf8(body).map_err(|err| {
        RpcError::bad_specification(format!("descriptor {url} is not UTF-8: {err}"))
            .with_source(err)
    })?;
    debug!(%url, bytes = text.len(), "descriptor fetched");
    Ok(text)
}
