//! Fetching repository documents from HTTP(S) URLs and the local filesystem.

use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::{Client, Response, StatusCode};
use url::Url;

use obr_core::config::FetchConfig;
use obr_util::errors::{ObrError, ObrResult};

const RETRY_DELAY: Duration = Duration::from_millis(500);

/// Where a repository URI points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location {
    File(PathBuf),
    Remote(Url),
}

impl Location {
    /// Classify a URI. Strings that are not absolute URLs are filesystem paths.
    pub fn parse(uri: &str) -> ObrResult<Self> {
        match Url::parse(uri) {
            Ok(url) if url.scheme() == "http" || url.scheme() == "https" => Ok(Self::Remote(url)),
            Ok(url) if url.scheme() == "file" => url
                .to_file_path()
                .map(Self::File)
                .map_err(|_| io_error(uri, "file URL has no local path")),
            // single letters are drive prefixes such as `C:`
            Ok(url) if url.scheme().len() > 1 => Err(io_error(
                uri,
                &format!("unsupported scheme '{}'", url.scheme()),
            )),
            _ => Ok(Self::File(PathBuf::from(uri))),
        }
    }
}

/// Raw bytes of a fetched document and the source's modification time.
#[derive(Debug, Clone)]
pub struct Fetched {
    pub bytes: Vec<u8>,
    pub last_modified: Option<DateTime<Utc>>,
}

/// Shared HTTP client plus retry policy.
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: Client,
    retries: u32,
}

impl Fetcher {
    pub fn new(config: &FetchConfig) -> ObrResult<Self> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout())
            .timeout(config.read_timeout())
            .user_agent(config.user_agent.as_str())
            .build()
            .map_err(|e| ObrError::Config {
                message: format!("Failed to create HTTP client: {e}"),
            })?;
        Ok(Self {
            client,
            retries: config.retries,
        })
    }

    /// Fetch the document at `uri`.
    pub async fn fetch(&self, uri: &str) -> ObrResult<Fetched> {
        match Location::parse(uri)? {
            Location::File(path) => {
                let bytes = tokio::fs::read(&path)
                    .await
                    .map_err(|e| io_error(uri, &format!("cannot read {}: {e}", path.display())))?;
                let last_modified = file_mtime(&path).await;
                tracing::debug!("Read {} bytes from {}", bytes.len(), path.display());
                Ok(Fetched {
                    bytes,
                    last_modified,
                })
            }
            Location::Remote(url) => {
                let resp = self.send_with_retries(uri, || self.client.get(url.clone())).await?;
                let last_modified = header_last_modified(&resp);
                let bytes = resp
                    .bytes()
                    .await
                    .map_err(|e| io_error(uri, &format!("failed to read response: {}", describe(&e))))?;
                tracing::debug!("Downloaded {} bytes from {uri}", bytes.len());
                Ok(Fetched {
                    bytes: bytes.to_vec(),
                    last_modified,
                })
            }
        }
    }

    /// Modification time of the document without downloading it.
    ///
    /// `Ok(None)` when the source does not report one.
    pub async fn last_modified(&self, uri: &str) -> ObrResult<Option<DateTime<Utc>>> {
        match Location::parse(uri)? {
            Location::File(path) => {
                tokio::fs::metadata(&path)
                    .await
                    .map_err(|e| io_error(uri, &format!("cannot stat {}: {e}", path.display())))?;
                Ok(file_mtime(&path).await)
            }
            Location::Remote(url) => {
                match self.send_with_retries(uri, || self.client.head(url.clone())).await {
                    Ok(resp) => Ok(header_last_modified(&resp)),
                    // servers rejecting HEAD still serve the document
                    Err(ObrError::RepositoryIo { message, .. })
                        if message.starts_with("HTTP 405") || message.starts_with("HTTP 501") =>
                    {
                        Ok(None)
                    }
                    Err(e) => Err(e),
                }
            }
        }
    }

    async fn send_with_retries(
        &self,
        uri: &str,
        request: impl Fn() -> reqwest::RequestBuilder,
    ) -> ObrResult<Response> {
        let mut last_err = String::new();

        for attempt in 0..=self.retries {
            if attempt > 0 {
                tracing::debug!("Retrying {uri} (attempt {}): {last_err}", attempt + 1);
                tokio::time::sleep(RETRY_DELAY * attempt).await;
            }

            match request().send().await {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_server_error() && status != StatusCode::NOT_IMPLEMENTED {
                        last_err = format!("HTTP {status}");
                        continue;
                    }
                    if !status.is_success() {
                        return Err(io_error(uri, &format!("HTTP {status}")));
                    }
                    return Ok(resp);
                }
                Err(e) if e.is_timeout() || e.is_connect() => {
                    last_err = describe(&e);
                    continue;
                }
                Err(e) => return Err(io_error(uri, &describe(&e))),
            }
        }

        Err(io_error(
            uri,
            &format!("failed after {} attempts: {last_err}", self.retries + 1),
        ))
    }
}

fn describe(e: &reqwest::Error) -> String {
    if e.is_timeout() {
        format!("timed out: {e}")
    } else {
        e.to_string()
    }
}

fn header_last_modified(resp: &Response) -> Option<DateTime<Utc>> {
    let value = resp.headers().get(reqwest::header::LAST_MODIFIED)?.to_str().ok()?;
    DateTime::parse_from_rfc2822(value)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

async fn file_mtime(path: &std::path::Path) -> Option<DateTime<Utc>> {
    let meta = tokio::fs::metadata(path).await.ok()?;
    meta.modified().ok().map(DateTime::<Utc>::from)
}

fn io_error(uri: &str, message: &str) -> ObrError {
    ObrError::RepositoryIo {
        uri: uri.to_string(),
        message: message.to_string(),
    }
}
