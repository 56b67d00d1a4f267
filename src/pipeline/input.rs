//! Input resolution: normalise a caller-supplied buffer, stream or URL into
//! bytes the rest of the pipeline can consume.
//!
//! Buffers and streams pass through untouched; a stream is only drained when
//! it is materialised to disk or piped into a child process. A locator is
//! checked for a URL scheme before any network access and then downloaded
//! with a bounded timeout. Every fetch failure (DNS, timeout, non-2xx,
//! truncated body) surfaces as [`MassageError::InvalidLocator`]; the detail
//! goes to the log only.

use crate::error::MassageError;
use futures::stream::{self, StreamExt, TryStreamExt};
use reqwest::{Client, Url};
use std::fmt;
use std::io;
use std::pin::Pin;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio_stream::Stream;
use tracing::{debug, info, warn};

/// Chunk size used when adapting an `AsyncRead` into a [`ByteStream`].
const READ_CHUNK: usize = 64 * 1024;

/// A boxed stream of byte chunks; an `Err` item aborts whatever consumes it.
pub type ByteStream = Pin<Box<dyn Stream<Item = io::Result<Vec<u8>>> + Send>>;

/// Document bytes as the caller holds them.
pub enum Document {
    /// In-memory buffer.
    Bytes(Vec<u8>),
    /// Readable byte stream, consumed at most once.
    Stream(ByteStream),
    /// URL of remote bytes.
    Locator(String),
}

impl Document {
    /// Wrap any tokio reader (file, socket, pipe) as a stream handle.
    pub fn from_reader<R>(reader: R) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        Document::Stream(Box::pin(stream::try_unfold(reader, read_chunk)))
    }

    /// Wrap an existing chunk stream.
    pub fn from_stream<S>(chunks: S) -> Self
    where
        S: Stream<Item = io::Result<Vec<u8>>> + Send + 'static,
    {
        Document::Stream(Box::pin(chunks))
    }
}

async fn read_chunk<R>(mut reader: R) -> io::Result<Option<(Vec<u8>, R)>>
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; READ_CHUNK];
    let n = reader.read(&mut buf).await?;
    if n == 0 {
        return Ok(None);
    }
    buf.truncate(n);
    Ok(Some((buf, reader)))
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Document::Bytes(b) => write!(f, "Document::Bytes(<{} bytes>)", b.len()),
            Document::Stream(_) => f.write_str("Document::Stream(..)"),
            Document::Locator(url) => write!(f, "Document::Locator({url:?})"),
        }
    }
}

impl From<Vec<u8>> for Document {
    fn from(bytes: Vec<u8>) -> Self {
        Document::Bytes(bytes)
    }
}

impl From<&[u8]> for Document {
    fn from(bytes: &[u8]) -> Self {
        Document::Bytes(bytes.to_vec())
    }
}

impl From<String> for Document {
    fn from(url: String) -> Self {
        Document::Locator(url)
    }
}

impl From<&str> for Document {
    fn from(url: &str) -> Self {
        Document::Locator(url.to_string())
    }
}

/// A document after locator resolution: something holding bytes.
pub enum Source {
    Bytes(Vec<u8>),
    Stream(ByteStream),
}

impl Source {
    /// Drain into a single buffer.
    pub async fn into_bytes(self) -> io::Result<Vec<u8>> {
        match self {
            Source::Bytes(b) => Ok(b),
            Source::Stream(s) => {
                s.try_fold(Vec::new(), |mut acc, chunk| async move {
                    acc.extend_from_slice(&chunk);
                    Ok(acc)
                })
                .await
            }
        }
    }
}

/// Parse `input` as an absolute URL.
///
/// Anything without a scheme (`"test.pdf"`, `"/tmp/a.pdf"`, `""`) is rejected.
pub fn parse_locator(input: &str) -> Result<Url, MassageError> {
    Url::parse(input).map_err(|e| {
        debug!("Rejecting locator {:?}: {}", input, e);
        MassageError::InvalidLocator
    })
}

/// Check `input` is a usable locator and hand it back unchanged.
pub fn validate_url(input: &str) -> Result<String, MassageError> {
    parse_locator(input).map(|_| input.to_string())
}

/// Build the HTTP client used for locator fetches.
pub fn build_client() -> Result<Client, MassageError> {
    Client::builder().build().map_err(|e| {
        warn!("Failed to build HTTP client: {}", e);
        MassageError::ProcessingFailure
    })
}

/// Resolve a [`Document`] to a [`Source`].
///
/// Only a locator causes I/O; buffers and streams are returned as-is.
pub async fn resolve(
    client: &Client,
    document: Document,
    timeout: std::time::Duration,
) -> Result<Source, MassageError> {
    match document {
        Document::Bytes(b) => Ok(Source::Bytes(b)),
        Document::Stream(s) => Ok(Source::Stream(s)),
        Document::Locator(url) => fetch(client, &url, timeout).await.map(Source::Bytes),
    }
}

/// GET a locator and return its body.
pub async fn fetch(
    client: &Client,
    input: &str,
    timeout: std::time::Duration,
) -> Result<Vec<u8>, MassageError> {
    let url = parse_locator(input)?;
    info!("Fetching document from: {}", url);

    let response = client
        .get(url.clone())
        .timeout(timeout)
        .send()
        .await
        .and_then(|r| r.error_for_status())
        .map_err(|e| fetch_failed(&url, e))?;

    let bytes = response.bytes().await.map_err(|e| fetch_failed(&url, e))?;
    debug!("Fetched {} bytes from {}", bytes.len(), url);
    Ok(bytes.to_vec())
}

/// HEAD a locator, then return its GET body as a stream.
///
/// The HEAD must answer exactly 200; anything else is
/// [`MassageError::InvalidLocator`]. Errors while the body streams arrive as
/// `Err` items and fail whichever operation consumes the stream.
pub async fn open_stream(
    client: &Client,
    input: &str,
    timeout: std::time::Duration,
) -> Result<ByteStream, MassageError> {
    let url = parse_locator(input)?;

    let head = client
        .head(url.clone())
        .timeout(timeout)
        .send()
        .await
        .map_err(|e| fetch_failed(&url, e))?;
    if head.status() != reqwest::StatusCode::OK {
        warn!("HEAD {} answered {}", url, head.status());
        return Err(MassageError::InvalidLocator);
    }

    let response = client
        .get(url.clone())
        .send()
        .await
        .and_then(|r| r.error_for_status())
        .map_err(|e| fetch_failed(&url, e))?;

    let chunks = response
        .bytes_stream()
        .map(|chunk| chunk.map(|b| b.to_vec()).map_err(io::Error::other));
    Ok(Box::pin(chunks))
}

fn fetch_failed(url: &Url, e: reqwest::Error) -> MassageError {
    if e.is_timeout() {
        warn!("Fetching {} timed out", url);
    } else {
        warn!("Fetching {} failed: {}", url, e);
    }
    MassageError::InvalidLocator
}
