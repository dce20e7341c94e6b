//! Remote file source abstractions.

pub mod http;

use std::pin::Pin;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures_util::Stream;

use crate::error::SourceError;

pub use http::HttpFileSource;

/// Chunked byte stream of a remote file body.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, SourceError>> + Send>>;

/// Opens a download URL as a byte stream.
#[async_trait]
pub trait FileSource: Send + Sync {
    async fn open(&self, url: &str) -> Result<ByteStream, SourceError>;
}

/// A time-bounded signed download URL handed out by the file store.
#[derive(Debug, Clone)]
pub struct SignedUrl {
    pub url: String,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Resolves a source item to a fresh signed download URL. Consulted by
/// the scheduler when promoting queued jobs, because stored URLs expire.
#[async_trait]
pub trait DownloadUrlProvider: Send + Sync {
    async fn download_url(&self, item_id: &str) -> Result<SignedUrl, SourceError>;
}
