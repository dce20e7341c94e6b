//! HTTP implementation of the file source.

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use tracing::debug;

use super::{ByteStream, FileSource};
use crate::error::SourceError;

/// Streams pre-signed download URLs over HTTP. Redirects are followed;
/// no read timeout is applied because large transfers may stall briefly
/// between chunks.
pub struct HttpFileSource {
    client: Client,
}

impl HttpFileSource {
    pub fn new() -> Result<Self, SourceError> {
        let client = Client::builder()
            .redirect(reqwest::redirect::Policy::limited(10))
            .connect_timeout(std::time::Duration::from_secs(10))
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl FileSource for HttpFileSource {
    async fn open(&self, url: &str) -> Result<ByteStream, SourceError> {
        let response = self.client.get(url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        debug!(
            status = status.as_u16(),
            content_length = response.content_length(),
            "Opened download stream"
        );

        let stream = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| SourceError::Read(e.to_string())));
        Ok(Box::pin(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        assert!(HttpFileSource::new().is_ok());
    }
}
