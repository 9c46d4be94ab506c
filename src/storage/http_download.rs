// cdr-restore/src/storage/http_download.rs
use async_trait::async_trait;
use futures::TryStreamExt;
use std::io;
use std::time::Duration;
use tokio_util::io::StreamReader;
use tracing::debug;

use super::{ArchiveFetcher, ArchiveStream, redact_url};
use crate::errors::Result;

/// Downloads archives over HTTPS from pre-signed URLs.
pub struct HttpArchiveFetcher {
    client: reqwest::Client,
}

impl HttpArchiveFetcher {
    /// `timeout` bounds the whole exchange, body streaming included.
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl ArchiveFetcher for HttpArchiveFetcher {
    async fn fetch(&self, url: &str) -> Result<Option<ArchiveStream>> {
        // `send` resolves as soon as the status line and headers are in.
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            debug!(url = %redact_url(url), %status, "Remote archive not available");
            return Ok(None);
        }

        debug!(
            url = %redact_url(url),
            content_length = ?response.content_length(),
            "Streaming remote archive"
        );
        let body = response.bytes_stream().map_err(io::Error::other);
        Ok(Some(Box::pin(StreamReader::new(body))))
    }
}
