//! Collaborators that reach the cold-storage bucket: URL signing and
//! streaming download. Both are injected into the restore service as trait
//! objects so tests can replace them.
pub(crate) mod http_download;
pub(crate) mod s3_signer;

use async_trait::async_trait;
use std::pin::Pin;
use std::time::Duration;
use tokio::io::AsyncRead;

use crate::errors::Result;

pub use http_download::HttpArchiveFetcher;
pub use s3_signer::S3UrlSigner;

/// Body of a fetched archive, consumed incrementally.
pub type ArchiveStream = Pin<Box<dyn AsyncRead + Send>>;

#[async_trait]
pub trait UrlSigner: Send + Sync {
    /// Returns a pre-authenticated GET URL for `object_path`, valid for `validity`.
    async fn sign(&self, bucket: &str, object_path: &str, validity: Duration) -> Result<String>;
}

#[async_trait]
pub trait ArchiveFetcher: Send + Sync {
    /// Starts downloading `url` and returns once response headers are read.
    ///
    /// `Ok(None)` means the server answered with a non-success status.
    async fn fetch(&self, url: &str) -> Result<Option<ArchiveStream>>;
}

/// Strips the query string (which carries the signature) for logging.
pub fn redact_url(raw: &str) -> String {
    match url::Url::parse(raw) {
        Ok(mut parsed) => {
            parsed.set_query(None);
            parsed.set_fragment(None);
            parsed.to_string()
        }
        Err(_) => "<unparseable url>".to_string(),
    }
}
