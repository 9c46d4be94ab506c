// In-memory stand-ins for the storage collaborators.
use async_trait::async_trait;
use chrono::NaiveDateTime;
use std::collections::HashMap;
use std::io::{self, Cursor};
use std::path::Path;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{AsyncRead, ReadBuf};

use super::logic::RestoreService;
use super::naming::{ArtifactKind, object_path};
use crate::config::RestoreSettings;
use crate::errors::{RestoreError, Result};
use crate::storage::{ArchiveFetcher, ArchiveStream, UrlSigner};

pub const BUCKET: &str = "recordings";

pub fn ts(s: &str) -> NaiveDateTime {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S").unwrap()
}

pub fn url_for(call_date: NaiveDateTime, kind: ArtifactKind) -> String {
    format!("mem://{}/{}", BUCKET, object_path(call_date, kind))
}

pub struct FakeSigner;

#[async_trait]
impl UrlSigner for FakeSigner {
    async fn sign(&self, bucket: &str, object_path: &str, _validity: Duration) -> Result<String> {
        Ok(format!("mem://{}/{}", bucket, object_path))
    }
}

/// Serves archives from memory; unknown URLs answer "not found".
#[derive(Default)]
pub struct FakeFetcher {
    objects: HashMap<String, Vec<u8>>,
    streams: Mutex<HashMap<String, ArchiveStream>>,
    broken: Vec<String>,
    delay: Option<Duration>,
    in_flight: AtomicUsize,
    pub peak_in_flight: AtomicUsize,
    pub fetches: AtomicUsize,
}

impl FakeFetcher {
    pub fn with_object(mut self, url: String, bytes: Vec<u8>) -> Self {
        self.objects.insert(url, bytes);
        self
    }

    /// Serves `stream` once for `url`, for tests that control when bytes arrive.
    pub fn with_stream<S>(self, url: String, stream: S) -> Self
    where
        S: AsyncRead + Send + 'static,
    {
        self.streams.lock().unwrap().insert(url, Box::pin(stream));
        self
    }

    /// Fetching `url` fails at the transport level.
    pub fn with_broken(mut self, url: String) -> Self {
        self.broken.push(url);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

#[async_trait]
impl ArchiveFetcher for FakeFetcher {
    async fn fetch(&self, url: &str) -> Result<Option<ArchiveStream>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.broken.iter().any(|b| b == url) {
            return Err(RestoreError::Unexpected("connection reset by peer".to_string()));
        }
        if let Some(stream) = self.streams.lock().unwrap().remove(url) {
            return Ok(Some(stream));
        }
        Ok(self
            .objects
            .get(url)
            .map(|bytes| Box::pin(Cursor::new(bytes.clone())) as ArchiveStream))
    }
}

/// Raises `dropped` once the reader lets go of the stream.
pub struct DropFlagStream<S> {
    inner: S,
    dropped: Arc<AtomicBool>,
}

impl<S> DropFlagStream<S> {
    pub fn new(inner: S, dropped: Arc<AtomicBool>) -> Self {
        Self { inner, dropped }
    }
}

impl<S: AsyncRead + Unpin> AsyncRead for DropFlagStream<S> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_read(cx, buf)
    }
}

impl<S> Drop for DropFlagStream<S> {
    fn drop(&mut self) {
        self.dropped.store(true, Ordering::SeqCst);
    }
}

pub fn settings(base: &Path, keep_partial_results: bool) -> RestoreSettings {
    RestoreSettings {
        recordings_base_path: base.to_path_buf(),
        bucket_name: BUCKET.to_string(),
        signed_url_validity: Duration::from_secs(3600),
        keep_partial_results,
    }
}

pub fn service(base: &Path, fetcher: Arc<FakeFetcher>, keep_partial_results: bool) -> RestoreService {
    RestoreService::new(settings(base, keep_partial_results), Arc::new(FakeSigner), fetcher)
}

/// Directories named `Temp` (or anything inside them) still on disk.
pub fn leftover_scratch(base: &Path) -> Vec<std::path::PathBuf> {
    if !base.exists() {
        return Vec::new();
    }
    walkdir::WalkDir::new(base)
        .into_iter()
        .map(|entry| entry.unwrap().into_path())
        .filter(|path| path.components().any(|c| c.as_os_str() == "Temp"))
        .collect()
}
