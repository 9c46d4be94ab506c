// cdr-restore/src/restore/logic.rs
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::models::{KindOutcome, RestoreOutput, RestoreRequest};
use super::naming::{ArtifactKind, object_path};
use crate::archive::{extract_from_stream, package_files};
use crate::config::RestoreSettings;
use crate::errors::{RestoreError, Result};
use crate::storage::{ArchiveFetcher, UrlSigner, redact_url};

/// Name of the scratch directory created next to each final archive.
const TEMP_SEGMENT: &str = "Temp";

/// Restores the graph, media and signaling artifacts of single calls.
pub struct RestoreService {
    settings: RestoreSettings,
    signer: Arc<dyn UrlSigner>,
    fetcher: Arc<dyn ArchiveFetcher>,
}

impl RestoreService {
    pub fn new(
        settings: RestoreSettings,
        signer: Arc<dyn UrlSigner>,
        fetcher: Arc<dyn ArchiveFetcher>,
    ) -> Self {
        Self {
            settings,
            signer,
            fetcher,
        }
    }

    /// Runs the per-kind pipeline for one call, in the fixed kind order.
    ///
    /// Missing source archives and archives without the call are recorded per
    /// kind. Any other failure ends the request with a request-level error and
    /// the outcomes gathered so far are dropped, unless partial results are
    /// enabled, in which case the failure is recorded for that kind and the
    /// remaining kinds still run. Cancellation always ends the request.
    pub async fn restore_single(
        &self,
        request: &RestoreRequest,
        cancel: &CancellationToken,
    ) -> RestoreOutput {
        info!(call_id = %request.call_id, call_date = %request.call_date, "🔄 Starting restore");

        match self.restore_all_kinds(request, cancel).await {
            Ok(outcomes) => {
                info!(call_id = %request.call_id, "✅ Restore completed");
                RestoreOutput::Done(outcomes)
            }
            Err(err) => {
                error!(call_id = %request.call_id, error = %err, "❌ Restore failed");
                RestoreOutput::Error(err.to_string())
            }
        }
    }

    async fn restore_all_kinds(
        &self,
        request: &RestoreRequest,
        cancel: &CancellationToken,
    ) -> Result<BTreeMap<ArtifactKind, KindOutcome>> {
        validate_call_id(&request.call_id)?;

        let mut outcomes = BTreeMap::new();
        for kind in ArtifactKind::ALL {
            if cancel.is_cancelled() {
                return Err(RestoreError::Cancelled(format!(
                    "restore of call {} stopped before {}",
                    request.call_id, kind
                )));
            }

            let outcome = match self.restore_kind(request, kind, cancel).await {
                Ok(outcome) => outcome,
                Err(err @ RestoreError::Cancelled(_)) => return Err(err),
                Err(err) if self.settings.keep_partial_results => {
                    warn!(call_id = %request.call_id, %kind, error = %err, "Artifact failed, continuing with the next kind");
                    KindOutcome::Error(err.to_string())
                }
                Err(err) => return Err(err),
            };
            debug!(call_id = %request.call_id, %kind, ?outcome, "Artifact processed");
            outcomes.insert(kind, outcome);
        }
        Ok(outcomes)
    }

    async fn restore_kind(
        &self,
        request: &RestoreRequest,
        kind: ArtifactKind,
        cancel: &CancellationToken,
    ) -> Result<KindOutcome> {
        let object = object_path(request.call_date, kind);
        let url = self
            .signer
            .sign(&self.settings.bucket_name, &object, self.settings.signed_url_validity)
            .await?;

        let Some(stream) = self.fetcher.fetch(&url).await? else {
            info!(call_id = %request.call_id, %kind, url = %redact_url(&url), "Source archive not found in storage");
            return Ok(KindOutcome::RemoteNotFound);
        };

        let output_path = self.output_path(&request.call_id, &object);
        let scratch = WorkingDirectory::create(&output_path, &self.settings.recordings_base_path)?;

        // The extraction holds its own handle so the directory outlives it
        // even when this future is dropped first.
        let extracted = extract_from_stream(
            stream,
            kind.wire_compressed(),
            scratch.clone(),
            kind.entry_matcher(&request.call_id),
            cancel.clone(),
        )
        .await;

        let outcome = match extracted {
            Err(err) => Err(err),
            // A cancelled extraction may have left truncated files; never package them.
            Ok(_) if cancel.is_cancelled() => Err(RestoreError::Cancelled(format!(
                "extraction of {} for call {} interrupted",
                object, request.call_id
            ))),
            Ok(files) if files.is_empty() => {
                info!(call_id = %request.call_id, %kind, object = %object, "Call not present in source archive");
                Ok(KindOutcome::NotFoundInArchive)
            }
            Ok(files) => {
                debug!(call_id = %request.call_id, %kind, files = files.len(), "Repackaging extracted entries");
                package_files(files, output_path.clone(), kind.wire_compressed())
                    .await
                    .map(|_| KindOutcome::Path(output_path))
            }
        };

        drop(scratch);
        outcome
    }

    /// `{base}/{call_id}/{object_path}`; each call gets its own tree so calls
    /// sharing a minute bucket never overwrite each other.
    fn output_path(&self, call_id: &str, object: &str) -> PathBuf {
        let mut path = self.settings.recordings_base_path.join(call_id);
        path.extend(object.split('/'));
        path
    }
}

/// Call ids become a path segment of the output tree.
fn validate_call_id(call_id: &str) -> Result<()> {
    if call_id.trim().is_empty()
        || call_id == "."
        || call_id == ".."
        || call_id.contains(['/', '\\', '\0'])
    {
        return Err(RestoreError::InvalidRequest(format!(
            "call id '{}' is empty or not usable as a directory name",
            call_id
        )));
    }
    Ok(())
}

/// Scratch space exclusively owned by one (request, kind) operation.
///
/// Lives in a unique directory below a `Temp` directory next to the final
/// archive. Clones share the directory, which is removed when the last clone
/// is dropped, together with every ancestor left empty below the recordings
/// base path.
#[derive(Clone)]
struct WorkingDirectory {
    inner: Arc<ScratchDir>,
}

struct ScratchDir {
    stop_at: PathBuf,
    temp_root: PathBuf,
    path: PathBuf,
    dir: Option<TempDir>,
}

/// Attempts at creating the scratch directory while a concurrent cleanup of
/// the shared `Temp` root keeps removing it.
const SCRATCH_CREATE_ATTEMPTS: usize = 8;

impl WorkingDirectory {
    fn create(output_path: &Path, stop_at: &Path) -> Result<Self> {
        let temp_root = output_path
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join(TEMP_SEGMENT);

        let mut attempt = 1;
        let dir = loop {
            let created = fs::create_dir_all(&temp_root).and_then(|_| {
                tempfile::Builder::new()
                    .prefix("restore-")
                    .tempdir_in(&temp_root)
            });
            match created {
                Ok(dir) => break dir,
                Err(e) if e.kind() == io::ErrorKind::NotFound && attempt < SCRATCH_CREATE_ATTEMPTS => {
                    debug!(dir = %temp_root.display(), attempt, "Scratch root vanished, retrying");
                    attempt += 1;
                }
                Err(e) => {
                    return Err(RestoreError::io(
                        format!("creating scratch directory in {}", temp_root.display()),
                        e,
                    ));
                }
            }
        };

        Ok(Self {
            inner: Arc::new(ScratchDir {
                stop_at: stop_at.to_path_buf(),
                temp_root,
                path: dir.path().to_path_buf(),
                dir: Some(dir),
            }),
        })
    }

    fn path(&self) -> &Path {
        &self.inner.path
    }
}

impl AsRef<Path> for WorkingDirectory {
    fn as_ref(&self) -> &Path {
        self.path()
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        if let Some(dir) = self.dir.take() {
            if let Err(e) = dir.close() {
                warn!(dir = %self.path.display(), error = %e, "Failed to remove scratch directory");
            }
        }

        // Stops at the first directory still in use by someone else.
        let mut current = Some(self.temp_root.as_path());
        while let Some(dir) = current {
            if dir == self.stop_at || !dir.starts_with(&self.stop_at) {
                break;
            }
            if fs::remove_dir(dir).is_err() {
                break;
            }
            current = dir.parent();
        }
    }
}
