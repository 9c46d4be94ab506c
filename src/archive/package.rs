// cdr-restore/src/archive/package.rs
use flate2::Compression;
use flate2::write::GzEncoder;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use tar::{Builder, EntryType, Header};
use tracing::{debug, info};

use crate::errors::{IoContext, RestoreError, Result};

/// Creates a TAR archive (GZipped when `compress` is set) at `output_path`
/// from a list of local files.
///
/// Every file becomes a top-level entry named after its basename, in list
/// order. Files that no longer exist are skipped. Content is streamed from
/// disk; the archive is staged next to `output_path` and renamed into place,
/// so a failure never leaves a partial archive behind.
///
/// # Returns
/// Number of entries written.
pub fn create_archive(files: &[PathBuf], output_path: &Path, compress: bool) -> Result<usize> {
    let parent = match output_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    if !parent.exists() {
        fs::create_dir_all(parent).io_context(|| {
            format!("creating parent directory for archive {}", parent.display())
        })?;
    }

    let mut staging = tempfile::Builder::new()
        .prefix(".packaging-")
        .tempfile_in(parent)
        .io_context(|| format!("creating staging file in {}", parent.display()))?;

    let appended = {
        let writer = BufWriter::new(staging.as_file_mut());
        if compress {
            let encoder = GzEncoder::new(writer, Compression::default());
            let (encoder, appended) = append_files(Builder::new(encoder), files)?;
            encoder
                .finish()
                .and_then(|mut writer| writer.flush())
                .io_context(|| format!("finishing Gzip encoding for {}", output_path.display()))?;
            appended
        } else {
            let (mut writer, appended) = append_files(Builder::new(writer), files)?;
            writer
                .flush()
                .io_context(|| format!("flushing archive {}", output_path.display()))?;
            appended
        }
    };

    staging.persist(output_path).map_err(|err| {
        RestoreError::io(format!("moving archive into {}", output_path.display()), err.error)
    })?;

    info!(
        archive = %output_path.display(),
        entries = appended,
        compressed = compress,
        "Archive created"
    );
    Ok(appended)
}

/// Async front for [`create_archive`], run on the blocking pool.
pub async fn package_files(files: Vec<PathBuf>, output_path: PathBuf, compress: bool) -> Result<usize> {
    tokio::task::spawn_blocking(move || create_archive(&files, &output_path, compress)).await?
}

fn append_files<W: Write>(mut builder: Builder<W>, files: &[PathBuf]) -> Result<(W, usize)> {
    let mut appended = 0;

    for path in files {
        let metadata = match fs::metadata(path) {
            Ok(metadata) if metadata.is_file() => metadata,
            Ok(_) => {
                debug!(file = %path.display(), "Not a regular file, skipping");
                continue;
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(file = %path.display(), "File vanished before packaging, skipping");
                continue;
            }
            Err(e) => {
                return Err(RestoreError::io(format!("reading metadata of {}", path.display()), e));
            }
        };
        let Some(name) = path.file_name() else {
            continue;
        };

        let mut header = Header::new_gnu();
        header.set_entry_type(EntryType::Regular);
        header.set_size(metadata.len());
        header.set_mode(0o644);
        header.set_mtime(
            metadata
                .modified()
                .ok()
                .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                .map(|d| d.as_secs())
                .unwrap_or(0),
        );

        let source = File::open(path).io_context(|| format!("opening {}", path.display()))?;
        builder
            .append_data(&mut header, name, source)
            .io_context(|| format!("appending {} to archive", path.display()))?;
        appended += 1;
    }

    let inner = builder
        .into_inner()
        .io_context(|| "finishing tar stream")?;
    Ok((inner, appended))
}
