// cdr-restore/src/archive/extract.rs
use flate2::read::MultiGzDecoder;
use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Component, Path, PathBuf};
use tar::Archive;
use tokio::io::AsyncRead;
use tokio_util::io::SyncIoBridge;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::errors::{IoContext, Result};

/// Size of the buffer used to copy a single entry to disk.
const COPY_BUFFER_SIZE: usize = 80 * 1024;

/// Selects archive entries by their short name (final path segment),
/// compared case-insensitively.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryMatcher {
    /// Short name equals the expected name. At most one entry is extracted.
    Exact(String),
    /// Short name starts with `prefix` and ends with `suffix`.
    PrefixSuffix { prefix: String, suffix: String },
}

impl EntryMatcher {
    pub fn exact(name: &str) -> Self {
        EntryMatcher::Exact(name.to_lowercase())
    }

    pub fn prefix_suffix(prefix: &str, suffix: &str) -> Self {
        EntryMatcher::PrefixSuffix {
            prefix: prefix.to_lowercase(),
            suffix: suffix.to_lowercase(),
        }
    }

    pub fn matches(&self, short_name: &str) -> bool {
        let name = short_name.to_lowercase();
        match self {
            EntryMatcher::Exact(expected) => name == *expected,
            EntryMatcher::PrefixSuffix { prefix, suffix } => {
                name.starts_with(prefix.as_str()) && name.ends_with(suffix.as_str())
            }
        }
    }

    fn single_entry(&self) -> bool {
        matches!(self, EntryMatcher::Exact(_))
    }
}

/// Streams a tar archive (optionally gzip-wrapped) and writes every entry
/// accepted by `matcher` below `output_dir`.
///
/// Entries are read sequentially; nothing but the current copy buffer is held
/// in memory. Directory and non-regular entries are skipped. When two entries
/// share a short name the first one wins and later ones are ignored.
///
/// Cancellation is checked before every entry and every copied chunk. Once it
/// is observed the files written so far are returned, the last one possibly
/// truncated; callers decide what a cancelled result means.
///
/// # Returns
/// Paths of the written files, in archive order. No match yields an empty list.
pub fn extract_matching_entries<R: Read>(
    source: R,
    gzipped: bool,
    output_dir: &Path,
    matcher: &EntryMatcher,
    cancel: &CancellationToken,
) -> Result<Vec<PathBuf>> {
    if gzipped {
        extract_from_tar(MultiGzDecoder::new(source), output_dir, matcher, cancel)
    } else {
        extract_from_tar(source, output_dir, matcher, cancel)
    }
}

/// Async front for [`extract_matching_entries`]: bridges `stream` into a
/// blocking reader and runs the extraction on the blocking pool.
///
/// `output_dir` is moved into the blocking task and dropped only once the
/// extraction has stopped, so a guard type owning the directory outlives
/// every write into it. Dropping the returned future cancels the extraction.
pub async fn extract_from_stream<S, D>(
    stream: S,
    gzipped: bool,
    output_dir: D,
    matcher: EntryMatcher,
    cancel: CancellationToken,
) -> Result<Vec<PathBuf>>
where
    S: AsyncRead + Send + Unpin + 'static,
    D: AsRef<Path> + Send + 'static,
{
    let cancel = cancel.child_token();
    let _cancel_on_drop = cancel.clone().drop_guard();

    let source = SyncIoBridge::new(stream);
    tokio::task::spawn_blocking(move || {
        let extracted =
            extract_matching_entries(source, gzipped, output_dir.as_ref(), &matcher, &cancel);
        drop(output_dir);
        extracted
    })
    .await?
}

fn extract_from_tar<R: Read>(
    source: R,
    output_dir: &Path,
    matcher: &EntryMatcher,
    cancel: &CancellationToken,
) -> Result<Vec<PathBuf>> {
    let mut archive = Archive::new(source);
    let mut extracted = Vec::new();
    let mut seen_names = HashSet::new();

    let entries = archive
        .entries()
        .io_context(|| "opening archive stream")?;

    for entry in entries {
        if cancel.is_cancelled() {
            debug!(extracted = extracted.len(), "Extraction cancelled between entries");
            break;
        }

        let mut entry = entry.io_context(|| "reading archive entry header")?;
        if !entry.header().entry_type().is_file() {
            continue;
        }

        let entry_path = entry
            .path()
            .io_context(|| "decoding archive entry path")?
            .into_owned();
        let Some(short_name) = entry_path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if !matcher.matches(short_name) {
            continue;
        }
        if !seen_names.insert(short_name.to_lowercase()) {
            warn!(entry = %entry_path.display(), "Ignoring duplicate entry name, keeping the first one");
            continue;
        }

        let Some(relative) = sanitize_entry_path(&entry_path) else {
            warn!(entry = %entry_path.display(), "Skipping entry with unusable path");
            continue;
        };
        let target = output_dir.join(relative);

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .io_context(|| format!("creating directory {}", parent.display()))?;
        }

        let mut output_file = File::create(&target)
            .io_context(|| format!("creating {}", target.display()))?;
        let copied = copy_entry_contents(&mut entry, &mut output_file, cancel)
            .io_context(|| format!("writing entry {} to {}", entry_path.display(), target.display()))?;

        debug!(entry = %entry_path.display(), bytes = copied, "Extracted archive entry");
        extracted.push(target);

        if matcher.single_entry() {
            break;
        }
    }

    Ok(extracted)
}

/// Copies one entry in fixed-size chunks, stopping early on cancellation.
fn copy_entry_contents<R: Read, W: Write>(
    reader: &mut R,
    writer: &mut W,
    cancel: &CancellationToken,
) -> io::Result<u64> {
    let mut buffer = vec![0u8; COPY_BUFFER_SIZE];
    let mut copied = 0u64;

    loop {
        if cancel.is_cancelled() {
            break;
        }
        let read = match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        writer.write_all(&buffer[..read])?;
        copied += read as u64;
    }

    writer.flush()?;
    Ok(copied)
}

/// Reduces an archive entry path to its plain components.
///
/// Root, drive prefixes, `.` and `..` are dropped so the result always stays
/// below the directory it is joined to.
fn sanitize_entry_path(path: &Path) -> Option<PathBuf> {
    let clean: PathBuf = path
        .components()
        .filter_map(|component| match component {
            Component::Normal(part) => Some(part),
            _ => None,
        })
        .collect();

    if clean.as_os_str().is_empty() {
        None
    } else {
        Some(clean)
    }
}
