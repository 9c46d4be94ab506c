// cdr-restore/src/restore/naming.rs
use chrono::NaiveDateTime;
use std::fmt;

use crate::archive::EntryMatcher;

/// The artifact categories archived per minute bucket, in restore order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ArtifactKind {
    Graph,
    Media,
    Signaling,
}

impl ArtifactKind {
    pub const ALL: [ArtifactKind; 3] = [ArtifactKind::Graph, ArtifactKind::Media, ArtifactKind::Signaling];

    /// Directory segment used in the bucket layout.
    pub fn storage_dir(self) -> &'static str {
        match self {
            ArtifactKind::Graph => "GRAPH",
            ArtifactKind::Media => "RTP",
            ArtifactKind::Signaling => "SIP",
        }
    }

    /// Filename prefix, also the key used in restore responses.
    pub fn file_prefix(self) -> &'static str {
        match self {
            ArtifactKind::Graph => "graph",
            ArtifactKind::Media => "rtp",
            ArtifactKind::Signaling => "sip",
        }
    }

    /// Whether archives of this kind are gzip-wrapped, both in storage and on output.
    pub fn wire_compressed(self) -> bool {
        !matches!(self, ArtifactKind::Media)
    }

    pub fn extension(self) -> &'static str {
        if self.wire_compressed() { "tar.gz" } else { "tar" }
    }

    pub fn entry_matcher(self, call_id: &str) -> EntryMatcher {
        match self {
            ArtifactKind::Graph => EntryMatcher::prefix_suffix(call_id, ".graph"),
            ArtifactKind::Media | ArtifactKind::Signaling => {
                EntryMatcher::exact(&format!("{}.pcap", call_id))
            }
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.file_prefix())
    }
}

/// Builds the bucket object path for a call timestamp and artifact kind.
///
/// Seconds and below are ignored; archives are bucketed per minute.
pub fn object_path(call_date: NaiveDateTime, kind: ArtifactKind) -> String {
    let date = call_date.format("%Y-%m-%d");
    let hour = call_date.format("%H");
    let minute = call_date.format("%M");
    format!(
        "{date}/{hour}/{minute}/{dir}/{prefix}_{date}-{hour}-{minute}.{ext}",
        dir = kind.storage_dir(),
        prefix = kind.file_prefix(),
        ext = kind.extension(),
    )
}
