// cdr-restore/src/restore/models.rs
use chrono::{DateTime, NaiveDateTime};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::path::PathBuf;

use super::naming::ArtifactKind;

/// One call to restore.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RestoreRequest {
    #[serde(deserialize_with = "deserialize_call_date")]
    pub call_date: NaiveDateTime,
    pub call_id: String,
}

/// Accepts RFC 3339 (converted to UTC) or a naive `YYYY-MM-DDTHH:MM[:SS[.f]]`.
pub fn parse_call_date(raw: &str) -> Result<NaiveDateTime, String> {
    let raw = raw.trim();
    if let Ok(with_offset) = DateTime::parse_from_rfc3339(raw) {
        return Ok(with_offset.naive_utc());
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw, format).ok())
        .ok_or_else(|| format!("unrecognised call date '{}'", raw))
}

fn deserialize_call_date<'de, D>(deserializer: D) -> Result<NaiveDateTime, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_call_date(&raw).map_err(serde::de::Error::custom)
}

/// Result of restoring one artifact kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KindOutcome {
    /// Repackaged archive written at this path.
    Path(PathBuf),
    /// The source archive could not be fetched.
    RemoteNotFound,
    /// The source archive holds no entry for the call.
    NotFoundInArchive,
    /// Unexpected failure, only recorded when partial results are kept.
    Error(String),
}

impl KindOutcome {
    fn wire_value(&self) -> String {
        match self {
            KindOutcome::Path(path) => path.display().to_string(),
            KindOutcome::RemoteNotFound => "not_found_on_gcs".to_string(),
            KindOutcome::NotFoundInArchive => "not_in_tar".to_string(),
            KindOutcome::Error(message) => format!("error: {}", message),
        }
    }
}

/// Terminal state of one restore request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestoreOutput {
    Done(BTreeMap<ArtifactKind, KindOutcome>),
    Error(String),
}

// Flat map: {"graph": .., "rtp": .., "sip": .., "status": "done"} or
// {"status": "error", "error": ..}.
impl Serialize for RestoreOutput {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            RestoreOutput::Done(outcomes) => {
                let mut map = serializer.serialize_map(Some(outcomes.len() + 1))?;
                for (kind, outcome) in outcomes {
                    map.serialize_entry(kind.file_prefix(), &outcome.wire_value())?;
                }
                map.serialize_entry("status", "done")?;
                map.end()
            }
            RestoreOutput::Error(message) => {
                let mut map = serializer.serialize_map(Some(2))?;
                map.serialize_entry("status", "error")?;
                map.serialize_entry("error", message)?;
                map.end()
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RestoreResponse {
    pub call_id: String,
    pub restore_output: RestoreOutput,
}
