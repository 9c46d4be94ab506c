// cdr-restore/src/config/mod.rs
use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

const DEFAULT_MAX_DEGREE_OF_PARALLELISM: usize = 1;
const DEFAULT_SIGNED_URL_VALIDITY_SECS: u64 = 60 * 60;
const DEFAULT_DOWNLOAD_TIMEOUT_SECS: u64 = 5 * 60;
const DEFAULT_REGION: &str = "auto";

// Structs for deserializing config.json
#[derive(Debug, Clone, Deserialize)]
pub struct JsonS3StorageConfig {
    pub region: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub endpoint_url: Option<String>,
    pub force_path_style: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawJsonConfig {
    pub recordings_base_path: Option<PathBuf>,
    pub bucket_name: Option<String>,
    pub max_degree_of_parallelism: Option<usize>,
    pub signed_url_validity_secs: Option<u64>,
    pub download_timeout_secs: Option<u64>,
    pub keep_partial_results: Option<bool>,
    pub s3_storage: Option<JsonS3StorageConfig>,
}

// Application's internal configuration structs
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub endpoint_url: Option<String>,
    pub region: String,
    /// `(access_key_id, secret_access_key)` when both are configured.
    pub static_credentials: Option<(String, String)>,
    pub force_path_style: bool,
}

#[derive(Debug, Clone)]
pub struct RestoreSettings {
    pub recordings_base_path: PathBuf,
    pub bucket_name: String,
    pub signed_url_validity: Duration,
    /// Record unexpected per-kind failures and carry on instead of failing
    /// the whole request.
    pub keep_partial_results: bool,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub restore: RestoreSettings,
    pub storage: StorageConfig,
    pub max_degree_of_parallelism: usize,
    pub download_timeout: Duration,
}

impl AppConfig {
    pub fn load_from_json(config_path: &Path) -> Result<Self> {
        let config_content = fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file at {}", config_path.display()))?;
        let raw_json_config: RawJsonConfig = serde_json::from_str(&config_content)
            .with_context(|| {
                format!(
                    "Failed to parse JSON from config file at {}",
                    config_path.display()
                )
            })?;

        Self::from_raw(raw_json_config)
    }

    pub fn from_raw(raw: RawJsonConfig) -> Result<Self> {
        let recordings_base_path = raw
            .recordings_base_path
            .context("recordings_base_path must be set in config.json")?;
        if recordings_base_path.as_os_str().is_empty() {
            anyhow::bail!("recordings_base_path cannot be empty in config.json.");
        }

        let bucket_name = raw
            .bucket_name
            .filter(|s| !s.trim().is_empty())
            .context("bucket_name must be set in config.json")?;

        let max_degree_of_parallelism = match raw.max_degree_of_parallelism {
            Some(0) => {
                warn!("max_degree_of_parallelism is 0 in config.json, using 1");
                1
            }
            Some(n) => n,
            None => DEFAULT_MAX_DEGREE_OF_PARALLELISM,
        };

        let signed_url_validity_secs = raw
            .signed_url_validity_secs
            .unwrap_or(DEFAULT_SIGNED_URL_VALIDITY_SECS);
        if signed_url_validity_secs == 0 {
            anyhow::bail!("signed_url_validity_secs must be greater than zero.");
        }
        let download_timeout_secs = raw
            .download_timeout_secs
            .unwrap_or(DEFAULT_DOWNLOAD_TIMEOUT_SECS);
        if download_timeout_secs == 0 {
            anyhow::bail!("download_timeout_secs must be greater than zero.");
        }

        Ok(AppConfig {
            restore: RestoreSettings {
                recordings_base_path,
                bucket_name,
                signed_url_validity: Duration::from_secs(signed_url_validity_secs),
                keep_partial_results: raw.keep_partial_results.unwrap_or(false),
            },
            storage: storage_config_from_raw(raw.s3_storage.as_ref()),
            max_degree_of_parallelism,
            download_timeout: Duration::from_secs(download_timeout_secs),
        })
    }
}

fn storage_config_from_raw(raw: Option<&JsonS3StorageConfig>) -> StorageConfig {
    let non_empty = |value: &Option<String>| value.clone().filter(|s| !s.trim().is_empty());

    let Some(s3_raw) = raw else {
        return StorageConfig {
            endpoint_url: None,
            region: DEFAULT_REGION.to_string(),
            static_credentials: None,
            force_path_style: true,
        };
    };

    let static_credentials = match (
        non_empty(&s3_raw.access_key_id),
        non_empty(&s3_raw.secret_access_key),
    ) {
        (Some(key_id), Some(secret)) => Some((key_id, secret)),
        (None, None) => None,
        _ => {
            // Only warn if one half of the key pair was provided
            warn!("s3_storage has only one of access_key_id / secret_access_key; falling back to the default credential chain.");
            None
        }
    };

    StorageConfig {
        endpoint_url: non_empty(&s3_raw.endpoint_url),
        region: non_empty(&s3_raw.region).unwrap_or_else(|| DEFAULT_REGION.to_string()),
        static_credentials,
        force_path_style: s3_raw.force_path_style.unwrap_or(true),
    }
}
