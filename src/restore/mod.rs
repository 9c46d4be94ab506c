pub(crate) mod batch;
pub(crate) mod logic;
pub(crate) mod models;
pub(crate) mod naming;

#[cfg(test)]
pub(crate) mod test_support;

use anyhow::{Context, Result};
use std::sync::Arc;

use crate::config::AppConfig;
use crate::storage::{HttpArchiveFetcher, S3UrlSigner};

pub use batch::BatchCoordinator;
pub use logic::RestoreService;
pub use models::{RestoreRequest, parse_call_date};

/// Wires the restore service to the configured storage endpoint.
pub async fn build_restore_service(app_config: &AppConfig) -> Result<Arc<RestoreService>> {
    let signer = S3UrlSigner::from_config(&app_config.storage).await;
    let fetcher = HttpArchiveFetcher::new(app_config.download_timeout)
        .context("Failed to build HTTP client for archive downloads")?;

    Ok(Arc::new(RestoreService::new(
        app_config.restore.clone(),
        Arc::new(signer),
        Arc::new(fetcher),
    )))
}
