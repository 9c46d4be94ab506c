// cdr-restore/src/restore/batch.rs
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use super::logic::RestoreService;
use super::models::{RestoreOutput, RestoreRequest, RestoreResponse};

/// Runs many restores with at most `max_degree_of_parallelism` in flight.
pub struct BatchCoordinator {
    service: Arc<RestoreService>,
    max_degree_of_parallelism: usize,
}

impl BatchCoordinator {
    pub fn new(service: Arc<RestoreService>, max_degree_of_parallelism: usize) -> Self {
        Self {
            service,
            max_degree_of_parallelism: max_degree_of_parallelism.max(1),
        }
    }

    /// Restores every request and returns one response per request.
    ///
    /// Each request runs in its own task; a failing or panicking request only
    /// affects its own response. Responses come back in completion order, not
    /// submission order.
    pub async fn restore_many(
        &self,
        requests: Vec<RestoreRequest>,
        cancel: &CancellationToken,
    ) -> Vec<RestoreResponse> {
        let total = requests.len();
        info!(
            requests = total,
            parallelism = self.max_degree_of_parallelism,
            "🚀 Starting batch restore"
        );

        let permits = Arc::new(Semaphore::new(self.max_degree_of_parallelism));
        let responses = Arc::new(Mutex::new(Vec::with_capacity(total)));
        let mut workers = JoinSet::new();

        for request in requests {
            let service = Arc::clone(&self.service);
            let permits = Arc::clone(&permits);
            let responses = Arc::clone(&responses);
            let cancel = cancel.clone();

            workers.spawn(async move {
                let restore_output = match permits.acquire_owned().await {
                    Ok(_permit) => AssertUnwindSafe(service.restore_single(&request, &cancel))
                        .catch_unwind()
                        .await
                        .unwrap_or_else(|_| {
                            RestoreOutput::Error("restore worker panicked".to_string())
                        }),
                    Err(_) => RestoreOutput::Error("worker pool closed".to_string()),
                };
                responses.lock().await.push(RestoreResponse {
                    call_id: request.call_id,
                    restore_output,
                });
            });
        }

        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "Batch worker ended abnormally");
            }
        }

        let responses = std::mem::take(&mut *responses.lock().await);
        let failed = responses
            .iter()
            .filter(|r| matches!(r.restore_output, RestoreOutput::Error(_)))
            .count();
        info!(
            requests = total,
            completed = responses.len(),
            failed,
            "✅ Batch restore finished"
        );
        responses
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::test_support::build_tar;
    use crate::restore::models::KindOutcome;
    use crate::restore::naming::ArtifactKind;
    use crate::restore::test_support::{FakeFetcher, leftover_scratch, service, ts, url_for};
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    const GOOD_MINUTE: &str = "2024-03-01T14:05:00";
    const BAD_MINUTE: &str = "2024-03-01T14:06:00";

    /// One archive per kind for the good minute with pcaps for calls c0..c5;
    /// the bad minute serves a corrupt graph archive.
    fn fetcher() -> FakeFetcher {
        let good = ts(GOOD_MINUTE);
        let names: Vec<String> = (0..6).map(|i| format!("c{}.pcap", i)).collect();
        let pcaps: Vec<(&str, &[u8])> = names.iter().map(|n| (n.as_str(), &b"pcap"[..])).collect();

        FakeFetcher::default()
            .with_object(url_for(good, ArtifactKind::Graph), build_tar(&[("c0_a.graph", b"g")], true))
            .with_object(url_for(good, ArtifactKind::Media), build_tar(&pcaps, false))
            .with_object(url_for(good, ArtifactKind::Signaling), build_tar(&pcaps, true))
            .with_object(url_for(ts(BAD_MINUTE), ArtifactKind::Graph), vec![1u8; 1500])
            .with_delay(Duration::from_millis(10))
    }

    fn request(call_id: &str, minute: &str) -> RestoreRequest {
        RestoreRequest {
            call_date: ts(minute),
            call_id: call_id.to_string(),
        }
    }

    #[tokio::test]
    async fn test_batch_isolates_failures() {
        let base = tempfile::tempdir().unwrap();
        let svc = Arc::new(service(base.path(), Arc::new(fetcher()), false));
        let coordinator = BatchCoordinator::new(svc, 3);

        let mut requests: Vec<_> = (0..6).map(|i| request(&format!("c{}", i), GOOD_MINUTE)).collect();
        requests.insert(2, request("broken", BAD_MINUTE));

        let mut responses = coordinator.restore_many(requests, &CancellationToken::new()).await;
        responses.sort_by(|a, b| a.call_id.cmp(&b.call_id));

        assert_eq!(responses.len(), 7);
        let broken = responses.iter().find(|r| r.call_id == "broken").unwrap();
        assert!(matches!(broken.restore_output, RestoreOutput::Error(_)));

        for response in responses.iter().filter(|r| r.call_id != "broken") {
            let RestoreOutput::Done(outcomes) = &response.restore_output else {
                panic!("{} failed: {:?}", response.call_id, response.restore_output);
            };
            assert!(matches!(outcomes[&ArtifactKind::Media], KindOutcome::Path(_)));
            assert!(matches!(outcomes[&ArtifactKind::Signaling], KindOutcome::Path(_)));
            let graph = &outcomes[&ArtifactKind::Graph];
            if response.call_id == "c0" {
                assert!(matches!(graph, KindOutcome::Path(_)));
            } else {
                assert_eq!(graph, &KindOutcome::NotFoundInArchive);
            }
        }
        assert!(leftover_scratch(base.path()).is_empty());
    }

    #[tokio::test]
    async fn test_parallelism_is_bounded() {
        let base = tempfile::tempdir().unwrap();
        let fetcher = Arc::new(fetcher());
        let svc = Arc::new(service(base.path(), fetcher.clone(), false));
        let coordinator = BatchCoordinator::new(svc, 2);

        let requests: Vec<_> = (0..6).map(|i| request(&format!("c{}", i), GOOD_MINUTE)).collect();
        let responses = coordinator.restore_many(requests, &CancellationToken::new()).await;

        assert_eq!(responses.len(), 6);
        assert_eq!(fetcher.fetches.load(Ordering::SeqCst), 18);
        assert!(fetcher.peak_in_flight.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_zero_parallelism_still_runs_sequentially() {
        let base = tempfile::tempdir().unwrap();
        let fetcher = Arc::new(fetcher());
        let svc = Arc::new(service(base.path(), fetcher.clone(), false));
        let coordinator = BatchCoordinator::new(svc, 0);

        let requests: Vec<_> = (0..3).map(|i| request(&format!("c{}", i), GOOD_MINUTE)).collect();
        let responses = coordinator.restore_many(requests, &CancellationToken::new()).await;

        assert_eq!(responses.len(), 3);
        assert_eq!(fetcher.peak_in_flight.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_empty_batch() {
        let base = tempfile::tempdir().unwrap();
        let svc = Arc::new(service(base.path(), Arc::new(FakeFetcher::default()), false));
        let coordinator = BatchCoordinator::new(svc, 4);

        let responses = coordinator.restore_many(Vec::new(), &CancellationToken::new()).await;

        assert!(responses.is_empty());
    }
}
