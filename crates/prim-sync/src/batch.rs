use tracing::{error, info};

use crate::resource::ResourceDescriptor;
use crate::sync::{ResourceSynchronizer, SyncOutcome};

/// Per-resource verdicts of one batch, in declaration order.
#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    pub outcomes: Vec<SyncOutcome>,
}

impl BatchReport {
    pub fn total(&self) -> usize {
        self.outcomes.len()
    }

    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.total() - self.succeeded()
    }

    pub fn all_succeeded(&self) -> bool {
        self.failed() == 0
    }

    pub fn failures(&self) -> impl Iterator<Item = &SyncOutcome> {
        self.outcomes.iter().filter(|o| !o.is_success())
    }
}

/// Sync every resource in order. A failure is recorded and the batch moves
/// on; nothing aborts early.
pub async fn run_all(
    synchronizer: &ResourceSynchronizer<'_>,
    resources: &[ResourceDescriptor],
) -> BatchReport {
    let mut report = BatchReport::default();

    for resource in resources {
        let outcome = synchronizer.sync(resource).await;
        if !outcome.is_success() {
            error!(resource = %outcome.resource_id, reason = %outcome.state, "resource failed");
        }
        report.outcomes.push(outcome);
    }

    info!(
        succeeded = report.succeeded(),
        failed = report.failed(),
        "batch complete"
    );
    report
}

#[cfg(test)]
mod tests {
    use crate::resource::ResourceDescriptor;
    use crate::sync::{SyncError, SyncState};
    use crate::test_support::{
        InMemoryMetadataStore, InMemoryPayloadStore, ScriptedFetcher, ScriptedResponse,
    };

    use super::*;

    fn datasets(ids: &[&str]) -> Vec<ResourceDescriptor> {
        ids.iter()
            .map(|id| ResourceDescriptor::dataset(*id, "https://portal.example.org"))
            .collect()
    }

    #[tokio::test]
    async fn failure_in_the_middle_does_not_stop_the_batch() {
        let fetcher = ScriptedFetcher::new(vec![
            ScriptedResponse::ok("one\n", None),
            ScriptedResponse::Status(500),
            ScriptedResponse::ok("three\n", None),
        ]);
        let meta = InMemoryMetadataStore::new();
        let payloads = InMemoryPayloadStore::new();
        let sync = ResourceSynchronizer::new(&fetcher, &meta, &payloads);

        let report = run_all(&sync, &datasets(&["a", "b", "c"])).await;

        assert_eq!(report.total(), 3);
        assert_eq!(report.succeeded(), 2);
        assert_eq!(report.failed(), 1);
        assert!(!report.all_succeeded());

        let ids: Vec<&str> = report.outcomes.iter().map(|o| o.resource_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert_eq!(
            report.outcomes[1].state,
            SyncState::Failed(SyncError::UnexpectedStatus { status: 500 })
        );
        assert_eq!(payloads.get("c").as_deref(), Some(&b"three\n"[..]));
        assert!(payloads.get("b").is_none());

        let failed: Vec<&str> = report.failures().map(|o| o.resource_id.as_str()).collect();
        assert_eq!(failed, vec!["b"]);
    }

    #[tokio::test]
    async fn empty_batch_succeeds() {
        let fetcher = ScriptedFetcher::new(vec![]);
        let meta = InMemoryMetadataStore::new();
        let payloads = InMemoryPayloadStore::new();
        let sync = ResourceSynchronizer::new(&fetcher, &meta, &payloads);

        let report = run_all(&sync, &[]).await;
        assert_eq!(report.total(), 0);
        assert!(report.all_succeeded());
    }

    #[tokio::test]
    async fn second_run_against_unchanged_remote_never_writes() {
        let fetcher = ScriptedFetcher::new(vec![
            ScriptedResponse::ok("same\n", None),
            ScriptedResponse::ok("same\n", None),
        ]);
        let meta = InMemoryMetadataStore::new();
        let payloads = InMemoryPayloadStore::new();
        let sync = ResourceSynchronizer::new(&fetcher, &meta, &payloads);
        let resources = datasets(&["a"]);

        let first = run_all(&sync, &resources).await;
        let second = run_all(&sync, &resources).await;

        assert_eq!(first.outcomes[0].state, SyncState::Written);
        assert_eq!(second.outcomes[0].state, SyncState::Deduplicated);
        assert_eq!(payloads.commit_count(), 1);
    }
}
