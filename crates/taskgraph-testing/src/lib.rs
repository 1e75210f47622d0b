//! Test-only tooling for taskgraph: an in-memory `QueueStore` for exercising
//! the Worker Runtime and Control Surface without Postgres, used by the
//! unit tests in `taskgraph-worker` and `taskgraph-cli`. Integration tests
//! against the real backend live in `taskgraph-postgres` itself, using
//! `sqlx::test` against the migrations in that crate.

mod in_memory;

pub use in_memory::InMemoryQueueStore;

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use taskgraph_core::{
        ClaimOutcome, FailOutcome, FailureClassification, PipelineTemplate, QueueStore,
        SettleOutcome,
    };

    #[tokio::test]
    async fn claim_then_complete_round_trip() {
        let store = InMemoryQueueStore::default();
        let id = store
            .submit_task("ocr", "doc-1", serde_json::json!({}), 0, 3, 1)
            .await
            .unwrap();

        let ClaimOutcome::Claimed(claimed) = store
            .claim_next("worker-1", &["ocr".to_string()], Duration::seconds(60))
            .await
            .unwrap()
        else {
            panic!("expected a claim");
        };
        assert_eq!(claimed.id, id);

        let outcome = store
            .complete(id, "worker-1", claimed.lease_epoch, serde_json::json!({"ok": true}))
            .await
            .unwrap();
        assert_eq!(outcome, SettleOutcome::Ok);

        let view = store.get_task(id).await.unwrap();
        assert_eq!(view.status, taskgraph_core::TaskStatus::Completed);
    }

    #[tokio::test]
    async fn stale_settle_is_reported_not_silently_accepted() {
        let store = InMemoryQueueStore::default();
        let id = store
            .submit_task("ocr", "doc-1", serde_json::json!({}), 0, 3, 1)
            .await
            .unwrap();
        store
            .claim_next("worker-1", &["ocr".to_string()], Duration::seconds(60))
            .await
            .unwrap();

        // A worker operating on a lease_epoch that no longer matches the
        // current one (e.g. after a reclaim-and-reclaim-again) must be
        // told its result is discarded, not have it silently accepted.
        let outcome = store
            .complete(id, "worker-1", 999, serde_json::json!({}))
            .await
            .unwrap();
        assert_eq!(outcome, SettleOutcome::Stale);
    }

    #[tokio::test]
    async fn terminal_failure_cascades_to_downstream_tasks() {
        let store = InMemoryQueueStore::default();
        let template = PipelineTemplate::pitch_deck_review();
        let pipeline_id = store
            .submit_pipeline(&template, "doc-2", 0)
            .await
            .unwrap();

        let ClaimOutcome::Claimed(root) = store
            .claim_next(
                "worker-1",
                &["visual_analysis".to_string()],
                Duration::seconds(60),
            )
            .await
            .unwrap()
        else {
            panic!("expected visual_analysis to be claimable with no dependencies");
        };

        store
            .fail(
                root.id,
                "worker-1",
                root.lease_epoch,
                "boom",
                FailureClassification::Permanent,
                chrono::Utc::now(),
            )
            .await
            .unwrap();

        let progress = store.get_pipeline_progress(pipeline_id).await.unwrap();
        assert!(progress.partial_failure);
        assert_eq!(progress.percent, 0);
    }

    #[tokio::test]
    async fn retryable_failure_requeues_with_backoff() {
        let store = InMemoryQueueStore::default();
        let id = store
            .submit_task("ocr", "doc-3", serde_json::json!({}), 0, 3, 1)
            .await
            .unwrap();
        let ClaimOutcome::Claimed(claimed) = store
            .claim_next("worker-1", &["ocr".to_string()], Duration::seconds(60))
            .await
            .unwrap()
        else {
            panic!("expected a claim");
        };

        let outcome = store
            .fail(
                claimed.id,
                "worker-1",
                claimed.lease_epoch,
                "transient blip",
                FailureClassification::Transient,
                chrono::Utc::now(),
            )
            .await
            .unwrap();
        assert_eq!(outcome, FailOutcome::Retried);

        let view = store.get_task(id).await.unwrap();
        assert_eq!(view.status, taskgraph_core::TaskStatus::Queued);
        assert_eq!(view.retries, 1);
    }
}
