use chrono::Duration;
use sqlx::PgPool;
use taskgraph_core::{
    ClaimOutcome, FailOutcome, FailureClassification, PipelineTemplate, QueueStore, SettleOutcome,
};
use taskgraph_postgres::PgQueueStore;

fn store(db: PgPool) -> PgQueueStore {
    PgQueueStore::new(db, &taskgraph_core::SchedulerConfig::default())
}

#[sqlx::test(migrations = "./migrations")]
async fn claim_next_returns_none_on_an_empty_queue(db: PgPool) {
    let store = store(db);
    let outcome = store
        .claim_next("worker-1", &["ocr".to_string()], Duration::seconds(60))
        .await
        .unwrap();
    assert!(matches!(outcome, ClaimOutcome::None));
}

#[sqlx::test(migrations = "./migrations")]
async fn two_workers_racing_on_one_task_only_one_wins(db: PgPool) {
    let store = store(db);
    store
        .submit_task("ocr", "doc-1", serde_json::json!({}), 0, 3, 1)
        .await
        .unwrap();

    let (a, b) = tokio::join!(
        store.claim_next("worker-a", &["ocr".to_string()], Duration::seconds(60)),
        store.claim_next("worker-b", &["ocr".to_string()], Duration::seconds(60)),
    );

    let claims = [a.unwrap(), b.unwrap()];
    let claimed_count = claims
        .iter()
        .filter(|c| matches!(c, ClaimOutcome::Claimed(_)))
        .count();
    assert_eq!(claimed_count, 1, "exactly one worker should win the race");
}

#[sqlx::test(migrations = "./migrations")]
async fn extend_lease_with_wrong_epoch_reports_stale(db: PgPool) {
    let store = store(db);
    let task_id = store
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

    let before = store.get_task(task_id).await.unwrap();

    let outcome = store
        .extend_lease(
            task_id,
            "worker-1",
            claimed.lease_epoch + 1,
            Duration::seconds(120),
            None,
            None,
        )
        .await
        .unwrap();
    assert_eq!(outcome, SettleOutcome::Stale);

    let after = store.get_task(task_id).await.unwrap();
    assert_eq!(before.status, after.status);
}

#[sqlx::test(migrations = "./migrations")]
async fn upstream_failure_cascades_to_downstream_and_not_to_siblings(db: PgPool) {
    let store = store(db);
    let template = PipelineTemplate::pitch_deck_review();
    let pipeline_id = store.submit_pipeline(&template, "doc-1", 0).await.unwrap();

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

    let outcome = store
        .fail(
            root.id,
            "worker-1",
            root.lease_epoch,
            "bad input",
            FailureClassification::Permanent,
            chrono::Utc::now(),
        )
        .await
        .unwrap();
    assert_eq!(outcome, FailOutcome::Terminal);

    let progress = store.get_pipeline_progress(pipeline_id).await.unwrap();
    assert!(progress.partial_failure);

    let cancelled: Vec<_> = progress
        .per_task
        .iter()
        .filter(|t| t.status == taskgraph_core::TaskStatus::Cancelled)
        .map(|t| t.kind.clone())
        .collect();
    assert!(cancelled.contains(&"extractions_and_template".to_string()));
    assert!(cancelled.contains(&"specialized_clinical".to_string()));
    assert!(cancelled.contains(&"specialized_regulatory".to_string()));
    assert!(cancelled.contains(&"specialized_science".to_string()));

    // slide_feedback is an independent sibling of visual_analysis; it must
    // not be swept up by the cascade.
    let sibling = progress
        .per_task
        .iter()
        .find(|t| t.kind == "slide_feedback")
        .unwrap();
    assert_eq!(sibling.status, taskgraph_core::TaskStatus::Queued);
}

#[sqlx::test(migrations = "./migrations")]
async fn dependent_task_is_not_dispatched_before_its_upstream_completes(db: PgPool) {
    let store = store(db);
    let template = PipelineTemplate::pitch_deck_review();
    store.submit_pipeline(&template, "doc-2", 0).await.unwrap();

    let outcome = store
        .claim_next(
            "worker-1",
            &["extractions_and_template".to_string()],
            Duration::seconds(60),
        )
        .await
        .unwrap();
    assert!(matches!(outcome, ClaimOutcome::None));
}

#[sqlx::test(migrations = "./migrations")]
async fn transient_failure_retries_until_max_then_completes(db: PgPool) {
    let store = store(db);
    let task_id = store
        .submit_task("ocr", "doc-3", serde_json::json!({}), 0, 2, 1)
        .await
        .unwrap();

    for _ in 0..2 {
        let ClaimOutcome::Claimed(claimed) = store
            .claim_next("worker-1", &["ocr".to_string()], Duration::seconds(60))
            .await
            .unwrap()
        else {
            panic!("expected task to be claimable before max_retries is exhausted");
        };
        let outcome = store
            .fail(
                claimed.id,
                "worker-1",
                claimed.lease_epoch,
                "transient",
                FailureClassification::Transient,
                chrono::Utc::now(),
            )
            .await
            .unwrap();
        assert_eq!(outcome, FailOutcome::Retried);

        sqlx::query("UPDATE tasks SET next_earliest_start = NOW() WHERE id = $1")
            .bind(claimed.id)
            .execute(store.pool())
            .await
            .unwrap();
    }

    let ClaimOutcome::Claimed(claimed) = store
        .claim_next("worker-1", &["ocr".to_string()], Duration::seconds(60))
        .await
        .unwrap()
    else {
        panic!("expected one more claim before exhausting retries");
    };
    store
        .complete(claimed.id, "worker-1", claimed.lease_epoch, serde_json::json!({}))
        .await
        .unwrap();

    let view = store.get_task(task_id).await.unwrap();
    assert_eq!(view.status, taskgraph_core::TaskStatus::Completed);
    assert_eq!(view.retries, 2);
}

#[sqlx::test(migrations = "./migrations")]
async fn submitting_a_cyclic_template_is_rejected_with_no_partial_writes(db: PgPool) {
    use taskgraph_core::TaskSpec;

    let store = store(db);
    let template = PipelineTemplate::new(
        "cyclic",
        vec![
            TaskSpec::new("a").depends_on(["b"]),
            TaskSpec::new("b").depends_on(["a"]),
        ],
    );

    let result = store.submit_pipeline(&template, "doc-4", 0).await;
    assert!(result.is_err());

    let stats = store.get_queue_stats().await.unwrap();
    assert_eq!(stats.total_queued, 0);
}

#[sqlx::test(migrations = "./migrations")]
async fn force_retry_requires_a_failed_task(db: PgPool) {
    let store = store(db);
    let task_id = store
        .submit_task("ocr", "doc-5", serde_json::json!({}), 0, 3, 1)
        .await
        .unwrap();

    let result = store.force_retry(task_id).await;
    assert!(result.is_err());
}

#[sqlx::test(migrations = "./migrations")]
async fn recovery_cycle_reclaims_expired_leases_without_incrementing_retries(db: PgPool) {
    let store = store(db);
    let task_id = store
        .submit_task("ocr", "doc-6", serde_json::json!({}), 0, 3, 1)
        .await
        .unwrap();

    store
        .claim_next("worker-1", &["ocr".to_string()], Duration::seconds(0))
        .await
        .unwrap();

    // Lease duration of 0s means it's already expired by the time recovery runs.
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    let report = store.run_recovery_cycle(Duration::seconds(300)).await.unwrap();
    assert_eq!(report.leases_reclaimed, 1);

    let view = store.get_task(task_id).await.unwrap();
    assert_eq!(view.status, taskgraph_core::TaskStatus::Queued);
    assert_eq!(view.retries, 0);
}
