//! Implements each subcommand against a `QueueStore`, printing
//! human-readable output and translating `SchedulerError` into the process
//! exit code for the process.

use taskgraph_core::{QueueStore, SchedulerError, WorkerStatus};

use crate::cli::{QueueCommand, WorkersCommand};

pub async fn run_queue_command(store: &dyn QueueStore, cmd: QueueCommand) -> Result<(), SchedulerError> {
    match cmd {
        QueueCommand::Stats => {
            let stats = store.get_queue_stats().await?;
            println!("queued:      {}", stats.total_queued);
            println!("processing:  {}", stats.total_processing);
            println!("completed:   {}", stats.total_completed);
            println!("failed:      {}", stats.total_failed);
            println!("cancelled:   {}", stats.total_cancelled);
            if let Some(age) = stats.oldest_queued_age_seconds {
                println!("oldest queued age (s): {age}");
            }
            for (kind, depth) in &stats.depth_by_kind {
                println!("  {kind}: {depth}");
            }
        }
        QueueCommand::Drain { worker_id } => {
            store.set_worker_status(&worker_id, WorkerStatus::Draining).await?;
            let in_flight = store.drain(&worker_id).await?;
            println!("worker {worker_id} draining, {} task(s) in flight", in_flight.len());
            for id in in_flight {
                println!("  task {id}");
            }
        }
        QueueCommand::Retry { task_id } => {
            store.force_retry(task_id).await?;
            println!("task {task_id} requeued");
        }
        QueueCommand::Cancel { target } => {
            if let Ok(task_id) = target.parse::<i64>() {
                store.cancel(task_id).await?;
                println!("task {task_id} cancelled");
            } else if let Ok(pipeline_id) = target.parse::<uuid::Uuid>() {
                let cancelled = store.cancel_pipeline(pipeline_id).await?;
                println!("pipeline {pipeline_id} cancelled, {} task(s) affected", cancelled.len());
            } else {
                return Err(SchedulerError::InvalidArgument(format!(
                    "'{target}' is neither a task id nor a pipeline id"
                )));
            }
        }
        QueueCommand::Inspect { pipeline_id } => {
            let progress = store.get_pipeline_progress(pipeline_id).await?;
            println!("pipeline {pipeline_id}: {}% (terminal: {})", progress.percent, progress.terminal);
            for entry in &progress.per_task {
                println!(
                    "  task {} [{}] {} - {}%",
                    entry.id, entry.kind, entry.status, entry.progress
                );
            }
        }
    }
    Ok(())
}

pub async fn run_workers_command(store: &dyn QueueStore, cmd: WorkersCommand) -> Result<(), SchedulerError> {
    match cmd {
        WorkersCommand::List => {
            let workers = store.list_workers().await?;
            for w in workers {
                println!(
                    "{} [{}] capabilities={:?} max_concurrent={} last_heartbeat={}",
                    w.id, w.status, w.capabilities, w.max_concurrent, w.last_heartbeat_at
                );
            }
        }
        WorkersCommand::Kill { worker_id } => {
            store.set_worker_status(&worker_id, WorkerStatus::Dead).await?;
            println!("worker {worker_id} marked dead; its leases will be reclaimed by recovery");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::QueueCommand;
    use taskgraph_testing::InMemoryQueueStore;

    #[tokio::test]
    async fn cancel_target_accepts_a_task_id() {
        let store = InMemoryQueueStore::default();
        let task_id = store
            .submit_task("ocr", "doc-1", serde_json::json!({}), 0, 3, 1)
            .await
            .unwrap();

        run_queue_command(
            &store,
            QueueCommand::Cancel {
                target: task_id.to_string(),
            },
        )
        .await
        .unwrap();

        let view = store.get_task(task_id).await.unwrap();
        assert_eq!(view.status, taskgraph_core::TaskStatus::Cancelled);
    }

    #[tokio::test]
    async fn cancel_target_accepts_a_pipeline_id() {
        let store = InMemoryQueueStore::default();
        let template = taskgraph_core::PipelineTemplate::pitch_deck_review();
        let pipeline_id = store.submit_pipeline(&template, "doc-2", 0).await.unwrap();

        run_queue_command(
            &store,
            QueueCommand::Cancel {
                target: pipeline_id.to_string(),
            },
        )
        .await
        .unwrap();

        let progress = store.get_pipeline_progress(pipeline_id).await.unwrap();
        assert!(progress
            .per_task
            .iter()
            .all(|t| t.status == taskgraph_core::TaskStatus::Cancelled));
    }

    #[tokio::test]
    async fn cancel_target_rejects_garbage_input() {
        let store = InMemoryQueueStore::default();
        let result = run_queue_command(
            &store,
            QueueCommand::Cancel {
                target: "not-an-id".to_string(),
            },
        )
        .await;
        assert!(matches!(result, Err(SchedulerError::InvalidArgument(_))));
    }
}
