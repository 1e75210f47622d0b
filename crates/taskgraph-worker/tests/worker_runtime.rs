use std::sync::Arc;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use taskgraph_core::{CancelSignal, HandlerError, QueueStore, SchedulerConfig, TaskHandler};
use taskgraph_testing::InMemoryQueueStore;
use taskgraph_worker::{HandlerRegistry, WorkerConfig, WorkerRuntime};
use tokio::sync::watch;

struct EchoHandler;

#[async_trait]
impl TaskHandler for EchoHandler {
    fn kind(&self) -> &str {
        "echo"
    }

    async fn execute(
        &self,
        payload: serde_json::Value,
        _cancel: CancelSignal,
    ) -> Result<serde_json::Value, HandlerError> {
        Ok(payload)
    }
}

#[tokio::test]
async fn worker_runtime_claims_and_completes_a_task() {
    let store: Arc<dyn QueueStore> = Arc::new(InMemoryQueueStore::default());
    let task_id = store
        .submit_task("echo", "doc-1", serde_json::json!({"hello": "world"}), 0, 3, 1)
        .await
        .unwrap();

    let registry = HandlerRegistry::new().register(Arc::new(EchoHandler));
    let mut config = WorkerConfig::from_scheduler_config(
        "worker-test-1",
        registry.capabilities(),
        &SchedulerConfig::default(),
    );
    config.dispatch_idle_sleep_min = StdDuration::from_millis(10);
    config.dispatch_idle_sleep_max = StdDuration::from_millis(20);
    config.shutdown_timeout = StdDuration::from_secs(5);

    let runtime = WorkerRuntime::new(store.clone(), registry, config);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = tokio::spawn(runtime.run(shutdown_rx));

    let mut completed = false;
    for _ in 0..100 {
        let view = store.get_task(task_id).await.unwrap();
        if view.status == taskgraph_core::TaskStatus::Completed {
            completed = true;
            break;
        }
        tokio::time::sleep(StdDuration::from_millis(20)).await;
    }
    assert!(completed, "task did not complete within the test window");

    shutdown_tx.send(true).unwrap();
    tokio::time::timeout(StdDuration::from_secs(5), handle)
        .await
        .expect("worker runtime should shut down promptly")
        .unwrap()
        .unwrap();
}
