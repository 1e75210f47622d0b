//! `InMemoryQueueStore`: a full `QueueStore` implementation backed by a
//! `tokio::sync::Mutex`-guarded map, for exercising the Worker Runtime and
//! Control Surface in tests without a Postgres instance. It applies exactly
//! the same rules the Postgres backend does (staleness checks, cascade
//! cancel, backoff) — it exists to let the rest of the workspace be tested
//! in isolation, not to be a second production backend.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;

use taskgraph_core::{
    aggregate_pipeline_progress, compute_backoff_with_system_jitter, ClaimOutcome, ClaimedTask,
    DependencyEdge, FailOutcome, FailureClassification, Lease, PipelineId, PipelineProgress,
    PipelineTemplate, ProgressRecord, QueueStats, QueueStore, RecoveryReport, Result,
    SchedulerError, SettleOutcome, Task, TaskId, TaskKind, TaskProgressInput, TaskStatus, TaskView,
    WorkerRecord, WorkerStatus,
};

struct State {
    tasks: HashMap<TaskId, Task>,
    deps: Vec<DependencyEdge>,
    progress: HashMap<TaskId, ProgressRecord>,
    workers: HashMap<String, WorkerRecord>,
}

pub struct InMemoryQueueStore {
    state: Mutex<State>,
    next_id: AtomicI64,
    payload_max_bytes: usize,
    backoff_base_seconds: u64,
    backoff_cap_seconds: u64,
    backoff_jitter_fraction: f64,
}

impl Default for InMemoryQueueStore {
    fn default() -> Self {
        let config = taskgraph_core::SchedulerConfig::default();
        Self::new(&config)
    }
}

impl InMemoryQueueStore {
    pub fn new(config: &taskgraph_core::SchedulerConfig) -> Self {
        Self {
            state: Mutex::new(State {
                tasks: HashMap::new(),
                deps: Vec::new(),
                progress: HashMap::new(),
                workers: HashMap::new(),
            }),
            next_id: AtomicI64::new(1),
            payload_max_bytes: config.payload_max_bytes,
            backoff_base_seconds: config.retry_backoff_base_seconds,
            backoff_cap_seconds: config.retry_backoff_cap_seconds,
            backoff_jitter_fraction: config.retry_backoff_jitter_fraction,
        }
    }

    fn alloc_id(&self) -> TaskId {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }
}

fn is_upstream_satisfied(state: &State, task_id: TaskId) -> bool {
    state
        .deps
        .iter()
        .filter(|e| e.downstream_id == task_id)
        .all(|e| {
            state
                .tasks
                .get(&e.upstream_id)
                .map(|t| t.status == TaskStatus::Completed)
                .unwrap_or(false)
        })
}

fn cascade_cancel(state: &mut State, upstream_id: TaskId) -> Vec<TaskId> {
    let mut cancelled = Vec::new();
    let mut frontier = vec![upstream_id];

    while let Some(current) = frontier.pop() {
        let downstream: Vec<TaskId> = state
            .deps
            .iter()
            .filter(|e| e.upstream_id == current)
            .map(|e| e.downstream_id)
            .collect();

        for id in downstream {
            if let Some(task) = state.tasks.get_mut(&id) {
                if !task.status.is_terminal() {
                    task.status = TaskStatus::Cancelled;
                    task.finished_at = Some(Utc::now());
                    task.error = Some(format!("upstream_failed:{current}"));
                    task.lease = None;
                    cancelled.push(id);
                    frontier.push(id);
                }
            }
        }
    }

    cancelled
}

fn to_view(task: &Task, progress: Option<&ProgressRecord>) -> TaskView {
    TaskView {
        id: task.id,
        pipeline_id: task.pipeline_id,
        kind: task.kind.clone(),
        status: task.status,
        retries: task.retries,
        max_retries: task.max_retries,
        priority: task.priority,
        leased_by: task.lease.as_ref().map(|l| l.leased_by.clone()),
        error: task.error.clone(),
        progress_percent: progress.map(|p| p.percent),
        created_at: task.created_at,
        started_at: task.started_at,
        finished_at: task.finished_at,
    }
}

#[async_trait]
impl QueueStore for InMemoryQueueStore {
    async fn submit_pipeline(
        &self,
        template: &PipelineTemplate,
        subject_ref: &str,
        priority: i32,
    ) -> Result<PipelineId> {
        template.validate()?;

        for spec in &template.tasks {
            let size = serde_json::to_vec(&spec.payload).map(|v| v.len()).unwrap_or(0);
            if size > self.payload_max_bytes {
                return Err(SchedulerError::PayloadTooLarge {
                    size,
                    max: self.payload_max_bytes,
                });
            }
        }

        let pipeline_id = uuid::Uuid::new_v4();
        let mut state = self.state.lock().await;
        let mut ids_by_kind = HashMap::with_capacity(template.tasks.len());

        for spec in &template.tasks {
            let id = self.alloc_id();
            let now = Utc::now();
            state.tasks.insert(
                id,
                Task {
                    id,
                    pipeline_id: Some(pipeline_id),
                    kind: spec.kind.clone(),
                    subject_ref: subject_ref.to_string(),
                    priority,
                    status: TaskStatus::Queued,
                    retries: 0,
                    max_retries: spec.max_retries,
                    next_earliest_start: now,
                    lease: None,
                    payload: spec.payload.clone(),
                    result: None,
                    error: None,
                    weight: spec.weight,
                    created_at: now,
                    started_at: None,
                    finished_at: None,
                },
            );
            ids_by_kind.insert(spec.kind.clone(), id);
        }

        for spec in &template.tasks {
            let downstream_id = ids_by_kind[&spec.kind];
            for upstream_kind in &spec.depends_on {
                state.deps.push(DependencyEdge {
                    upstream_id: ids_by_kind[upstream_kind],
                    downstream_id,
                });
            }
        }

        Ok(pipeline_id)
    }

    async fn submit_task(
        &self,
        kind: &str,
        subject_ref: &str,
        payload: serde_json::Value,
        priority: i32,
        max_retries: i32,
        weight: i32,
    ) -> Result<TaskId> {
        let size = serde_json::to_vec(&payload).map(|v| v.len()).unwrap_or(0);
        if size > self.payload_max_bytes {
            return Err(SchedulerError::PayloadTooLarge {
                size,
                max: self.payload_max_bytes,
            });
        }

        let id = self.alloc_id();
        let now = Utc::now();
        let mut state = self.state.lock().await;
        state.tasks.insert(
            id,
            Task {
                id,
                pipeline_id: None,
                kind: kind.to_string(),
                subject_ref: subject_ref.to_string(),
                priority,
                status: TaskStatus::Queued,
                retries: 0,
                max_retries,
                next_earliest_start: now,
                lease: None,
                payload,
                result: None,
                error: None,
                weight,
                created_at: now,
                started_at: None,
                finished_at: None,
            },
        );
        Ok(id)
    }

    async fn claim_next(
        &self,
        worker_id: &str,
        capabilities: &[TaskKind],
        lease_duration: Duration,
    ) -> Result<ClaimOutcome> {
        if capabilities.is_empty() {
            return Ok(ClaimOutcome::None);
        }

        let mut state = self.state.lock().await;
        let now = Utc::now();

        let mut candidates: Vec<TaskId> = state
            .tasks
            .values()
            .filter(|t| {
                t.status == TaskStatus::Queued
                    && capabilities.contains(&t.kind)
                    && t.next_earliest_start <= now
            })
            .map(|t| t.id)
            .filter(|id| is_upstream_satisfied(&state, *id))
            .collect();

        candidates.sort_by_key(|id| {
            let t = &state.tasks[id];
            (std::cmp::Reverse(t.priority), t.created_at, *id)
        });

        let Some(&chosen) = candidates.first() else {
            return Ok(ClaimOutcome::None);
        };

        let task = state.tasks.get_mut(&chosen).unwrap();
        task.status = TaskStatus::Processing;
        task.retries += 0; // attempt reported separately, retries only bump on fail
        let lease_epoch = task.lease.as_ref().map(|l| l.lease_epoch).unwrap_or(0) + 1;
        task.lease = Some(Lease {
            leased_by: worker_id.to_string(),
            lease_expires_at: now + lease_duration,
            lease_epoch,
        });
        if task.started_at.is_none() {
            task.started_at = Some(now);
        }

        Ok(ClaimOutcome::Claimed(ClaimedTask {
            id: task.id,
            pipeline_id: task.pipeline_id,
            kind: task.kind.clone(),
            subject_ref: task.subject_ref.clone(),
            payload: task.payload.clone(),
            attempt: task.retries + 1,
            lease_epoch,
            lease_expires_at: now + lease_duration,
        }))
    }

    async fn extend_lease(
        &self,
        task_id: TaskId,
        worker_id: &str,
        lease_epoch: i64,
        new_duration: Duration,
        progress_percent: Option<i16>,
        progress_step: Option<&str>,
    ) -> Result<SettleOutcome> {
        let mut state = self.state.lock().await;
        let Some(task) = state.tasks.get_mut(&task_id) else {
            return Ok(SettleOutcome::Stale);
        };

        let matches = task.status == TaskStatus::Processing
            && task
                .lease
                .as_ref()
                .is_some_and(|l| l.leased_by == worker_id && l.lease_epoch == lease_epoch);

        if !matches {
            return Ok(SettleOutcome::Stale);
        }

        task.lease.as_mut().unwrap().lease_expires_at = Utc::now() + new_duration;

        if let Some(percent) = progress_percent {
            let clamped = percent.clamp(0, 99);
            state.progress.insert(
                task_id,
                ProgressRecord {
                    task_id,
                    percent: clamped,
                    step: progress_step.map(String::from),
                    updated_at: Utc::now(),
                },
            );
        }

        Ok(SettleOutcome::Ok)
    }

    async fn complete(
        &self,
        task_id: TaskId,
        worker_id: &str,
        lease_epoch: i64,
        result: serde_json::Value,
    ) -> Result<SettleOutcome> {
        let mut state = self.state.lock().await;
        let Some(task) = state.tasks.get_mut(&task_id) else {
            return Ok(SettleOutcome::Stale);
        };

        let matches = task.status == TaskStatus::Processing
            && task
                .lease
                .as_ref()
                .is_some_and(|l| l.leased_by == worker_id && l.lease_epoch == lease_epoch);

        if !matches {
            return Ok(SettleOutcome::Stale);
        }

        task.status = TaskStatus::Completed;
        task.finished_at = Some(Utc::now());
        task.result = Some(result);
        task.lease = None;

        Ok(SettleOutcome::Ok)
    }

    async fn fail(
        &self,
        task_id: TaskId,
        worker_id: &str,
        lease_epoch: i64,
        error: &str,
        classification: FailureClassification,
        now: DateTime<Utc>,
    ) -> Result<FailOutcome> {
        let mut state = self.state.lock().await;
        let Some(task) = state.tasks.get(&task_id) else {
            return Ok(FailOutcome::Stale);
        };

        let matches = task.status == TaskStatus::Processing
            && task
                .lease
                .as_ref()
                .is_some_and(|l| l.leased_by == worker_id && l.lease_epoch == lease_epoch);

        if !matches {
            return Ok(FailOutcome::Stale);
        }

        let retries = task.retries;
        let next_retries = retries + 1;
        let max_retries = task.max_retries;
        let goes_terminal =
            classification == FailureClassification::Permanent || next_retries > max_retries;

        if goes_terminal {
            let task = state.tasks.get_mut(&task_id).unwrap();
            task.status = TaskStatus::Failed;
            task.finished_at = Some(now);
            task.error = Some(error.to_string());
            task.lease = None;
            task.retries = next_retries.min(max_retries);
            cascade_cancel(&mut state, task_id);
            return Ok(FailOutcome::Terminal);
        }

        // The first retry uses 2^0 = base, so `retries` (pre-increment) is the
        // exponent, not `next_retries` — matches S2's observed 1s/2s delays.
        let delay = compute_backoff_with_system_jitter(
            retries,
            self.backoff_base_seconds,
            self.backoff_cap_seconds,
            self.backoff_jitter_fraction,
        );

        let task = state.tasks.get_mut(&task_id).unwrap();
        task.status = TaskStatus::Queued;
        task.retries = next_retries;
        task.next_earliest_start = now + delay;
        task.lease = None;
        task.error = Some(error.to_string());

        Ok(FailOutcome::Retried)
    }

    async fn cancel(&self, task_id: TaskId) -> Result<()> {
        let mut state = self.state.lock().await;
        if let Some(task) = state.tasks.get_mut(&task_id) {
            if !task.status.is_terminal() {
                task.status = TaskStatus::Cancelled;
                task.finished_at = Some(Utc::now());
                task.lease = None;
                cascade_cancel(&mut state, task_id);
            }
        }
        Ok(())
    }

    async fn drain(&self, worker_id: &str) -> Result<Vec<TaskId>> {
        let state = self.state.lock().await;
        Ok(state
            .tasks
            .values()
            .filter(|t| {
                t.status == TaskStatus::Processing
                    && t.lease.as_ref().is_some_and(|l| l.leased_by == worker_id)
            })
            .map(|t| t.id)
            .collect())
    }

    async fn register_worker(
        &self,
        worker_id: &str,
        capabilities: &[TaskKind],
        max_concurrent: i32,
    ) -> Result<()> {
        let mut state = self.state.lock().await;
        let now = Utc::now();
        state
            .workers
            .entry(worker_id.to_string())
            .and_modify(|w| {
                w.capabilities = capabilities.to_vec();
                w.max_concurrent = max_concurrent;
                w.status = WorkerStatus::Active;
                w.last_heartbeat_at = now;
            })
            .or_insert(WorkerRecord {
                id: worker_id.to_string(),
                capabilities: capabilities.to_vec(),
                max_concurrent,
                status: WorkerStatus::Active,
                last_heartbeat_at: now,
                started_at: now,
            });
        Ok(())
    }

    async fn heartbeat(&self, worker_id: &str) -> Result<()> {
        let mut state = self.state.lock().await;
        if let Some(w) = state.workers.get_mut(worker_id) {
            w.last_heartbeat_at = Utc::now();
        }
        Ok(())
    }

    async fn set_worker_status(&self, worker_id: &str, status: WorkerStatus) -> Result<()> {
        let mut state = self.state.lock().await;
        if let Some(w) = state.workers.get_mut(worker_id) {
            w.status = status;
        }
        Ok(())
    }

    async fn expire_own_leases(&self, worker_id: &str) -> Result<u64> {
        let mut state = self.state.lock().await;
        let mut count = 0;
        for task in state.tasks.values_mut() {
            if task.status == TaskStatus::Processing
                && task.lease.as_ref().is_some_and(|l| l.leased_by == worker_id)
            {
                task.status = TaskStatus::Queued;
                task.lease = None;
                task.next_earliest_start = Utc::now();
                count += 1;
            }
        }
        Ok(count)
    }

    async fn get_task(&self, task_id: TaskId) -> Result<TaskView> {
        let state = self.state.lock().await;
        let task = state
            .tasks
            .get(&task_id)
            .ok_or(SchedulerError::NotFound { task_id })?;
        Ok(to_view(task, state.progress.get(&task_id)))
    }

    async fn get_pipeline_progress(&self, pipeline_id: PipelineId) -> Result<PipelineProgress> {
        let state = self.state.lock().await;
        let inputs: Vec<TaskProgressInput> = state
            .tasks
            .values()
            .filter(|t| t.pipeline_id == Some(pipeline_id))
            .map(|t| TaskProgressInput {
                id: t.id,
                kind: t.kind.clone(),
                status: t.status,
                weight: t.weight,
                in_flight_percent: state.progress.get(&t.id).map(|p| p.percent),
            })
            .collect();
        Ok(aggregate_pipeline_progress(&inputs))
    }

    async fn get_queue_stats(&self) -> Result<QueueStats> {
        let state = self.state.lock().await;
        let mut stats = QueueStats {
            total_queued: 0,
            total_processing: 0,
            total_completed: 0,
            total_failed: 0,
            total_cancelled: 0,
            oldest_queued_age_seconds: None,
            depth_by_kind: Vec::new(),
        };
        let mut depth: HashMap<TaskKind, i64> = HashMap::new();
        let mut oldest: Option<DateTime<Utc>> = None;

        for task in state.tasks.values() {
            match task.status {
                TaskStatus::Queued => {
                    stats.total_queued += 1;
                    *depth.entry(task.kind.clone()).or_insert(0) += 1;
                    oldest = Some(oldest.map_or(task.created_at, |o| o.min(task.created_at)));
                }
                TaskStatus::Processing => stats.total_processing += 1,
                TaskStatus::Completed => stats.total_completed += 1,
                TaskStatus::Failed => stats.total_failed += 1,
                TaskStatus::Cancelled => stats.total_cancelled += 1,
            }
        }

        stats.oldest_queued_age_seconds =
            oldest.map(|o| (Utc::now() - o).num_seconds());
        stats.depth_by_kind = depth.into_iter().collect();
        stats.depth_by_kind.sort_by(|a, b| a.0.cmp(&b.0));

        Ok(stats)
    }

    async fn list_workers(&self) -> Result<Vec<WorkerRecord>> {
        let state = self.state.lock().await;
        let mut workers: Vec<WorkerRecord> = state.workers.values().cloned().collect();
        workers.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(workers)
    }

    async fn run_recovery_cycle(&self, death_threshold: Duration) -> Result<RecoveryReport> {
        let mut state = self.state.lock().await;
        let now = Utc::now();

        let mut leases_reclaimed = 0;
        for task in state.tasks.values_mut() {
            if task.status == TaskStatus::Processing
                && task.lease.as_ref().is_some_and(|l| l.lease_expires_at < now)
            {
                task.status = TaskStatus::Queued;
                task.lease = None;
                task.next_earliest_start = now + Duration::seconds(1);
                leases_reclaimed += 1;
            }
        }

        let mut workers_marked_dead = 0;
        for worker in state.workers.values_mut() {
            if worker.status == WorkerStatus::Active
                && now - worker.last_heartbeat_at > death_threshold
            {
                worker.status = WorkerStatus::Dead;
                workers_marked_dead += 1;
            }
        }

        Ok(RecoveryReport {
            leases_reclaimed,
            workers_marked_dead,
        })
    }

    async fn force_retry(&self, task_id: TaskId) -> Result<()> {
        let mut state = self.state.lock().await;
        let task = state
            .tasks
            .get_mut(&task_id)
            .ok_or(SchedulerError::NotFound { task_id })?;

        if task.status != TaskStatus::Failed {
            return Err(SchedulerError::Conflict(format!(
                "task {task_id} is not in a failed state"
            )));
        }

        task.status = TaskStatus::Queued;
        task.lease = None;
        task.next_earliest_start = Utc::now();
        task.error = None;
        Ok(())
    }

    async fn cancel_pipeline(&self, pipeline_id: PipelineId) -> Result<Vec<TaskId>> {
        let mut state = self.state.lock().await;
        let ids: Vec<TaskId> = state
            .tasks
            .values()
            .filter(|t| t.pipeline_id == Some(pipeline_id) && !t.status.is_terminal())
            .map(|t| t.id)
            .collect();

        for &id in &ids {
            let task = state.tasks.get_mut(&id).unwrap();
            task.status = TaskStatus::Cancelled;
            task.finished_at = Some(Utc::now());
            task.lease = None;
        }

        Ok(ids)
    }
}
