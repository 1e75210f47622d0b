//! Recent-event feed for operator tooling and log forwarders.
//!
//! This is strictly a read-side convenience: nothing in `taskgraph-postgres`
//! or `taskgraph-worker` consults it to make a scheduling decision. The
//! durable audit trail is the `task_events` table, written transactionally
//! alongside every state change; `TaskEventFeed` is a bounded, in-memory
//! mirror of the same events, kept around only so a CLI or sidecar can
//! `tail` recent activity without polling Postgres.

use std::collections::VecDeque;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use taskgraph_core::TaskId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum FeedEventKind {
    Submitted,
    Claimed,
    Completed,
    Failed,
    RetryScheduled,
    Cancelled,
    LeaseReclaimed,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct FeedEvent {
    pub task_id: TaskId,
    pub kind: FeedEventKind,
    pub worker_id: Option<String>,
    pub detail: Option<String>,
    pub at: DateTime<Utc>,
}

/// A bounded recent-event tap. `capacity` caps the global feed; per-task
/// history is unbounded for the lifetime of the process, since a pipeline's
/// task count is already bounded by its template.
pub struct TaskEventFeed {
    capacity: usize,
    recent: Mutex<VecDeque<FeedEvent>>,
    by_task: DashMap<TaskId, Vec<FeedEvent>>,
}

impl TaskEventFeed {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            recent: Mutex::new(VecDeque::with_capacity(capacity)),
            by_task: DashMap::new(),
        }
    }

    pub fn record(&self, event: FeedEvent) {
        self.by_task
            .entry(event.task_id)
            .or_default()
            .push(event.clone());

        let mut recent = self.recent.lock().expect("feed mutex poisoned");
        if recent.len() == self.capacity {
            recent.pop_front();
        }
        recent.push_back(event);
    }

    /// Most recent events across all tasks, newest last, capped at `limit`.
    pub fn recent(&self, limit: usize) -> Vec<FeedEvent> {
        let recent = self.recent.lock().expect("feed mutex poisoned");
        recent.iter().rev().take(limit).rev().cloned().collect()
    }

    pub fn for_task(&self, task_id: TaskId) -> Vec<FeedEvent> {
        self.by_task
            .get(&task_id)
            .map(|entries| entries.clone())
            .unwrap_or_default()
    }
}

impl Default for TaskEventFeed {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(task_id: TaskId, kind: FeedEventKind) -> FeedEvent {
        FeedEvent {
            task_id,
            kind,
            worker_id: None,
            detail: None,
            at: Utc::now(),
        }
    }

    #[test]
    fn caps_the_global_feed_at_capacity() {
        let feed = TaskEventFeed::new(3);
        for i in 0..5 {
            feed.record(event(i, FeedEventKind::Submitted));
        }
        let recent = feed.recent(10);
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0].task_id, 2);
        assert_eq!(recent[2].task_id, 4);
    }

    #[test]
    fn tracks_per_task_history_independent_of_capacity() {
        let feed = TaskEventFeed::new(1);
        feed.record(event(7, FeedEventKind::Submitted));
        feed.record(event(7, FeedEventKind::Claimed));
        feed.record(event(7, FeedEventKind::Completed));

        let history = feed.for_task(7);
        assert_eq!(history.len(), 3);
        assert_eq!(history[2].kind, FeedEventKind::Completed);
    }

    #[test]
    fn unknown_task_returns_empty_history() {
        let feed = TaskEventFeed::default();
        assert!(feed.for_task(999).is_empty());
    }
}
