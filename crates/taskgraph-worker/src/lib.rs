//! Worker Runtime: registers with the Queue Store, recovers
//! any leases left behind by a previous incarnation, then runs a heartbeat
//! loop and a bounded dispatch loop side by side until asked to shut down.
//!
//! This crate owns no handler logic — callers build a [`HandlerRegistry`]
//! from their own [`taskgraph_core::TaskHandler`] implementations and hand
//! it, along with a [`taskgraph_core::QueueStore`] and a [`WorkerConfig`],
//! to [`WorkerRuntime::run`].

mod config;
mod dispatch;
mod heartbeat;
mod registry;
mod runtime;

pub use config::WorkerConfig;
pub use registry::HandlerRegistry;
pub use runtime::WorkerRuntime;
