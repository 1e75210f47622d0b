//! Maps `sqlx::Error` onto `taskgraph_core::SchedulerError` at the crate
//! boundary, so nothing above this crate needs to know which driver is in
//! use.

use taskgraph_core::SchedulerError;

pub(crate) fn db(err: sqlx::Error) -> SchedulerError {
    SchedulerError::Database(anyhow::Error::new(err))
}
