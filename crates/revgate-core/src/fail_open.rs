//! Fail-open execution for non-critical operations.
//!
//! The bridge treats most side work as best-effort: backup trigger
//! writes, stale file cleanup, VCS lookups for reports. A failure
//! there should be logged and swallowed, never allowed to break the
//! request cycle.
//!
//! # Example
//!
//! ```no_run
//! use revgate_core::fail_open::fail_open;
//!
//! # async fn example() {
//! let removed = fail_open("cleanup stale trigger", || async {
//!     tokio::fs::remove_file("/tmp/trigger.json").await?;
//!     Ok(())
//! })
//! .await;
//!
//! if removed.is_none() {
//!     // Already logged; the request cycle continues regardless.
//! }
//! # }
//! ```

use std::future::Future;

use tracing::warn;

use crate::Result;

/// Runs `operation`, converting failure into `None` plus a warning.
pub async fn fail_open<T, F, Fut>(operation_name: &str, operation: F) -> Option<T>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    match operation().await {
        Ok(value) => Some(value),
        Err(e) => {
            warn!("{} failed (fail-open): {}", operation_name, e);
            None
        }
    }
}
