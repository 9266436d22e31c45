//! # revgate-dashboard
//!
//! Client for the account dashboard's private usage-limit endpoints,
//! plus the rewriter that keeps embedded session cookies in sync when
//! the browser session rotates.

mod cookie;
mod limit;

pub use cookie::{rewrite_cookie, update_files, FileOutcome, UpdateSummary, COOKIE_PATTERN};
pub use limit::{classify, LimitClient, LimitOutcome, LimitRequest, LimitState};
