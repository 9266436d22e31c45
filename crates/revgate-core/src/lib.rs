//! # revgate-core
//!
//! Core types shared by every Review Gate crate: the error type, the
//! on-disk record schemas for the trigger/response file protocol, the
//! temp-directory path layout, configuration loading, and fail-open
//! helpers for non-critical operations.

pub mod config;
pub mod fail_open;

mod error;
mod paths;
mod records;

pub use error::{Error, Result};
pub use paths::RecordPaths;
pub use records::{
    new_trigger_id, AckRecord, Attachment, ResponseRecord, SpeechResponse, SpeechTrigger,
    SpeechTriggerData, TriggerData, TriggerRecord,
};
