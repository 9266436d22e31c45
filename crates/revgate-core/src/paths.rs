//! Path layout for the shared temp-directory protocol.

use std::path::{Path, PathBuf};

/// Computes the well-known file locations both sides of the bridge
/// agree on. All records live flat in one directory.
#[derive(Debug, Clone)]
pub struct RecordPaths {
    dir: PathBuf,
}

impl RecordPaths {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Layout rooted at the OS temp directory, the default deployment.
    pub fn system_temp() -> Self {
        Self::new(std::env::temp_dir())
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Primary trigger location watched by the editor extension.
    pub fn trigger(&self) -> PathBuf {
        self.dir.join("trigger.json")
    }

    /// Numbered backup trigger, written alongside the primary for
    /// editor watchers that miss the main file.
    pub fn backup_trigger(&self, index: usize) -> PathBuf {
        self.dir.join(format!("trigger_{}.json", index))
    }

    pub fn ack(&self, trigger_id: &str) -> PathBuf {
        self.dir.join(format!("ack_{}.json", trigger_id))
    }

    pub fn response_for(&self, trigger_id: &str) -> PathBuf {
        self.dir.join(format!("response_{}.json", trigger_id))
    }

    /// Generic response location used by older editor components that
    /// do not echo the trigger id back in the file name.
    pub fn generic_response(&self) -> PathBuf {
        self.dir.join("response.json")
    }

    /// Response locations checked each poll cycle, in priority order:
    /// the id-specific file first, then the generic fallback.
    pub fn response_candidates(&self, trigger_id: &str) -> [PathBuf; 2] {
        [self.response_for(trigger_id), self.generic_response()]
    }

    /// Glob pattern matching speech triggers dropped by the editor.
    pub fn speech_trigger_pattern(&self) -> String {
        self.dir
            .join("speech_trigger_*.json")
            .to_string_lossy()
            .into_owned()
    }

    pub fn speech_response(&self, trigger_id: &str) -> PathBuf {
        self.dir.join(format!("speech_response_{}.json", trigger_id))
    }

    /// Server log file, kept next to the records so one directory
    /// holds everything needed to debug a session.
    pub fn log_file(&self) -> PathBuf {
        self.dir.join("revgate.log")
    }
}
