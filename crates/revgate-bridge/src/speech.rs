//! Background watcher for speech-to-text triggers.
//!
//! The editor drops `speech_trigger_{id}.json` files when the user
//! records audio. This loop runs independently of the request cycle,
//! scanning on its own interval and answering each trigger with a
//! `speech_response_{id}.json`, so a pending review request never
//! blocks transcription.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use revgate_core::config::BridgeSettings;
use revgate_core::fail_open::fail_open;
use revgate_core::{Error, RecordPaths, Result, SpeechResponse, SpeechTrigger};

/// Wire value the editor puts in speech trigger payloads.
const SPEECH_TOOL: &str = "speech_to_text";

/// Converts recorded audio into text.
///
/// No backend ships with the bridge; embedders plug one in via
/// [`SpeechWatcher::with_transcriber`]. The default refuses every
/// request so the editor can surface the missing capability instead
/// of hanging.
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Short backend name recorded in the response `source` field.
    fn name(&self) -> &str;

    async fn transcribe(&self, audio: &Path) -> Result<String>;
}

/// Placeholder backend used when no transcriber is configured.
pub struct UnavailableTranscriber;

#[async_trait]
impl Transcriber for UnavailableTranscriber {
    fn name(&self) -> &str {
        "unavailable"
    }

    async fn transcribe(&self, _audio: &Path) -> Result<String> {
        Err(Error::Other(
            "no transcription backend configured".to_string(),
        ))
    }
}

/// Polls the record directory for speech triggers and answers each
/// one, successfully or not, so the editor never waits forever.
pub struct SpeechWatcher {
    paths: RecordPaths,
    interval: Duration,
    transcriber: Arc<dyn Transcriber>,
}

impl SpeechWatcher {
    pub fn new(settings: &BridgeSettings) -> Self {
        Self {
            paths: settings.record_paths(),
            interval: settings.speech_poll_interval(),
            transcriber: Arc::new(UnavailableTranscriber),
        }
    }

    pub fn with_transcriber(mut self, transcriber: Arc<dyn Transcriber>) -> Self {
        self.transcriber = transcriber;
        self
    }

    /// Runs until `cancel` fires. A failed scan cycle is logged and
    /// the next tick proceeds normally.
    pub async fn run(self, cancel: CancellationToken) {
        info!(
            "speech watcher started ({}ms interval, backend {})",
            self.interval.as_millis(),
            self.transcriber.name()
        );
        let mut ticker = tokio::time::interval(self.interval);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.scan_once().await {
                        warn!("speech scan failed: {}", e);
                    }
                }
            }
        }
        info!("speech watcher stopped");
    }

    /// One scan pass over the trigger pattern. Returns the number of
    /// triggers handled.
    async fn scan_once(&self) -> Result<usize> {
        let pattern = self.paths.speech_trigger_pattern();
        let entries = glob::glob(&pattern)
            .map_err(|e| Error::Other(format!("bad speech trigger pattern: {}", e)))?;

        let mut handled = 0;
        for entry in entries {
            let path = match entry {
                Ok(path) => path,
                Err(e) => {
                    warn!("unreadable entry during speech scan: {}", e);
                    continue;
                }
            };
            match self.handle_trigger(&path).await {
                Ok(()) => handled += 1,
                Err(e) => warn!("speech trigger {} failed: {}", path.display(), e),
            }
        }
        Ok(handled)
    }

    async fn handle_trigger(&self, path: &Path) -> Result<()> {
        let content = tokio::fs::read_to_string(path).await?;
        let trigger: SpeechTrigger = match serde_json::from_str(&content) {
            Ok(trigger) => trigger,
            Err(e) => {
                // Removed rather than skipped: a file that never parses
                // would otherwise be rescanned every cycle forever.
                warn!("malformed speech trigger {}: {}", path.display(), e);
                tokio::fs::remove_file(path).await?;
                return Ok(());
            }
        };

        if trigger.data.tool != SPEECH_TOOL {
            warn!(
                "{} carries tool {:?}, not a speech trigger, removing",
                path.display(),
                trigger.data.tool
            );
            tokio::fs::remove_file(path).await?;
            return Ok(());
        }

        let trigger_id = trigger.data.trigger_id.clone();
        debug!("[{}] speech trigger picked up", trigger_id);

        let response = match &trigger.data.audio_file {
            Some(audio) => {
                let audio_path = PathBuf::from(audio);
                match self.transcriber.transcribe(&audio_path).await {
                    Ok(text) => {
                        info!("[{}] transcribed {} chars", trigger_id, text.len());
                        SpeechResponse::transcribed(&trigger_id, text, self.transcriber.name())
                    }
                    Err(e) => {
                        warn!("[{}] transcription failed: {}", trigger_id, e);
                        SpeechResponse::failed(&trigger_id, e.to_string(), self.transcriber.name())
                    }
                }
            }
            None => SpeechResponse::failed(
                &trigger_id,
                "trigger carries no audio file".to_string(),
                self.transcriber.name(),
            ),
        };

        let response_path = self.paths.speech_response(&trigger_id);
        tokio::fs::write(&response_path, serde_json::to_string_pretty(&response)?).await?;

        tokio::fs::remove_file(path).await?;

        // The audio is only discarded once its text has been captured;
        // a failed transcription leaves it on disk for retry by hand.
        if response.success {
            if let Some(audio) = &trigger.data.audio_file {
                let audio_path = PathBuf::from(audio);
                fail_open("remove transcribed audio", || async {
                    tokio::fs::remove_file(&audio_path).await?;
                    Ok(())
                })
                .await;
            }
        }
        Ok(())
    }
}
