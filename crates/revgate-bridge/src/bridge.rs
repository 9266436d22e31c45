//! The trigger/response request cycle.
//!
//! One request moves through a fixed set of phases:
//!
//! ```text
//! Created -> AwaitingAck -> AwaitingResponse -> Resolved
//!                |                   |
//!                v                   v
//!            AckTimeout       ResponseTimeout
//! ```
//!
//! A missed acknowledgement is non-fatal: the extension sometimes
//! answers without ever writing the ack record, so the cycle proceeds
//! to response polling either way. Only a failed trigger write aborts
//! the request.

use std::fmt;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use revgate_core::config::BridgeSettings;
use revgate_core::fail_open::fail_open;
use revgate_core::{
    AckRecord, Attachment, Error, RecordPaths, ResponseRecord, Result, TriggerData, TriggerRecord,
};

/// Lifecycle phase of a single request, logged on every transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Created,
    AwaitingAck,
    AckTimeout,
    AwaitingResponse,
    Resolved,
    ResponseTimeout,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Created => "created",
            Phase::AwaitingAck => "awaiting_ack",
            Phase::AckTimeout => "ack_timeout",
            Phase::AwaitingResponse => "awaiting_response",
            Phase::Resolved => "resolved",
            Phase::ResponseTimeout => "response_timeout",
        };
        f.write_str(name)
    }
}

/// Answer text plus any files the user attached.
#[derive(Debug, Clone, PartialEq)]
pub struct UserReply {
    pub text: String,
    pub attachments: Vec<Attachment>,
}

/// Terminal state of the response phase.
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Answered(UserReply),
    TimedOut,
}

/// Result of one full request cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestOutcome {
    pub trigger_id: String,
    /// Whether the editor acknowledged the trigger. An answer can
    /// arrive even when this is false.
    pub acknowledged: bool,
    pub reply: Reply,
}

impl RequestOutcome {
    pub fn answer(&self) -> Option<&UserReply> {
        match &self.reply {
            Reply::Answered(reply) => Some(reply),
            Reply::TimedOut => None,
        }
    }
}

/// Drives trigger delivery and response collection over the shared
/// temp directory.
pub struct Bridge {
    paths: RecordPaths,
    settings: BridgeSettings,
}

impl Bridge {
    pub fn new(settings: BridgeSettings) -> Self {
        let paths = settings.record_paths();
        Self { paths, settings }
    }

    pub fn paths(&self) -> &RecordPaths {
        &self.paths
    }

    /// Issues one trigger and waits up to `response_timeout` for the
    /// user's answer.
    ///
    /// The acknowledgement phase runs on its own budget
    /// ([`BridgeSettings::ack_timeout`]) and its expiry is non-fatal.
    /// The deadline is evaluated before the first poll, so a zero or
    /// already-elapsed `response_timeout` returns without blocking or
    /// consuming any file.
    pub async fn request(
        &self,
        data: TriggerData,
        response_timeout: Duration,
    ) -> Result<RequestOutcome> {
        let record = TriggerRecord::new(data);
        let trigger_id = record.data.trigger_id.clone();
        let payload = serde_json::to_string_pretty(&record)?;

        debug!("[{}] phase {}", trigger_id, Phase::Created);
        self.write_trigger(&trigger_id, &payload).await?;
        self.write_backup_triggers(&payload).await;
        info!(
            "[{}] trigger written for tool {}",
            trigger_id, record.data.tool
        );

        debug!("[{}] phase {}", trigger_id, Phase::AwaitingAck);
        let acknowledged = self.await_ack(&trigger_id).await;
        if !acknowledged {
            debug!("[{}] phase {}", trigger_id, Phase::AckTimeout);
            warn!(
                "[{}] no acknowledgement within {:?}, waiting for a response anyway",
                trigger_id,
                self.settings.ack_timeout()
            );
        }

        debug!("[{}] phase {}", trigger_id, Phase::AwaitingResponse);
        let reply = self.await_response(&trigger_id, response_timeout).await;
        match &reply {
            Reply::Answered(answer) => info!(
                "[{}] phase {} ({} chars, {} attachments)",
                trigger_id,
                Phase::Resolved,
                answer.text.len(),
                answer.attachments.len()
            ),
            Reply::TimedOut => warn!("[{}] phase {}", trigger_id, Phase::ResponseTimeout),
        }

        Ok(RequestOutcome {
            trigger_id,
            acknowledged,
            reply,
        })
    }

    /// Writes the primary trigger and reads it back to confirm it
    /// landed intact. Failure here is fatal to the request, unlike
    /// every later phase.
    async fn write_trigger(&self, trigger_id: &str, payload: &str) -> Result<()> {
        let path = self.paths.trigger();
        tokio::fs::write(&path, payload)
            .await
            .map_err(|e| Error::Trigger(format!("failed to write {}: {}", path.display(), e)))?;

        let written = match tokio::fs::read_to_string(&path).await {
            Ok(written) => written,
            // A fast extension may consume the trigger before the
            // read-back lands; that counts as delivered.
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("[{}] trigger consumed before verification", trigger_id);
                return Ok(());
            }
            Err(e) => {
                return Err(Error::Trigger(format!(
                    "failed to read back {}: {}",
                    path.display(),
                    e
                )))
            }
        };
        let parsed: TriggerRecord = serde_json::from_str(&written)
            .map_err(|e| Error::Trigger(format!("trigger verification failed: {}", e)))?;
        if parsed.data.trigger_id != trigger_id {
            return Err(Error::Trigger(format!(
                "trigger verification found foreign id {}",
                parsed.data.trigger_id
            )));
        }
        Ok(())
    }

    /// Redundant copies for editor watchers that miss the primary
    /// file. Best-effort; a failed backup never fails the request.
    async fn write_backup_triggers(&self, payload: &str) {
        for index in 0..self.settings.backup_trigger_count {
            let path = self.paths.backup_trigger(index);
            fail_open("write backup trigger", || async {
                tokio::fs::write(&path, payload).await?;
                Ok(())
            })
            .await;
        }
    }

    /// Polls for the acknowledgement record. The extension may write
    /// `acknowledged: false` while its UI spins up; the record is
    /// consumed either way and polling continues until the deadline.
    async fn await_ack(&self, trigger_id: &str) -> bool {
        let path = self.paths.ack(trigger_id);
        let deadline = Instant::now() + self.settings.ack_timeout();
        loop {
            if Instant::now() >= deadline {
                return false;
            }
            match tokio::fs::read_to_string(&path).await {
                Ok(content) => {
                    let acknowledged = match serde_json::from_str::<AckRecord>(&content) {
                        Ok(ack) => ack.acknowledged,
                        Err(e) => {
                            warn!("[{}] malformed ack record, discarding: {}", trigger_id, e);
                            false
                        }
                    };
                    fail_open("remove ack record", || async {
                        tokio::fs::remove_file(&path).await?;
                        Ok(())
                    })
                    .await;
                    if acknowledged {
                        debug!("[{}] acknowledged by extension", trigger_id);
                        return true;
                    }
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!("[{}] ack poll read error: {}", trigger_id, e),
            }
            tokio::time::sleep(self.settings.ack_poll_interval()).await;
        }
    }

    /// Polls the response candidates until the deadline. Responses
    /// addressed to other trigger ids are left in place for their
    /// owner; unparseable content is skipped so a later rewrite can
    /// supersede it.
    async fn await_response(&self, trigger_id: &str, timeout: Duration) -> Reply {
        let candidates = self.paths.response_candidates(trigger_id);
        let deadline = Instant::now() + timeout;
        loop {
            if Instant::now() >= deadline {
                return Reply::TimedOut;
            }
            for path in &candidates {
                let content = match tokio::fs::read_to_string(path).await {
                    Ok(content) => content,
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                    Err(e) => {
                        warn!(
                            "[{}] response poll read error on {}: {}",
                            trigger_id,
                            path.display(),
                            e
                        );
                        continue;
                    }
                };
                match parse_response(&content, trigger_id) {
                    Parsed::Reply(reply) => {
                        // Consumed on read: deleted before the answer is
                        // handed back, so it cannot be returned twice.
                        fail_open("remove response record", || async {
                            tokio::fs::remove_file(path).await?;
                            Ok(())
                        })
                        .await;
                        return Reply::Answered(reply);
                    }
                    Parsed::ForeignId => {
                        debug!(
                            "[{}] {} belongs to another request, leaving it",
                            trigger_id,
                            path.display()
                        );
                    }
                    Parsed::NoAnswer => {
                        debug!(
                            "[{}] {} has no answer field yet",
                            trigger_id,
                            path.display()
                        );
                    }
                    Parsed::Malformed(reason) => {
                        warn!(
                            "[{}] unparseable response in {}: {}",
                            trigger_id,
                            path.display(),
                            reason
                        );
                    }
                    Parsed::Incomplete => {}
                }
            }
            tokio::time::sleep(self.settings.response_poll_interval()).await;
        }
    }
}

enum Parsed {
    Reply(UserReply),
    ForeignId,
    NoAnswer,
    Malformed(String),
    Incomplete,
}

/// Interprets raw response file content.
///
/// Brace-prefixed content must parse as a response record; anything
/// else is taken as plain text typed straight into the file. Empty
/// content is treated as a file still being written.
fn parse_response(content: &str, trigger_id: &str) -> Parsed {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        return Parsed::Incomplete;
    }
    if trimmed.starts_with('{') {
        let record: ResponseRecord = match serde_json::from_str(trimmed) {
            Ok(record) => record,
            Err(e) => return Parsed::Malformed(e.to_string()),
        };
        if !record.matches(trigger_id) {
            return Parsed::ForeignId;
        }
        let answer = record.answer().map(str::to_string);
        match answer {
            Some(text) => Parsed::Reply(UserReply {
                text,
                attachments: record.attachments,
            }),
            None => Parsed::NoAnswer,
        }
    } else {
        Parsed::Reply(UserReply {
            text: trimmed.to_string(),
            attachments: Vec::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_response_with_matching_id_is_a_reply() {
        let content = r#"{"user_input": "hello", "trigger_id": "t1"}"#;
        match parse_response(content, "t1") {
            Parsed::Reply(reply) => {
                assert_eq!(reply.text, "hello");
                assert!(reply.attachments.is_empty());
            }
            _ => panic!("expected a reply"),
        }
    }

    #[test]
    fn json_response_without_id_is_generic() {
        let content = r#"{"message": "take it"}"#;
        assert!(matches!(parse_response(content, "t1"), Parsed::Reply(_)));
    }

    #[test]
    fn json_response_for_another_request_is_left_alone() {
        let content = r#"{"user_input": "hi", "trigger_id": "t2"}"#;
        assert!(matches!(parse_response(content, "t1"), Parsed::ForeignId));
    }

    #[test]
    fn answer_fallback_order_is_user_input_response_message() {
        let content = r#"{"response": "b", "message": "c", "trigger_id": "t1"}"#;
        match parse_response(content, "t1") {
            Parsed::Reply(reply) => assert_eq!(reply.text, "b"),
            _ => panic!("expected a reply"),
        }
    }

    #[test]
    fn brace_prefixed_garbage_is_malformed_not_plaintext() {
        let content = "{definitely not json";
        assert!(matches!(
            parse_response(content, "t1"),
            Parsed::Malformed(_)
        ));
    }

    #[test]
    fn valid_json_without_answer_field_is_not_consumed() {
        let content = r#"{"trigger_id": "t1", "event": "TYPING"}"#;
        assert!(matches!(parse_response(content, "t1"), Parsed::NoAnswer));
    }

    #[test]
    fn plain_text_is_the_whole_answer() {
        match parse_response("  typed straight in\n", "t1") {
            Parsed::Reply(reply) => assert_eq!(reply.text, "typed straight in"),
            _ => panic!("expected a reply"),
        }
    }

    #[test]
    fn empty_content_is_incomplete() {
        assert!(matches!(parse_response("", "t1"), Parsed::Incomplete));
        assert!(matches!(parse_response("  \n", "t1"), Parsed::Incomplete));
    }

    #[test]
    fn attachments_survive_extraction() {
        let content = r#"{
            "user_input": "see image",
            "trigger_id": "t1",
            "attachments": [{"fileName": "a.png", "mimeType": "image/png", "base64Data": "eA=="}]
        }"#;
        match parse_response(content, "t1") {
            Parsed::Reply(reply) => {
                assert_eq!(reply.attachments.len(), 1);
                assert_eq!(reply.attachments[0].file_name, "a.png");
            }
            _ => panic!("expected a reply"),
        }
    }
}
