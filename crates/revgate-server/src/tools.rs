//! Interactive tools exposed over the protocol.
//!
//! Every tool funnels into [`Bridge::request`] with its own response
//! window, mirroring how long a user plausibly takes to react: five
//! minutes for a full review, ninety seconds for a quick check.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::info;

use revgate_bridge::{Bridge, RequestOutcome};
use revgate_core::TriggerData;

const REVIEW_CHAT_TIMEOUT: Duration = Duration::from_secs(300);
const QUICK_REVIEW_TIMEOUT: Duration = Duration::from_secs(90);
const INGEST_TEXT_TIMEOUT: Duration = Duration::from_secs(120);
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(60);

/// Everything a tool may touch while handling a call.
pub struct ToolContext<'a> {
    pub bridge: &'a Bridge,
    pub shutdown: &'a CancellationToken,
}

/// Outcome of a tool call, rendered into a protocol content block by
/// the server loop.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolReply {
    pub text: String,
    pub is_error: bool,
}

impl ToolReply {
    pub fn ok(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_error: false,
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            is_error: true,
        }
    }
}

/// A tool listed by `tools/list` and dispatched by `tools/call`.
#[async_trait]
pub trait ReviewTool: Send + Sync {
    fn name(&self) -> &'static str;

    /// Listing entry advertised to the client, including the input
    /// schema.
    fn describe(&self) -> Value;

    async fn call(&self, cx: &ToolContext<'_>, args: &Value) -> ToolReply;
}

/// All tools in listing order.
pub fn registry() -> Vec<Box<dyn ReviewTool>> {
    vec![
        Box::new(ReviewChat),
        Box::new(QuickReview),
        Box::new(IngestText),
        Box::new(ShutdownServer),
    ]
}

fn str_arg<'a>(args: &'a Value, key: &str) -> Option<&'a str> {
    args.get(key).and_then(Value::as_str)
}

fn bool_arg(args: &Value, key: &str) -> bool {
    args.get(key).and_then(Value::as_bool).unwrap_or(false)
}

/// Formats a bridge outcome into the reply text the agent reads.
fn render_outcome(outcome: &RequestOutcome, timeout: Duration) -> ToolReply {
    match outcome.answer() {
        Some(reply) => {
            let mut text = format!("User response: {}", reply.text);
            if !reply.attachments.is_empty() {
                let names: Vec<&str> = reply
                    .attachments
                    .iter()
                    .map(|a| a.file_name.as_str())
                    .collect();
                text.push_str(&format!(
                    "\n\nAttached files ({}): {}",
                    names.len(),
                    names.join(", ")
                ));
            }
            ToolReply::ok(text)
        }
        None => ToolReply::ok(format!(
            "TIMEOUT: no user response within {} seconds. The review popup may not be open in the editor.",
            timeout.as_secs()
        )),
    }
}

/// Primary review popup. Agents call this before concluding a task so
/// the user can steer follow-up work in the same session.
pub struct ReviewChat;

#[async_trait]
impl ReviewTool for ReviewChat {
    fn name(&self) -> &'static str {
        "review_gate_chat"
    }

    fn describe(&self) -> Value {
        json!({
            "name": self.name(),
            "description": "Open the interactive review popup in the editor and wait for the user's response. Call this before concluding any task so the user can request follow-up work.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "message": { "type": "string", "description": "Prompt shown in the popup" },
                    "title": { "type": "string", "description": "Popup window title" },
                    "context": { "type": "string", "description": "Summary of what was just completed" },
                    "urgent": { "type": "boolean", "description": "Ask the editor to focus the popup immediately" }
                }
            }
        })
    }

    async fn call(&self, cx: &ToolContext<'_>, args: &Value) -> ToolReply {
        let message = str_arg(args, "message").unwrap_or("Please provide your review or feedback:");
        let title = str_arg(args, "title").unwrap_or("Review Gate");
        let data = TriggerData::new(self.name())
            .with_message(message)
            .with_title(title)
            .with_context(str_arg(args, "context").unwrap_or(""))
            .with_urgent(bool_arg(args, "urgent"));

        match cx.bridge.request(data, REVIEW_CHAT_TIMEOUT).await {
            Ok(outcome) => render_outcome(&outcome, REVIEW_CHAT_TIMEOUT),
            Err(e) => ToolReply::error(format!("ERROR: could not open the review popup: {}", e)),
        }
    }
}

/// Shorter popup for yes/no style checks.
pub struct QuickReview;

#[async_trait]
impl ReviewTool for QuickReview {
    fn name(&self) -> &'static str {
        "quick_review"
    }

    fn describe(&self) -> Value {
        json!({
            "name": self.name(),
            "description": "Ask the user for quick feedback with a short response window.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "message": { "type": "string", "description": "Prompt shown in the popup" }
                }
            }
        })
    }

    async fn call(&self, cx: &ToolContext<'_>, args: &Value) -> ToolReply {
        let message = str_arg(args, "message").unwrap_or("Quick review needed:");
        let data = TriggerData::new(self.name())
            .with_message(message)
            .with_title("Quick Review")
            .with_mode("quick");

        match cx.bridge.request(data, QUICK_REVIEW_TIMEOUT).await {
            Ok(outcome) => render_outcome(&outcome, QUICK_REVIEW_TIMEOUT),
            Err(e) => ToolReply::error(format!("ERROR: could not open the review popup: {}", e)),
        }
    }
}

/// Hands a block of text to the user for inspection before the agent
/// acts on it.
pub struct IngestText;

#[async_trait]
impl ReviewTool for IngestText {
    fn name(&self) -> &'static str {
        "ingest_text"
    }

    fn describe(&self) -> Value {
        json!({
            "name": self.name(),
            "description": "Show a block of text in the review popup and wait for the user's verdict on it.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "text_content": { "type": "string", "description": "The text to review" },
                    "source": { "type": "string", "description": "Where the text came from" },
                    "processing_mode": { "type": "string", "description": "What the agent intends to do with it" }
                },
                "required": ["text_content"]
            }
        })
    }

    async fn call(&self, cx: &ToolContext<'_>, args: &Value) -> ToolReply {
        let Some(text_content) = str_arg(args, "text_content") else {
            return ToolReply::error("ERROR: text_content is required");
        };
        let source = str_arg(args, "source").unwrap_or("unknown");
        let processing_mode = str_arg(args, "processing_mode").unwrap_or("analyze");

        let data = TriggerData::new(self.name())
            .with_message(format!(
                "Review {} chars of text from {}:",
                text_content.len(),
                source
            ))
            .with_title("Text Review")
            .with_extra("text_content", json!(text_content))
            .with_extra("source", json!(source))
            .with_extra("processing_mode", json!(processing_mode));

        match cx.bridge.request(data, INGEST_TEXT_TIMEOUT).await {
            Ok(outcome) => render_outcome(&outcome, INGEST_TEXT_TIMEOUT),
            Err(e) => ToolReply::error(format!("ERROR: could not open the review popup: {}", e)),
        }
    }
}

/// Graceful stop with interactive confirmation. The server only goes
/// down when the user answers with an affirmative token, or when the
/// caller explicitly asks for an immediate stop.
pub struct ShutdownServer;

fn confirms_shutdown(answer: &str) -> bool {
    matches!(
        answer.trim().to_uppercase().as_str(),
        "CONFIRM" | "YES" | "Y" | "SHUTDOWN" | "PROCEED"
    )
}

#[async_trait]
impl ReviewTool for ShutdownServer {
    fn name(&self) -> &'static str {
        "shutdown_mcp"
    }

    fn describe(&self) -> Value {
        json!({
            "name": self.name(),
            "description": "Stop the tool server. Asks the user for confirmation unless immediate is set.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "reason": { "type": "string", "description": "Why the server should stop" },
                    "immediate": { "type": "boolean", "description": "Skip the confirmation popup" }
                }
            }
        })
    }

    async fn call(&self, cx: &ToolContext<'_>, args: &Value) -> ToolReply {
        let reason = str_arg(args, "reason").unwrap_or("Agent requested shutdown");

        if bool_arg(args, "immediate") {
            info!("immediate shutdown requested: {}", reason);
            cx.shutdown.cancel();
            return ToolReply::ok("Server shutting down immediately.");
        }

        let data = TriggerData::new(self.name())
            .with_message(format!(
                "Shutdown requested: {}\n\nReply CONFIRM to stop the server, or anything else to keep it running.",
                reason
            ))
            .with_title("Confirm Shutdown")
            .with_urgent(true);

        match cx.bridge.request(data, SHUTDOWN_TIMEOUT).await {
            Ok(outcome) => match outcome.answer() {
                Some(reply) if confirms_shutdown(&reply.text) => {
                    info!("shutdown confirmed by user");
                    cx.shutdown.cancel();
                    ToolReply::ok("Shutdown confirmed. Server stopping.")
                }
                Some(reply) => {
                    info!("shutdown declined by user");
                    ToolReply::ok(format!("Shutdown declined by user: {}", reply.text))
                }
                None => {
                    ToolReply::ok("Shutdown request timed out without confirmation; server stays up.")
                }
            },
            Err(e) => ToolReply::error(format!(
                "ERROR: could not deliver the shutdown confirmation prompt: {}",
                e
            )),
        }
    }
}
