//! # revgate-bridge
//!
//! File-based bridge between an agent process and the editor
//! extension. The agent writes trigger records into a shared temp
//! directory, the extension acknowledges and eventually writes a
//! response, and every record is deleted by its reader once consumed.
//!
//! [`Bridge::request`] drives one full cycle; [`SpeechWatcher`] is the
//! independent background loop answering speech-to-text triggers.

mod bridge;
mod speech;

pub use bridge::{Bridge, Phase, Reply, RequestOutcome, UserReply};
pub use speech::{SpeechWatcher, Transcriber, UnavailableTranscriber};
