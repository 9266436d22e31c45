//! # revgate-server
//!
//! Line-delimited JSON-RPC server speaking the editor tool protocol
//! over stdin/stdout. stdout carries protocol frames only; every log
//! line goes to stderr or the shared log file, since a stray print
//! would corrupt the stream.

pub mod rpc;

mod server;
mod tools;

pub use server::Server;
pub use tools::{registry, ReviewTool, ToolContext, ToolReply};
