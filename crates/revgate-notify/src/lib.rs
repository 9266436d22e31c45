//! # revgate-notify
//!
//! Delivers work reports to a Telegram chat: Markdown summaries of
//! what an agent just finished, optionally with a screenshot, plus
//! branch and commit context when the project is a git repository.

mod report;
mod telegram;

pub use report::{render, send_report, status_emoji, vcs_info, VcsInfo, WorkReport};
pub use telegram::TelegramClient;
