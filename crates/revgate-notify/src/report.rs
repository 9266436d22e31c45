//! Work report rendering and delivery.

use std::path::{Path, PathBuf};

use chrono::Local;
use tracing::{info, warn};

use revgate_core::fail_open::fail_open;
use revgate_core::{Error, Result};

use crate::telegram::TelegramClient;

/// A finished unit of work headed for the notification channel.
#[derive(Debug, Clone)]
pub struct WorkReport {
    pub task: String,
    pub status: String,
    pub details: Option<String>,
    pub project_dir: PathBuf,
}

/// Status marker rendered at the head of the report.
pub fn status_emoji(status: &str) -> &'static str {
    match status.to_lowercase().as_str() {
        "completed" | "success" | "done" => "✅",
        "failed" | "error" => "❌",
        "warning" | "partial" => "⚠️",
        _ => "ℹ️",
    }
}

/// Branch and commit of the project, when it is a git repository.
#[derive(Debug, Clone, Default)]
pub struct VcsInfo {
    pub branch: Option<String>,
    pub commit: Option<String>,
}

/// Reads branch and short commit via gix. Callers wrap this in
/// fail-open; a report is still worth sending without VCS context.
pub fn vcs_info(dir: &Path) -> Result<VcsInfo> {
    let repo = gix::discover(dir)
        .map_err(|e| Error::Vcs(format!("no repository at {}: {}", dir.display(), e)))?;
    let mut head = repo
        .head()
        .map_err(|e| Error::Vcs(format!("failed to read HEAD: {}", e)))?;
    let branch = head.referent_name().map(|name| name.shorten().to_string());
    let commit = head
        .peel_to_commit_in_place()
        .map_err(|e| Error::Vcs(format!("failed to peel HEAD: {}", e)))?
        .id
        .to_hex_with_len(8)
        .to_string();
    Ok(VcsInfo {
        branch,
        commit: Some(commit),
    })
}

/// Renders the Markdown body sent to the chat.
pub fn render(report: &WorkReport, vcs: Option<&VcsInfo>) -> String {
    let project = report
        .project_dir
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| report.project_dir.display().to_string());

    let mut lines = vec![
        format!("{} *Work Report*", status_emoji(&report.status)),
        String::new(),
        format!("*Task:* {}", report.task),
        format!("*Status:* {}", report.status),
        format!("*Time:* {}", Local::now().format("%Y-%m-%d %H:%M:%S")),
        format!("*Project:* {}", project),
        format!("*Path:* `{}`", report.project_dir.display()),
    ];
    if let Some(vcs) = vcs {
        if let Some(branch) = &vcs.branch {
            lines.push(format!("*Branch:* {}", branch));
        }
        if let Some(commit) = &vcs.commit {
            lines.push(format!("*Commit:* `{}`", commit));
        }
    }
    if let Some(details) = &report.details {
        lines.push(String::new());
        lines.push(details.clone());
    }
    lines.join("\n")
}

/// Sends the report, attaching `photo` when given. A failed photo
/// upload degrades to a plain message rather than dropping the report.
pub async fn send_report(
    client: &TelegramClient,
    report: &WorkReport,
    photo: Option<&Path>,
) -> Result<()> {
    let vcs = fail_open("read vcs info", || async {
        vcs_info(&report.project_dir)
    })
    .await;
    let body = render(report, vcs.as_ref());

    if let Some(photo) = photo {
        match client.send_photo(photo, &body).await {
            Ok(()) => {
                info!("work report delivered with screenshot");
                return Ok(());
            }
            Err(e) => warn!("photo delivery failed, sending text only: {}", e),
        }
    }
    client.send_message(&body).await?;
    info!("work report delivered");
    Ok(())
}
