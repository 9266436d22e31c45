//! Session cookie rewriter.
//!
//! Tooling that talks to the dashboard embeds the session cookie as a
//! quoted `'Cookie': '...'` literal. When the browser session
//! rotates, this module rewrites that literal in each configured file
//! and leaves every other byte untouched.

use std::fmt;
use std::path::{Path, PathBuf};

use regex::{NoExpand, Regex};
use tracing::{info, warn};

use revgate_core::{Error, Result};

/// Matches the embedded cookie literal, including an empty one.
pub const COOKIE_PATTERN: &str = r"'Cookie': '[^']*'";

/// Replaces every cookie literal in `content` with `new_cookie`.
/// Returns `None` when the pattern does not occur, so callers can
/// distinguish "nothing to do" from a successful rewrite.
pub fn rewrite_cookie(content: &str, new_cookie: &str) -> Option<String> {
    let re = Regex::new(COOKIE_PATTERN).unwrap();
    if !re.is_match(content) {
        return None;
    }
    let replacement = format!("'Cookie': '{}'", new_cookie);
    // NoExpand keeps `$` sequences in cookie values literal instead of
    // being treated as capture group references.
    Some(re.replace_all(content, NoExpand(&replacement)).into_owned())
}

/// Per-file result of an update run.
#[derive(Debug)]
pub enum FileOutcome {
    Updated,
    PatternNotFound,
    Failed(Error),
}

impl fmt::Display for FileOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileOutcome::Updated => f.write_str("updated"),
            FileOutcome::PatternNotFound => f.write_str("no cookie literal found"),
            FileOutcome::Failed(e) => write!(f, "failed: {}", e),
        }
    }
}

/// Results across a whole file set.
#[derive(Debug, Default)]
pub struct UpdateSummary {
    pub outcomes: Vec<(PathBuf, FileOutcome)>,
}

impl UpdateSummary {
    pub fn updated(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|(_, outcome)| matches!(outcome, FileOutcome::Updated))
            .count()
    }

    pub fn all_updated(&self) -> bool {
        !self.outcomes.is_empty() && self.updated() == self.outcomes.len()
    }
}

/// Rewrites the embedded cookie in every file, continuing past
/// individual failures so one bad path does not block the rest.
pub async fn update_files(files: &[PathBuf], new_cookie: &str) -> UpdateSummary {
    let mut summary = UpdateSummary::default();
    for path in files {
        let outcome = match update_file(path, new_cookie).await {
            Ok(true) => {
                info!("updated cookie in {}", path.display());
                FileOutcome::Updated
            }
            Ok(false) => {
                warn!("no cookie literal found in {}", path.display());
                FileOutcome::PatternNotFound
            }
            Err(e) => {
                warn!("could not update {}: {}", path.display(), e);
                FileOutcome::Failed(e)
            }
        };
        summary.outcomes.push((path.clone(), outcome));
    }
    summary
}

async fn update_file(path: &Path, new_cookie: &str) -> Result<bool> {
    let content = tokio::fs::read_to_string(path).await?;
    match rewrite_cookie(&content, new_cookie) {
        Some(rewritten) => {
            tokio::fs::write(path, rewritten).await?;
            Ok(true)
        }
        None => Ok(false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn rewrite_changes_only_the_cookie_literal() {
        let head = "headers = {\n    'Accept': '*/*',\n    ";
        let tail = ",\n    'Origin': 'https://cursor.com'\n}\n";
        let content = format!("{}'Cookie': 'SessionToken=old123'{}", head, tail);

        let rewritten = rewrite_cookie(&content, "SessionToken=new456").unwrap();

        assert_eq!(
            rewritten,
            format!("{}'Cookie': 'SessionToken=new456'{}", head, tail)
        );
    }

    #[test]
    fn rewrite_fills_an_empty_literal() {
        let content = "'Cookie': ''";
        assert_eq!(
            rewrite_cookie(content, "abc").as_deref(),
            Some("'Cookie': 'abc'")
        );
    }

    #[test]
    fn rewrite_without_pattern_is_none() {
        assert!(rewrite_cookie("no headers here", "abc").is_none());
    }

    #[test]
    fn dollar_signs_in_cookie_values_stay_literal() {
        let content = "'Cookie': 'old'";
        let rewritten = rewrite_cookie(content, "a$1b$c").unwrap();
        assert_eq!(rewritten, "'Cookie': 'a$1b$c'");
    }

    #[test]
    fn every_occurrence_is_rewritten() {
        let content = "'Cookie': 'one' and 'Cookie': 'two'";
        let rewritten = rewrite_cookie(content, "same").unwrap();
        assert_eq!(rewritten, "'Cookie': 'same' and 'Cookie': 'same'");
    }

    #[tokio::test]
    async fn update_files_reports_mixed_outcomes() {
        let dir = TempDir::new().unwrap();
        let with_cookie = dir.path().join("client.py");
        let without_cookie = dir.path().join("readme.md");
        let missing = dir.path().join("gone.py");
        std::fs::write(&with_cookie, "x = {'Cookie': 'stale'}").unwrap();
        std::fs::write(&without_cookie, "nothing to see").unwrap();

        let files = vec![with_cookie.clone(), without_cookie, missing];
        let summary = update_files(&files, "fresh").await;

        assert_eq!(summary.updated(), 1);
        assert!(!summary.all_updated());
        assert!(matches!(summary.outcomes[0].1, FileOutcome::Updated));
        assert!(matches!(summary.outcomes[1].1, FileOutcome::PatternNotFound));
        assert!(matches!(summary.outcomes[2].1, FileOutcome::Failed(_)));

        let rewritten = std::fs::read_to_string(&with_cookie).unwrap();
        assert_eq!(rewritten, "x = {'Cookie': 'fresh'}");
    }
}
