use std::path::PathBuf;

use time::macros::format_description;
use time::{OffsetDateTime, UtcOffset};

pub const DEFAULT_ERROR_LOG_NAME: &str = "kv-sync-errors.md";

/// Messages collected across a bulk pass, flushed as one log entry.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ErrorBatch {
    messages: Vec<String>,
}

impl ErrorBatch {
    pub fn push(&mut self, message: impl Into<String>) {
        self.messages.push(message.into());
    }

    pub fn extend(&mut self, messages: impl IntoIterator<Item = String>) {
        self.messages.extend(messages);
    }

    pub fn messages(&self) -> &[String] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

/// Append-only Markdown log of sync failures.
#[derive(Debug, Clone)]
pub struct ErrorLog {
    path: PathBuf,
}

impl ErrorLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Immediate mode: one timestamped entry for this call.
    pub async fn record(&self, messages: &[String]) {
        self.write_or_fallback(OffsetDateTime::now_utc(), messages)
            .await;
    }

    /// Batched mode: one entry holding every message of the pass, in order.
    pub async fn flush(&self, batch: ErrorBatch) {
        self.write_or_fallback(OffsetDateTime::now_utc(), &batch.messages)
            .await;
    }

    pub async fn append_at(
        &self,
        at: OffsetDateTime,
        messages: &[String],
    ) -> Result<(), std::io::Error> {
        if messages.is_empty() {
            return Ok(());
        }
        let existing = match tokio::fs::read_to_string(&self.path).await {
            Ok(existing) => existing,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => String::new(),
            Err(err) => return Err(err),
        };
        let mut out = existing;
        if !out.is_empty() {
            if !out.ends_with('\n') {
                out.push('\n');
            }
            out.push('\n');
        }
        out.push_str(&format_entry(at, messages));
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&self.path, out).await
    }

    async fn write_or_fallback(&self, at: OffsetDateTime, messages: &[String]) {
        if let Err(err) = self.append_at(at, messages).await {
            tracing::error!(
                path = %self.path.display(),
                error = %err,
                ?messages,
                "failed to write sync error log"
            );
        }
    }
}

pub fn format_entry(at: OffsetDateTime, messages: &[String]) -> String {
    let mut entry = format!("## {}\n", format_timestamp(at));
    for message in messages {
        entry.push_str("- ");
        entry.push_str(&single_line(message));
        entry.push('\n');
    }
    entry
}

/// Folds a multi-line provider reason into one bullet line.
fn single_line(message: &str) -> String {
    message
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn format_timestamp(at: OffsetDateTime) -> String {
    let at = at.to_offset(UtcOffset::UTC);
    let format = format_description!("[year]-[month]-[day] [hour]:[minute]:[second] UTC");
    at.format(format).unwrap_or_else(|_| at.to_string())
}
