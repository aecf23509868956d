//! Outbox channel: appends each message as one JSON line to a file.
//!
//! Another process (a mail relay, a ticketing bridge) is expected to drain
//! the outbox.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::Utc;
use serde::Serialize;

use super::{ChannelError, NotificationChannel};

#[derive(Serialize)]
struct OutboxLine<'a> {
    ts: String,
    from: &'a str,
    to: &'a [String],
    subject: &'a str,
    body: &'a str,
}

#[derive(Debug)]
pub struct OutboxChannel {
    path: PathBuf,
    sender: String,
    // Serializes appends from concurrent dispatch workers.
    write_lock: Mutex<()>,
}

impl OutboxChannel {
    pub fn new(path: impl AsRef<Path>, sender: &str) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            sender: sender.to_string(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl NotificationChannel for OutboxChannel {
    fn name(&self) -> &str {
        "outbox"
    }

    fn send(&self, recipients: &[String], subject: &str, body: &str) -> Result<(), ChannelError> {
        let line = OutboxLine {
            ts: Utc::now().to_rfc3339(),
            from: &self.sender,
            to: recipients,
            subject,
            body,
        };
        let mut json = serde_json::to_string(&line)
            .map_err(|e| ChannelError::Transport(format!("cannot encode outbox line: {}", e)))?;
        json.push('\n');

        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| ChannelError::Transport("outbox lock poisoned".to_string()))?;
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(json.as_bytes())?;
        file.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn appends_one_line_per_message() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out").join("alerts.jsonl");
        let channel = OutboxChannel::new(&path, "mlr@example.com");
        let to = vec!["a@example.com".to_string(), "b@example.com".to_string()];

        channel.send(&to, "first", "body 1").unwrap();
        channel.send(&to, "second", "body 2\nwith newline").unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<serde_json::Value> = content
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["subject"], "first");
        assert_eq!(lines[0]["from"], "mlr@example.com");
        assert_eq!(lines[1]["to"][1], "b@example.com");
        assert_eq!(lines[1]["body"], "body 2\nwith newline");
    }

    #[test]
    fn unwritable_path_is_an_error() {
        let dir = tempdir().unwrap();
        // A directory cannot be opened for append.
        let channel = OutboxChannel::new(dir.path(), "mlr@example.com");
        assert!(channel.send(&["x@example.com".to_string()], "s", "b").is_err());
    }
}
