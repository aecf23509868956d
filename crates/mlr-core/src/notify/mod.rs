//! Notification dispatch.
//!
//! The dispatcher turns an [`AlertEvent`] into a message and hands it to a
//! [`NotificationChannel`]. Each send runs on its own worker thread and is
//! bounded by the configured timeout; a slow or failing channel yields a
//! `failed` result and never aborts the run.

pub mod message;
pub mod outbox;
#[cfg(feature = "webhook")]
pub mod webhook;

pub use message::{compose_message, AlertMessage};
pub use outbox::OutboxChannel;
#[cfg(feature = "webhook")]
pub use webhook::WebhookChannel;

use std::path::Path;
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use mlr_config::{ChannelKind, NotifyConfig};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::alert::AlertEvent;

/// Errors reported by a notification channel.
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("channel misconfigured: {0}")]
    Config(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("rejected with status {status}: {detail}")]
    Rejected { status: u16, detail: String },
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Transport-agnostic delivery of one message to a list of recipients.
pub trait NotificationChannel: Send + Sync {
    fn name(&self) -> &str;
    fn send(&self, recipients: &[String], subject: &str, body: &str) -> Result<(), ChannelError>;

    /// Whether an empty recipient list is a delivery failure.
    fn requires_recipients(&self) -> bool {
        true
    }
}

/// Outcome of one dispatch attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "result", content = "reason", rename_all = "snake_case")]
pub enum DispatchResult {
    Sent,
    Failed(String),
}

impl DispatchResult {
    pub fn is_sent(&self) -> bool {
        matches!(self, DispatchResult::Sent)
    }
}

/// Writes alerts to the log instead of delivering them.
#[derive(Debug, Default)]
pub struct LogChannel;

impl NotificationChannel for LogChannel {
    fn name(&self) -> &str {
        "log"
    }

    fn requires_recipients(&self) -> bool {
        false
    }

    fn send(&self, recipients: &[String], subject: &str, body: &str) -> Result<(), ChannelError> {
        info!(
            channel = "log",
            recipients = %recipients.join(","),
            subject = %subject,
            "alert notification"
        );
        debug!(body = %body, "alert notification body");
        Ok(())
    }
}

/// A message captured by [`RecordingChannel`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub recipients: Vec<String>,
    pub subject: String,
    pub body: String,
}

/// In-memory channel that keeps every message (used by tests and dry runs).
#[derive(Debug, Default)]
pub struct RecordingChannel {
    sent: Mutex<Vec<SentMessage>>,
}

impl RecordingChannel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<SentMessage> {
        self.sent.lock().map(|m| m.clone()).unwrap_or_default()
    }
}

impl NotificationChannel for RecordingChannel {
    fn name(&self) -> &str {
        "recording"
    }

    fn send(&self, recipients: &[String], subject: &str, body: &str) -> Result<(), ChannelError> {
        let mut sent = self
            .sent
            .lock()
            .map_err(|_| ChannelError::Transport("recording channel poisoned".to_string()))?;
        sent.push(SentMessage {
            recipients: recipients.to_vec(),
            subject: subject.to_string(),
            body: body.to_string(),
        });
        Ok(())
    }
}

/// Channel that always fails, optionally after a delay.
#[derive(Debug, Default)]
pub struct FailingChannel {
    pub reason: String,
    pub delay: Option<Duration>,
}

impl FailingChannel {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            delay: None,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

impl NotificationChannel for FailingChannel {
    fn name(&self) -> &str {
        "failing"
    }

    fn send(&self, _recipients: &[String], _subject: &str, _body: &str) -> Result<(), ChannelError> {
        if let Some(delay) = self.delay {
            thread::sleep(delay);
        }
        Err(ChannelError::Transport(self.reason.clone()))
    }
}

/// Build the channel selected by configuration.
///
/// `outbox_override` forces the outbox channel at that path.
pub fn build_channel(
    config: &NotifyConfig,
    outbox_override: Option<&Path>,
) -> Result<Arc<dyn NotificationChannel>, ChannelError> {
    if let Some(path) = outbox_override {
        return Ok(Arc::new(OutboxChannel::new(path, &config.sender)));
    }
    match config.channel {
        ChannelKind::Log => Ok(Arc::new(LogChannel)),
        ChannelKind::Outbox => {
            let path = config.outbox_path.as_deref().ok_or_else(|| {
                ChannelError::Config("notify.outbox_path is required for the outbox channel".into())
            })?;
            Ok(Arc::new(OutboxChannel::new(path, &config.sender)))
        }
        #[cfg(feature = "webhook")]
        ChannelKind::Webhook => {
            let url = config.webhook_url.as_deref().ok_or_else(|| {
                ChannelError::Config("notify.webhook_url is required for the webhook channel".into())
            })?;
            Ok(Arc::new(WebhookChannel::new(
                url,
                &config.sender,
                &config.webhook_token_env,
                Duration::from_secs(config.timeout_secs),
            )))
        }
        #[cfg(not(feature = "webhook"))]
        ChannelKind::Webhook => Err(ChannelError::Config(
            "webhook channel requires the `webhook` feature".to_string(),
        )),
    }
}

/// Dispatcher for a run. With notifications off (`notify == false` or
/// `notify.enabled = false`) alerts go to the log channel as a dry run.
pub fn build_dispatcher(
    config: &NotifyConfig,
    notify: bool,
    outbox_override: Option<&Path>,
) -> Result<Dispatcher, ChannelError> {
    let timeout = Duration::from_secs(config.timeout_secs);
    let dispatcher = if notify && config.enabled {
        Dispatcher::new(build_channel(config, outbox_override)?, timeout)
    } else {
        Dispatcher::new(Arc::new(LogChannel), timeout).dry_run()
    };
    Ok(dispatcher.with_subject_prefix(config.subject_prefix.clone()))
}

/// Sends alert events through a channel with a bounded wait.
#[derive(Clone)]
pub struct Dispatcher {
    channel: Arc<dyn NotificationChannel>,
    timeout: Duration,
    subject_prefix: String,
    dry_run: bool,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("channel", &self.channel.name())
            .field("timeout", &self.timeout)
            .field("subject_prefix", &self.subject_prefix)
            .field("dry_run", &self.dry_run)
            .finish()
    }
}

impl Dispatcher {
    pub fn new(channel: Arc<dyn NotificationChannel>, timeout: Duration) -> Self {
        Self {
            channel,
            timeout,
            subject_prefix: String::new(),
            dry_run: false,
        }
    }

    /// Mark deliveries as rehearsals: nobody real was notified, so they
    /// must not reach the alert ledger.
    pub fn dry_run(mut self) -> Self {
        self.dry_run = true;
        self
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    pub fn with_subject_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.subject_prefix = prefix.into();
        self
    }

    pub fn channel_name(&self) -> &str {
        self.channel.name()
    }

    /// Compose and deliver one alert. Never panics and never blocks longer
    /// than the timeout; the worker of a timed-out send is left to finish on
    /// its own.
    pub fn dispatch(&self, event: &AlertEvent, recipients: &[String]) -> DispatchResult {
        if recipients.is_empty() && self.channel.requires_recipients() {
            return DispatchResult::Failed("no recipients configured".to_string());
        }
        let message = compose_message(event, &self.subject_prefix);
        let channel = Arc::clone(&self.channel);
        let recipients = recipients.to_vec();
        let (tx, rx) = mpsc::channel();

        let spawned = thread::Builder::new()
            .name("mlr-notify".to_string())
            .spawn(move || {
                let result = channel.send(&recipients, &message.subject, &message.body);
                let _ = tx.send(result);
            });
        if let Err(e) = spawned {
            return DispatchResult::Failed(format!("cannot start notification worker: {}", e));
        }

        match rx.recv_timeout(self.timeout) {
            Ok(Ok(())) => DispatchResult::Sent,
            Ok(Err(e)) => DispatchResult::Failed(e.to_string()),
            Err(mpsc::RecvTimeoutError::Timeout) => DispatchResult::Failed(format!(
                "{} channel timed out after {}s",
                self.channel.name(),
                self.timeout.as_secs_f64()
            )),
            Err(mpsc::RecvTimeoutError::Disconnected) => DispatchResult::Failed(format!(
                "{} channel worker exited without a result",
                self.channel.name()
            )),
        }
    }
}
