//! HTTP mail API channel.
//!
//! POSTs `{fromAddress, toAddress, subject, content}` to the configured URL
//! with an OAuth token read from the environment on every send, so a
//! rotated token is picked up without restarting.

use std::time::Duration;

use serde_json::json;

use super::{ChannelError, NotificationChannel};

/// Authorization scheme expected by the mail API.
pub const AUTH_SCHEME: &str = "Zoho-oauthtoken";

pub struct WebhookChannel {
    url: String,
    sender: String,
    token_env: String,
    agent: ureq::Agent,
}

impl std::fmt::Debug for WebhookChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookChannel")
            .field("url", &self.url)
            .field("sender", &self.sender)
            .field("token_env", &self.token_env)
            .finish()
    }
}

impl WebhookChannel {
    pub fn new(url: &str, sender: &str, token_env: &str, timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(timeout)
            .timeout(timeout)
            .build();
        Self {
            url: url.to_string(),
            sender: sender.to_string(),
            token_env: token_env.to_string(),
            agent,
        }
    }

    /// Current token from `token_env`; blank counts as unset.
    pub fn token(&self) -> Result<String, ChannelError> {
        std::env::var(&self.token_env)
            .ok()
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| ChannelError::Config(format!("{} is not set", self.token_env)))
    }

    pub fn payload(&self, recipients: &[String], subject: &str, body: &str) -> serde_json::Value {
        json!({
            "fromAddress": self.sender,
            "toAddress": recipients.join(","),
            "subject": subject,
            "content": body,
        })
    }
}

impl NotificationChannel for WebhookChannel {
    fn name(&self) -> &str {
        "webhook"
    }

    fn send(&self, recipients: &[String], subject: &str, body: &str) -> Result<(), ChannelError> {
        let token = self.token()?;

        let response = self
            .agent
            .post(&self.url)
            .set("Authorization", &format!("{} {}", AUTH_SCHEME, token))
            .set("Accept", "application/json")
            .send_json(self.payload(recipients, subject, body));

        match response {
            Ok(_) => Ok(()),
            Err(ureq::Error::Status(status, resp)) => {
                let detail = resp
                    .into_string()
                    .unwrap_or_else(|_| "<unreadable body>".to_string());
                Err(ChannelError::Rejected { status, detail })
            }
            Err(ureq::Error::Transport(transport)) => {
                Err(ChannelError::Transport(transport.to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_shape() {
        let channel = WebhookChannel::new(
            "https://mail.example.com/api/messages",
            "mlr@example.com",
            "MLR_TEST_TOKEN_UNSET_FOR_PAYLOAD",
            Duration::from_secs(1),
        );
        let payload = channel.payload(
            &["a@example.com".to_string(), "b@example.com".to_string()],
            "subject",
            "body",
        );
        assert_eq!(payload["fromAddress"], "mlr@example.com");
        assert_eq!(payload["toAddress"], "a@example.com,b@example.com");
        assert_eq!(payload["subject"], "subject");
        assert_eq!(payload["content"], "body");
    }

    #[test]
    fn missing_token_fails_before_any_request() {
        let channel = WebhookChannel::new(
            "http://127.0.0.1:9/unreachable",
            "mlr@example.com",
            "MLR_TEST_TOKEN_DEFINITELY_UNSET",
            Duration::from_secs(1),
        );
        let err = channel
            .send(&["a@example.com".to_string()], "s", "b")
            .unwrap_err();
        assert!(matches!(err, ChannelError::Config(_)));
        assert!(format!("{:?}", channel).contains("MLR_TEST_TOKEN_DEFINITELY_UNSET"));
    }

    #[test]
    fn token_is_read_when_sending_not_when_built() {
        let var = "MLR_TEST_TOKEN_SET_AFTER_BUILD";
        std::env::remove_var(var);
        let channel = WebhookChannel::new(
            "http://127.0.0.1:9/unreachable",
            "mlr@example.com",
            var,
            Duration::from_secs(1),
        );
        assert!(channel.token().is_err());

        std::env::set_var(var, "rotated-token");
        assert_eq!(channel.token().unwrap(), "rotated-token");
        assert!(!format!("{:?}", channel).contains("rotated-token"));
        std::env::remove_var(var);
    }
}
