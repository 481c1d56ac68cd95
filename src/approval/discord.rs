//! Discord approval channel.
//!
//! Approval requests are posted through a webhook with `?wait=true`
//! so Discord returns the created message. The verdict is read by
//! polling the message's reactions: ✅ approves, ❌ denies, approve
//! wins when both are present at the same poll.

use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::errors::{BrokerError, Result};

use super::{ApprovalChannel, Verdict};

/// How often the reactions endpoint is polled.
const POLL_INTERVAL: Duration = Duration::from_millis(2500);

/// Per-call HTTP timeout for Discord requests.
const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// URL-encoded sentinel emoji.
const APPROVE_EMOJI: &str = "%E2%9C%85"; // ✅
const DENY_EMOJI: &str = "%E2%9D%8C"; // ❌

/// Discord-backed approval channel.
pub struct DiscordChannel {
    webhook_url: String,
    bot_token: String,
    channel_id: String,
    /// REST base, overridable for tests.
    api_base: String,
    poll_interval: Duration,
    agent: ureq::Agent,
}

impl DiscordChannel {
    pub fn new(webhook_url: &str, bot_token: &str, channel_id: &str) -> Self {
        Self {
            webhook_url: webhook_url.to_string(),
            bot_token: bot_token.to_string(),
            channel_id: channel_id.to_string(),
            api_base: "https://discord.com/api/v10".to_string(),
            poll_interval: POLL_INTERVAL,
            agent: ureq::AgentBuilder::new().timeout(HTTP_TIMEOUT).build(),
        }
    }

    /// Point the channel at a different REST base and poll cadence.
    /// Used by tests to drive the polling loop against a stub server.
    pub fn with_api_base(mut self, api_base: &str, poll_interval: Duration) -> Self {
        self.api_base = api_base.trim_end_matches('/').to_string();
        self.poll_interval = poll_interval;
        self
    }

    /// Post `content` to the webhook. `wait` controls the `?wait=true`
    /// query param that makes Discord return the created message.
    fn post_webhook(&self, content: &str, wait: bool) -> Result<serde_json::Value> {
        let url = if wait {
            format!("{}?wait=true", self.webhook_url)
        } else {
            self.webhook_url.clone()
        };

        let response = self
            .agent
            .post(&url)
            .send_json(serde_json::json!({ "content": content }))
            .map_err(|e| BrokerError::ApprovalChannelFailure(format!("webhook post: {e}")))?;

        if wait {
            response
                .into_json()
                .map_err(|e| BrokerError::ApprovalChannelFailure(format!("webhook response: {e}")))
        } else {
            Ok(serde_json::Value::Null)
        }
    }

    /// Whether anyone has reacted to `message_id` with `emoji`.
    ///
    /// A 404 means the message is not yet indexed by the reactions
    /// endpoint and reads as "no reactions"; any other non-2xx status
    /// is an error.
    fn has_reaction(&self, message_id: &str, emoji: &str) -> Result<bool> {
        let url = format!(
            "{}/channels/{}/messages/{}/reactions/{}?limit=1",
            self.api_base, self.channel_id, message_id, emoji
        );

        match self
            .agent
            .get(&url)
            .set("Authorization", &format!("Bot {}", self.bot_token))
            .call()
        {
            Ok(response) => {
                let users: serde_json::Value = response.into_json().map_err(|e| {
                    BrokerError::ApprovalChannelFailure(format!("reactions response: {e}"))
                })?;
                Ok(users.as_array().is_some_and(|a| !a.is_empty()))
            }
            Err(ureq::Error::Status(404, _)) => {
                debug!(message_id, "reactions endpoint returned 404, treating as none");
                Ok(false)
            }
            Err(ureq::Error::Status(code, _)) => Err(BrokerError::ApprovalChannelFailure(
                format!("reactions endpoint returned {code}"),
            )),
            Err(e) => Err(BrokerError::ApprovalChannelFailure(format!(
                "reactions request: {e}"
            ))),
        }
    }
}

impl ApprovalChannel for DiscordChannel {
    fn send_approval_request(&self, summary: &str) -> Result<String> {
        let message = self.post_webhook(summary, true)?;
        message
            .get("id")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or_else(|| {
                BrokerError::ApprovalChannelFailure("webhook response had no message id".into())
            })
    }

    fn wait_for_response(&self, message_id: &str, timeout: Duration) -> Result<Verdict> {
        let deadline = Instant::now() + timeout;

        loop {
            // Approve takes precedence when both reactions are present.
            if self.has_reaction(message_id, APPROVE_EMOJI)? {
                return Ok(Verdict::Approved);
            }
            if self.has_reaction(message_id, DENY_EMOJI)? {
                return Ok(Verdict::Denied);
            }

            if Instant::now() + self.poll_interval > deadline {
                warn!(message_id, "approval poll deadline elapsed");
                return Ok(Verdict::Timeout);
            }
            std::thread::sleep(self.poll_interval);
        }
    }

    fn send_notification(&self, text: &str) -> Result<()> {
        self.post_webhook(text, false).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emoji_constants_are_percent_encoded_utf8() {
        // ✅ is U+2705, ❌ is U+274C.
        assert_eq!(APPROVE_EMOJI, "%E2%9C%85");
        assert_eq!(DENY_EMOJI, "%E2%9D%8C");
    }

    #[test]
    fn api_base_override_strips_trailing_slash() {
        let channel = DiscordChannel::new("http://wh", "tok", "chan")
            .with_api_base("http://localhost:9/", Duration::from_millis(1));
        assert_eq!(channel.api_base, "http://localhost:9");
    }

    #[test]
    fn unreachable_endpoint_is_a_channel_failure() {
        // Nothing listens on this port; the transport error must map
        // to ApprovalChannelFailure rather than panicking.
        let channel = DiscordChannel::new("http://127.0.0.1:1/webhook", "tok", "chan")
            .with_api_base("http://127.0.0.1:1", Duration::from_millis(1));

        let err = channel.send_notification("hello").unwrap_err();
        assert!(matches!(err, BrokerError::ApprovalChannelFailure(_)));

        let err = channel.has_reaction("m-1", APPROVE_EMOJI).unwrap_err();
        assert!(matches!(err, BrokerError::ApprovalChannelFailure(_)));
    }
}
