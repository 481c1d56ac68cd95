//! Approval channel — the out-of-band human in the loop.
//!
//! The broker only knows the capability set: post an approval request,
//! wait for a verdict, send audit notifications. `discord` provides
//! the one concrete variant (webhook post + reaction polling).

pub mod discord;

pub use discord::DiscordChannel;

use std::time::Duration;

use crate::errors::Result;

/// Outcome of a human approval poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Approved,
    Denied,
    Timeout,
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Verdict::Approved => "approved",
            Verdict::Denied => "denied",
            Verdict::Timeout => "timeout",
        };
        f.write_str(s)
    }
}

/// Capability surface every approval channel implements.
pub trait ApprovalChannel: Send + Sync {
    /// Post a human-readable request summary. The returned opaque
    /// message id is the handle `wait_for_response` understands.
    fn send_approval_request(&self, summary: &str) -> Result<String>;

    /// Block until a verdict is observable or the deadline elapses.
    fn wait_for_response(&self, message_id: &str, timeout: Duration) -> Result<Verdict>;

    /// Fire-and-forget audit notification. Failures surface as errors;
    /// callers decide whether they are fatal.
    fn send_notification(&self, text: &str) -> Result<()>;
}
