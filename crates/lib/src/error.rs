//! Error taxonomy for inbound-message processing and outbound dispatch.
//!
//! Invalid or unsupported webhook envelopes never reach these types; they are
//! rejected (400) or acknowledged-and-dropped (202) at the HTTP edge. Startup
//! configuration violations use anyhow and are fatal before serving traffic.

use thiserror::Error;

/// A send to the platform message endpoint failed.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The platform rejected the message with a 4xx status. Permanent: not retried.
    #[error("platform rejected message ({status}): {body}")]
    Rejected { status: u16, body: String },

    /// All retry attempts were exhausted on transient failures (network or 5xx).
    #[error("send failed after {attempts} attempts: {reason}")]
    Exhausted { attempts: u32, reason: String },
}

impl DispatchError {
    /// Upstream HTTP status to reuse on synchronous send routes, when known.
    pub fn upstream_status(&self) -> Option<u16> {
        match self {
            DispatchError::Rejected { status, .. } => Some(*status),
            DispatchError::Exhausted { .. } => None,
        }
    }
}

/// Failure while processing one inbound message. Logged and dropped; the
/// webhook was already acknowledged, so these never surface to the sender.
#[derive(Debug, Error)]
pub enum ProcessError {
    /// The event is missing chat or contact fields the pipeline needs.
    #[error("malformed conversation: {0}")]
    MalformedConversation(String),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}
