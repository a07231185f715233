//! Platform API surface: wire types and the HTTP client.

mod client;
mod types;

pub use client::PlatformClient;
pub use types::*;

use crate::error::DispatchError;
use async_trait::async_trait;

/// Outbound delivery seam. Implemented by [`PlatformClient`]; tests substitute
/// their own double to exercise the processing pipeline without a network.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    /// Deliver one message, retrying transient failures up to the bounded
    /// attempt budget.
    async fn send(&self, message: &OutboundMessage) -> Result<DeliveryReceipt, DispatchError>;
}
