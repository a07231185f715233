//! Webhook gateway: HTTP ingest, background processing, and startup wiring.

mod server;

pub use server::{run_gateway, GatewayState};
