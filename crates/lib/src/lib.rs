//! Wakili core library — eligibility gate, conversation state machine,
//! platform client, and webhook gateway shared by the CLI.

pub mod bootstrap;
pub mod cache;
pub mod config;
pub mod error;
pub mod gate;
pub mod gateway;
pub mod machine;
pub mod platform;
pub mod state;
