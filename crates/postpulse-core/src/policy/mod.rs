//! Reliability policies for the upstream connection.

pub mod reconnect;

pub use reconnect::{ReconnectConfig, ReconnectPolicy};
