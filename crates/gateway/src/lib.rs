//! Messaging-gateway adapter: webhook payload model for inbound deliveries
//! and a small send client for replies. The gateway is not part of the
//! reconciliation core; failures here are logged and never fail a run.

pub mod client;
pub mod payload;

pub use client::{GatewayClient, GatewayError};
pub use payload::{InboundMessage, MessageKind, WebhookEnvelope};
