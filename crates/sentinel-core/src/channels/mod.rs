//! Channel adapters shipped with the core.

mod webhook;

pub use webhook::{sign_payload, verify_signature, ChannelEvent, WebhookChannel};
