//! Reasoning gateway over on-device and remote language models.

mod gateway;

pub use gateway::{BackendHealth, ReasoningBackend, ReasoningGateway, ReasoningRequest, ReasoningResponse};
