//! Core types for sentinel.

mod detection;
mod message;
mod session;
mod turn;

pub use detection::*;
pub use message::*;
pub use session::*;
pub use turn::*;
