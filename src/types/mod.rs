//! Shared data types

pub mod message;
pub mod transcript;

pub use message::{Message, Role};
pub use transcript::Transcript;
