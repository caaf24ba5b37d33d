//! Model client module for AI inference.

mod client;
mod messages;

pub use client::{ModelClient, ModelConfig, ModelError, ModelResponse};
pub use messages::{assistant_message, screen_info, strip_images, system_message, user_message};
