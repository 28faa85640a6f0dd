//! YandexGPT completion client.
//!
//! One non-streaming completion call behind the `CompletionBackend` trait,
//! authenticated with an IAM token exchanged from a service-account key or
//! with a static API key.

pub mod auth;
pub mod client;
pub mod config;
pub mod types;

pub use auth::IamAuth;
pub use client::{CompletionBackend, CompletionError, YandexGpt};
pub use config::{Credentials, LLMConfig};
pub use types::*;
