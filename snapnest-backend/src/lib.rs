pub mod client;
pub mod config;
pub mod error;
pub mod http;
pub mod memory;
mod record;
pub mod service;

pub use client::{BackendClient, FollowOutcome};
pub use config::BackendConfig;
pub use error::{BackendError, ErrorReason, Result};
pub use http::HttpBackend;
pub use memory::MemoryBackend;
