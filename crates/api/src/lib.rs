//! 123pan open-platform API client.
//!
//! Async HTTP client using `reqwest` with bearer token authentication.
//! Every call decodes the shared response envelope and classifies failures
//! into [`ApiError`] so callers can tell transport trouble (retryable)
//! from semantic rejections (not retryable).

pub mod client;
pub mod error;

pub use client::Client;
pub use error::ApiError;
