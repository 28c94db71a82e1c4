//! regvault-cli: HTTP client and form handling for the `regvault` binary
//!
//! All field encryption happens here, on the client side. The daemon only
//! ever sees field ciphertexts.

pub mod client;
pub mod form;

pub use client::{ApiClient, ClientError};
pub use form::{StudentRow, StudentUpdate};

/// Default API base URL
pub const DEFAULT_API: &str = "http://localhost:5000/api";
