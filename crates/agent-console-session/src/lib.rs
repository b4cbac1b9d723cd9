//! Session directory backends for the console client.
//!
//! Provides:
//! - `MemoryDirectory` - In-process directory for dev servers and tests
//! - `HttpDirectory` - Client for a console server's REST surface

pub mod memory;

#[cfg(feature = "http")]
pub mod http;

#[cfg(feature = "http")]
pub use http::HttpDirectory;
pub use memory::{DirectoryConfig, MemoryDirectory};
