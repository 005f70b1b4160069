//! # tldw Common Library
//!
//! Shared code for tldw services including:
//! - Error types
//! - Progress event wire format
//! - Configuration file loading and path resolution
//! - Server-Sent Events helpers

pub mod config;
pub mod error;
pub mod events;
pub mod sse;

pub use error::{Error, Result};
pub use events::{Progress, ProgressStatus};
