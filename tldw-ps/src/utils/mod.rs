//! Utility modules for tldw-ps

pub mod retry;

pub use retry::{RetryError, RetryPolicy, Transient};
