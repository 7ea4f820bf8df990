//! Utility modules shared by the analyses and the runtime.
//!
//! - Error types
//! - Buffer name interning
//! - String helpers for analysis fact text

pub mod errors;
pub mod intern;
pub mod strings;

// Re-exports
pub use errors::*;
pub use intern::{BufferId, BufferInterner};
