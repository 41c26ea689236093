//! Audit trail of batch runs.
//!
//! This module records what each run processed, skipped and wrote.

pub mod log;

// Re-export commonly used types
pub use log::RunLog;
