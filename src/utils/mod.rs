//! Utilities module
//!
//! Error handling, logging setup and secret redaction

pub mod error;
pub mod logging;
pub mod redact;
