//! Structured logging with request context.
//!
//! Provides logging macros and utilities that include the request id and,
//! when known, the provider and rule type in every log message.

pub mod structured;

pub use structured::*;
