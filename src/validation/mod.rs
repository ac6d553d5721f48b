//! Rule-type validation module.
//!
//! Decides whether a rule-list type is usable for a request:
//! - Capability table (enabled, support level, risk, fallback, endpoints)
//! - Fallback-chain resolution with cycle detection
//! - Risk and performance advisories

pub mod capability;
pub mod validator;

pub use capability::*;
pub use validator::*;
