//! Field extraction module.
//!
//! Path parsing and rule application against raw provider payloads.

pub mod json_path;
pub mod transform;

pub use json_path::*;
pub use transform::*;
