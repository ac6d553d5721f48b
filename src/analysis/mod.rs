//! Schema analysis module.
//!
//! Offline inference of payload shapes for rule authoring:
//! - Field discovery with type, path and nesting level
//! - Confidence scoring
//! - Mapping suggestions against canonical target fields

pub mod analyzer;
pub mod suggest;
pub mod types;

pub use analyzer::*;
pub use suggest::*;
pub use types::*;
