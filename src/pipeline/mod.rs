//! Pipeline orchestration module.
//!
//! Market data transformation pipeline that coordinates:
//! - Rule-type validation and fallback
//! - Best-matching rule resolution
//! - Field mapping and usage statistics
//! - Bounded batch execution

pub mod context;
pub mod ingestion;

pub use context::*;
pub use ingestion::*;
