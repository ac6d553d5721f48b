//! Mapping rule registry module.
//!
//! Rule documents and their lifecycle:
//! - Data model and validation of rule documents
//! - Cache and persistence contracts
//! - In-memory collaborators
//! - Best-match selection with default-rule semantics

pub mod memory;
pub mod rule;
pub mod service;
pub mod store;

pub use memory::*;
pub use rule::*;
pub use service::*;
pub use store::*;
