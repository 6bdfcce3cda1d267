//! treetrail - interactive attributed-tree browser.
//!
//! This crate provides the CLI binary on top of `treetrail-core`.
//!
//! ## Modules
//!
//! - `cli` - Command implementations (browse, dump, choices, config)
//! - `terminal` - Line-oriented terminal chooser

pub mod cli;
pub mod terminal;

// Re-export core types for convenience
pub use treetrail_core::error::{OutputErrorCode, TrailError};
pub use treetrail_core::memory::{MemoryNode, MemoryTree};
pub use treetrail_core::output::{ErrorInfo, ErrorResponse, SCHEMA_VERSION};
pub use treetrail_core::session::{Outcome, Session, SessionOptions};
