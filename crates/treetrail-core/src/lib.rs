//! Core engine for treetrail.
//!
//! This crate provides the provider-agnostic navigation engine:
//! - Node model and the `NodeAdapter` capability trait
//! - Choice construction for the chooser
//! - Access-path recording and replay
//! - Navigation stack and the browsing session state machine
//! - Cycle-safe hierarchy dump
//! - An in-memory tree provider loadable from JSON
//! - Error types, layered configuration and JSON output types

pub mod choice;
pub mod config;
pub mod dump;
pub mod error;
pub mod interaction;
pub mod memory;
pub mod node;
pub mod output;
pub mod path;
pub mod session;
pub mod stack;
