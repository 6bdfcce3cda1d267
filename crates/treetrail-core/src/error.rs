//! Error types and error code constants for treetrail.
//!
//! Three layers of errors live here:
//!
//! - [`ProviderError`]: failures reported by a tree provider through
//!   [`NodeAdapter`](crate::node::NodeAdapter). `Unsupported` is the
//!   "capability not offered" signal and is usually degraded to an empty list.
//! - [`NavError`]: engine errors raised by the navigation stack and session.
//! - [`TrailError`]: the unified error type rendered by the CLI, with a stable
//!   [`OutputErrorCode`] that doubles as the process exit code.
//!
//! ## Error Code Mapping
//!
//! - `2`: Invalid arguments (bad flags, unparsable input)
//! - `3`: Resolution errors (document or node not found)
//! - `4`: Session errors (stale elements, navigation failures)
//! - `10`: Internal errors (bugs, unexpected state)

use std::fmt;

use thiserror::Error;

use crate::config::ConfigError;
use crate::memory::MemoryTreeError;

// ============================================================================
// Provider Errors
// ============================================================================

/// Errors reported by a tree provider.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    /// The node does not offer this capability at all.
    #[error("capability not supported: {capability}")]
    Unsupported { capability: String },

    /// The underlying element has been invalidated.
    #[error("element is no longer valid")]
    InvalidElement,

    /// The attribute does not exist on this node.
    #[error("no such attribute: {name}")]
    NoSuchAttribute { name: String },

    /// The action does not exist on this node.
    #[error("no such action: {name}")]
    NoSuchAction { name: String },

    /// The attribute exists but rejects writes.
    #[error("attribute is not settable: {name}")]
    NotSettable { name: String },

    /// Any other provider failure.
    #[error("{message}")]
    Failed { message: String },
}

impl ProviderError {
    pub fn unsupported(capability: impl Into<String>) -> Self {
        ProviderError::Unsupported {
            capability: capability.into(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        ProviderError::Failed {
            message: message.into(),
        }
    }

    pub fn is_unsupported(&self) -> bool {
        matches!(self, ProviderError::Unsupported { .. })
    }
}

/// Result type for tree provider calls.
pub type ProviderResult<T> = Result<T, ProviderError>;

// ============================================================================
// Navigation Errors
// ============================================================================

/// Errors raised by the navigation engine.
#[derive(Debug, Error)]
pub enum NavError {
    /// The element a frame refers to is no longer valid.
    #[error("element at {path} is no longer valid")]
    StaleNode { path: String },

    /// `back` was requested with no prior descent.
    ///
    /// The choice builder only offers `back` when a descent exists, so this is
    /// an invariant violation. The session that hits it is reset.
    #[error("navigation stack underflow: back requested with no prior descent")]
    StackUnderflow,

    /// A recorded path no longer leads to a navigable node.
    #[error("cannot navigate {path}: {reason}")]
    NotNavigable { path: String, reason: String },

    /// An operation was called in the wrong session state.
    #[error("session is {actual}, expected {expected}")]
    InvalidState {
        expected: &'static str,
        actual: &'static str,
    },

    /// Neither the recorded root nor the default root provider yielded a node.
    #[error("no root element available")]
    NoRoot,

    /// `commit_set` was called without a prepared set.
    #[error("no attribute is prepared for setting")]
    NoPendingSet,

    /// A provider call failed.
    #[error(transparent)]
    Provider(#[from] ProviderError),
}

impl NavError {
    pub fn not_navigable(path: impl Into<String>, reason: impl Into<String>) -> Self {
        NavError::NotNavigable {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// Result type for navigation operations.
pub type NavResult<T> = Result<T, NavError>;

// ============================================================================
// Output Error Codes
// ============================================================================

/// Error codes for JSON output and CLI exit codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OutputErrorCode {
    /// Invalid arguments from caller (bad input, malformed request).
    InvalidArguments = 2,
    /// Resolution errors (document missing, node id unknown).
    ResolutionError = 3,
    /// Session errors (stale elements, broken navigation).
    SessionError = 4,
    /// Internal errors (bugs, unexpected state).
    InternalError = 10,
}

impl OutputErrorCode {
    /// Get the numeric code value.
    pub fn code(&self) -> u8 {
        *self as u8
    }
}

impl fmt::Display for OutputErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

// ============================================================================
// Unified Error Type
// ============================================================================

/// Unified error type for CLI output.
///
/// Subsystem errors are bridged into this type before being rendered as an
/// `ErrorResponse`.
#[derive(Debug, Error)]
pub enum TrailError {
    /// Invalid arguments from caller.
    #[error("invalid arguments: {message}")]
    InvalidArguments { message: String },

    /// Input file not found.
    #[error("file not found: {path}")]
    FileNotFound { path: String },

    /// Node id not present in the document.
    #[error("node not found: {id}")]
    NodeNotFound { id: String },

    /// Document could not be loaded.
    #[error("document error: {message}")]
    DocumentError { message: String },

    /// Configuration could not be resolved.
    #[error("configuration error: {message}")]
    ConfigError { message: String },

    /// Navigation session failure.
    #[error("session error: {message}")]
    SessionError { message: String },

    /// Internal error (bug or unexpected state).
    #[error("internal error: {message}")]
    InternalError { message: String },
}

impl TrailError {
    pub fn invalid_args(message: impl Into<String>) -> Self {
        TrailError::InvalidArguments {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        TrailError::InternalError {
            message: message.into(),
        }
    }

    pub fn session(message: impl Into<String>) -> Self {
        TrailError::SessionError {
            message: message.into(),
        }
    }
}

impl From<&TrailError> for OutputErrorCode {
    fn from(err: &TrailError) -> Self {
        match err {
            TrailError::InvalidArguments { .. } => OutputErrorCode::InvalidArguments,
            TrailError::ConfigError { .. } => OutputErrorCode::InvalidArguments,
            TrailError::FileNotFound { .. } => OutputErrorCode::ResolutionError,
            TrailError::NodeNotFound { .. } => OutputErrorCode::ResolutionError,
            TrailError::DocumentError { .. } => OutputErrorCode::ResolutionError,
            TrailError::SessionError { .. } => OutputErrorCode::SessionError,
            TrailError::InternalError { .. } => OutputErrorCode::InternalError,
        }
    }
}

impl From<TrailError> for OutputErrorCode {
    fn from(err: TrailError) -> Self {
        OutputErrorCode::from(&err)
    }
}

// ============================================================================
// Bridges
// ============================================================================

impl From<NavError> for TrailError {
    fn from(err: NavError) -> Self {
        match err {
            NavError::StackUnderflow | NavError::InvalidState { .. } => TrailError::InternalError {
                message: err.to_string(),
            },
            other => TrailError::SessionError {
                message: other.to_string(),
            },
        }
    }
}

impl From<MemoryTreeError> for TrailError {
    fn from(err: MemoryTreeError) -> Self {
        match err {
            MemoryTreeError::Io { path, source } if source.kind() == std::io::ErrorKind::NotFound => {
                TrailError::FileNotFound {
                    path: path.display().to_string(),
                }
            }
            MemoryTreeError::UnknownNode { id } => TrailError::NodeNotFound { id },
            other => TrailError::DocumentError {
                message: other.to_string(),
            },
        }
    }
}

impl From<ConfigError> for TrailError {
    fn from(err: ConfigError) -> Self {
        TrailError::ConfigError {
            message: err.to_string(),
        }
    }
}

impl From<std::io::Error> for TrailError {
    fn from(err: std::io::Error) -> Self {
        TrailError::InternalError {
            message: format!("IO error: {}", err),
        }
    }
}
