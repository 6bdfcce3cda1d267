//! JSON output types and serialization for CLI responses.
//!
//! ## Design Principles
//!
//! 1. **Status first:** Every response has `status` as first field
//! 2. **Deterministic:** Same tree -> same output (field order, array ordering)
//! 3. **Versioned:** Schema version in response enables forward compatibility

use std::io::{self, Write};

use serde::{Deserialize, Serialize};

use crate::choice::{Choice, ChoiceKind};
use crate::config::ResolvedConfig;
use crate::dump::DumpStats;
use crate::error::{OutputErrorCode, TrailError};

/// Current schema version for all responses.
pub const SCHEMA_VERSION: &str = "1";

// ============================================================================
// Error Response
// ============================================================================

/// Error details.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// Numeric error code, also the process exit code.
    pub code: u8,
    /// Human-readable message.
    pub message: String,
}

impl ErrorInfo {
    pub fn from_error(err: &TrailError) -> Self {
        ErrorInfo {
            code: OutputErrorCode::from(err).code(),
            message: err.to_string(),
        }
    }
}

/// Response emitted when a command fails.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Status: "error".
    pub status: String,
    /// Schema version for compatibility.
    pub schema_version: String,
    /// Error information.
    pub error: ErrorInfo,
}

impl ErrorResponse {
    /// Create an error response from a TrailError.
    pub fn from_error(err: &TrailError) -> Self {
        ErrorResponse {
            status: "error".to_string(),
            schema_version: SCHEMA_VERSION.to_string(),
            error: ErrorInfo::from_error(err),
        }
    }
}

// ============================================================================
// Dump Response
// ============================================================================

/// Response for `dump --format json`.
#[derive(Debug, Clone, Serialize)]
pub struct DumpResponse {
    pub status: String,
    pub schema_version: String,
    /// Dump lines in output order.
    pub lines: Vec<String>,
    pub stats: DumpStats,
}

impl DumpResponse {
    pub fn new(lines: Vec<String>, stats: DumpStats) -> Self {
        DumpResponse {
            status: "ok".to_string(),
            schema_version: SCHEMA_VERSION.to_string(),
            lines,
            stats,
        }
    }
}

// ============================================================================
// Choices Response
// ============================================================================

/// One choice as presented to the operator.
#[derive(Debug, Clone, Serialize)]
pub struct ChoiceInfo {
    /// 1-based number the terminal chooser shows.
    pub number: usize,
    pub text: String,
    pub subtext: String,
    pub kind: ChoiceKind,
    pub selector: String,
    pub settable: bool,
    pub requires_modifier: bool,
    /// Rendered fragment selecting this choice would record.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fragment: Option<String>,
}

impl ChoiceInfo {
    pub fn new(number: usize, choice: &Choice) -> Self {
        ChoiceInfo {
            number,
            text: choice.text.clone(),
            subtext: choice.subtext.clone(),
            kind: choice.kind,
            selector: choice.selector.to_string(),
            settable: choice.settable,
            requires_modifier: choice.requires_modifier(),
            fragment: choice.fragment().map(|fragment| fragment.to_string()),
        }
    }
}

/// Response for `choices --format json`.
#[derive(Debug, Clone, Serialize)]
pub struct ChoicesResponse {
    pub status: String,
    pub schema_version: String,
    /// Path of the node the choices belong to.
    pub path: String,
    /// Lines the session emitted while following `--select`.
    pub emitted: Vec<String>,
    pub choices: Vec<ChoiceInfo>,
}

impl ChoicesResponse {
    pub fn new(path: impl Into<String>, emitted: Vec<String>, choices: &[Choice]) -> Self {
        ChoicesResponse {
            status: "ok".to_string(),
            schema_version: SCHEMA_VERSION.to_string(),
            path: path.into(),
            emitted,
            choices: choices
                .iter()
                .enumerate()
                .map(|(offset, choice)| ChoiceInfo::new(offset + 1, choice))
                .collect(),
        }
    }
}

// ============================================================================
// Config Response
// ============================================================================

/// One resolved setting.
#[derive(Debug, Clone, Serialize)]
pub struct ConfigEntry {
    pub key: String,
    pub value: String,
    pub source: String,
}

/// Response for `config --format json`.
#[derive(Debug, Clone, Serialize)]
pub struct ConfigResponse {
    pub status: String,
    pub schema_version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_file: Option<String>,
    pub entries: Vec<ConfigEntry>,
}

impl ConfigResponse {
    pub fn new(config: &ResolvedConfig) -> Self {
        ConfigResponse {
            status: "ok".to_string(),
            schema_version: SCHEMA_VERSION.to_string(),
            config_file: config
                .config_file
                .as_ref()
                .map(|path| path.display().to_string()),
            entries: config
                .entries()
                .into_iter()
                .map(|(key, value, source)| ConfigEntry {
                    key: key.to_string(),
                    value,
                    source: source.to_string(),
                })
                .collect(),
        }
    }
}

// ============================================================================
// Emission
// ============================================================================

/// Emit a response as pretty-printed JSON to a writer.
pub fn emit_response<T: Serialize>(response: &T, writer: &mut impl Write) -> io::Result<()> {
    let json = serde_json::to_string_pretty(response)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    writeln!(writer, "{}", json)
}
