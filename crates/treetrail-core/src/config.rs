//! Layered configuration.
//!
//! Every setting is resolved from four sources, lowest precedence first:
//!
//! 1. Built-in defaults
//! 2. The config file (`--config`, else `./treetrail.toml`, else
//!    `<config_dir>/treetrail/config.toml`)
//! 3. `TREETRAIL_*` environment variables
//! 4. CLI flags
//!
//! Each resolved value remembers where it came from, so `treetrail config`
//! can show provenance.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::dump::DumpOptions;
use crate::session::SessionOptions;

// ============================================================================
// Constants
// ============================================================================

/// Default root token used when rendering paths.
pub const DEFAULT_ROOT_TOKEN: &str = "root";

/// Default number of dumped nodes between cooperative yields.
pub const DEFAULT_YIELD_EVERY: usize = 64;

/// Default prefix marking a terminal selection as "modifier held".
pub const DEFAULT_MODIFIER_PREFIX: &str = "!";

/// Config file name looked up in the current directory.
pub const LOCAL_CONFIG_FILE: &str = "treetrail.toml";

pub const ENV_ROOT_TOKEN: &str = "TREETRAIL_ROOT_TOKEN";
pub const ENV_MAX_DEPTH: &str = "TREETRAIL_MAX_DEPTH";
pub const ENV_YIELD_EVERY: &str = "TREETRAIL_YIELD_EVERY";
pub const ENV_MODIFIER_PREFIX: &str = "TREETRAIL_MODIFIER_PREFIX";

// ============================================================================
// Error Types
// ============================================================================

/// Errors that can occur while resolving configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file could not be read.
    #[error("cannot read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Config file is not valid TOML or has unknown keys.
    #[error("invalid config file {path}: {source}")]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// A setting has an unusable value.
    #[error("invalid value {value:?} for {key}: {reason}")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },
}

// ============================================================================
// Configuration Sources
// ============================================================================

/// Configuration value source (for precedence tracking).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ConfigSource {
    /// Built-in default value.
    Default = 0,
    /// From the config file.
    ConfigFile = 1,
    /// From environment variable.
    EnvVar = 2,
    /// From CLI flag (highest precedence).
    CliFlag = 3,
}

impl fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ConfigSource::Default => "default",
            ConfigSource::ConfigFile => "config file",
            ConfigSource::EnvVar => "environment",
            ConfigSource::CliFlag => "command line",
        })
    }
}

/// A configuration value with its source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigValue<T> {
    /// The actual value.
    pub value: T,
    /// Where the value came from.
    pub source: ConfigSource,
}

impl<T> ConfigValue<T> {
    /// Create a new config value with the given source.
    pub fn new(value: T, source: ConfigSource) -> Self {
        ConfigValue { value, source }
    }

    /// Merge with another value, preferring higher precedence.
    pub fn merge(self, other: Self) -> Self {
        if other.source >= self.source {
            other
        } else {
            self
        }
    }
}

// ============================================================================
// Config File
// ============================================================================

/// Contents of a config file. Every key is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub root_token: Option<String>,
    pub max_depth: Option<usize>,
    pub yield_every: Option<usize>,
    pub modifier_prefix: Option<String>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Toml {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Locate the config file to use.
///
/// An explicit path is returned as-is (a missing file is reported when it is
/// loaded). Otherwise the first existing default location wins.
pub fn discover_config_file(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    let local = PathBuf::from(LOCAL_CONFIG_FILE);
    if local.is_file() {
        return Some(local);
    }
    dirs::config_dir()
        .map(|dir| dir.join("treetrail").join("config.toml"))
        .filter(|path| path.is_file())
}

// ============================================================================
// Configuration Resolution
// ============================================================================

/// CLI configuration overrides.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    /// --root-token flag.
    pub root_token: Option<String>,
    /// --max-depth flag.
    pub max_depth: Option<usize>,
    /// --yield-every flag.
    pub yield_every: Option<usize>,
    /// --modifier-prefix flag.
    pub modifier_prefix: Option<String>,
}

/// Resolved configuration with precedence information.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedConfig {
    pub root_token: ConfigValue<String>,
    pub max_depth: Option<ConfigValue<usize>>,
    pub yield_every: ConfigValue<usize>,
    pub modifier_prefix: ConfigValue<String>,
    /// The config file that was applied, if any.
    pub config_file: Option<PathBuf>,
}

impl Default for ResolvedConfig {
    fn default() -> Self {
        ResolvedConfig {
            root_token: ConfigValue::new(DEFAULT_ROOT_TOKEN.to_string(), ConfigSource::Default),
            max_depth: None,
            yield_every: ConfigValue::new(DEFAULT_YIELD_EVERY, ConfigSource::Default),
            modifier_prefix: ConfigValue::new(
                DEFAULT_MODIFIER_PREFIX.to_string(),
                ConfigSource::Default,
            ),
            config_file: None,
        }
    }
}

impl ResolvedConfig {
    /// Resolve configuration from all sources, reading the process environment.
    pub fn resolve(
        explicit_file: Option<&Path>,
        cli_overrides: &CliOverrides,
    ) -> Result<Self, ConfigError> {
        Self::resolve_with_env(explicit_file, cli_overrides, |key| std::env::var(key).ok())
    }

    /// Resolve configuration with a caller-supplied environment lookup.
    pub fn resolve_with_env(
        explicit_file: Option<&Path>,
        cli_overrides: &CliOverrides,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let mut config = ResolvedConfig::default();

        if let Some(path) = discover_config_file(explicit_file) {
            let file = FileConfig::load(&path)?;
            debug!(path = %path.display(), "applying config file");
            config.apply_file_config(&file)?;
            config.config_file = Some(path);
        }

        config.apply_env_vars(env)?;
        config.apply_cli_overrides(cli_overrides)?;
        Ok(config)
    }

    /// Apply a config file layer.
    pub fn apply_file_config(&mut self, file: &FileConfig) -> Result<(), ConfigError> {
        let source = ConfigSource::ConfigFile;
        if let Some(token) = &file.root_token {
            self.set_root_token(token.clone(), source)?;
        }
        if let Some(depth) = file.max_depth {
            self.set_max_depth(depth, source);
        }
        if let Some(every) = file.yield_every {
            self.set_yield_every(every, source)?;
        }
        if let Some(prefix) = &file.modifier_prefix {
            self.set_modifier_prefix(prefix.clone(), source)?;
        }
        Ok(())
    }

    fn apply_env_vars(&mut self, env: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        let source = ConfigSource::EnvVar;
        if let Some(token) = env(ENV_ROOT_TOKEN) {
            self.set_root_token(token, source)?;
        }
        if let Some(depth) = env(ENV_MAX_DEPTH) {
            self.set_max_depth(parse_count(ENV_MAX_DEPTH, &depth)?, source);
        }
        if let Some(every) = env(ENV_YIELD_EVERY) {
            self.set_yield_every(parse_count(ENV_YIELD_EVERY, &every)?, source)?;
        }
        if let Some(prefix) = env(ENV_MODIFIER_PREFIX) {
            self.set_modifier_prefix(prefix, source)?;
        }
        Ok(())
    }

    fn apply_cli_overrides(&mut self, overrides: &CliOverrides) -> Result<(), ConfigError> {
        let source = ConfigSource::CliFlag;
        if let Some(ref token) = overrides.root_token {
            self.set_root_token(token.clone(), source)?;
        }
        if let Some(depth) = overrides.max_depth {
            self.set_max_depth(depth, source);
        }
        if let Some(every) = overrides.yield_every {
            self.set_yield_every(every, source)?;
        }
        if let Some(ref prefix) = overrides.modifier_prefix {
            self.set_modifier_prefix(prefix.clone(), source)?;
        }
        Ok(())
    }

    fn set_root_token(&mut self, token: String, source: ConfigSource) -> Result<(), ConfigError> {
        if token.trim().is_empty() {
            return Err(invalid("root_token", &token, "must not be empty"));
        }
        let current = self.root_token.clone();
        self.root_token = current.merge(ConfigValue::new(token, source));
        Ok(())
    }

    fn set_max_depth(&mut self, depth: usize, source: ConfigSource) {
        let next = ConfigValue::new(depth, source);
        self.max_depth = Some(match self.max_depth.take() {
            Some(current) => current.merge(next),
            None => next,
        });
    }

    fn set_yield_every(&mut self, every: usize, source: ConfigSource) -> Result<(), ConfigError> {
        if every == 0 {
            return Err(invalid("yield_every", &every.to_string(), "must be at least 1"));
        }
        self.yield_every = self.yield_every.clone().merge(ConfigValue::new(every, source));
        Ok(())
    }

    fn set_modifier_prefix(
        &mut self,
        prefix: String,
        source: ConfigSource,
    ) -> Result<(), ConfigError> {
        if prefix.is_empty() || prefix.chars().any(|c| c.is_ascii_digit() || c.is_whitespace()) {
            return Err(invalid(
                "modifier_prefix",
                &prefix,
                "must be non-empty and contain no digits or whitespace",
            ));
        }
        let current = self.modifier_prefix.clone();
        self.modifier_prefix = current.merge(ConfigValue::new(prefix, source));
        Ok(())
    }

    pub fn dump_options(&self) -> DumpOptions {
        DumpOptions {
            max_depth: self.max_depth.as_ref().map(|depth| depth.value),
            yield_every: self.yield_every.value,
        }
    }

    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            root_token: self.root_token.value.clone(),
            modifier_hint: format!("prefix with {:?}", self.modifier_prefix.value),
        }
    }

    /// `(key, value, source)` rows for display.
    pub fn entries(&self) -> Vec<(&'static str, String, ConfigSource)> {
        vec![
            (
                "root_token",
                self.root_token.value.clone(),
                self.root_token.source,
            ),
            (
                "max_depth",
                self.max_depth
                    .as_ref()
                    .map_or_else(|| "none".to_string(), |depth| depth.value.to_string()),
                self.max_depth
                    .as_ref()
                    .map_or(ConfigSource::Default, |depth| depth.source),
            ),
            (
                "yield_every",
                self.yield_every.value.to_string(),
                self.yield_every.source,
            ),
            (
                "modifier_prefix",
                self.modifier_prefix.value.clone(),
                self.modifier_prefix.source,
            ),
        ]
    }
}

fn parse_count(key: &str, raw: &str) -> Result<usize, ConfigError> {
    raw.trim()
        .parse::<usize>()
        .map_err(|err| invalid(key, raw, &err.to_string()))
}

fn invalid(key: &str, value: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}
