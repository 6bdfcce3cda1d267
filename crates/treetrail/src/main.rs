//! Binary entry point for the treetrail CLI.
//!
//! ## Usage
//!
//! ```bash
//! # Browse a tree document interactively (paths are printed on stdout)
//! treetrail browse tree.json
//!
//! # Dump the whole tree, or the part below one node
//! treetrail dump tree.json --start win --max-depth 3
//!
//! # Drive a session non-interactively and print the resulting choices
//! treetrail choices tree.json --select 2,1 --format json
//!
//! # Show the resolved configuration and where each value came from
//! treetrail config
//! ```

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};

use treetrail::cli::{config_lines, load_tree, run_browse, run_choices, run_dump, start_node};
use treetrail::terminal::render_choices;
use treetrail_core::config::{CliOverrides, ResolvedConfig};
use treetrail_core::error::{OutputErrorCode, TrailError};
use treetrail_core::interaction::WriterSink;
use treetrail_core::output::{
    emit_response, ChoicesResponse, ConfigResponse, DumpResponse, ErrorResponse,
};

// ============================================================================
// CLI Structure
// ============================================================================

/// Browse attributed trees and record replayable access paths.
#[derive(Parser, Debug)]
#[command(
    name = "treetrail",
    version,
    about = "Browse attributed trees and record replayable access paths"
)]
struct Cli {
    #[command(flatten)]
    global: GlobalArgs,
    #[command(subcommand)]
    command: Command,
}

/// Global arguments shared by all subcommands.
#[derive(Parser, Debug)]
struct GlobalArgs {
    /// Log level for tracing output.
    #[arg(long, global = true, value_enum, default_value = "warn")]
    log_level: LogLevel,

    /// Config file (default: ./treetrail.toml, then the user config dir).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Token rendered paths start with.
    #[arg(long, global = true)]
    root_token: Option<String>,

    /// Maximum object nesting printed by `dump`.
    #[arg(long, global = true)]
    max_depth: Option<usize>,

    /// Nodes visited between cooperative yields during `dump`.
    #[arg(long, global = true)]
    yield_every: Option<usize>,

    /// Prefix marking a selection made with the modifier held.
    #[arg(long, global = true)]
    modifier_prefix: Option<String>,
}

impl GlobalArgs {
    fn overrides(&self) -> CliOverrides {
        CliOverrides {
            root_token: self.root_token.clone(),
            max_depth: self.max_depth,
            yield_every: self.yield_every,
            modifier_prefix: self.modifier_prefix.clone(),
        }
    }
}

/// Log level for tracing output.
#[derive(Clone, Copy, Debug, ValueEnum)]
enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    fn to_tracing_level(self) -> tracing::Level {
        match self {
            LogLevel::Trace => tracing::Level::TRACE,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Error => tracing::Level::ERROR,
        }
    }
}

/// Output format for non-interactive commands.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    /// Plain lines.
    #[default]
    Text,
    /// JSON response with `status` and `schema_version`.
    Json,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Browse a tree document with a terminal chooser.
    ///
    /// Answer with a choice number, `<prefix>N` to hold the modifier, `b` to
    /// go back, or an empty line to stop.
    Browse {
        /// Tree document (JSON).
        document: PathBuf,
        /// Node id to start at instead of the document root.
        #[arg(long)]
        start: Option<String>,
    },
    /// Dump the hierarchy below a node.
    Dump {
        /// Tree document (JSON).
        document: PathBuf,
        /// Node id to start at instead of the document root.
        #[arg(long)]
        start: Option<String>,
        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,
    },
    /// Apply selections non-interactively and print the resulting choices.
    Choices {
        /// Tree document (JSON).
        document: PathBuf,
        /// Node id to start at instead of the document root.
        #[arg(long)]
        start: Option<String>,
        /// Replies to apply in order, e.g. `2,!1,b`.
        #[arg(long, value_delimiter = ',')]
        select: Vec<String>,
        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,
    },
    /// Print the resolved configuration.
    Config {
        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,
    },
}

// ============================================================================
// Main Entry Point
// ============================================================================

fn main() -> ExitCode {
    let cli = Cli::parse();

    init_tracing(cli.global.log_level);

    match execute(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let error_code = OutputErrorCode::from(&err);
            let response = ErrorResponse::from_error(&err);

            // Errors go to stdout as JSON.
            let _ = emit_response(&response, &mut io::stdout());
            let _ = io::stdout().flush();

            ExitCode::from(error_code.code())
        }
    }
}

/// Initialize tracing subscriber.
fn init_tracing(level: LogLevel) {
    use tracing_subscriber::fmt::format::FmtSpan;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.to_tracing_level().to_string()));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_span_events(FmtSpan::CLOSE)
        .with_target(false)
        .with_writer(io::stderr)
        .init();
}

/// Execute the CLI command.
fn execute(cli: Cli) -> Result<(), TrailError> {
    let config = ResolvedConfig::resolve(cli.global.config.as_deref(), &cli.global.overrides())?;
    match cli.command {
        Command::Browse { document, start } => execute_browse(&config, &document, start),
        Command::Dump {
            document,
            start,
            format,
        } => execute_dump(&config, &document, start, format),
        Command::Choices {
            document,
            start,
            select,
            format,
        } => execute_choices(&config, &document, start, &select, format),
        Command::Config { format } => execute_config(&config, format),
    }
}

// ============================================================================
// Command Executors
// ============================================================================

fn execute_browse(
    config: &ResolvedConfig,
    document: &Path,
    start: Option<String>,
) -> Result<(), TrailError> {
    let tree = load_tree(document)?;
    let start = start_node(&tree, start.as_deref())?;
    run_browse(
        config,
        &tree,
        start,
        io::stdin().lock(),
        io::stderr(),
        io::stdout(),
    )
}

fn execute_dump(
    config: &ResolvedConfig,
    document: &Path,
    start: Option<String>,
    format: OutputFormat,
) -> Result<(), TrailError> {
    let tree = load_tree(document)?;
    let start = start_node(&tree, start.as_deref())?;
    match format {
        OutputFormat::Text => {
            let mut sink = WriterSink::new(io::stdout().lock());
            run_dump(start, config.dump_options(), &mut sink)?;
        }
        OutputFormat::Json => {
            let mut lines: Vec<String> = Vec::new();
            let stats = run_dump(start, config.dump_options(), &mut lines)?;
            emit_response(&DumpResponse::new(lines, stats), &mut io::stdout())?;
        }
    }
    Ok(())
}

fn execute_choices(
    config: &ResolvedConfig,
    document: &Path,
    start: Option<String>,
    select: &[String],
    format: OutputFormat,
) -> Result<(), TrailError> {
    let tree = load_tree(document)?;
    let start = start_node(&tree, start.as_deref())?;
    let report = run_choices(config, start, select)?;
    match format {
        OutputFormat::Text => {
            let mut stdout = io::stdout().lock();
            for line in &report.emitted {
                writeln!(stdout, "{}", line)?;
            }
            writeln!(stdout, "at {}", report.path)?;
            for line in render_choices(&report.choices, usize::MAX) {
                writeln!(stdout, "{}", line)?;
            }
        }
        OutputFormat::Json => {
            let response = ChoicesResponse::new(report.path, report.emitted, &report.choices);
            emit_response(&response, &mut io::stdout())?;
        }
    }
    Ok(())
}

fn execute_config(config: &ResolvedConfig, format: OutputFormat) -> Result<(), TrailError> {
    match format {
        OutputFormat::Text => {
            let mut stdout = io::stdout().lock();
            for line in config_lines(config) {
                writeln!(stdout, "{}", line)?;
            }
        }
        OutputFormat::Json => emit_response(&ConfigResponse::new(config), &mut io::stdout())?,
    }
    Ok(())
}
