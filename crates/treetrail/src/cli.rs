//! Command implementations behind the `treetrail` binary.
//!
//! Each runner takes already-resolved configuration and explicit readers and
//! writers, so the binary only wires them to the process streams:
//!
//! - [`run_browse`] - interactive session over a terminal chooser
//! - [`run_dump`] - cooperative hierarchy dump
//! - [`run_choices`] - non-interactive session driven by `--select`
//! - [`config_lines`] - resolved configuration as text
//!
//! ## Error Handling
//!
//! All runners return `Result<T, TrailError>`; engine, document and I/O errors
//! are bridged through the `From` impls in `treetrail_core::error`.

use std::io::{BufRead, Write};
use std::path::Path;

use tracing::{debug, info};
use treetrail_core::choice::Choice;
use treetrail_core::config::ResolvedConfig;
use treetrail_core::dump::{DumpOptions, DumpStats, HierarchyDumper};
use treetrail_core::error::TrailError;
use treetrail_core::interaction::{Chooser, Host, LatchedModifier, RecordingChooser, TextSink, WriterSink};
use treetrail_core::memory::{MemoryNode, MemoryTree};
use treetrail_core::session::{Outcome, Session, SessionState};

use crate::terminal::{parse_reply, Reply, TerminalChooser};

// ============================================================================
// Documents
// ============================================================================

/// Load a tree document.
pub fn load_tree(document: &Path) -> Result<MemoryTree, TrailError> {
    let tree = MemoryTree::from_path(document)?;
    debug!(document = %document.display(), "tree loaded");
    Ok(tree)
}

/// The node to start at: `start` by id, else the document root.
pub fn start_node(tree: &MemoryTree, start: Option<&str>) -> Result<MemoryNode, TrailError> {
    match start {
        Some(id) => Ok(tree.node(id)?),
        None => tree
            .root()
            .ok_or_else(|| TrailError::invalid_args("document declares no root; pass --start")),
    }
}

// ============================================================================
// Browse
// ============================================================================

/// Run an interactive session until the operator quits.
///
/// Choices, prompts and status lines go to `ui`; emitted paths and values go
/// to `out`.
///
/// # Arguments
///
/// * `config` - Resolved configuration (root token, modifier prefix)
/// * `tree` - The live tree; its declared root is the fallback after a
///   stale root
/// * `start` - Node the session starts at
/// * `input` - Operator answers, one per line
pub fn run_browse<R: BufRead, W: Write, O: Write>(
    config: &ResolvedConfig,
    tree: &MemoryTree,
    start: MemoryNode,
    input: R,
    ui: W,
    out: O,
) -> Result<(), TrailError> {
    let mut chooser = TerminalChooser::new(input, ui, config.modifier_prefix.value.clone());
    let modifier = LatchedModifier::new();
    let mut sink = WriterSink::new(out);
    let fallback = tree.clone();
    let mut session =
        Session::new(config.session_options()).with_default_root(move || fallback.root());

    session.start(start, &mut Host::new(&mut chooser, &modifier, &mut sink))?;

    loop {
        let picked = chooser.read_selection()?;
        modifier.set(picked.modifier);
        let outcome = session.select(
            picked.choice.as_ref(),
            &mut Host::new(&mut chooser, &modifier, &mut sink),
        )?;
        modifier.set(false);

        match outcome {
            Outcome::Posted => continue,
            Outcome::PrepareSet { .. } => {
                prompt_for_value(tree, &mut session, &mut chooser, &modifier, &mut sink)?;
            }
            _ => {}
        }

        if chooser.at_eof() {
            break;
        }
        match chooser.prompt_line("enter to resume, q to quit> ")? {
            Some(line) if line.trim() != "q" => {}
            _ => break,
        }
        session.browse(None, &mut Host::new(&mut chooser, &modifier, &mut sink))?;
    }

    info!("browse session ended");
    Ok(())
}

fn prompt_for_value<R: BufRead, W: Write>(
    tree: &MemoryTree,
    session: &mut Session<MemoryNode>,
    chooser: &mut TerminalChooser<R, W>,
    modifier: &LatchedModifier,
    sink: &mut dyn TextSink,
) -> Result<(), TrailError> {
    let Some(line) = chooser.prompt_line("new value as JSON (empty to skip)> ")? else {
        return Ok(());
    };
    if line.trim().is_empty() {
        return Ok(());
    }

    let value = match serde_json::from_str::<serde_json::Value>(&line) {
        Ok(json) => tree.value_from_json(&json),
        Err(err) => {
            chooser.show_status(&format!("invalid JSON value: {}", err));
            return Ok(());
        }
    };
    match value {
        Ok(value) => {
            let committed = session.commit_set(value, &mut Host::new(chooser, modifier, sink));
            if let Err(err) = committed {
                debug!(error = %err, "set not committed");
            }
        }
        Err(err) => chooser.show_status(&format!("invalid value: {}", err)),
    }
    Ok(())
}

// ============================================================================
// Dump
// ============================================================================

/// Dump the hierarchy below `root`, yielding to the runtime every
/// `options.yield_every` nodes.
pub fn run_dump(
    root: MemoryNode,
    options: DumpOptions,
    sink: &mut dyn TextSink,
) -> Result<DumpStats, TrailError> {
    let runtime = tokio::runtime::Builder::new_current_thread().build()?;
    let stats = runtime.block_on(drive_dump(HierarchyDumper::new(root, options), sink));
    debug!(?stats, "dump complete");
    Ok(stats)
}

async fn drive_dump(
    mut dumper: HierarchyDumper<MemoryNode>,
    sink: &mut dyn TextSink,
) -> DumpStats {
    while dumper.step(sink) {
        if dumper.take_yield() {
            tokio::task::yield_now().await;
        }
    }
    dumper.stats()
}

// ============================================================================
// Choices
// ============================================================================

/// Where a `--select` run ended.
#[derive(Debug, Clone)]
pub struct ChoicesReport {
    /// Path of the node the choices belong to.
    pub path: String,
    /// Lines the session emitted along the way.
    pub emitted: Vec<String>,
    pub choices: Vec<Choice>,
}

/// Start a session at `start` and apply each `--select` reply in turn.
///
/// Replies use the terminal syntax (`N`, `<prefix>N`, `b`). After a terminal
/// outcome the session resumes before the next reply.
pub fn run_choices(
    config: &ResolvedConfig,
    start: MemoryNode,
    replies: &[String],
) -> Result<ChoicesReport, TrailError> {
    let mut chooser = RecordingChooser::new();
    let mut emitted: Vec<String> = Vec::new();
    let mut session = Session::new(config.session_options());
    let prefix = config.modifier_prefix.value.as_str();

    session.start(start, &mut Host::new(&mut chooser, &false, &mut emitted))?;

    for reply in replies {
        if session.state() == SessionState::Idle {
            session.resume(&mut Host::new(&mut chooser, &false, &mut emitted))?;
        }
        let choices = session.choices().to_vec();
        let (selection, modifier) = match parse_reply(reply, prefix, choices.len())
            .map_err(|message| TrailError::invalid_args(format!("--select {}: {}", reply, message)))?
        {
            Reply::Pick { index, modifier } => (Some(choices[index].clone()), modifier),
            Reply::Back => {
                let back = choices
                    .iter()
                    .find(|choice| choice.is_back())
                    .cloned()
                    .ok_or_else(|| {
                        TrailError::invalid_args(format!("--select {}: already at the root", reply))
                    })?;
                (Some(back), false)
            }
            Reply::Nothing => (None, false),
        };
        debug!(reply = %reply, "applying selection");
        session.select(
            selection.as_ref(),
            &mut Host::new(&mut chooser, &modifier, &mut emitted),
        )?;
    }

    Ok(ChoicesReport {
        path: session.current_path(),
        emitted,
        choices: session.choices().to_vec(),
    })
}

// ============================================================================
// Config
// ============================================================================

/// Resolved configuration as `key = value (source)` lines.
pub fn config_lines(config: &ResolvedConfig) -> Vec<String> {
    let mut lines = Vec::new();
    if let Some(path) = &config.config_file {
        lines.push(format!("config file: {}", path.display()));
    }
    for (key, value, source) in config.entries() {
        lines.push(format!("{} = {} ({})", key, value, source));
    }
    lines
}
