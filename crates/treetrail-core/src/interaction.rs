//! Host interfaces for a browsing session
//!
//! The session never talks to a terminal, window or clipboard directly. It
//! goes through three narrow traits supplied by the host:
//!
//! - [`Chooser`]: displays a list of choices and later reports which one the
//!   operator picked (or none)
//! - [`ModifierQuery`]: whether the "perform" modifier was held at selection
//! - [`TextSink`]: receives the emitted paths, values and status lines
//!
//! [`Host`] bundles one of each for the duration of a session call. All
//! traits are object-safe.

use std::cell::Cell;
use std::io::Write;

use tracing::warn;

use crate::choice::Choice;

/// Selection UI.
///
/// The UI reports the operator's pick back to the session by calling
/// `Session::select` exactly once per `post`.
pub trait Chooser {
    /// Display `choices` with `preselected` highlighted
    ///
    /// # Arguments
    /// * `choices` - The ordered choices to display
    /// * `preselected` - Index of the choice to highlight (0 when unsure)
    fn post(&mut self, choices: &[Choice], preselected: usize);

    /// Whether a posted list is currently on screen
    fn is_currently_shown(&self) -> bool;

    /// Hide the posted list without a selection
    fn dismiss(&mut self);

    /// Show a one-line status message
    fn show_status(&mut self, message: &str);
}

/// Modifier key state, queried only while a selection is processed.
pub trait ModifierQuery {
    fn is_held(&self) -> bool;
}

impl ModifierQuery for bool {
    fn is_held(&self) -> bool {
        *self
    }
}

/// Modifier state set by the host just before it reports a selection.
///
/// Used by hosts where the modifier arrives together with the selection
/// (e.g. a `!` typed in front of the choice number).
#[derive(Debug, Default)]
pub struct LatchedModifier {
    held: Cell<bool>,
}

impl LatchedModifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, held: bool) {
        self.held.set(held);
    }
}

impl ModifierQuery for LatchedModifier {
    fn is_held(&self) -> bool {
        self.held.get()
    }
}

/// Destination for emitted text.
pub trait TextSink {
    fn line(&mut self, line: &str);
}

impl TextSink for Vec<String> {
    fn line(&mut self, line: &str) {
        self.push(line.to_string());
    }
}

/// [`TextSink`] writing one line per call to any [`Write`].
#[derive(Debug)]
pub struct WriterSink<W: Write> {
    writer: W,
}

impl<W: Write> WriterSink<W> {
    pub fn new(writer: W) -> Self {
        WriterSink { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> TextSink for WriterSink<W> {
    fn line(&mut self, line: &str) {
        if let Err(err) = writeln!(self.writer, "{}", line).and_then(|_| self.writer.flush()) {
            warn!(error = %err, "failed to write output line");
        }
    }
}

/// The host services a session call runs against.
pub struct Host<'a> {
    pub chooser: &'a mut dyn Chooser,
    pub modifier: &'a dyn ModifierQuery,
    pub sink: &'a mut dyn TextSink,
}

impl<'a> Host<'a> {
    pub fn new(
        chooser: &'a mut dyn Chooser,
        modifier: &'a dyn ModifierQuery,
        sink: &'a mut dyn TextSink,
    ) -> Self {
        Host {
            chooser,
            modifier,
            sink,
        }
    }

    /// Report a status line to both the chooser and the sink.
    pub fn status(&mut self, message: &str) {
        self.chooser.show_status(message);
        self.sink.line(message);
    }
}

/// Chooser that records what it is asked to display.
///
/// Backs non-interactive hosts (the `choices` command) and tests.
#[derive(Debug, Default)]
pub struct RecordingChooser {
    posts: Vec<(Vec<Choice>, usize)>,
    statuses: Vec<String>,
    shown: bool,
    dismissals: usize,
}

impl RecordingChooser {
    pub fn new() -> Self {
        Self::default()
    }

    /// The most recent post: choices and preselected index.
    pub fn last_post(&self) -> Option<(&[Choice], usize)> {
        self.posts
            .last()
            .map(|(choices, preselected)| (choices.as_slice(), *preselected))
    }

    pub fn post_count(&self) -> usize {
        self.posts.len()
    }

    pub fn statuses(&self) -> &[String] {
        &self.statuses
    }

    pub fn dismissals(&self) -> usize {
        self.dismissals
    }

    /// Mark the posted list as answered, as a real UI does on selection.
    pub fn answer(&mut self) {
        self.shown = false;
    }
}

impl Chooser for RecordingChooser {
    fn post(&mut self, choices: &[Choice], preselected: usize) {
        self.posts.push((choices.to_vec(), preselected));
        self.shown = true;
    }

    fn is_currently_shown(&self) -> bool {
        self.shown
    }

    fn dismiss(&mut self) {
        self.shown = false;
        self.dismissals += 1;
    }

    fn show_status(&mut self, message: &str) {
        self.statuses.push(message.to_string());
    }
}
