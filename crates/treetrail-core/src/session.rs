//! Browsing session: the state machine behind the chooser.
//!
//! A [`Session`] owns one [`NavigationStack`] and one [`PathRecorder`] and
//! keeps them in lock-step: after every operation the recorded path has one
//! fragment per frame above the root.
//!
//! # States
//!
//! - `Idle`: nothing posted. `start`, `browse` and `resume` post choices.
//! - `AwaitingSelection`: choices are posted; the host reports the operator's
//!   pick through [`Session::select`].
//!
//! Selections that descend re-post and stay in `AwaitingSelection`. Terminal
//! selections (a scalar value, an action, a set template, a parameterized
//! action) emit a path line to the text sink and return to `Idle` without
//! recording the extra fragment, so the session can later resume at the same
//! node.
//!
//! # Stale Recovery
//!
//! The tree may change between any two calls. When the current frame no
//! longer resolves, the session walks down the stack to the deepest frame that
//! still does and reports a one-line status. If even the root is gone it
//! restarts at the default root, when a provider for one was supplied.

use std::fmt;

use tracing::{debug, error, info, warn};

use crate::choice::{Choice, ChoiceBuilder, Selector};
use crate::config::DEFAULT_ROOT_TOKEN;
use crate::error::{NavError, NavResult};
use crate::interaction::Host;
use crate::node::{ancestry, Key, Node, NodeAdapter, Scalar, Value};
use crate::path::{PathFragment, PathRecorder};
use crate::stack::{Frame, NavigationStack};

// ============================================================================
// Session Types
// ============================================================================

/// Session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    AwaitingSelection,
}

impl SessionState {
    pub fn name(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::AwaitingSelection => "awaiting selection",
        }
    }
}

/// What a session call did.
#[derive(Debug, Clone)]
pub enum Outcome<N> {
    /// Choices were (re-)posted; a selection is awaited.
    Posted,
    /// The operator picked nothing.
    Cancelled,
    /// The chooser was showing and has been hidden.
    Dismissed,
    /// A scalar value was shown.
    Value { path: String, value: Value<N> },
    /// A set template was emitted; a value can be committed with
    /// [`Session::commit_set`].
    PrepareSet {
        path: String,
        attribute: String,
        current: Value<N>,
    },
    /// An action was performed.
    Invoked { path: String, action: String },
    /// A parameterized-action template was emitted.
    Parameterized { path: String, action: String },
}

impl<N> Outcome<N> {
    /// Whether the session returned to `Idle`.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Outcome::Posted)
    }

    /// The emitted path, for outcomes that emit one.
    pub fn path(&self) -> Option<&str> {
        match self {
            Outcome::Value { path, .. }
            | Outcome::PrepareSet { path, .. }
            | Outcome::Invoked { path, .. }
            | Outcome::Parameterized { path, .. } => Some(path),
            Outcome::Posted | Outcome::Cancelled | Outcome::Dismissed => None,
        }
    }
}

/// Session settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOptions {
    /// Token the rendered path starts with.
    pub root_token: String,
    /// How the host asks for the modifier, shown in action subtexts.
    pub modifier_hint: String,
}

impl Default for SessionOptions {
    fn default() -> Self {
        SessionOptions {
            root_token: DEFAULT_ROOT_TOKEN.to_string(),
            modifier_hint: "hold the modifier".to_string(),
        }
    }
}

struct PendingSet<N> {
    element: N,
    attribute: String,
    base_path: String,
}

type RootProvider<N> = Box<dyn Fn() -> Option<N>>;

// ============================================================================
// Session
// ============================================================================

/// One interactive browsing session.
pub struct Session<N: NodeAdapter> {
    options: SessionOptions,
    builder: ChoiceBuilder,
    stack: NavigationStack<N>,
    path: PathRecorder,
    state: SessionState,
    choices: Vec<Choice>,
    pending_set: Option<PendingSet<N>>,
    default_root: Option<RootProvider<N>>,
}

impl<N: NodeAdapter> fmt::Debug for Session<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("state", &self.state)
            .field("path", &self.path.current_path())
            .field("depth", &self.stack.depth())
            .field("choices", &self.choices.len())
            .finish()
    }
}

impl<N: NodeAdapter> Default for Session<N> {
    fn default() -> Self {
        Session::new(SessionOptions::default())
    }
}

impl<N: NodeAdapter> Session<N> {
    pub fn new(options: SessionOptions) -> Self {
        Session {
            builder: ChoiceBuilder::new(options.modifier_hint.clone()),
            path: PathRecorder::new(options.root_token.clone()),
            options,
            stack: NavigationStack::new(),
            state: SessionState::Idle,
            choices: Vec::new(),
            pending_set: None,
            default_root: None,
        }
    }

    /// Supply the "current context" root used when the recorded root is gone.
    pub fn with_default_root(mut self, provider: impl Fn() -> Option<N> + 'static) -> Self {
        self.default_root = Some(Box::new(provider));
        self
    }

    // ------------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------------

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// The most recently posted choices.
    pub fn choices(&self) -> &[Choice] {
        &self.choices
    }

    pub fn current_path(&self) -> String {
        self.path.current_path()
    }

    pub fn path(&self) -> &PathRecorder {
        &self.path
    }

    pub fn stack(&self) -> &NavigationStack<N> {
        &self.stack
    }

    pub fn depth(&self) -> usize {
        self.stack.depth()
    }

    /// The session root, if a session has been started.
    pub fn root(&self) -> Option<&N> {
        self.stack.root().map(Frame::element)
    }

    /// Re-derive the node currently displayed.
    pub fn current_node(&self) -> NavResult<Node<N>> {
        self.stack.refresh_top()
    }

    /// Base path and attribute of the prepared set, if any.
    pub fn pending_set(&self) -> Option<(&str, &str)> {
        self.pending_set
            .as_ref()
            .map(|pending| (pending.base_path.as_str(), pending.attribute.as_str()))
    }

    // ------------------------------------------------------------------------
    // Entry Points
    // ------------------------------------------------------------------------

    /// Start a fresh session at `root` and post its choices.
    pub fn start(&mut self, root: N, host: &mut Host<'_>) -> NavResult<Outcome<N>> {
        if !root.is_valid() {
            return Err(NavError::StaleNode {
                path: self.options.root_token.clone(),
            });
        }
        let label = root.role_summary().label();
        info!(root = %label, "session started");

        let parents = ancestry(&root);
        if !parents.is_empty() {
            host.chooser
                .show_status(&format!("{} (in {})", label, parents.join(" < ")));
        }

        self.stack.reset(root);
        self.path.clear();
        self.pending_set = None;
        self.present(host, None)
    }

    /// Toggle the chooser: hide it when shown, otherwise resume or start.
    ///
    /// `root` is the host's current context. Browsing resumes when it is
    /// `None` or the node the session is already rooted at.
    pub fn browse(&mut self, root: Option<N>, host: &mut Host<'_>) -> NavResult<Outcome<N>> {
        if host.chooser.is_currently_shown() {
            host.chooser.dismiss();
            self.state = SessionState::Idle;
            debug!("chooser dismissed");
            return Ok(Outcome::Dismissed);
        }
        match root {
            Some(root) if !self.is_rooted_at(&root) => self.start(root, host),
            _ => self.resume(host),
        }
    }

    /// Re-post the current node, recovering from stale frames first.
    pub fn resume(&mut self, host: &mut Host<'_>) -> NavResult<Outcome<N>> {
        if self.stack.is_empty() {
            let root = self.fresh_default_root().ok_or(NavError::NoRoot)?;
            return self.start(root, host);
        }
        debug!(path = %self.path, "resuming session");
        self.present(host, None)
    }

    /// Handle the operator's pick from the last posted choices.
    pub fn select(
        &mut self,
        selection: Option<&Choice>,
        host: &mut Host<'_>,
    ) -> NavResult<Outcome<N>> {
        if self.state != SessionState::AwaitingSelection {
            return Err(NavError::InvalidState {
                expected: SessionState::AwaitingSelection.name(),
                actual: self.state.name(),
            });
        }
        let Some(choice) = selection else {
            debug!(path = %self.path, "selection cancelled");
            self.state = SessionState::Idle;
            return Ok(Outcome::Cancelled);
        };

        let modifier = host.modifier.is_held();
        debug!(selector = %choice.selector, modifier, "selection");
        match &choice.selector {
            Selector::Back => self.go_back(host),
            Selector::Attribute(name) => self.select_attribute(name, modifier, host),
            Selector::Index(key) => self.select_index(key, host),
            Selector::Action(name) => self.select_action(name, modifier, host),
            Selector::ParameterizedAction(name) => Ok(self.select_parameterized(name, host)),
        }
    }

    /// Write `value` to the attribute prepared by the last `PrepareSet`.
    ///
    /// A rejected write is reported through the host and leaves the set
    /// pending, so the caller may retry with another value.
    pub fn commit_set(&mut self, value: Value<N>, host: &mut Host<'_>) -> NavResult<()> {
        let pending = self.pending_set.take().ok_or(NavError::NoPendingSet)?;
        let literal = value.literal();
        if let Err(err) = pending
            .element
            .set_attribute_value(&pending.attribute, value)
        {
            warn!(attribute = %pending.attribute, error = %err, "attribute write failed");
            host.status(&format!(
                "{}{} failed: {}",
                pending.base_path,
                PathFragment::SetAttribute(pending.attribute.clone()),
                err
            ));
            self.pending_set = Some(pending);
            return Err(err.into());
        }
        let line = format!(
            "{}{} = {}",
            pending.base_path,
            PathFragment::Attribute(pending.attribute.clone()),
            literal
        );
        info!(assignment = %line, "attribute set");
        host.sink.line(&line);
        Ok(())
    }

    /// Discard the session.
    pub fn reset(&mut self) {
        self.stack.clear();
        self.path.clear();
        self.choices.clear();
        self.pending_set = None;
        self.state = SessionState::Idle;
    }

    // ------------------------------------------------------------------------
    // Selection Handlers
    // ------------------------------------------------------------------------

    fn go_back(&mut self, host: &mut Host<'_>) -> NavResult<Outcome<N>> {
        if let Err(err) = self.stack.pop() {
            error!(error = %err, "back without a prior descent; resetting session");
            self.reset();
            return Err(err);
        }
        let removed = self.path.remove_last();
        debug!(path = %self.path, "back");
        self.present(host, removed.as_ref())
    }

    fn select_attribute(
        &mut self,
        name: &str,
        modifier: bool,
        host: &mut Host<'_>,
    ) -> NavResult<Outcome<N>> {
        let Some(node) = self.live_top(host)? else {
            return Ok(Outcome::Posted);
        };
        let Node::Object(element) = node else {
            return Ok(self.report_failure(host, format!("{} has no attribute {:?}", self.path, name)));
        };
        let fragment = PathFragment::Attribute(name.to_string());

        let value = match element.attribute_value(name) {
            Ok(value) => value,
            Err(err) if modifier && element.is_attribute_settable(name).unwrap_or(false) => {
                debug!(attribute = name, error = %err, "preparing set without a readable value");
                let current = Value::Scalar(Scalar::Text(format!("<unavailable: {}>", err)));
                return Ok(self.prepare_set(element, name, current, host));
            }
            Err(err) => {
                let message = format!("cannot read {}: {}", self.path.render_with(&fragment), err);
                return Ok(self.report_failure(host, message));
            }
        };

        if modifier && element.is_attribute_settable(name).unwrap_or(false) {
            return Ok(self.prepare_set(element, name, value, host));
        }

        match value {
            Value::Object(child) => self.descend(Frame::object(child), fragment, host),
            Value::Collection(_) => self.descend(Frame::attribute(element, name), fragment, host),
            Value::Scalar(_) => Ok(self.show_value(fragment, value, host)),
        }
    }

    fn select_index(&mut self, key: &Key, host: &mut Host<'_>) -> NavResult<Outcome<N>> {
        let Some(node) = self.live_top(host)? else {
            return Ok(Outcome::Posted);
        };
        let fragment = PathFragment::Index(key.clone());
        let Node::Collection(view) = node else {
            let message = format!("{} is not a collection", self.path);
            return Ok(self.report_failure(host, message));
        };

        let value = match view.live_entry(key) {
            Ok(Some(value)) => value,
            Ok(None) => {
                let message = format!("{} no longer exists", self.path.render_with(&fragment));
                return Ok(self.report_failure(host, message));
            }
            Err(err) => {
                let message = format!("cannot read {}: {}", self.path.render_with(&fragment), err);
                return Ok(self.report_failure(host, message));
            }
        };

        match value {
            Value::Object(child) => self.descend(Frame::object(child), fragment, host),
            Value::Collection(_) => {
                let frame = self
                    .stack
                    .current()
                    .map(|top| top.nested(key.clone()))
                    .ok_or(NavError::NoRoot)?;
                self.descend(frame, fragment, host)
            }
            Value::Scalar(_) => Ok(self.show_value(fragment, value, host)),
        }
    }

    fn select_action(
        &mut self,
        name: &str,
        modifier: bool,
        host: &mut Host<'_>,
    ) -> NavResult<Outcome<N>> {
        if !modifier {
            debug!(action = name, "action needs the modifier; re-posting");
            let preselected = self
                .choices
                .iter()
                .position(|choice| matches!(&choice.selector, Selector::Action(action) if action == name))
                .unwrap_or(0);
            host.chooser.post(&self.choices, preselected);
            return Ok(Outcome::Posted);
        }

        let Some(node) = self.live_top(host)? else {
            return Ok(Outcome::Posted);
        };
        let fragment = PathFragment::Invoke(name.to_string());
        let path = self.path.render_with(&fragment);
        match node.owner().perform_action(name) {
            Ok(()) => {
                info!(path = %path, "action performed");
                host.sink.line(&path);
                self.state = SessionState::Idle;
                Ok(Outcome::Invoked {
                    path,
                    action: name.to_string(),
                })
            }
            Err(err) => Ok(self.report_failure(host, format!("{} failed: {}", path, err))),
        }
    }

    fn select_parameterized(&mut self, name: &str, host: &mut Host<'_>) -> Outcome<N> {
        let path = self
            .path
            .render_with(&PathFragment::Parameterized(name.to_string()));
        host.sink.line(&path);
        self.state = SessionState::Idle;
        Outcome::Parameterized {
            path,
            action: name.to_string(),
        }
    }

    fn show_value(&mut self, fragment: PathFragment, value: Value<N>, host: &mut Host<'_>) -> Outcome<N> {
        let path = self.path.render_with(&fragment);
        host.sink.line(&format!("{} = {}", path, value.literal()));
        self.state = SessionState::Idle;
        Outcome::Value { path, value }
    }

    fn prepare_set(
        &mut self,
        element: N,
        name: &str,
        current: Value<N>,
        host: &mut Host<'_>,
    ) -> Outcome<N> {
        let path = self
            .path
            .render_with(&PathFragment::SetAttribute(name.to_string()));
        host.sink
            .line(&format!("{} (current value: {})", path, current.literal()));
        self.pending_set = Some(PendingSet {
            element,
            attribute: name.to_string(),
            base_path: self.path.current_path(),
        });
        self.state = SessionState::Idle;
        Outcome::PrepareSet {
            path,
            attribute: name.to_string(),
            current,
        }
    }

    // ------------------------------------------------------------------------
    // Posting and Recovery
    // ------------------------------------------------------------------------

    fn descend(
        &mut self,
        frame: Frame<N>,
        fragment: PathFragment,
        host: &mut Host<'_>,
    ) -> NavResult<Outcome<N>> {
        self.stack.push(frame);
        self.path.append(fragment);
        debug!(path = %self.path, "descended");
        self.present(host, None)
    }

    /// Rebuild and post the choices for the top frame.
    ///
    /// `previous` is the fragment just undone by `back`; the choice that
    /// records it again is preselected.
    fn present(
        &mut self,
        host: &mut Host<'_>,
        previous: Option<&PathFragment>,
    ) -> NavResult<Outcome<N>> {
        let node = match self.stack.refresh_top() {
            Ok(node) => node,
            Err(err) => self.recover(err, host)?,
        };
        debug_assert_eq!(self.path.len() + 1, self.stack.depth());

        let back_to = self.stack.can_go_back().then(|| self.path.parent_path());
        self.choices = self.builder.build(&node, back_to.as_deref());
        let preselected = previous
            .and_then(|fragment| {
                self.choices
                    .iter()
                    .position(|choice| choice.fragment().as_ref() == Some(fragment))
            })
            .unwrap_or(0);
        host.chooser.post(&self.choices, preselected);
        self.state = SessionState::AwaitingSelection;
        Ok(Outcome::Posted)
    }

    /// The live top node, or `None` after stale recovery re-posted.
    fn live_top(&mut self, host: &mut Host<'_>) -> NavResult<Option<Node<N>>> {
        match self.stack.refresh_top() {
            Ok(node) => Ok(Some(node)),
            Err(err) => {
                let node = self.recover(err, host)?;
                let back_to = self.stack.can_go_back().then(|| self.path.parent_path());
                self.choices = self.builder.build(&node, back_to.as_deref());
                host.chooser.post(&self.choices, 0);
                self.state = SessionState::AwaitingSelection;
                Ok(None)
            }
        }
    }

    /// Walk down to the deepest frame that still resolves.
    fn recover(&mut self, cause: NavError, host: &mut Host<'_>) -> NavResult<Node<N>> {
        if !matches!(
            cause,
            NavError::StaleNode { .. } | NavError::NotNavigable { .. } | NavError::Provider(_)
        ) {
            return Err(cause);
        }
        let stale = self.path.current_path();
        warn!(path = %stale, error = %cause, "current node is stale");

        while self.stack.can_go_back() {
            self.stack.truncate(self.stack.depth() - 1);
            self.path.truncate(self.stack.depth() - 1);
            if let Ok(node) = self.stack.refresh_top() {
                host.status(&format!(
                    "{} is no longer valid; returned to {}",
                    stale, self.path
                ));
                return Ok(node);
            }
        }

        match self.fresh_default_root() {
            Some(root) => {
                let label = root.role_summary().label();
                info!(root = %label, "session restarted at default root");
                self.stack.reset(root);
                self.path.clear();
                self.pending_set = None;
                host.status(&format!(
                    "{} is no longer valid; restarted at {}",
                    stale, label
                ));
                self.stack.refresh_top()
            }
            None => {
                self.reset();
                Err(NavError::StaleNode { path: stale })
            }
        }
    }

    /// Report a provider failure and re-post the current choices unchanged.
    fn report_failure(&mut self, host: &mut Host<'_>, message: String) -> Outcome<N> {
        warn!(%message, "selection failed");
        host.status(&message);
        host.chooser.post(&self.choices, 0);
        self.state = SessionState::AwaitingSelection;
        Outcome::Posted
    }

    fn fresh_default_root(&self) -> Option<N> {
        self.default_root
            .as_ref()
            .and_then(|provider| provider())
            .filter(|root| root.is_valid())
    }

    fn is_rooted_at(&self, root: &N) -> bool {
        self.root().is_some_and(|current| current.same_node(root))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderError;
    use crate::interaction::RecordingChooser;
    use crate::memory::{MemoryNode, MemoryTree};

    const DOCUMENT: &str = r#"{
        "root": "win",
        "nodes": {
            "win": {
                "role": "window",
                "attributes": {
                    "title": "X",
                    "count": 2,
                    "children": [{"$ref": "b1"}, {"$ref": "b2"}]
                },
                "settable": ["title"],
                "actions": {"raise": "Bring to front"}
            },
            "b1": {"role": "button", "parent": "win", "actions": {"press": "Press"}},
            "b2": {"role": "button", "parent": "win"}
        }
    }"#;

    struct Harness {
        chooser: RecordingChooser,
        sink: Vec<String>,
    }

    impl Harness {
        fn new() -> Self {
            Harness {
                chooser: RecordingChooser::new(),
                sink: Vec::new(),
            }
        }

        fn run<T>(
            &mut self,
            modifier: bool,
            f: impl FnOnce(&mut Host<'_>) -> T,
        ) -> T {
            let mut host = Host::new(&mut self.chooser, &modifier, &mut self.sink);
            f(&mut host)
        }
    }

    fn find(session: &Session<MemoryNode>, text: &str) -> Choice {
        session
            .choices()
            .iter()
            .find(|choice| choice.text.starts_with(text))
            .cloned()
            .unwrap_or_else(|| panic!("no choice {text:?} in {:?}", session.choices()))
    }

    fn started() -> (MemoryTree, Session<MemoryNode>, Harness) {
        let tree = MemoryTree::from_json_str(DOCUMENT).unwrap();
        let mut session = Session::default();
        let mut harness = Harness::new();
        let root = tree.root().unwrap();
        harness.run(false, |host| session.start(root, host)).unwrap();
        (tree, session, harness)
    }

    #[test]
    fn start_posts_root_choices() {
        let (_tree, session, harness) = started();
        assert_eq!(session.state(), SessionState::AwaitingSelection);
        assert_eq!(session.current_path(), "root");
        assert_eq!(session.depth(), 1);
        let (choices, preselected) = harness.chooser.last_post().unwrap();
        assert_eq!(preselected, 0);
        assert!(!choices.iter().any(Choice::is_back));
        assert_eq!(choices[0].text, "Action: raise");
    }

    #[test]
    fn select_scalar_emits_value() {
        let (_tree, mut session, mut harness) = started();
        let count = find(&session, "count");
        let outcome = harness
            .run(false, |host| session.select(Some(&count), host))
            .unwrap();
        assert_eq!(outcome.path(), Some("root(\"count\")"));
        assert_eq!(harness.sink, vec!["root(\"count\") = 2"]);
        assert_eq!(session.state(), SessionState::Idle);
        assert_eq!(session.current_path(), "root");
    }

    #[test]
    fn descend_and_back_preselects_previous_choice() {
        let (_tree, mut session, mut harness) = started();
        let children = find(&session, "children");
        harness
            .run(false, |host| session.select(Some(&children), host))
            .unwrap();
        assert_eq!(session.current_path(), "root(\"children\")");
        assert!(session.choices()[0].is_back());

        let back = session.choices()[0].clone();
        harness
            .run(false, |host| session.select(Some(&back), host))
            .unwrap();
        assert_eq!(session.current_path(), "root");
        let (choices, preselected) = harness.chooser.last_post().unwrap();
        assert!(choices[preselected].text.starts_with("children"));
    }

    #[test]
    fn action_requires_modifier() {
        let (tree, mut session, mut harness) = started();
        let raise = find(&session, "Action: raise");
        let posts = harness.chooser.post_count();

        let outcome = harness
            .run(false, |host| session.select(Some(&raise), host))
            .unwrap();
        assert!(matches!(outcome, Outcome::Posted));
        assert_eq!(harness.chooser.post_count(), posts + 1);
        assert!(tree.performed_actions("win").unwrap().is_empty());

        let outcome = harness
            .run(true, |host| session.select(Some(&raise), host))
            .unwrap();
        assert_eq!(outcome.path(), Some("root:performAction(\"raise\")"));
        assert_eq!(tree.performed_actions("win").unwrap(), vec!["raise"]);
    }

    #[test]
    fn prepare_and_commit_set() {
        let (tree, mut session, mut harness) = started();
        let title = find(&session, "title");
        let outcome = harness
            .run(true, |host| session.select(Some(&title), host))
            .unwrap();
        assert!(matches!(outcome, Outcome::PrepareSet { .. }));
        assert_eq!(
            harness.sink[0],
            "root:setAttributeValue(\"title\", <value>) (current value: \"X\")"
        );
        assert_eq!(session.pending_set(), Some(("root", "title")));

        harness
            .run(false, |host| session.commit_set(Value::from("Y"), host))
            .unwrap();
        assert_eq!(harness.sink[1], "root(\"title\") = \"Y\"");
        let title = tree.root().unwrap().attribute_value("title").unwrap();
        assert_eq!(title.as_scalar().map(ToString::to_string), Some("Y".to_string()));
        assert!(matches!(
            harness.run(false, |host| session.commit_set(Value::from("Z"), host)),
            Err(NavError::NoPendingSet)
        ));
    }

    #[test]
    fn failed_commit_is_reported_and_stays_pending() {
        let (tree, mut session, mut harness) = started();
        let title = find(&session, "title");
        harness
            .run(true, |host| session.select(Some(&title), host))
            .unwrap();
        tree.remove_node("win").unwrap();

        let result = harness.run(false, |host| session.commit_set(Value::from("Y"), host));
        assert!(matches!(
            result,
            Err(NavError::Provider(ProviderError::InvalidElement))
        ));
        let expected =
            "root:setAttributeValue(\"title\", <value>) failed: element is no longer valid";
        assert_eq!(harness.sink.last().map(String::as_str), Some(expected));
        assert_eq!(
            harness.chooser.statuses().last().map(String::as_str),
            Some(expected)
        );
        assert_eq!(session.pending_set(), Some(("root", "title")));
    }

    #[test]
    fn unreadable_settable_attribute_can_still_be_set() {
        let tree = MemoryTree::from_json_str(
            r#"{"root": "w", "nodes": {
                "w": {"role": "window", "attributes": {"count": 1}, "settable": ["title"]}
            }}"#,
        )
        .unwrap();
        let mut session = Session::default();
        let mut harness = Harness::new();
        let root = tree.root().unwrap();
        harness.run(false, |host| session.start(root, host)).unwrap();
        let title = Choice {
            selector: Selector::Attribute("title".to_string()),
            ..find(&session, "count")
        };

        let outcome = harness
            .run(true, |host| session.select(Some(&title), host))
            .unwrap();
        assert!(matches!(outcome, Outcome::PrepareSet { .. }));
        assert_eq!(
            harness.sink.last().map(String::as_str),
            Some("root:setAttributeValue(\"title\", <value>) (current value: \"<unavailable: no such attribute: title>\")")
        );

        harness
            .run(false, |host| session.commit_set(Value::from("Y"), host))
            .unwrap();
        let title = tree.root().unwrap().attribute_value("title").unwrap();
        assert_eq!(title.as_scalar().map(ToString::to_string), Some("Y".to_string()));
    }

    #[test]
    fn unreadable_attribute_is_reported_without_modifier() {
        let (_tree, mut session, mut harness) = started();
        let missing = Choice {
            selector: Selector::Attribute("missing".to_string()),
            ..find(&session, "count")
        };
        for modifier in [false, true] {
            let outcome = harness
                .run(modifier, |host| session.select(Some(&missing), host))
                .unwrap();
            assert!(matches!(outcome, Outcome::Posted));
            assert_eq!(
                harness.chooser.statuses().last().map(String::as_str),
                Some("cannot read root(\"missing\"): no such attribute: missing")
            );
        }
        assert_eq!(session.pending_set(), None);
    }

    #[test]
    fn cancel_then_resume_keeps_position() {
        let (_tree, mut session, mut harness) = started();
        let children = find(&session, "children");
        harness
            .run(false, |host| session.select(Some(&children), host))
            .unwrap();
        harness.chooser.answer();
        let outcome = harness.run(false, |host| session.select(None, host)).unwrap();
        assert!(matches!(outcome, Outcome::Cancelled));

        let outcome = harness.run(false, |host| session.browse(None, host)).unwrap();
        assert!(matches!(outcome, Outcome::Posted));
        assert_eq!(session.current_path(), "root(\"children\")");
    }

    #[test]
    fn browse_toggles_visible_chooser() {
        let (tree, mut session, mut harness) = started();
        let root = tree.root();
        let outcome = harness.run(false, |host| session.browse(root, host)).unwrap();
        assert!(matches!(outcome, Outcome::Dismissed));
        assert_eq!(harness.chooser.dismissals(), 1);
        assert_eq!(session.state(), SessionState::Idle);
    }

    #[test]
    fn browse_with_other_root_restarts() {
        let (tree, mut session, mut harness) = started();
        harness.chooser.answer();
        let button = tree.node("b1").unwrap();
        harness
            .run(false, |host| session.browse(Some(button.clone()), host))
            .unwrap();
        assert!(session.root().unwrap().same_node(&button));
        assert!(harness
            .chooser
            .statuses()
            .iter()
            .any(|status| status == "button (in window)"));
    }

    #[test]
    fn select_while_idle_is_invalid() {
        let mut session: Session<MemoryNode> = Session::default();
        let mut harness = Harness::new();
        let result = harness.run(false, |host| session.select(None, host));
        assert!(matches!(result, Err(NavError::InvalidState { .. })));
    }

    #[test]
    fn back_at_root_underflows_and_resets() {
        let (_tree, mut session, mut harness) = started();
        let forged = Choice::back("root");
        let result = harness.run(false, |host| session.select(Some(&forged), host));
        assert!(matches!(result, Err(NavError::StackUnderflow)));
        assert_eq!(session.state(), SessionState::Idle);
        assert_eq!(session.depth(), 0);
    }

    #[test]
    fn failed_action_reposts_without_moving() {
        let tree = MemoryTree::from_json_str(
            r#"{"root": "a", "nodes": {"a": {"actions": {"boom": {"fails": "refused"}}}}}"#,
        )
        .unwrap();
        let mut session = Session::default();
        let mut harness = Harness::new();
        let root = tree.root().unwrap();
        harness.run(false, |host| session.start(root, host)).unwrap();
        let boom = session.choices()[0].clone();

        let outcome = harness
            .run(true, |host| session.select(Some(&boom), host))
            .unwrap();
        assert!(matches!(outcome, Outcome::Posted));
        assert_eq!(session.state(), SessionState::AwaitingSelection);
        assert_eq!(harness.sink, vec!["root:performAction(\"boom\") failed: refused"]);
    }

    #[test]
    fn stale_root_without_default_is_an_error() {
        let (tree, mut session, mut harness) = started();
        harness.chooser.answer();
        tree.remove_node("win").unwrap();
        let result = harness.run(false, |host| session.resume(host));
        assert!(matches!(result, Err(NavError::StaleNode { .. })));
        assert_eq!(session.depth(), 0);
    }

    #[test]
    fn stale_root_restarts_at_default_root() {
        let tree = MemoryTree::from_json_str(DOCUMENT).unwrap();
        let fallback = tree.clone();
        let mut session =
            Session::default().with_default_root(move || fallback.node("b2").ok());
        let mut harness = Harness::new();
        let root = tree.root().unwrap();
        harness.run(false, |host| session.start(root, host)).unwrap();
        harness.chooser.answer();
        tree.remove_node("win").unwrap();

        harness.run(false, |host| session.resume(host)).unwrap();
        assert_eq!(session.root().map(MemoryNode::id), Some("b2".to_string()));
        assert_eq!(
            harness.sink.last().map(String::as_str),
            Some("root is no longer valid; restarted at button")
        );
    }
}
