//! Access-path recording.
//!
//! Every forward step of a browsing session appends exactly one
//! [`PathFragment`] to a [`PathRecorder`]; every `back` removes exactly one.
//! Fragments stay typed until display time, so undo is a `Vec::pop` and never
//! a text operation.
//!
//! Rendered, a path reads like an accessor expression against the root:
//!
//! ```text
//! root("children")[2]("title")
//! root("windows")[1]:performAction("raise")
//! ```

use std::fmt;

use crate::error::{NavError, NavResult};
use crate::node::{CollectionView, Key, Node, NodeAdapter, Value};

/// One accessor step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathFragment {
    /// Attribute read: `("name")`.
    Attribute(String),
    /// Collection entry: `[2]` or `["key"]`.
    Index(Key),
    /// Action invocation: `:performAction("name")`.
    Invoke(String),
    /// Parameterized action, left for the operator to complete.
    Parameterized(String),
    /// Attribute write template.
    SetAttribute(String),
}

impl PathFragment {
    /// Whether replaying this fragment leads to another node.
    pub fn is_navigable(&self) -> bool {
        matches!(self, PathFragment::Attribute(_) | PathFragment::Index(_))
    }
}

impl fmt::Display for PathFragment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathFragment::Attribute(name) => write!(f, "({:?})", name),
            PathFragment::Index(Key::Index(index)) => write!(f, "[{}]", index),
            PathFragment::Index(Key::Name(name)) => write!(f, "[{:?}]", name),
            PathFragment::Invoke(name) => write!(f, ":performAction({:?})", name),
            PathFragment::Parameterized(name) => {
                write!(f, ":performParameterizedAction({:?}, ...)", name)
            }
            PathFragment::SetAttribute(name) => write!(f, ":setAttributeValue({:?}, <value>)", name),
        }
    }
}

/// The recorded path from the session root to the current node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathRecorder {
    root_token: String,
    fragments: Vec<PathFragment>,
}

impl PathRecorder {
    pub fn new(root_token: impl Into<String>) -> Self {
        PathRecorder {
            root_token: root_token.into(),
            fragments: Vec::new(),
        }
    }

    pub fn root_token(&self) -> &str {
        &self.root_token
    }

    pub fn fragments(&self) -> &[PathFragment] {
        &self.fragments
    }

    pub fn len(&self) -> usize {
        self.fragments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }

    pub fn append(&mut self, fragment: PathFragment) {
        self.fragments.push(fragment);
    }

    /// Undo the last `append`.
    pub fn remove_last(&mut self) -> Option<PathFragment> {
        self.fragments.pop()
    }

    /// Keep only the first `len` fragments.
    pub fn truncate(&mut self, len: usize) {
        self.fragments.truncate(len);
    }

    pub fn clear(&mut self) {
        self.fragments.clear();
    }

    pub fn current_path(&self) -> String {
        self.render_prefix(self.fragments.len())
    }

    /// The path one step up, i.e. what `back` would return to.
    pub fn parent_path(&self) -> String {
        self.render_prefix(self.fragments.len().saturating_sub(1))
    }

    /// The current path followed by one fragment that is not recorded.
    pub fn render_with(&self, fragment: &PathFragment) -> String {
        format!("{}{}", self.current_path(), fragment)
    }

    fn render_prefix(&self, len: usize) -> String {
        self.fragments[..len]
            .iter()
            .fold(self.root_token.clone(), |mut path, fragment| {
                path.push_str(&fragment.to_string());
                path
            })
    }

    /// Replay the recorded fragments against `root` using only the
    /// [`NodeAdapter`] primitives.
    ///
    /// The result denotes the same node as the top of the navigation stack the
    /// fragments were recorded alongside.
    pub fn resolve<N: NodeAdapter>(&self, root: &N) -> NavResult<Node<N>> {
        let mut current = Value::Object(root.clone());
        let mut owner = root.clone();
        let mut attribute: Option<String> = None;
        let mut indices: Vec<Key> = Vec::new();

        for (position, fragment) in self.fragments.iter().enumerate() {
            let at = || self.render_prefix(position + 1);
            current = match (fragment, current) {
                (PathFragment::Attribute(name), Value::Object(node)) => {
                    let value = node.attribute_value(name)?;
                    owner = node;
                    attribute = Some(name.clone());
                    indices.clear();
                    value
                }
                (PathFragment::Index(key), Value::Collection(collection)) => {
                    indices.push(key.clone());
                    collection
                        .into_entry(key)
                        .ok_or_else(|| NavError::not_navigable(at(), "no such entry"))?
                }
                (PathFragment::Attribute(_), other) | (PathFragment::Index(_), other) => {
                    return Err(NavError::not_navigable(
                        at(),
                        format!("cannot step into a {}", other.kind_name()),
                    ));
                }
                (other, _) => {
                    return Err(NavError::not_navigable(
                        at(),
                        format!("{} is not an accessor", other),
                    ));
                }
            };
            if let Value::Object(node) = &current {
                owner = node.clone();
                attribute = None;
                indices.clear();
            }
        }

        match (current, attribute) {
            (Value::Object(node), _) => Ok(Node::Object(node)),
            (Value::Collection(collection), Some(attribute)) => Ok(Node::Collection(
                CollectionView::new(owner, attribute, indices, collection),
            )),
            (other, _) => Err(NavError::not_navigable(
                self.current_path(),
                format!("path ends at a {}", other.kind_name()),
            )),
        }
    }
}

impl fmt::Display for PathRecorder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.current_path())
    }
}
