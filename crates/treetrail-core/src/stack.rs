//! Navigation stack.
//!
//! A [`Frame`] records how to re-derive one displayed node from the live tree:
//! an object node is its own handle, a collection node is an owner, the
//! attribute it was read from, and the index path into nested collections.
//! Frames never cache the node itself, so every visit reads fresh data.
//!
//! The bottom frame is the session root and is never popped.

use std::fmt;

use tracing::{debug, trace};

use crate::error::{NavError, NavResult};
use crate::node::{walk_indices, CollectionView, Key, Node, NodeAdapter, Value};

// ============================================================================
// Frame
// ============================================================================

/// Re-derivable reference to a displayed node.
#[derive(Debug, Clone)]
pub struct Frame<N> {
    element: N,
    attribute: Option<String>,
    indices: Vec<Key>,
}

impl<N: NodeAdapter> Frame<N> {
    /// Frame displaying an object node.
    pub fn object(element: N) -> Self {
        Frame {
            element,
            attribute: None,
            indices: Vec::new(),
        }
    }

    /// Frame displaying the collection stored in `element`'s attribute.
    pub fn attribute(element: N, name: impl Into<String>) -> Self {
        Frame {
            element,
            attribute: Some(name.into()),
            indices: Vec::new(),
        }
    }

    /// Frame displaying the collection at `key` inside this frame's collection.
    pub fn nested(&self, key: Key) -> Self {
        let mut indices = self.indices.clone();
        indices.push(key);
        Frame {
            element: self.element.clone(),
            attribute: self.attribute.clone(),
            indices,
        }
    }

    pub fn element(&self) -> &N {
        &self.element
    }

    pub fn attribute_name(&self) -> Option<&str> {
        self.attribute.as_deref()
    }

    pub fn indices(&self) -> &[Key] {
        &self.indices
    }

    /// The attribute this frame reads nested collections through.
    ///
    /// `None` unless the frame sits below at least one collection index.
    pub fn nested_chain_attribute(&self) -> Option<&str> {
        if self.indices.is_empty() {
            None
        } else {
            self.attribute.as_deref()
        }
    }

    /// Re-read the node this frame denotes from the live tree.
    pub fn resolve(&self) -> NavResult<Node<N>> {
        if !self.element.is_valid() {
            return Err(NavError::StaleNode {
                path: self.to_string(),
            });
        }
        let Some(attribute) = &self.attribute else {
            return Ok(Node::Object(self.element.clone()));
        };

        let value = self.element.attribute_value(attribute)?;
        match walk_indices(value, &self.indices) {
            Some(Value::Collection(collection)) => Ok(Node::Collection(CollectionView::new(
                self.element.clone(),
                attribute.clone(),
                self.indices.clone(),
                collection,
            ))),
            Some(other) => Err(NavError::not_navigable(
                self.to_string(),
                format!("expected a collection, found a {}", other.kind_name()),
            )),
            None => Err(NavError::not_navigable(self.to_string(), "no such entry")),
        }
    }
}

impl<N: NodeAdapter> fmt::Display for Frame<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}>", self.element.role_summary().label())?;
        if let Some(attribute) = &self.attribute {
            write!(f, "({:?})", attribute)?;
        }
        for key in &self.indices {
            match key {
                Key::Index(index) => write!(f, "[{}]", index)?,
                Key::Name(name) => write!(f, "[{:?}]", name)?,
            }
        }
        Ok(())
    }
}

// ============================================================================
// Navigation Stack
// ============================================================================

/// Stack of frames from the session root to the current node.
#[derive(Debug, Clone)]
pub struct NavigationStack<N> {
    frames: Vec<Frame<N>>,
}

impl<N> Default for NavigationStack<N> {
    fn default() -> Self {
        NavigationStack { frames: Vec::new() }
    }
}

impl<N: NodeAdapter> NavigationStack<N> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole stack with a single root frame.
    pub fn reset(&mut self, root: N) {
        debug!(root = %root.role_summary().label(), "navigation stack reset");
        self.frames.clear();
        self.frames.push(Frame::object(root));
    }

    pub fn clear(&mut self) {
        self.frames.clear();
    }

    pub fn push(&mut self, frame: Frame<N>) {
        trace!(frame = %frame, depth = self.frames.len() + 1, "push");
        self.frames.push(frame);
    }

    /// Remove the current frame.
    ///
    /// The root frame stays: popping it is a [`NavError::StackUnderflow`].
    pub fn pop(&mut self) -> NavResult<Frame<N>> {
        if self.frames.len() <= 1 {
            return Err(NavError::StackUnderflow);
        }
        let frame = self.frames.pop().ok_or(NavError::StackUnderflow)?;
        trace!(frame = %frame, depth = self.frames.len(), "pop");
        Ok(frame)
    }

    /// Remove the current frame and re-derive the one below it.
    pub fn step_back(&mut self) -> NavResult<Node<N>> {
        self.pop()?;
        self.refresh_top()
    }

    /// Keep only the bottom `depth` frames.
    pub fn truncate(&mut self, depth: usize) {
        self.frames.truncate(depth);
    }

    pub fn current(&self) -> Option<&Frame<N>> {
        self.frames.last()
    }

    pub fn root(&self) -> Option<&Frame<N>> {
        self.frames.first()
    }

    pub fn frames(&self) -> &[Frame<N>] {
        &self.frames
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Whether there is a descent to undo.
    pub fn can_go_back(&self) -> bool {
        self.frames.len() > 1
    }

    /// Re-derive the node the current frame denotes.
    pub fn refresh_top(&self) -> NavResult<Node<N>> {
        self.current().ok_or(NavError::NoRoot)?.resolve()
    }
}
