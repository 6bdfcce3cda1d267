//! In-memory attributed tree.
//!
//! [`MemoryTree`] is a live tree provider held entirely in memory. It backs the
//! CLI (trees are loaded from JSON documents) and the test-suite. Handles are
//! [`MemoryNode`]s; they stay cheap to clone and observe every later change to
//! the tree, including removal.
//!
//! ## Document Format
//!
//! ```json
//! {
//!   "root": "app",
//!   "nodes": {
//!     "app": {
//!       "role": "application",
//!       "description": "Finder",
//!       "attributes": {
//!         "title": "Finder",
//!         "windows": [{"$ref": "win"}],
//!         "frame": {"x": 0, "y": 0}
//!       },
//!       "settable": ["title"],
//!       "actions": {
//!         "raise": "Bring to front",
//!         "close": {"description": "Close", "removes": true}
//!       },
//!       "parameterized_actions": ["lineForIndex"]
//!     },
//!     "win": {"role": "window", "parent": "app"}
//!   }
//! }
//! ```
//!
//! - `{"$ref": "<id>"}` is an object node.
//! - Arrays are sequences keyed `1..=n`.
//! - Other objects are collections; keys that parse as positive integers
//!   become index keys, all others are name keys.
//! - A node without an `actions` (or `parameterized_actions`) field does not
//!   support that capability at all.

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::error::{ProviderError, ProviderResult};
use crate::node::{Key, NodeAdapter, Scalar, Value};

// ============================================================================
// Errors
// ============================================================================

/// Errors that can occur while loading a tree document.
#[derive(Debug, Error)]
pub enum MemoryTreeError {
    /// Document could not be read.
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Document is not valid JSON or does not match the schema.
    #[error("invalid tree document: {0}")]
    Json(#[from] serde_json::Error),

    /// A node id was requested that the document does not define.
    #[error("unknown node: {id}")]
    UnknownNode { id: String },

    /// A `$ref` or `parent` points at an undefined node.
    #[error("node {from} references unknown node {id}")]
    UnknownReference { from: String, id: String },

    /// A value cannot be stored in this tree.
    #[error("invalid value: {reason}")]
    InvalidValue { reason: String },
}

// ============================================================================
// Document Schema
// ============================================================================

#[derive(Debug, Deserialize)]
struct DocumentSchema {
    #[serde(default)]
    root: Option<String>,
    nodes: BTreeMap<String, NodeSchema>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct NodeSchema {
    role: Option<String>,
    subrole: Option<String>,
    description: Option<String>,
    parent: Option<String>,
    attributes: BTreeMap<String, serde_json::Value>,
    settable: Vec<String>,
    actions: Option<BTreeMap<String, ActionSchema>>,
    parameterized_actions: Option<Vec<String>>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum ActionSchema {
    Description(String),
    Detailed {
        #[serde(default)]
        description: String,
        /// Performing the action removes the node from the tree.
        #[serde(default)]
        removes: bool,
        /// Performing the action fails with this message.
        #[serde(default)]
        fails: Option<String>,
    },
}

impl ActionSchema {
    fn description(&self) -> &str {
        match self {
            ActionSchema::Description(description) => description,
            ActionSchema::Detailed { description, .. } => description,
        }
    }
}

// ============================================================================
// Tree State
// ============================================================================

#[derive(Debug, Clone)]
enum Stored {
    Ref(usize),
    Collection(BTreeMap<Key, Stored>),
    Scalar(Scalar),
}

#[derive(Debug)]
struct NodeRecord {
    id: String,
    role: Option<String>,
    subrole: Option<String>,
    description: Option<String>,
    parent: Option<usize>,
    attributes: BTreeMap<String, Stored>,
    settable: BTreeSet<String>,
    actions: Option<BTreeMap<String, ActionSchema>>,
    parameterized_actions: Option<Vec<String>>,
    removed: bool,
    performed: Vec<String>,
}

#[derive(Debug, Default)]
struct TreeState {
    nodes: Vec<NodeRecord>,
    ids: HashMap<String, usize>,
    root: Option<usize>,
}

impl TreeState {
    fn record(&self, index: usize) -> ProviderResult<&NodeRecord> {
        match self.nodes.get(index) {
            Some(record) if !record.removed => Ok(record),
            _ => Err(ProviderError::InvalidElement),
        }
    }

    fn record_mut(&mut self, index: usize) -> ProviderResult<&mut NodeRecord> {
        match self.nodes.get_mut(index) {
            Some(record) if !record.removed => Ok(record),
            _ => Err(ProviderError::InvalidElement),
        }
    }
}

// ============================================================================
// Memory Tree
// ============================================================================

/// A live, in-memory attributed tree.
#[derive(Clone, Default)]
pub struct MemoryTree {
    state: Rc<RefCell<TreeState>>,
}

impl fmt::Debug for MemoryTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("MemoryTree")
            .field("nodes", &state.nodes.len())
            .field("root", &state.root.map(|index| state.nodes[index].id.clone()))
            .finish()
    }
}

impl MemoryTree {
    /// Load a tree document from a file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, MemoryTreeError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| MemoryTreeError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&content)
    }

    /// Load a tree document from a JSON string.
    pub fn from_json_str(content: &str) -> Result<Self, MemoryTreeError> {
        let document: DocumentSchema = serde_json::from_str(content)?;

        // Pass 1: assign indices so references can resolve in any order.
        let ids: HashMap<String, usize> = document
            .nodes
            .keys()
            .enumerate()
            .map(|(index, id)| (id.clone(), index))
            .collect();

        // Pass 2: convert node schemas.
        let mut nodes = Vec::with_capacity(document.nodes.len());
        for (id, schema) in document.nodes {
            let parent = schema
                .parent
                .as_ref()
                .map(|parent| lookup(&ids, &id, parent))
                .transpose()?;
            let attributes = schema
                .attributes
                .iter()
                .map(|(name, value)| Ok((name.clone(), convert_json(value, &ids, &id)?)))
                .collect::<Result<BTreeMap<_, _>, MemoryTreeError>>()?;
            nodes.push(NodeRecord {
                id,
                role: schema.role,
                subrole: schema.subrole,
                description: schema.description,
                parent,
                attributes,
                settable: schema.settable.into_iter().collect(),
                actions: schema.actions,
                parameterized_actions: schema.parameterized_actions,
                removed: false,
                performed: Vec::new(),
            });
        }

        let root = match document.root {
            Some(root) => Some(*ids.get(&root).ok_or(MemoryTreeError::UnknownNode { id: root })?),
            None => None,
        };

        debug!(nodes = nodes.len(), "loaded tree document");
        Ok(MemoryTree {
            state: Rc::new(RefCell::new(TreeState { nodes, ids, root })),
        })
    }

    /// The document's declared root, if it declares one and it still exists.
    pub fn root(&self) -> Option<MemoryNode> {
        let root = self.state.borrow().root?;
        let node = self.handle(root);
        node.is_valid().then_some(node)
    }

    /// Handle to the node with the given id.
    pub fn node(&self, id: &str) -> Result<MemoryNode, MemoryTreeError> {
        let index = self
            .state
            .borrow()
            .ids
            .get(id)
            .copied()
            .ok_or_else(|| MemoryTreeError::UnknownNode { id: id.to_string() })?;
        Ok(self.handle(index))
    }

    /// Remove a node. Existing handles to it become invalid.
    pub fn remove_node(&self, id: &str) -> Result<(), MemoryTreeError> {
        let node = self.node(id)?;
        self.state.borrow_mut().nodes[node.index].removed = true;
        debug!(id, "removed node");
        Ok(())
    }

    /// Replace an attribute regardless of whether it is settable.
    pub fn replace_attribute(
        &self,
        id: &str,
        name: &str,
        value: Value<MemoryNode>,
    ) -> Result<(), MemoryTreeError> {
        let node = self.node(id)?;
        let stored = self.store(value)?;
        self.state.borrow_mut().nodes[node.index]
            .attributes
            .insert(name.to_string(), stored);
        Ok(())
    }

    /// Actions performed on a node, in order.
    pub fn performed_actions(&self, id: &str) -> Result<Vec<String>, MemoryTreeError> {
        let node = self.node(id)?;
        Ok(self.state.borrow().nodes[node.index].performed.clone())
    }

    /// Convert a JSON value into a value of this tree, resolving `$ref`s.
    pub fn value_from_json(
        &self,
        json: &serde_json::Value,
    ) -> Result<Value<MemoryNode>, MemoryTreeError> {
        let stored = convert_json(json, &self.state.borrow().ids, "<input>")?;
        Ok(self.load(&stored))
    }

    fn handle(&self, index: usize) -> MemoryNode {
        MemoryNode {
            tree: self.clone(),
            index,
        }
    }

    fn load(&self, stored: &Stored) -> Value<MemoryNode> {
        match stored {
            Stored::Ref(index) => Value::Object(self.handle(*index)),
            Stored::Collection(entries) => Value::Collection(
                entries
                    .iter()
                    .map(|(key, value)| (key.clone(), self.load(value)))
                    .collect(),
            ),
            Stored::Scalar(scalar) => Value::Scalar(scalar.clone()),
        }
    }

    fn store(&self, value: Value<MemoryNode>) -> Result<Stored, MemoryTreeError> {
        match value {
            Value::Object(node) if Rc::ptr_eq(&node.tree.state, &self.state) => {
                Ok(Stored::Ref(node.index))
            }
            Value::Object(node) => Err(MemoryTreeError::InvalidValue {
                reason: format!("node {:?} belongs to a different tree", node),
            }),
            Value::Collection(collection) => {
                let mut entries = BTreeMap::new();
                for (key, entry) in collection.iter() {
                    entries.insert(key.clone(), self.store(entry.clone())?);
                }
                Ok(Stored::Collection(entries))
            }
            Value::Scalar(scalar) => Ok(Stored::Scalar(scalar)),
        }
    }
}

fn lookup(ids: &HashMap<String, usize>, from: &str, id: &str) -> Result<usize, MemoryTreeError> {
    ids.get(id)
        .copied()
        .ok_or_else(|| MemoryTreeError::UnknownReference {
            from: from.to_string(),
            id: id.to_string(),
        })
}

fn parse_key(key: &str) -> Key {
    match key.parse::<u64>() {
        Ok(index) if index > 0 => Key::Index(index),
        _ => Key::Name(key.to_string()),
    }
}

fn convert_json(
    value: &serde_json::Value,
    ids: &HashMap<String, usize>,
    owner: &str,
) -> Result<Stored, MemoryTreeError> {
    use serde_json::Value as Json;

    Ok(match value {
        Json::Null => Stored::Scalar(Scalar::Null),
        Json::Bool(flag) => Stored::Scalar(Scalar::Bool(*flag)),
        Json::Number(number) => match number.as_i64() {
            Some(integer) => Stored::Scalar(Scalar::Integer(integer)),
            None => Stored::Scalar(Scalar::Float(number.as_f64().unwrap_or(f64::NAN))),
        },
        Json::String(text) => Stored::Scalar(Scalar::Text(text.clone())),
        Json::Array(items) => Stored::Collection(
            items
                .iter()
                .enumerate()
                .map(|(offset, item)| {
                    Ok((Key::Index(offset as u64 + 1), convert_json(item, ids, owner)?))
                })
                .collect::<Result<_, MemoryTreeError>>()?,
        ),
        Json::Object(map) => match (map.len(), map.get("$ref")) {
            (1, Some(Json::String(target))) => Stored::Ref(lookup(ids, owner, target)?),
            _ => Stored::Collection(
                map.iter()
                    .map(|(key, item)| Ok((parse_key(key), convert_json(item, ids, owner)?)))
                    .collect::<Result<_, MemoryTreeError>>()?,
            ),
        },
    })
}

// ============================================================================
// Memory Node
// ============================================================================

/// Handle to one node of a [`MemoryTree`].
#[derive(Clone)]
pub struct MemoryNode {
    tree: MemoryTree,
    index: usize,
}

impl MemoryNode {
    /// The node's id in the source document.
    pub fn id(&self) -> String {
        self.tree.state.borrow().nodes[self.index].id.clone()
    }

    /// The tree this node belongs to.
    pub fn tree(&self) -> &MemoryTree {
        &self.tree
    }

    fn with_record<T>(&self, f: impl FnOnce(&NodeRecord) -> ProviderResult<T>) -> ProviderResult<T> {
        let state = self.tree.state.borrow();
        f(state.record(self.index)?)
    }
}

impl fmt::Debug for MemoryNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MemoryNode({})", self.id())
    }
}

/// Identity of a [`MemoryNode`]: the tree's allocation plus the node index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MemoryNodeId {
    tree: usize,
    index: usize,
}

impl NodeAdapter for MemoryNode {
    type Identity = MemoryNodeId;

    fn identity(&self) -> MemoryNodeId {
        MemoryNodeId {
            tree: Rc::as_ptr(&self.tree.state) as usize,
            index: self.index,
        }
    }

    fn is_valid(&self) -> bool {
        self.tree
            .state
            .borrow()
            .nodes
            .get(self.index)
            .is_some_and(|record| !record.removed)
    }

    fn attribute_names(&self) -> ProviderResult<Vec<String>> {
        self.with_record(|record| Ok(record.attributes.keys().cloned().collect()))
    }

    fn attribute_value(&self, name: &str) -> ProviderResult<Value<Self>> {
        let stored = self.with_record(|record| {
            record
                .attributes
                .get(name)
                .cloned()
                .ok_or_else(|| ProviderError::NoSuchAttribute {
                    name: name.to_string(),
                })
        })?;
        Ok(self.tree.load(&stored))
    }

    fn is_attribute_settable(&self, name: &str) -> ProviderResult<bool> {
        self.with_record(|record| Ok(record.settable.contains(name)))
    }

    fn set_attribute_value(&self, name: &str, value: Value<Self>) -> ProviderResult<()> {
        if !self.is_attribute_settable(name)? {
            return Err(ProviderError::NotSettable {
                name: name.to_string(),
            });
        }
        let stored = self
            .tree
            .store(value)
            .map_err(|err| ProviderError::failed(err.to_string()))?;
        let mut state = self.tree.state.borrow_mut();
        state
            .record_mut(self.index)?
            .attributes
            .insert(name.to_string(), stored);
        debug!(node = self.index, attribute = name, "attribute written");
        Ok(())
    }

    fn action_names(&self) -> ProviderResult<Vec<String>> {
        self.with_record(|record| match &record.actions {
            Some(actions) => Ok(actions.keys().cloned().collect()),
            None => Err(ProviderError::unsupported("actions")),
        })
    }

    fn action_description(&self, name: &str) -> ProviderResult<String> {
        self.with_record(|record| {
            let actions = record
                .actions
                .as_ref()
                .ok_or_else(|| ProviderError::unsupported("actions"))?;
            actions
                .get(name)
                .map(|action| action.description().to_string())
                .ok_or_else(|| ProviderError::NoSuchAction {
                    name: name.to_string(),
                })
        })
    }

    fn perform_action(&self, name: &str) -> ProviderResult<()> {
        let mut state = self.tree.state.borrow_mut();
        let record = state.record_mut(self.index)?;
        let action = record
            .actions
            .as_ref()
            .ok_or_else(|| ProviderError::unsupported("actions"))?
            .get(name)
            .cloned()
            .ok_or_else(|| ProviderError::NoSuchAction {
                name: name.to_string(),
            })?;

        if let ActionSchema::Detailed {
            fails: Some(message),
            ..
        } = &action
        {
            return Err(ProviderError::failed(message.clone()));
        }

        record.performed.push(name.to_string());
        if let ActionSchema::Detailed { removes: true, .. } = action {
            record.removed = true;
        }
        debug!(node = self.index, action = name, "action performed");
        Ok(())
    }

    fn parameterized_action_names(&self) -> ProviderResult<Vec<String>> {
        self.with_record(|record| match &record.parameterized_actions {
            Some(names) => Ok(names.clone()),
            None => Err(ProviderError::unsupported("parameterized actions")),
        })
    }

    fn parent(&self) -> Option<Self> {
        let parent = self.tree.state.borrow().nodes.get(self.index)?.parent?;
        Some(self.tree.handle(parent))
    }

    fn role(&self) -> Option<String> {
        self.tree.state.borrow().nodes.get(self.index)?.role.clone()
    }

    fn subrole(&self) -> Option<String> {
        self.tree.state.borrow().nodes.get(self.index)?.subrole.clone()
    }

    fn role_description(&self) -> Option<String> {
        self.tree
            .state
            .borrow()
            .nodes
            .get(self.index)?
            .description
            .clone()
    }
}
