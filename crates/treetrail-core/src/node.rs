//! Node model: the capability view over a live attributed tree.
//!
//! A tree provider exposes its elements through [`NodeAdapter`]. Everything the
//! engine displays is a [`Node`], a tagged union of an object node (an adapter
//! handle) and a collection node (a [`CollectionView`] read through an object's
//! attribute). Attribute reads produce [`Value`]s, which are either objects,
//! collections or scalars.
//!
//! # Collections
//!
//! A [`Collection`] is an ordered map from [`Key`] to [`Value`]. When every
//! key is a positive index it is a *sequence*; otherwise it is a key/value
//! map. Keys order indices before names, indices numerically and names
//! lexicographically, so entries `9, 10, 2` always list as `2, 9, 10`.
//!
//! # Identity
//!
//! Two adapters denote the same node iff their [`NodeAdapter::Identity`]
//! values are equal. Cycle detection in the dumper and the "same root" check
//! in the session both rely on it.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::hash::Hash;

use crate::error::ProviderResult;

// ============================================================================
// Node Adapter
// ============================================================================

/// Capability-based view over a single live object node.
///
/// Handles are cheap to clone and refer to the underlying element; mutating
/// operations take `&self` because the element lives in the provider, not in
/// the handle.
///
/// Capability queries return [`ProviderError::Unsupported`] when a node does
/// not offer that capability at all. Consumers treat that as an empty list.
///
/// [`ProviderError::Unsupported`]: crate::error::ProviderError::Unsupported
pub trait NodeAdapter: Clone + fmt::Debug {
    /// Referential identity of the underlying element.
    type Identity: Clone + Eq + Hash + fmt::Debug;

    fn identity(&self) -> Self::Identity;

    /// Whether the underlying element still exists.
    ///
    /// This can turn false at any time when the provider's state changes.
    fn is_valid(&self) -> bool;

    fn attribute_names(&self) -> ProviderResult<Vec<String>>;

    fn attribute_value(&self, name: &str) -> ProviderResult<Value<Self>>;

    fn is_attribute_settable(&self, name: &str) -> ProviderResult<bool>;

    fn set_attribute_value(&self, name: &str, value: Value<Self>) -> ProviderResult<()>;

    fn action_names(&self) -> ProviderResult<Vec<String>>;

    fn action_description(&self, name: &str) -> ProviderResult<String>;

    fn perform_action(&self, name: &str) -> ProviderResult<()>;

    fn parameterized_action_names(&self) -> ProviderResult<Vec<String>>;

    fn parent(&self) -> Option<Self>;

    fn role(&self) -> Option<String>;

    fn subrole(&self) -> Option<String> {
        None
    }

    fn role_description(&self) -> Option<String> {
        None
    }

    /// Whether both handles wrap the same underlying element.
    fn same_node(&self, other: &Self) -> bool {
        self.identity() == other.identity()
    }

    fn role_summary(&self) -> RoleSummary {
        RoleSummary {
            role: self.role(),
            subrole: self.subrole(),
            description: self.role_description(),
        }
    }
}

/// Labels of a node's ancestors, nearest first.
///
/// Stops at the top of the tree or at the first repeated ancestor.
pub fn ancestry<N: NodeAdapter>(node: &N) -> Vec<String> {
    let mut labels = Vec::new();
    let mut seen = HashSet::new();
    seen.insert(node.identity());

    let mut current = node.parent();
    while let Some(parent) = current {
        if !seen.insert(parent.identity()) {
            break;
        }
        labels.push(parent.role_summary().label());
        current = parent.parent();
    }
    labels
}

// ============================================================================
// Role Summary
// ============================================================================

const UNKNOWN: &str = "<unknown>";

/// Role, subrole and description of an object node.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoleSummary {
    pub role: Option<String>,
    pub subrole: Option<String>,
    pub description: Option<String>,
}

impl RoleSummary {
    /// Short label: the role plus the quoted description when present.
    pub fn label(&self) -> String {
        let role = self.role.as_deref().unwrap_or(UNKNOWN);
        match &self.description {
            Some(description) => format!("{} {:?}", role, description),
            None => role.to_string(),
        }
    }
}

impl fmt::Display for RoleSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "role: {}, subrole: {}, description: {}",
            self.role.as_deref().unwrap_or(UNKNOWN),
            self.subrole.as_deref().unwrap_or(UNKNOWN),
            self.description.as_deref().unwrap_or(UNKNOWN),
        )
    }
}

// ============================================================================
// Keys and Scalars
// ============================================================================

/// Collection key.
///
/// The derived ordering puts every `Index` before every `Name`, compares
/// indices numerically and names lexicographically.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Key {
    /// Positive, 1-based sequence index.
    Index(u64),
    /// Map key.
    Name(String),
}

impl Key {
    pub fn name(name: impl Into<String>) -> Self {
        Key::Name(name.into())
    }

    pub fn is_index(&self) -> bool {
        matches!(self, Key::Index(_))
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Index(index) => write!(f, "{}", index),
            Key::Name(name) => f.write_str(name),
        }
    }
}

/// Non-navigable attribute value.
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
}

impl Scalar {
    /// Source-like literal: text is quoted, everything else prints as-is.
    pub fn literal(&self) -> String {
        match self {
            Scalar::Text(text) => format!("{:?}", text),
            other => other.to_string(),
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Null => f.write_str("null"),
            Scalar::Bool(value) => write!(f, "{}", value),
            Scalar::Integer(value) => write!(f, "{}", value),
            Scalar::Float(value) => write!(f, "{}", value),
            Scalar::Text(value) => f.write_str(value),
        }
    }
}

// ============================================================================
// Values and Collections
// ============================================================================

/// Result of reading an attribute or a collection entry.
#[derive(Debug, Clone)]
pub enum Value<N> {
    Object(N),
    Collection(Collection<N>),
    Scalar(Scalar),
}

impl<N> Value<N> {
    /// Objects and collections can be descended into; scalars cannot.
    pub fn is_expandable(&self) -> bool {
        !matches!(self, Value::Scalar(_))
    }

    pub fn as_scalar(&self) -> Option<&Scalar> {
        match self {
            Value::Scalar(scalar) => Some(scalar),
            _ => None,
        }
    }

    pub fn as_collection(&self) -> Option<&Collection<N>> {
        match self {
            Value::Collection(collection) => Some(collection),
            _ => None,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Object(_) => "object",
            Value::Collection(_) => "collection",
            Value::Scalar(_) => "scalar",
        }
    }
}

impl<N: NodeAdapter> Value<N> {
    /// Literal form used when echoing a value next to a path.
    pub fn literal(&self) -> String {
        match self {
            Value::Scalar(scalar) => scalar.literal(),
            Value::Object(node) => format!("<{}>", node.role_summary().label()),
            Value::Collection(collection) => format!("<{}>", collection.summary()),
        }
    }
}

impl<N> From<Scalar> for Value<N> {
    fn from(scalar: Scalar) -> Self {
        Value::Scalar(scalar)
    }
}

impl<N> From<Collection<N>> for Value<N> {
    fn from(collection: Collection<N>) -> Self {
        Value::Collection(collection)
    }
}

impl<N> From<&str> for Value<N> {
    fn from(text: &str) -> Self {
        Value::Scalar(Scalar::Text(text.to_string()))
    }
}

impl<N> From<String> for Value<N> {
    fn from(text: String) -> Self {
        Value::Scalar(Scalar::Text(text))
    }
}

impl<N> From<i64> for Value<N> {
    fn from(value: i64) -> Self {
        Value::Scalar(Scalar::Integer(value))
    }
}

impl<N> From<f64> for Value<N> {
    fn from(value: f64) -> Self {
        Value::Scalar(Scalar::Float(value))
    }
}

impl<N> From<bool> for Value<N> {
    fn from(value: bool) -> Self {
        Value::Scalar(Scalar::Bool(value))
    }
}

/// Keyed or indexed collection of values.
#[derive(Debug, Clone)]
pub struct Collection<N> {
    entries: BTreeMap<Key, Value<N>>,
}

impl<N> Default for Collection<N> {
    fn default() -> Self {
        Collection {
            entries: BTreeMap::new(),
        }
    }
}

impl<N> Collection<N> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a sequence; keys are assigned `1..=n` in iteration order.
    pub fn sequence(values: impl IntoIterator<Item = Value<N>>) -> Self {
        let entries = values
            .into_iter()
            .enumerate()
            .map(|(offset, value)| (Key::Index(offset as u64 + 1), value))
            .collect();
        Collection { entries }
    }

    pub fn insert(&mut self, key: Key, value: Value<N>) -> Option<Value<N>> {
        self.entries.insert(key, value)
    }

    pub fn get(&self, key: &Key) -> Option<&Value<N>> {
        self.entries.get(key)
    }

    /// Consume the collection and take one entry out of it.
    pub fn into_entry(mut self, key: &Key) -> Option<Value<N>> {
        self.entries.remove(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// A collection is a sequence when every key is a positive index.
    ///
    /// The empty collection counts as a sequence of zero entries.
    pub fn is_sequence(&self) -> bool {
        self.entries
            .keys()
            .all(|key| matches!(key, Key::Index(index) if *index > 0))
    }

    /// Entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&Key, &Value<N>)> {
        self.entries.iter()
    }

    /// `"3 entries"` for sequences, `"key/value map, 2 keys"` for maps.
    pub fn summary(&self) -> String {
        let count = self.len();
        if self.is_sequence() {
            format!("{} {}", count, if count == 1 { "entry" } else { "entries" })
        } else {
            format!(
                "key/value map, {} {}",
                count,
                if count == 1 { "key" } else { "keys" }
            )
        }
    }
}

impl<N> IntoIterator for Collection<N> {
    type Item = (Key, Value<N>);
    type IntoIter = std::collections::btree_map::IntoIter<Key, Value<N>>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl<N> FromIterator<(Key, Value<N>)> for Collection<N> {
    fn from_iter<I: IntoIterator<Item = (Key, Value<N>)>>(iter: I) -> Self {
        Collection {
            entries: iter.into_iter().collect(),
        }
    }
}

// ============================================================================
// Nodes
// ============================================================================

/// A node that can be displayed: an object or a collection view.
#[derive(Debug, Clone)]
pub enum Node<N> {
    Object(N),
    Collection(CollectionView<N>),
}

impl<N: NodeAdapter> Node<N> {
    pub fn is_object_node(&self) -> bool {
        matches!(self, Node::Object(_))
    }

    pub fn is_collection_node(&self) -> bool {
        matches!(self, Node::Collection(_))
    }

    /// The object node this node is, or is read through.
    pub fn owner(&self) -> &N {
        match self {
            Node::Object(node) => node,
            Node::Collection(view) => view.owner(),
        }
    }

    /// Identity comparison.
    ///
    /// Collection views are the same node when they are read through the same
    /// owner, attribute and index path.
    pub fn same_node(&self, other: &Node<N>) -> bool {
        match (self, other) {
            (Node::Object(a), Node::Object(b)) => a.same_node(b),
            (Node::Collection(a), Node::Collection(b)) => {
                a.owner.same_node(&b.owner) && a.attribute == b.attribute && a.indices == b.indices
            }
            _ => false,
        }
    }
}

/// A collection node together with where it was read from.
///
/// The view never stands on its own: it remembers the owning object,
/// attribute and index path so that entries can be re-read from the live
/// attribute value instead of a detached copy.
#[derive(Debug, Clone)]
pub struct CollectionView<N> {
    owner: N,
    attribute: String,
    indices: Vec<Key>,
    entries: Collection<N>,
}

impl<N: NodeAdapter> CollectionView<N> {
    pub fn new(
        owner: N,
        attribute: impl Into<String>,
        indices: Vec<Key>,
        entries: Collection<N>,
    ) -> Self {
        CollectionView {
            owner,
            attribute: attribute.into(),
            indices,
            entries,
        }
    }

    pub fn owner(&self) -> &N {
        &self.owner
    }

    pub fn attribute(&self) -> &str {
        &self.attribute
    }

    pub fn indices(&self) -> &[Key] {
        &self.indices
    }

    /// Entries as they were when the view was resolved.
    pub fn entries(&self) -> &Collection<N> {
        &self.entries
    }

    /// Read one entry from the live attribute value.
    ///
    /// Returns `Ok(None)` when the live value no longer has that entry, or no
    /// longer has the shape this view was read with.
    pub fn live_entry(&self, key: &Key) -> ProviderResult<Option<Value<N>>> {
        let value = self.owner.attribute_value(&self.attribute)?;
        let collection = match walk_indices(value, &self.indices) {
            Some(Value::Collection(collection)) => collection,
            _ => return Ok(None),
        };
        Ok(collection.into_entry(key))
    }
}

/// Follow an index path through nested collections.
pub(crate) fn walk_indices<N>(value: Value<N>, indices: &[Key]) -> Option<Value<N>> {
    indices.iter().try_fold(value, |current, key| match current {
        Value::Collection(collection) => collection.into_entry(key),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryTree;

    #[test]
    fn numeric_keys_sort_numerically() {
        let mut keys = vec![Key::Index(9), Key::Index(10), Key::Index(2)];
        keys.sort();
        assert_eq!(keys, vec![Key::Index(2), Key::Index(9), Key::Index(10)]);
    }

    #[test]
    fn indices_sort_before_names() {
        let mut keys = vec![Key::name("b"), Key::Index(3), Key::name("a")];
        keys.sort();
        assert_eq!(keys, vec![Key::Index(3), Key::name("a"), Key::name("b")]);
    }

    #[test]
    fn sequence_assigns_one_based_keys() {
        let collection: Collection<crate::memory::MemoryNode> =
            Collection::sequence(vec![Value::from(1_i64), Value::from(2_i64)]);
        let keys: Vec<_> = collection.iter().map(|(key, _)| key.clone()).collect();
        assert_eq!(keys, vec![Key::Index(1), Key::Index(2)]);
        assert!(collection.is_sequence());
        assert_eq!(collection.summary(), "2 entries");
    }

    #[test]
    fn map_summary_distinguishes_from_sequence() {
        let collection: Collection<crate::memory::MemoryNode> =
            [(Key::name("x"), Value::from(0_i64)), (Key::name("y"), Value::from(1_i64))]
                .into_iter()
                .collect();
        assert!(!collection.is_sequence());
        assert_eq!(collection.summary(), "key/value map, 2 keys");
    }

    #[test]
    fn empty_collection_is_zero_entry_sequence() {
        let collection: Collection<crate::memory::MemoryNode> = Collection::new();
        assert_eq!(collection.summary(), "0 entries");
    }

    #[test]
    fn scalar_literals_quote_text_only() {
        assert_eq!(Scalar::Text("X".into()).literal(), "\"X\"");
        assert_eq!(Scalar::Integer(7).literal(), "7");
        assert_eq!(Scalar::Text("X".into()).to_string(), "X");
    }

    #[test]
    fn role_summary_degrades_to_unknown() {
        let summary = RoleSummary {
            role: Some("window".into()),
            subrole: None,
            description: None,
        };
        assert_eq!(
            summary.to_string(),
            "role: window, subrole: <unknown>, description: <unknown>"
        );
        assert_eq!(RoleSummary::default().label(), "<unknown>");
    }

    #[test]
    fn walk_indices_follows_nested_collections() {
        let inner: Collection<crate::memory::MemoryNode> =
            Collection::sequence(vec![Value::from("a"), Value::from("b")]);
        let outer = Collection::sequence(vec![Value::Collection(inner)]);
        let found = walk_indices(Value::Collection(outer), &[Key::Index(1), Key::Index(2)]);
        assert_eq!(
            found.and_then(|value| value.as_scalar().cloned()),
            Some(Scalar::Text("b".into()))
        );
    }

    #[test]
    fn ancestry_lists_parents_nearest_first() {
        let tree = MemoryTree::from_json_str(
            r#"{
                "root": "app",
                "nodes": {
                    "app": {"role": "application"},
                    "win": {"role": "window", "parent": "app"},
                    "button": {"role": "button", "parent": "win"}
                }
            }"#,
        )
        .unwrap();
        let button = tree.node("button").unwrap();
        assert_eq!(ancestry(&button), vec!["window", "application"]);
    }
}
