//! Choice construction.
//!
//! [`ChoiceBuilder::build`] turns the current node into the ordered list of
//! selectable entries posted to the chooser:
//!
//! 1. `back`, when a descent exists;
//! 2. for object nodes: actions, then attributes, then parameterized actions,
//!    each group sorted by name;
//! 3. for collection nodes: one entry per key, in key order.
//!
//! The list is a pure function of the node's current capability answers, so
//! building twice against an unchanged tree yields identical choices.

use std::fmt;

use serde::Serialize;
use tracing::{trace, warn};

use crate::error::{ProviderError, ProviderResult};
use crate::node::{Key, Node, NodeAdapter, Value};
use crate::path::PathFragment;

/// What selecting a choice does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChoiceKind {
    /// Return to the previous node.
    Back,
    /// Descend into an object or collection.
    Expandable,
    /// Show a scalar value (or prepare to set it).
    Value,
    /// Invoke an action. Requires the modifier.
    Action,
    /// Emit a parameterized-action template.
    ParameterizedAction,
}

/// Which accessor a choice reaches its target through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector {
    Back,
    Attribute(String),
    Index(Key),
    Action(String),
    ParameterizedAction(String),
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Selector::Back => f.write_str("back"),
            Selector::Attribute(name) => write!(f, "attribute:{}", name),
            Selector::Index(key) => write!(f, "index:{}", key),
            Selector::Action(name) => write!(f, "action:{}", name),
            Selector::ParameterizedAction(name) => write!(f, "parameterized:{}", name),
        }
    }
}

/// One selectable entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Choice {
    pub text: String,
    pub subtext: String,
    pub kind: ChoiceKind,
    pub selector: Selector,
    pub settable: bool,
}

impl Choice {
    pub fn back(target: &str) -> Self {
        Choice {
            text: "<- back".to_string(),
            subtext: format!("Return to {}", target),
            kind: ChoiceKind::Back,
            selector: Selector::Back,
            settable: false,
        }
    }

    pub fn is_back(&self) -> bool {
        self.kind == ChoiceKind::Back
    }

    /// Invoking an action or setting an attribute needs the modifier held.
    pub fn requires_modifier(&self) -> bool {
        self.kind == ChoiceKind::Action || self.settable
    }

    /// The path fragment selecting this choice would record.
    pub fn fragment(&self) -> Option<PathFragment> {
        match &self.selector {
            Selector::Back => None,
            Selector::Attribute(name) => Some(PathFragment::Attribute(name.clone())),
            Selector::Index(key) => Some(PathFragment::Index(key.clone())),
            Selector::Action(name) => Some(PathFragment::Invoke(name.clone())),
            Selector::ParameterizedAction(name) => {
                Some(PathFragment::Parameterized(name.clone()))
            }
        }
    }
}

/// Builds choice lists for nodes.
#[derive(Debug, Clone)]
pub struct ChoiceBuilder {
    modifier_hint: String,
}

impl Default for ChoiceBuilder {
    fn default() -> Self {
        ChoiceBuilder::new("hold the modifier")
    }
}

impl ChoiceBuilder {
    /// `modifier_hint` completes the sentence "... to invoke" in action subtexts.
    pub fn new(modifier_hint: impl Into<String>) -> Self {
        ChoiceBuilder {
            modifier_hint: modifier_hint.into(),
        }
    }

    /// Choices for `node`. `back_to` is the path `back` would return to, if
    /// a descent exists.
    pub fn build<N: NodeAdapter>(&self, node: &Node<N>, back_to: Option<&str>) -> Vec<Choice> {
        let mut choices = Vec::new();
        if let Some(target) = back_to {
            choices.push(Choice::back(target));
        }
        match node {
            Node::Object(element) => self.object_choices(element, &mut choices),
            Node::Collection(view) => {
                for (key, value) in view.entries().iter() {
                    let label = match key {
                        Key::Index(index) => format!("[{}]", index),
                        Key::Name(name) => name.clone(),
                    };
                    choices.push(entry_choice(
                        Selector::Index(key.clone()),
                        label,
                        value,
                        false,
                    ));
                }
            }
        }
        trace!(count = choices.len(), "built choices");
        choices
    }

    fn object_choices<N: NodeAdapter>(&self, element: &N, choices: &mut Vec<Choice>) {
        for name in capability(element.action_names(), "actions") {
            let description = element.action_description(&name).unwrap_or_default();
            let note = format!("{} to invoke", self.modifier_hint);
            let subtext = if description.is_empty() {
                note
            } else {
                format!("{}; {}", description, note)
            };
            choices.push(Choice {
                text: format!("Action: {}", name),
                subtext,
                kind: ChoiceKind::Action,
                selector: Selector::Action(name),
                settable: false,
            });
        }

        for name in capability(element.attribute_names(), "attributes") {
            let settable = element.is_attribute_settable(&name).unwrap_or(false);
            match element.attribute_value(&name) {
                Ok(value) => choices.push(entry_choice(
                    Selector::Attribute(name.clone()),
                    name,
                    &value,
                    settable,
                )),
                Err(err) => choices.push(Choice {
                    text: decorate(name.clone(), false, settable),
                    subtext: format!("Value: <unavailable: {}>", err),
                    kind: ChoiceKind::Value,
                    selector: Selector::Attribute(name),
                    settable,
                }),
            }
        }

        for name in capability(element.parameterized_action_names(), "parameterized actions") {
            choices.push(Choice {
                text: format!("Parameterized: {}", name),
                subtext: String::new(),
                kind: ChoiceKind::ParameterizedAction,
                selector: Selector::ParameterizedAction(name),
                settable: false,
            });
        }
    }
}

fn entry_choice<N: NodeAdapter>(
    selector: Selector,
    label: String,
    value: &Value<N>,
    settable: bool,
) -> Choice {
    let (kind, subtext) = match value {
        Value::Object(node) => (ChoiceKind::Expandable, node.role_summary().to_string()),
        Value::Collection(collection) => (ChoiceKind::Expandable, collection.summary()),
        Value::Scalar(scalar) => (ChoiceKind::Value, format!("Value: {}", scalar.literal())),
    };
    Choice {
        text: decorate(label, kind == ChoiceKind::Expandable, settable),
        subtext,
        kind,
        selector,
        settable,
    }
}

fn decorate(label: String, expandable: bool, settable: bool) -> String {
    let mut text = label;
    if expandable {
        text.push_str(" >");
    }
    if settable {
        text.push_str(" (settable)");
    }
    text
}

/// Names from a capability query, sorted. Unsupported capabilities are empty.
fn capability(result: ProviderResult<Vec<String>>, what: &str) -> Vec<String> {
    match result {
        Ok(mut names) => {
            names.sort();
            names
        }
        Err(ProviderError::Unsupported { .. }) => {
            trace!(capability = what, "capability not supported");
            Vec::new()
        }
        Err(err) => {
            warn!(capability = what, error = %err, "capability query failed");
            Vec::new()
        }
    }
}
