//! Hierarchy dump.
//!
//! A pre-order walk over every attribute reachable from a root, written one
//! line at a time to a [`TextSink`]. The walk keeps an explicit work stack, so
//! deep trees never grow the call stack, and a seen set keyed by node identity,
//! so cycles and shared nodes print once and are marked `<seen before>` after
//! that.
//!
//! ```text
//! window "Main"
//!   children: 2 entries
//!     [1] -> button
//!       owner -> <seen before> window "Main"
//!     [2] -> button
//!   title: "Main"
//!   actions: close, raise
//! ```
//!
//! Under a `max_depth` limit, a node first reached deep is expanded again when
//! a shorter route reaches it later, so its contents print within the limit.
//!
//! The walk hands control back every `yield_every` visited nodes through
//! [`CooperativeYield`], and can be driven one step at a time with
//! [`HierarchyDumper::step`] by async hosts.

use std::collections::HashMap;

use serde::Serialize;
use tracing::{instrument, trace, warn};

use crate::config::DEFAULT_YIELD_EVERY;
use crate::error::ProviderResult;
use crate::interaction::TextSink;
use crate::node::{Key, NodeAdapter, Value};

/// Limits for one dump.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DumpOptions {
    /// Object nodes deeper than this are not expanded. `None` is unbounded.
    pub max_depth: Option<usize>,
    /// Visited nodes between cooperative yields.
    pub yield_every: usize,
}

impl Default for DumpOptions {
    fn default() -> Self {
        DumpOptions {
            max_depth: None,
            yield_every: DEFAULT_YIELD_EVERY,
        }
    }
}

/// Counters for one dump.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DumpStats {
    pub nodes_visited: usize,
    pub cycles_cut: usize,
    pub depth_limited: usize,
    pub errors: usize,
}

/// Hands control back to the host during a long dump.
pub trait CooperativeYield {
    fn yield_now(&mut self);
}

/// Never yields.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoYield;

impl CooperativeYield for NoYield {
    fn yield_now(&mut self) {}
}

impl<F: FnMut()> CooperativeYield for F {
    fn yield_now(&mut self) {
        self()
    }
}

enum Task<N> {
    Visit {
        node: N,
        indent: usize,
        depth: usize,
        prefix: String,
    },
    Line(String),
}

/// Step-wise hierarchy walker.
pub struct HierarchyDumper<N: NodeAdapter> {
    tasks: Vec<Task<N>>,
    /// Depth each node was last expanded at.
    seen: HashMap<N::Identity, usize>,
    options: DumpOptions,
    stats: DumpStats,
    visited_at_last_yield: usize,
}

impl<N: NodeAdapter> HierarchyDumper<N> {
    pub fn new(root: N, options: DumpOptions) -> Self {
        HierarchyDumper {
            tasks: vec![Task::Visit {
                node: root,
                indent: 0,
                depth: 0,
                prefix: String::new(),
            }],
            seen: HashMap::new(),
            options,
            stats: DumpStats::default(),
            visited_at_last_yield: 0,
        }
    }

    pub fn stats(&self) -> DumpStats {
        self.stats
    }

    pub fn is_finished(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Emit lines until one node has been visited or the walk is complete.
    ///
    /// Returns `true` while work remains.
    pub fn step(&mut self, sink: &mut dyn TextSink) -> bool {
        while let Some(task) = self.tasks.pop() {
            match task {
                Task::Line(line) => sink.line(&line),
                Task::Visit {
                    node,
                    indent,
                    depth,
                    prefix,
                } => {
                    if self.visit(node, indent, depth, &prefix, sink) {
                        break;
                    }
                }
            }
        }
        !self.tasks.is_empty()
    }

    /// Whether `yield_every` nodes have been visited since the last yield.
    ///
    /// Calling this resets the count when it returns `true`.
    pub fn take_yield(&mut self) -> bool {
        let every = self.options.yield_every.max(1);
        if self.stats.nodes_visited - self.visited_at_last_yield >= every {
            self.visited_at_last_yield = self.stats.nodes_visited;
            true
        } else {
            false
        }
    }

    /// Walk to completion, yielding cooperatively.
    pub fn run(mut self, sink: &mut dyn TextSink, yielder: &mut dyn CooperativeYield) -> DumpStats {
        while self.step(sink) {
            if self.take_yield() {
                yielder.yield_now();
            }
        }
        self.stats
    }

    /// Returns `true` when a new node was visited.
    fn visit(
        &mut self,
        node: N,
        indent: usize,
        depth: usize,
        prefix: &str,
        sink: &mut dyn TextSink,
    ) -> bool {
        let pad = "  ".repeat(indent);
        let label = node.role_summary().label();

        let identity = node.identity();
        let limited = self.options.max_depth.is_some();
        if let Some(&expanded_at) = self.seen.get(&identity) {
            if !limited || expanded_at <= depth {
                self.stats.cycles_cut += 1;
                sink.line(&format!("{}{}<seen before> {}", pad, prefix, label));
                return false;
            }
        }
        self.seen.insert(identity, depth);
        self.stats.nodes_visited += 1;
        trace!(depth, node = %label, "dumping node");

        if !node.is_valid() {
            self.stats.errors += 1;
            sink.line(&format!("{}{}<error: element is no longer valid> {}", pad, prefix, label));
            return true;
        }
        sink.line(&format!("{}{}{}", pad, prefix, label));

        let child_pad = "  ".repeat(indent + 1);
        if self.options.max_depth.is_some_and(|max| depth >= max) {
            self.stats.depth_limited += 1;
            sink.line(&format!("{}... (max depth reached)", child_pad));
            return true;
        }

        let mut pending = Vec::new();
        for name in self.names(node.attribute_names(), &child_pad, &mut pending) {
            match node.attribute_value(&name) {
                Ok(value) => plan_value(&mut pending, name, value, indent + 1, depth + 1),
                Err(err) => {
                    self.stats.errors += 1;
                    pending.push(Task::Line(format!("{}{}: <error: {}>", child_pad, name, err)));
                }
            }
        }
        let actions = self.names(node.action_names(), &child_pad, &mut pending);
        if !actions.is_empty() {
            pending.push(Task::Line(format!("{}actions: {}", child_pad, actions.join(", "))));
        }
        let parameterized = self.names(node.parameterized_action_names(), &child_pad, &mut pending);
        if !parameterized.is_empty() {
            pending.push(Task::Line(format!(
                "{}parameterized actions: {}",
                child_pad,
                parameterized.join(", ")
            )));
        }

        self.tasks.extend(pending.into_iter().rev());
        true
    }

    /// Sorted names from a capability query; failures other than
    /// "unsupported" become an error line.
    fn names(
        &mut self,
        result: ProviderResult<Vec<String>>,
        pad: &str,
        pending: &mut Vec<Task<N>>,
    ) -> Vec<String> {
        match result {
            Ok(mut names) => {
                names.sort();
                names
            }
            Err(err) if err.is_unsupported() => Vec::new(),
            Err(err) => {
                warn!(error = %err, "capability query failed during dump");
                self.stats.errors += 1;
                pending.push(Task::Line(format!("{}<error: {}>", pad, err)));
                Vec::new()
            }
        }
    }
}

fn plan_value<N: NodeAdapter>(
    pending: &mut Vec<Task<N>>,
    label: String,
    value: Value<N>,
    indent: usize,
    depth: usize,
) {
    let pad = "  ".repeat(indent);
    match value {
        Value::Scalar(scalar) => {
            pending.push(Task::Line(format!("{}{}: {}", pad, label, scalar.literal())));
        }
        Value::Object(node) => pending.push(Task::Visit {
            node,
            indent,
            depth,
            prefix: format!("{} -> ", label),
        }),
        Value::Collection(collection) => {
            pending.push(Task::Line(format!("{}{}: {}", pad, label, collection.summary())));
            for (key, entry) in collection {
                let entry_label = match &key {
                    Key::Index(index) => format!("[{}]", index),
                    Key::Name(name) => format!("[{:?}]", name),
                };
                plan_value(pending, entry_label, entry, indent + 1, depth);
            }
        }
    }
}

/// Dump the hierarchy below `root` to `sink`.
///
/// The seen set is scoped to this call: a node reachable along several
/// routes prints in full once.
#[instrument(skip_all, fields(max_depth = ?options.max_depth))]
pub fn dump_hierarchy<N: NodeAdapter>(
    root: &N,
    sink: &mut dyn TextSink,
    options: &DumpOptions,
    yielder: &mut dyn CooperativeYield,
) -> DumpStats {
    let stats = HierarchyDumper::new(root.clone(), *options).run(sink, yielder);
    trace!(?stats, "dump finished");
    stats
}
