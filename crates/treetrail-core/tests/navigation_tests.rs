//! End-to-end navigation tests against the in-memory tree.
//!
//! These drive a `Session` through a `RecordingChooser` the way an
//! interactive host would, checking emitted paths, back-navigation and stale
//! recovery.

use proptest::prelude::*;

use treetrail_core::choice::{Choice, ChoiceBuilder, ChoiceKind};
use treetrail_core::error::NavError;
use treetrail_core::interaction::{Host, RecordingChooser};
use treetrail_core::memory::{MemoryNode, MemoryTree};
use treetrail_core::node::{Collection, Node, NodeAdapter, Value};
use treetrail_core::session::{Outcome, Session, SessionState};

const DESKTOP: &str = r#"{
    "root": "app",
    "nodes": {
        "app": {
            "role": "application",
            "description": "Finder",
            "attributes": {
                "windows": [{"$ref": "w1"}, {"$ref": "w2"}],
                "prefs": {"theme": "dark", "recent": [{"$ref": "w2"}]},
                "title": "Finder"
            },
            "actions": {"hide": "Hide the application"}
        },
        "w1": {
            "role": "window",
            "parent": "app",
            "attributes": {
                "owner": {"$ref": "app"},
                "grid": [[{"$ref": "b1"}], [{"$ref": "b2"}, [{"$ref": "w1"}]]],
                "title": "One"
            },
            "settable": ["title"]
        },
        "w2": {
            "role": "window",
            "parent": "app",
            "attributes": {"children": [{"$ref": "b1"}]}
        },
        "b1": {
            "role": "button",
            "parent": "w1",
            "attributes": {"window": {"$ref": "w1"}},
            "actions": {"press": "Press"}
        },
        "b2": {
            "role": "button",
            "parent": "w1",
            "attributes": {"sibling": {"$ref": "b1"}}
        }
    }
}"#;

/// Host services owned by the test.
struct Driver {
    chooser: RecordingChooser,
    sink: Vec<String>,
    modifier: bool,
}

impl Driver {
    fn new() -> Self {
        Driver {
            chooser: RecordingChooser::new(),
            sink: Vec::new(),
            modifier: false,
        }
    }

    fn host(&mut self) -> Host<'_> {
        Host::new(&mut self.chooser, &self.modifier, &mut self.sink)
    }
}

fn start(tree: &MemoryTree, driver: &mut Driver) -> Session<MemoryNode> {
    let mut session = Session::default();
    let root = tree.root().unwrap();
    session.start(root, &mut driver.host()).unwrap();
    session
}

fn choice(session: &Session<MemoryNode>, text: &str) -> Choice {
    session
        .choices()
        .iter()
        .find(|choice| choice.text.starts_with(text))
        .cloned()
        .unwrap_or_else(|| panic!("no choice {text:?} in {:?}", session.choices()))
}

fn select(
    session: &mut Session<MemoryNode>,
    driver: &mut Driver,
    text: &str,
) -> Outcome<MemoryNode> {
    let picked = choice(session, text);
    driver.chooser.answer();
    session.select(Some(&picked), &mut driver.host()).unwrap()
}

fn back(session: &mut Session<MemoryNode>, driver: &mut Driver) {
    let back = session
        .choices()
        .iter()
        .find(|choice| choice.is_back())
        .cloned()
        .expect("back choice");
    driver.chooser.answer();
    session.select(Some(&back), &mut driver.host()).unwrap();
}

// ============================================================================
// Scenarios
// ============================================================================

#[test]
fn count_and_children_root() {
    let tree = MemoryTree::from_json_str(
        r#"{"root": "r", "nodes": {
            "r": {"attributes": {"count": 3, "children": [{"$ref": "a"}, {"$ref": "b"}]}},
            "a": {"role": "cell"},
            "b": {"role": "cell"}
        }}"#,
    )
    .unwrap();
    let mut driver = Driver::new();
    let mut session = start(&tree, &mut driver);

    let texts: Vec<_> = session.choices().iter().map(|c| c.text.clone()).collect();
    assert_eq!(texts, vec!["children >", "count"]);
    assert_eq!(session.choices()[0].subtext, "2 entries");
    assert_eq!(session.choices()[1].subtext, "Value: 3");

    let outcome = select(&mut session, &mut driver, "count");
    assert!(matches!(outcome, Outcome::Value { .. }));
    assert_eq!(driver.sink, vec!["root(\"count\") = 3"]);
    assert_eq!(session.state(), SessionState::Idle);
}

#[test]
fn settable_title_with_modifier() {
    let tree = MemoryTree::from_json_str(DESKTOP).unwrap();
    let mut driver = Driver::new();
    let mut session = start(&tree, &mut driver);

    select(&mut session, &mut driver, "windows");
    select(&mut session, &mut driver, "[1]");
    assert!(choice(&session, "title").settable);

    driver.modifier = true;
    let outcome = select(&mut session, &mut driver, "title");
    match outcome {
        Outcome::PrepareSet { path, attribute, .. } => {
            assert_eq!(path, r#"root("windows")[1]:setAttributeValue("title", <value>)"#);
            assert_eq!(attribute, "title");
        }
        other => panic!("expected PrepareSet, got {other:?}"),
    }
    assert_eq!(session.current_path(), r#"root("windows")[1]"#);

    session
        .commit_set(Value::from("Renamed"), &mut driver.host())
        .unwrap();
    assert_eq!(
        driver.sink.last().unwrap(),
        r#"root("windows")[1]("title") = "Renamed""#
    );
}

#[test]
fn action_invocation_path() {
    let tree = MemoryTree::from_json_str(DESKTOP).unwrap();
    let mut driver = Driver::new();
    let mut session = start(&tree, &mut driver);
    select(&mut session, &mut driver, "windows");
    select(&mut session, &mut driver, "[2]");
    select(&mut session, &mut driver, "children");
    select(&mut session, &mut driver, "[1]");

    driver.modifier = true;
    let outcome = select(&mut session, &mut driver, "Action: press");
    assert_eq!(
        outcome.path(),
        Some(r#"root("windows")[2]("children")[1]:performAction("press")"#)
    );
    assert_eq!(tree.performed_actions("b1").unwrap(), vec!["press"]);
}

#[test]
fn nested_collections_back_one_level_at_a_time() {
    let tree = MemoryTree::from_json_str(DESKTOP).unwrap();
    let mut driver = Driver::new();
    let mut session = Session::default();
    session
        .start(tree.node("w1").unwrap(), &mut driver.host())
        .unwrap();

    select(&mut session, &mut driver, "grid");
    select(&mut session, &mut driver, "[2]");
    select(&mut session, &mut driver, "[2]");
    assert_eq!(session.current_path(), r#"root("grid")[2][2]"#);
    assert_eq!(
        session.stack().current().unwrap().nested_chain_attribute(),
        Some("grid")
    );

    back(&mut session, &mut driver);
    assert_eq!(session.current_path(), r#"root("grid")[2]"#);
    match session.current_node().unwrap() {
        Node::Collection(view) => assert_eq!(view.entries().len(), 2),
        other => panic!("expected collection, got {other:?}"),
    }

    back(&mut session, &mut driver);
    assert_eq!(session.current_path(), r#"root("grid")"#);
    back(&mut session, &mut driver);
    assert_eq!(session.current_path(), "root");
    assert_eq!(session.depth(), 1);
}

#[test]
fn parameterized_action_template() {
    let tree = MemoryTree::from_json_str(
        r#"{"root": "t", "nodes": {"t": {"role": "text", "parameterized_actions": ["lineForIndex"]}}}"#,
    )
    .unwrap();
    let mut driver = Driver::new();
    let mut session = start(&tree, &mut driver);
    let outcome = select(&mut session, &mut driver, "Parameterized: lineForIndex");
    assert!(matches!(outcome, Outcome::Parameterized { .. }));
    assert_eq!(
        driver.sink,
        vec![r#"root:performParameterizedAction("lineForIndex", ...)"#]
    );
}

#[test]
fn numeric_keys_list_numerically() {
    let tree = MemoryTree::from_json_str(
        r#"{"root": "r", "nodes": {"r": {"attributes": {"sparse": {"10": "ten", "9": "nine", "2": "two"}}}}}"#,
    )
    .unwrap();
    let mut driver = Driver::new();
    let mut session = start(&tree, &mut driver);
    select(&mut session, &mut driver, "sparse");

    let texts: Vec<_> = session.choices().iter().map(|c| c.text.clone()).collect();
    assert_eq!(texts, vec!["<- back", "[2]", "[9]", "[10]"]);
}

#[test]
fn choices_are_deterministic() {
    let tree = MemoryTree::from_json_str(DESKTOP).unwrap();
    let builder = ChoiceBuilder::default();
    for id in ["app", "w1", "w2", "b1", "b2"] {
        let node = Node::Object(tree.node(id).unwrap());
        assert_eq!(builder.build(&node, Some("root")), builder.build(&node, Some("root")));
    }
}

// ============================================================================
// Stale Recovery
// ============================================================================

#[test]
fn resume_walks_up_to_deepest_valid_frame() {
    let tree = MemoryTree::from_json_str(DESKTOP).unwrap();
    let mut driver = Driver::new();
    let mut session = start(&tree, &mut driver);
    select(&mut session, &mut driver, "windows");
    select(&mut session, &mut driver, "[1]");
    select(&mut session, &mut driver, "grid");
    driver.chooser.answer();
    session.select(None, &mut driver.host()).unwrap();

    tree.remove_node("w1").unwrap();
    let outcome = session.browse(None, &mut driver.host()).unwrap();
    assert!(matches!(outcome, Outcome::Posted));
    assert_eq!(session.current_path(), r#"root("windows")"#);
    assert_eq!(session.depth(), 2);
    assert_eq!(
        driver.sink.last().unwrap(),
        r#"root("windows")[1]("grid") is no longer valid; returned to root("windows")"#
    );
    assert_eq!(driver.chooser.statuses().last(), driver.sink.last());
}

#[test]
fn missing_entry_is_reported_and_reposted() {
    let tree = MemoryTree::from_json_str(DESKTOP).unwrap();
    let mut driver = Driver::new();
    let mut session = start(&tree, &mut driver);
    select(&mut session, &mut driver, "windows");

    let w1 = tree.node("w1").unwrap();
    tree.replace_attribute(
        "app",
        "windows",
        Value::Collection(Collection::sequence(vec![Value::Object(w1)])),
    )
    .unwrap();

    let posts = driver.chooser.post_count();
    let outcome = select(&mut session, &mut driver, "[2]");
    assert!(matches!(outcome, Outcome::Posted));
    assert_eq!(driver.chooser.post_count(), posts + 1);
    assert_eq!(session.current_path(), r#"root("windows")"#);
    assert_eq!(
        driver.sink.last().unwrap(),
        r#"root("windows")[2] no longer exists"#
    );
}

#[test]
fn removed_root_with_default_provider() {
    let tree = MemoryTree::from_json_str(DESKTOP).unwrap();
    let fallback = tree.clone();
    let mut driver = Driver::new();
    let mut session =
        Session::default().with_default_root(move || fallback.node("w2").ok());
    session
        .start(tree.node("w1").unwrap(), &mut driver.host())
        .unwrap();
    select(&mut session, &mut driver, "grid");
    driver.chooser.answer();
    session.select(None, &mut driver.host()).unwrap();

    tree.remove_node("w1").unwrap();
    session.resume(&mut driver.host()).unwrap();
    assert_eq!(session.current_path(), "root");
    assert!(session.root().unwrap().same_node(&tree.node("w2").unwrap()));
}

#[test]
fn start_on_removed_node_fails() {
    let tree = MemoryTree::from_json_str(DESKTOP).unwrap();
    let node = tree.node("b2").unwrap();
    tree.remove_node("b2").unwrap();
    let mut driver = Driver::new();
    let mut session: Session<MemoryNode> = Session::default();
    let result = session.start(node, &mut driver.host());
    assert!(matches!(result, Err(NavError::StaleNode { .. })));
}

// ============================================================================
// Properties
// ============================================================================

proptest! {
    /// After any sequence of descents, as many `back`s return to the root,
    /// and at every step the recorded path replays to the displayed node.
    #[test]
    fn back_undoes_every_descent(picks in prop::collection::vec(any::<prop::sample::Index>(), 0..12)) {
        let tree = MemoryTree::from_json_str(DESKTOP).unwrap();
        let root = tree.root().unwrap();
        let mut driver = Driver::new();
        let mut session = start(&tree, &mut driver);

        let mut descents = 0;
        for pick in &picks {
            let expandable: Vec<Choice> = session
                .choices()
                .iter()
                .filter(|choice| choice.kind == ChoiceKind::Expandable)
                .cloned()
                .collect();
            if expandable.is_empty() {
                break;
            }
            let picked = pick.get(&expandable).clone();
            driver.chooser.answer();
            let outcome = session.select(Some(&picked), &mut driver.host()).unwrap();
            prop_assert!(matches!(outcome, Outcome::Posted));
            descents += 1;

            prop_assert_eq!(session.path().len() + 1, session.depth());
            let replayed = session.path().resolve(&root).unwrap();
            prop_assert!(replayed.same_node(&session.current_node().unwrap()));
        }

        for _ in 0..descents {
            back(&mut session, &mut driver);
        }
        prop_assert_eq!(session.depth(), 1);
        prop_assert_eq!(session.current_path(), "root");
        prop_assert!(!session.choices().iter().any(Choice::is_back));
        prop_assert!(session.root().unwrap().same_node(&root));
    }
}
