use std::sync::{Arc, Mutex};

use submitter_core::events::{PropertyValue, TargetEvent, TargetProperty};
use submitter_core::target::{params, FilterAmbiguity, TargetKind, TargetTree, DEFAULT_PACKAGER};
use submitter_core::TargetError;

/// Root -> Group -> Assignment, with nothing set.
fn chain() -> (TargetTree, [submitter_core::TargetId; 3]) {
    let mut tree = TargetTree::new();
    let root = tree.root();
    let group = tree.add_group(root, Some("CS 1114")).unwrap();
    let assignment = tree.add_assignment(group, "Project 1").unwrap();
    (tree, [root, group, assignment])
}

#[test]
fn test_all_required_concatenates_leaf_to_root_without_dedup() {
    let (mut tree, [root, group, assignment]) = chain();
    tree.set_required(root, ["A"]).unwrap();
    tree.set_required(group, ["B"]).unwrap();
    tree.set_required(assignment, ["C"]).unwrap();
    assert_eq!(tree.all_required(assignment).unwrap(), vec!["C", "B", "A"]);

    tree.set_required(assignment, ["A"]).unwrap();
    assert_eq!(tree.all_required(assignment).unwrap(), vec!["A", "B", "A"]);
}

#[test]
fn test_transport_is_taken_from_nearest_ancestor() {
    let (mut tree, [root, group, assignment]) = chain();
    assert_eq!(tree.transport(assignment).unwrap(), None);

    tree.set_transport(root, Some("t1".into())).unwrap();
    tree.set_transport_params(root, params([("root", "1")])).unwrap();
    assert_eq!(tree.transport(assignment).unwrap().as_deref(), Some("t1"));
    assert_eq!(tree.transport_source(assignment).unwrap(), Some(root));

    tree.set_transport(group, Some("t2".into())).unwrap();
    assert_eq!(tree.transport(assignment).unwrap().as_deref(), Some("t2"));
    // Params travel with the transport that supplies them, even when empty.
    assert!(tree.transport_params(assignment).unwrap().is_empty());
    assert_eq!(tree.node(group).unwrap().transport(), Some("t2"));
    assert_eq!(tree.node(assignment).unwrap().transport(), None);
}

#[test]
fn test_packager_defaults_and_params_follow_source() {
    let (mut tree, [root, group, assignment]) = chain();
    assert_eq!(tree.packager(assignment).unwrap(), DEFAULT_PACKAGER);
    assert!(tree.packager_params(assignment).unwrap().is_empty());

    tree.set_packager(root, Some("jar".into())).unwrap();
    tree.set_packager_params(root, params([("Built-By", "${user}")]))
        .unwrap();
    tree.set_packager_params(group, params([("Ignored", "x")]))
        .unwrap();
    assert_eq!(tree.packager(assignment).unwrap(), "jar");
    let effective = tree.packager_params(assignment).unwrap();
    assert_eq!(effective.get("Built-By").map(String::as_str), Some("${user}"));
    assert!(effective.get("Ignored").is_none());
}

#[test]
fn test_local_conflict_uses_this_nodes_ambiguity_rule() {
    let (mut tree, [root, _group, assignment]) = chain();
    tree.set_includes(root, ["*.class"]).unwrap();
    tree.set_excludes(assignment, ["*.class"]).unwrap();
    tree.set_includes(assignment, ["Main.class"]).unwrap();

    assert!(tree.is_file_excluded(assignment, "Main.class").unwrap());
    assert!(tree.is_file_excluded(assignment, "Other.class").unwrap());

    tree.set_filter_ambiguity(assignment, FilterAmbiguity::PreferInclude)
        .unwrap();
    assert!(!tree.is_file_excluded(assignment, "Main.class").unwrap());
    assert!(tree.is_file_excluded(assignment, "Other.class").unwrap());
}

#[test]
fn test_nearest_local_match_wins_over_ancestors() {
    let (mut tree, [root, group, assignment]) = chain();
    tree.set_excludes(root, ["*.txt"]).unwrap();
    tree.set_includes(group, ["notes.txt"]).unwrap();

    assert!(!tree.is_file_excluded(assignment, "notes.txt").unwrap());
    assert!(tree.is_file_excluded(assignment, "todo.txt").unwrap());
    assert!(!tree.is_file_excluded(assignment, "Main.java").unwrap());
}

#[test]
fn test_default_inclusion_depends_only_on_root_includes() {
    let (mut tree, [root, group, assignment]) = chain();
    assert!(!tree.is_file_excluded(assignment, "Foo.java").unwrap());

    // Includes on an intermediate node do not change the default.
    tree.set_includes(group, ["*.xml"]).unwrap();
    assert!(!tree.is_file_excluded(assignment, "Foo.java").unwrap());

    tree.set_includes(root, ["*.never"]).unwrap();
    assert!(tree.is_file_excluded(assignment, "Foo.java").unwrap());
    assert!(!tree.is_file_excluded(assignment, "build.xml").unwrap());
}

#[test]
fn test_unloaded_import_group_reports_not_loaded() {
    let mut tree = TargetTree::new();
    let root = tree.root();
    let import = tree
        .add_import_group(root, "Labs", "https://example.edu/labs.xml")
        .unwrap();

    match tree.transport(import) {
        Err(TargetError::NotLoaded { name }) => assert_eq!(name, "Labs"),
        other => panic!("expected NotLoaded, got {other:?}"),
    }
    assert!(tree.add_assignment(import, "Lab 1").is_err());
    assert!(tree.local_children(import).unwrap().is_empty());
}

#[test]
fn test_kind_capabilities() {
    let (mut tree, [root, group, assignment]) = chain();
    let unnamed = tree.add_group(root, None).unwrap();

    let root_kind = tree.kind(root).unwrap();
    assert!(!root_kind.is_actionable() && !root_kind.is_nested() && root_kind.is_container());
    assert!(tree.kind(group).unwrap().is_nested());
    assert!(!tree.kind(unnamed).unwrap().is_nested());
    let kind = tree.kind(assignment).unwrap();
    assert!(kind.is_actionable() && !kind.is_container() && kind.is_loaded());
    assert_eq!(kind.name(), Some("Project 1"));

    assert!(matches!(
        tree.add_child(assignment, TargetKind::assignment("nested")),
        Err(TargetError::Unsupported { .. })
    ));
    assert_eq!(tree.path(assignment).unwrap(), "CS 1114/Project 1");
    assert_eq!(tree.ancestors(assignment).unwrap(), vec![group, root]);
}

#[test]
fn test_setters_publish_change_events() {
    let (mut tree, [_root, group, assignment]) = chain();
    let seen: Arc<Mutex<Vec<TargetEvent>>> = Arc::default();
    let sink = seen.clone();
    let listener = tree.subscribe(move |event| sink.lock().unwrap().push(event.clone()));

    tree.set_transport(assignment, Some("file:///tmp/out.zip".into()))
        .unwrap();
    tree.set_hidden(assignment, true).unwrap();
    tree.set_name(group, None).unwrap();

    {
        let events = seen.lock().unwrap();
        assert_eq!(events.len(), 3);
        assert_eq!(
            events[0],
            TargetEvent::Changed {
                target: assignment,
                property: TargetProperty::Transport,
                old: PropertyValue::None,
                new: PropertyValue::Text("file:///tmp/out.zip".into()),
            }
        );
        assert_eq!(
            events[1],
            TargetEvent::Changed {
                target: assignment,
                property: TargetProperty::Hidden,
                old: PropertyValue::Bool(false),
                new: PropertyValue::Bool(true),
            }
        );
        assert_eq!(
            events[2],
            TargetEvent::Changed {
                target: group,
                property: TargetProperty::Name,
                old: PropertyValue::Text("CS 1114".into()),
                new: PropertyValue::None,
            }
        );
    }

    assert!(tree.unsubscribe(listener));
    tree.set_required(assignment, ["README"]).unwrap();
    assert_eq!(seen.lock().unwrap().len(), 3);
}

#[test]
fn test_remove_child_detaches_node() {
    let (mut tree, [root, group, _assignment]) = chain();
    assert!(tree.remove_child(root, group).unwrap());
    assert!(tree.local_children(root).unwrap().is_empty());
    assert_eq!(tree.parent(group).unwrap(), None);
    assert!(!tree.remove_child(root, group).unwrap());
}

#[test]
fn test_outline_serializes_structure() {
    let (mut tree, [root, _group, assignment]) = chain();
    tree.set_hidden(assignment, true).unwrap();
    tree.add_import_group(root, "Labs", "labs.xml").unwrap();

    let outline = serde_json::to_value(tree.outline().unwrap()).unwrap();
    assert_eq!(outline["kind"], "root");
    assert_eq!(outline["children"][0]["name"], "CS 1114");
    assert_eq!(outline["children"][0]["children"][0]["kind"], "assignment");
    assert_eq!(outline["children"][0]["children"][0]["hidden"], true);
    assert_eq!(outline["children"][1]["kind"], "import-group");
    assert_eq!(outline["children"][1]["loaded"], false);
}
