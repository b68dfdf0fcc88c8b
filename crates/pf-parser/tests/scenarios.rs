//! End-to-end parsing scenarios: text in, wired and validated flowchart out.

use pf_core::{Dialect, FlowGraph, NodeId, NodeKind, parse_dialect_config_value, validate};
use pf_parser::{parse, parse_and_validate, parse_with_dialect};
use serde_json::json;

fn id_of(graph: &FlowGraph, text: &str) -> NodeId {
    graph
        .find_by_text(text)
        .map(|node| node.id)
        .unwrap_or_else(|| panic!("no node with text {text:?}\n{}", graph.outline()))
}

#[test]
fn two_branch_decision_converges_at_connector() {
    let input = "do a\n: do b\n  dec c, d\n    else branch1\n    then b1b\n    else branch2\n  ii end1";
    let graph = parse_and_validate(input);

    let a = id_of(&graph, "a");
    let b = id_of(&graph, "b");
    let dec = id_of(&graph, "c, d");
    let branch1 = id_of(&graph, "branch1");
    let b1b = id_of(&graph, "b1b");
    let branch2 = id_of(&graph, "branch2");
    let connector = id_of(&graph, "end1");

    let mut expected = vec![
        (graph.start, a, None),
        (a, b, None),
        (b, dec, None),
        (dec, branch1, Some("c")),
        (branch1, b1b, None),
        (dec, branch2, Some("d")),
        (b1b, connector, None),
        (branch2, connector, None),
        (connector, graph.end, None),
    ];
    let mut actual: Vec<(NodeId, NodeId, Option<&str>)> = graph
        .edges
        .iter()
        .map(|edge| (edge.from, edge.to, edge.label.as_deref()))
        .collect();
    expected.sort();
    actual.sort();
    assert_eq!(actual, expected, "{}", graph.outline());

    assert_eq!(graph.node(dec).map(|node| node.kind), Some(NodeKind::Decision));
    assert_eq!(
        graph.node(connector).map(|node| node.kind),
        Some(NodeKind::Connector)
    );
    assert_eq!(graph.node(b).map(|node| node.pos.sub_index), Some(1));
    assert!(graph.errors.is_empty(), "{:?}", graph.errors);
}

#[test]
fn empty_document_has_start_and_end_only() {
    let graph = parse_and_validate("");
    assert_eq!(graph.nodes.len(), 2);
    assert_eq!(graph.edges.len(), 1);
    assert!(graph.has_edge(graph.start, graph.end));
    assert!(graph.errors.is_empty());
}

#[test]
fn whitespace_and_comments_only_document_matches_empty() {
    let graph = parse_and_validate("\n   \n\t# heading\n  \\\n");
    assert_eq!(graph.nodes.len(), 2);
    assert!(graph.errors.is_empty());
    assert_eq!(graph.nodes[0].meta.notes, vec!["heading".to_string()]);
}

#[test]
fn lone_connector_runs_start_to_end() {
    let graph = parse_and_validate("ii");
    let connector = graph
        .nodes
        .iter()
        .find(|node| node.kind == NodeKind::Connector)
        .expect("connector");
    assert!(graph.has_edge(graph.start, connector.id));
    assert!(graph.has_edge(connector.id, graph.end));
    assert_eq!(graph.edges.len(), 2);
    assert!(graph.errors.is_empty());
}

#[test]
fn sibling_statements_feed_connector_from_terminal_only() {
    let graph = parse_and_validate("do one\ndo two\ndo three\nii merge");
    let one = id_of(&graph, "one");
    let two = id_of(&graph, "two");
    let three = id_of(&graph, "three");
    let merge = id_of(&graph, "merge");
    assert!(graph.has_edge(three, merge));
    assert!(!graph.has_edge(one, merge));
    assert!(!graph.has_edge(two, merge));
    assert!(graph.errors.is_empty(), "{:?}", graph.errors);
}

#[test]
fn three_way_decision_uses_every_label() {
    let input = "in order\ndec small, medium, large\n    else pack box\n    else pack crate\n    else ship pallet\nii dispatch\nout receipt";
    let graph = parse_and_validate(input);
    let dec = id_of(&graph, "small, medium, large");
    for (text, label) in [
        ("pack box", "small"),
        ("pack crate", "medium"),
        ("ship pallet", "large"),
    ] {
        assert!(graph.has_labeled_edge(dec, id_of(&graph, text), label));
    }
    assert_eq!(
        graph.node(dec).map(|node| node.meta.labels.len()),
        Some(3)
    );
    assert!(graph.errors.is_empty(), "{:?}", graph.errors);
}

#[test]
fn nested_decision_inside_branch() {
    let input = "\
dec cold, warm
    else dec ice, water
        else skate
        else swim
    then ii inner
    else sunbathe
ii outer";
    let graph = parse_and_validate(input);
    let outer_dec = id_of(&graph, "cold, warm");
    let inner_dec = id_of(&graph, "ice, water");
    let inner = id_of(&graph, "inner");
    let sunbathe = id_of(&graph, "sunbathe");
    let outer = id_of(&graph, "outer");

    assert!(graph.has_labeled_edge(outer_dec, inner_dec, "cold"));
    assert!(graph.has_labeled_edge(inner_dec, id_of(&graph, "skate"), "ice"));
    assert!(graph.has_labeled_edge(inner_dec, id_of(&graph, "swim"), "water"));
    assert!(graph.has_edge(id_of(&graph, "skate"), inner));
    assert!(graph.has_edge(id_of(&graph, "swim"), inner));
    assert!(graph.has_labeled_edge(outer_dec, sunbathe, "warm"));
    assert!(graph.has_edge(sunbathe, outer));
    assert!(graph.has_edge(outer, graph.end));
    assert!(!graph.has_edge(inner_dec, outer));
    assert!(graph.errors.is_empty(), "{:?}\n{}", graph.errors, graph.outline());
}

#[test]
fn removing_required_edge_is_reported_once_per_endpoint() {
    let mut graph = parse("do a\ndo b").graph;
    assert!(validate(&graph).is_empty());

    let a = id_of(&graph, "a");
    let b = id_of(&graph, "b");
    graph.edges.retain(|edge| !(edge.from == a && edge.to == b));
    let messages = validate(&graph);
    assert_eq!(messages.len(), 2, "{messages:?}");
    assert!(messages[0].contains("#1 (process)"));
    assert!(messages[0].contains("outgoing"));
    assert!(messages[1].contains("#2 (process)"));
    assert!(messages[1].contains("incoming"));
}

#[test]
fn custom_dialect_changes_keywords_and_delimiter() {
    let parsed = parse_dialect_config_value(&json!({
        "delimiter": ";",
        "comment": "%",
        "keywords": { "decision": "if", "branch_start": "case", "connector": "join" }
    }));
    assert!(parsed.errors.is_empty(), "{:?}", parsed.errors);
    let dialect: Dialect = parsed.dialect;

    let input = "if hot, cold % weather\n    case fan\n    case heater\njoin done; do rest";
    let result = parse_with_dialect(input, &dialect);
    let graph = result.graph;
    let dec = id_of(&graph, "hot, cold");
    assert_eq!(
        graph.node(dec).map(|node| node.meta.notes.clone()),
        Some(vec!["weather".to_string()])
    );
    assert!(graph.has_labeled_edge(dec, id_of(&graph, "fan"), "hot"));
    assert!(graph.has_edge(id_of(&graph, "heater"), id_of(&graph, "done")));
    assert!(graph.has_edge(id_of(&graph, "done"), id_of(&graph, "rest")));
    assert!(validate(&graph).is_empty(), "{}", graph.outline());
}

#[test]
fn function_inside_flow_is_exempt_from_arity_rules() {
    let input = "in file\nfun- parse rows {\n    do split\n    do trim loop\n}\nout rows";
    let graph = parse_and_validate(input);
    let header = graph
        .find_by_text("parse rows {...}")
        .expect("collapsed header");
    assert_eq!(header.meta.body.len(), 2);
    assert!(graph.errors.is_empty(), "{:?}\n{}", graph.errors, graph.outline());
}
