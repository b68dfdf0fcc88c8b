#![no_main]

use libfuzzer_sys::fuzz_target;
use pf_core::NodeKind;

fuzz_target!(|data: &[u8]| {
    let Ok(input) = std::str::from_utf8(data) else {
        return;
    };
    let graph = pf_parser::parse(input).graph;

    assert_eq!(graph.nodes[0].kind, NodeKind::Start);
    assert_eq!(
        graph
            .nodes
            .iter()
            .filter(|node| node.kind == NodeKind::Start)
            .count(),
        1
    );
    assert_eq!(graph.end.0 + 1, graph.nodes.len());
    for edge in &graph.edges {
        assert!(edge.from.0 < graph.nodes.len() && edge.to.0 < graph.nodes.len());
    }
    let _ = pf_core::validate(&graph);
});
