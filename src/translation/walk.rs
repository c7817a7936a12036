//! Translation graph walk.
//!
//! Starting from a reconstruction node, walk the payload graph upstream until
//! translation boundaries are reached: extraction nodes, or reconstruction
//! nodes met either directly above or from the side (a sibling consumer of a
//! node on the path). The resulting dependency graph holds every visited node;
//! each edge points one hop closer to the node the walk started from.

use petgraph::graphmap::DiGraphMap;

use crate::stream::{Graph, NodeId, NodeRole};

/// Subgraph discovered by [`walk_to_translation`].
pub type DependencyGraph = DiGraphMap<NodeId, ()>;

/// Walk upstream from `root` to the nearest translation boundaries.
pub fn walk_to_translation(graph: &Graph, root: NodeId) -> DependencyGraph {
    let mut dependencies = DependencyGraph::new();
    visit(graph, root, None, &mut dependencies);
    dependencies
}

fn visit(graph: &Graph, node: NodeId, prior: Option<NodeId>, dependencies: &mut DependencyGraph) {
    dependencies.add_node(node);

    if let Some(prior) = prior {
        if dependencies.contains_edge(node, prior) {
            return;
        }
        dependencies.add_edge(node, prior, ());

        if is_boundary(graph, node) {
            return;
        }

        let sibling = graph.downstreams(node).iter().copied().find(|down| {
            graph.role(*down) == Some(NodeRole::Reconstruction)
                && !dependencies.contains_node(*down)
        });
        if let Some(sibling) = sibling {
            dependencies.add_edge(node, sibling, ());
            return;
        }
    }

    for &up in graph.upstreams(node) {
        visit(graph, up, Some(node), dependencies);
    }
}

fn is_boundary(graph: &Graph, node: NodeId) -> bool {
    matches!(
        graph.role(node),
        Some(NodeRole::Extraction { .. }) | Some(NodeRole::Reconstruction)
    )
}

/// Translation nodes found by the walk, other than `root`, in discovery order.
pub fn boundary_nodes(graph: &Graph, dependencies: &DependencyGraph, root: NodeId) -> Vec<NodeId> {
    dependencies
        .nodes()
        .filter(|n| *n != root && is_boundary(graph, *n))
        .collect()
}

/// The boundary nodes allowed to drive a session lifecycle.
pub fn principal_nodes(graph: &Graph, boundaries: &[NodeId]) -> Vec<NodeId> {
    boundaries
        .iter()
        .copied()
        .filter(|n| match graph.role(*n) {
            Some(NodeRole::Extraction { principal }) => principal,
            Some(NodeRole::Reconstruction) => true,
            _ => false,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::DocKind;
    use crate::stream::{Map, Source, Zip};
    use crate::translation::{Address, ExtractOptions, ReconstructOptions};

    fn event_x() -> ExtractOptions {
        ExtractOptions::new(DocKind::Event, Address::path(["data", "x"]))
    }

    #[test]
    fn stops_at_extraction_nodes() {
        let mut graph = Graph::new();
        let raw = graph.add_node(Source::new("raw"), &[]).unwrap();
        let ex = graph.add_extraction(raw, event_x().principal()).unwrap();
        let m = graph.add_node(Map::new("m", |v| v), &[ex]).unwrap();
        let root = graph
            .add_reconstruction(m, ReconstructOptions::new(Some(vec!["x".into()])))
            .unwrap();

        let deps = walk_to_translation(&graph, root);
        assert!(deps.contains_edge(m, root));
        assert!(deps.contains_edge(ex, m));
        assert!(!deps.contains_node(raw));
        assert_eq!(boundary_nodes(&graph, &deps, root), vec![ex]);
    }

    #[test]
    fn collects_every_branch_of_a_zip() {
        let mut graph = Graph::new();
        let raw_a = graph.add_node(Source::new("a"), &[]).unwrap();
        let raw_b = graph.add_node(Source::new("b"), &[]).unwrap();
        let ea = graph.add_extraction(raw_a, event_x().principal()).unwrap();
        let eb = graph.add_extraction(raw_b, event_x()).unwrap();
        let zip = graph.add_node(Zip::new("zip", &[ea, eb]), &[ea, eb]).unwrap();
        let root = graph
            .add_reconstruction(zip, ReconstructOptions::new(Some(vec!["a".into(), "b".into()])))
            .unwrap();

        let deps = walk_to_translation(&graph, root);
        let boundaries = boundary_nodes(&graph, &deps, root);
        assert_eq!(boundaries, vec![ea, eb]);
        assert_eq!(principal_nodes(&graph, &boundaries), vec![ea]);
    }

    #[test]
    fn sibling_reconstruction_is_a_boundary() {
        let mut graph = Graph::new();
        let raw = graph.add_node(Source::new("raw"), &[]).unwrap();
        let ex = graph.add_extraction(raw, event_x().principal()).unwrap();
        let m = graph.add_node(Map::new("m", |v| v), &[ex]).unwrap();
        let first = graph
            .add_reconstruction(m, ReconstructOptions::new(Some(vec!["x".into()])))
            .unwrap();
        let second = graph
            .add_reconstruction(m, ReconstructOptions::new(Some(vec!["y".into()])))
            .unwrap();

        let deps = walk_to_translation(&graph, second);
        assert!(deps.contains_edge(m, first));
        assert!(!deps.contains_node(ex));
        assert_eq!(boundary_nodes(&graph, &deps, second), vec![first]);
    }

    #[test]
    fn diamond_is_walked_once_per_edge() {
        let mut graph = Graph::new();
        let raw = graph.add_node(Source::new("raw"), &[]).unwrap();
        let ex = graph.add_extraction(raw, event_x().principal()).unwrap();
        let left = graph.add_node(Map::new("left", |v| v), &[ex]).unwrap();
        let right = graph.add_node(Map::new("right", |v| v), &[ex]).unwrap();
        let zip = graph.add_node(Zip::new("zip", &[left, right]), &[left, right]).unwrap();
        let root = graph
            .add_reconstruction(zip, ReconstructOptions::new(Some(vec!["l".into(), "r".into()])))
            .unwrap();

        let deps = walk_to_translation(&graph, root);
        assert_eq!(boundary_nodes(&graph, &deps, root), vec![ex]);
        assert_eq!(deps.edge_count(), 5);
    }
}
