//! Topological helpers for the linear power flow.

use petgraph::unionfind::UnionFind;

use crate::{EnergySystem, Node, NodeIndex};

/// Partitions every electrical bus into connected islands.
///
/// Two buses share an island when a chain of lines connects them, regardless
/// of line direction. A bus without any line forms an island of its own.
/// Buses within an island are sorted by declaration order, and islands are
/// ordered by their first bus, so the result is stable across repeated calls
/// on the same system.
pub fn electrical_islands(system: &EnergySystem) -> Vec<Vec<NodeIndex>> {
    let graph = system.graph();
    let mut sets = UnionFind::<usize>::new(graph.node_count());

    for (line, node) in system.nodes() {
        if !matches!(node, Node::ElectricalLine(_)) {
            continue;
        }
        for bus in system.inputs(line).into_iter().chain(system.outputs(line)) {
            if matches!(system.node(bus), Some(Node::ElectricalBus(_))) {
                sets.union(line.index(), bus.index());
            }
        }
    }

    let mut islands: Vec<(usize, Vec<NodeIndex>)> = Vec::new();
    for idx in graph.node_indices() {
        if !matches!(system.node(idx), Some(Node::ElectricalBus(_))) {
            continue;
        }
        let root = sets.find(idx.index());
        match islands.iter_mut().find(|(r, _)| *r == root) {
            Some((_, members)) => members.push(idx),
            None => islands.push((root, vec![idx])),
        }
    }
    islands.into_iter().map(|(_, members)| members).collect()
}
