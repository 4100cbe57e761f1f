//! Version graph for migration path-finding
//!
//! Nodes are versions, edges are registered migrations weighted by their
//! registration index.

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use std::collections::{HashMap, HashSet};

use crate::version::VersionInfo;

#[derive(Debug, Clone, Default)]
pub(crate) struct MigrationGraph {
    graph: DiGraph<VersionInfo, usize>,
    nodes: HashMap<VersionInfo, NodeIndex>,
}

impl MigrationGraph {
    fn node(&mut self, version: VersionInfo) -> NodeIndex {
        if let Some(&idx) = self.nodes.get(&version) {
            return idx;
        }
        let idx = self.graph.add_node(version);
        self.nodes.insert(version, idx);
        idx
    }

    /// Record migration number `index` as an edge `from -> to`
    pub(crate) fn add_migration(&mut self, from: VersionInfo, to: VersionInfo, index: usize) {
        let a = self.node(from);
        let b = self.node(to);
        self.graph.add_edge(a, b, index);
    }

    /// Migration indices along the first path found from `from` to `to`
    ///
    /// A direct edge wins; otherwise edges are explored depth-first in
    /// registration order, never stepping past the target version.
    pub(crate) fn find_path(&self, from: VersionInfo, to: VersionInfo) -> Option<Vec<usize>> {
        let start = *self.nodes.get(&from)?;
        let target = *self.nodes.get(&to)?;

        let direct = self
            .graph
            .edges_connecting(start, target)
            .map(|e| *e.weight())
            .min();
        if let Some(index) = direct {
            return Some(vec![index]);
        }

        let mut visited = HashSet::new();
        let mut path = Vec::new();
        self.search(start, target, &mut visited, &mut path).then_some(path)
    }

    fn search(
        &self,
        node: NodeIndex,
        target: NodeIndex,
        visited: &mut HashSet<NodeIndex>,
        path: &mut Vec<usize>,
    ) -> bool {
        if node == target {
            return true;
        }
        visited.insert(node);

        let limit = self.graph[target];
        // petgraph yields outgoing edges newest first
        let mut edges: Vec<(usize, NodeIndex)> = self
            .graph
            .edges(node)
            .map(|e| (*e.weight(), e.target()))
            .collect();
        edges.sort_unstable();

        for (index, next) in edges {
            if visited.contains(&next) || self.graph[next] > limit {
                continue;
            }
            path.push(index);
            if self.search(next, target, visited, path) {
                return true;
            }
            path.pop();
        }
        false
    }
}
