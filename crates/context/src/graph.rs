use crate::entities::Hypothesis;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Dependency graph
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Directed graph over hypothesis ids with stable adjacency ordering:
/// nodes and edge lists are kept sorted, so serialization is
/// deterministic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct DependencyGraph {
    #[serde(default)]
    pub nodes: Vec<String>,
    #[serde(default)]
    pub edges: BTreeMap<String, Vec<String>>,
}

/// Record of one broken cycle: the members involved and the edge that
/// was removed to break it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleBreak {
    pub members: Vec<String>,
    pub removed_from: String,
    pub removed_to: String,
}

impl DependencyGraph {
    /// Build the graph induced by `Hypothesis.dependencies`. Edges point
    /// from a hypothesis to each of its dependencies; dangling
    /// dependency ids become nodes too.
    pub fn from_hypotheses(hypotheses: &[Hypothesis]) -> Self {
        let mut nodes: BTreeSet<String> = BTreeSet::new();
        let mut edges: BTreeMap<String, Vec<String>> = BTreeMap::new();

        for h in hypotheses {
            nodes.insert(h.id.clone());
            let targets = edges.entry(h.id.clone()).or_default();
            for dep in &h.dependencies {
                nodes.insert(dep.clone());
                if !targets.contains(dep) {
                    targets.push(dep.clone());
                }
            }
            targets.sort();
        }

        Self {
            nodes: nodes.into_iter().collect(),
            edges,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    fn neighbors(&self, node: &str) -> &[String] {
        self.edges.get(node).map_or(&[], Vec::as_slice)
    }

    /// Find one cycle, returned as the node sequence along the cycle
    /// (first node repeated implicitly). `None` when acyclic.
    pub fn find_cycle(&self) -> Option<Vec<String>> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            White,
            Gray,
            Black,
        }

        let mut marks: BTreeMap<&str, Mark> =
            self.nodes.iter().map(|n| (n.as_str(), Mark::White)).collect();

        fn visit<'a>(
            graph: &'a DependencyGraph,
            node: &'a str,
            marks: &mut BTreeMap<&'a str, Mark>,
            stack: &mut Vec<&'a str>,
        ) -> Option<Vec<String>> {
            marks.insert(node, Mark::Gray);
            stack.push(node);
            for next in graph.neighbors(node) {
                match marks.get(next.as_str()).copied().unwrap_or(Mark::White) {
                    Mark::Gray => {
                        // Back edge: the cycle is the stack suffix from
                        // `next` onward.
                        let start = stack.iter().position(|n| *n == next.as_str()).unwrap_or(0);
                        return Some(stack[start..].iter().map(|s| s.to_string()).collect());
                    }
                    Mark::White => {
                        if let Some(cycle) = visit(graph, next.as_str(), marks, stack) {
                            return Some(cycle);
                        }
                    }
                    Mark::Black => {}
                }
            }
            stack.pop();
            marks.insert(node, Mark::Black);
            None
        }

        let mut stack = Vec::new();
        for node in &self.nodes {
            if marks.get(node.as_str()) == Some(&Mark::White) {
                if let Some(cycle) = visit(self, node.as_str(), &mut marks, &mut stack) {
                    return Some(cycle);
                }
                stack.clear();
            }
        }
        None
    }

    /// Remove back edges until the graph is acyclic. Each removal closes
    /// the detected cycle by cutting the edge from its last member back
    /// to its first. Returns one record per removed edge, in removal
    /// order.
    pub fn break_cycles(&mut self) -> Vec<CycleBreak> {
        let mut breaks = Vec::new();
        while let Some(cycle) = self.find_cycle() {
            let from = cycle.last().cloned().unwrap_or_default();
            let to = cycle.first().cloned().unwrap_or_default();
            if let Some(targets) = self.edges.get_mut(&from) {
                targets.retain(|t| t != &to);
            }
            breaks.push(CycleBreak {
                members: cycle,
                removed_from: from,
                removed_to: to,
            });
            // Each pass removes one edge, so this terminates: the edge
            // count strictly decreases.
        }
        breaks
    }

    /// A topological order over the dependency edges. `None` if cyclic.
    pub fn topo_order(&self) -> Option<Vec<String>> {
        let mut in_degree: BTreeMap<&str, usize> =
            self.nodes.iter().map(|n| (n.as_str(), 0)).collect();
        for targets in self.edges.values() {
            for t in targets {
                if let Some(d) = in_degree.get_mut(t.as_str()) {
                    *d += 1;
                }
            }
        }

        let mut ready: Vec<&str> = in_degree
            .iter()
            .filter(|(_, d)| **d == 0)
            .map(|(n, _)| *n)
            .collect();
        let mut order = Vec::new();

        while let Some(node) = ready.pop() {
            order.push(node.to_string());
            for t in self.neighbors(node) {
                let d = in_degree.get_mut(t.as_str())?;
                *d -= 1;
                if *d == 0 {
                    ready.push(t.as_str());
                }
            }
        }

        (order.len() == self.nodes.len()).then_some(order)
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
