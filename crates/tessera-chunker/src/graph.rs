//! Directed graph of chunk-to-chunk links.
//!
//! The graph is built after chunk construction, not during it. Cycles are
//! possible in pathological inputs (a node referring to an ancestor); the
//! detector reports them and never mutates the graph. Not thread-safe by
//! contract; callers confine an instance to one task or wrap it.

use serde_json::Value;
use std::collections::{HashMap, HashSet};

/// Adjacency-set reference graph over chunk ids.
#[derive(Debug, Default)]
pub struct ReferenceGraph {
    /// Node insertion order, for deterministic traversal and reports
    order: Vec<String>,
    /// Auxiliary per-node data
    nodes: HashMap<String, Option<Value>>,
    /// Outgoing edges, insertion-ordered and deduplicated
    edges: HashMap<String, Vec<String>>,
}

impl ReferenceGraph {
    /// Create an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a node, optionally attaching auxiliary data.
    ///
    /// Re-adding an existing node replaces its data only when `data` is
    /// `Some`.
    pub fn add_node(&mut self, id: impl Into<String>, data: Option<Value>) {
        let id = id.into();
        match self.nodes.get_mut(&id) {
            Some(existing) => {
                if data.is_some() {
                    *existing = data;
                }
            }
            None => {
                self.order.push(id.clone());
                self.nodes.insert(id, data);
            }
        }
    }

    /// Add a directed edge, auto-adding both endpoints.
    ///
    /// Duplicate edges are ignored for graph operations.
    pub fn add_reference(&mut self, src: impl Into<String>, dst: impl Into<String>) {
        let src = src.into();
        let dst = dst.into();
        self.add_node(src.clone(), None);
        self.add_node(dst.clone(), None);
        let out = self.edges.entry(src).or_default();
        if !out.contains(&dst) {
            out.push(dst);
        }
    }

    /// Ids this node links to, in insertion order.
    #[must_use]
    pub fn references(&self, id: &str) -> Vec<String> {
        self.edges.get(id).cloned().unwrap_or_default()
    }

    /// Ids that link to this node (reverse scan), in node order.
    #[must_use]
    pub fn referenced_by(&self, id: &str) -> Vec<String> {
        self.order
            .iter()
            .filter(|src| {
                self.edges
                    .get(*src)
                    .is_some_and(|out| out.iter().any(|dst| dst == id))
            })
            .cloned()
            .collect()
    }

    /// Auxiliary data attached to a node.
    #[must_use]
    pub fn node_data(&self, id: &str) -> Option<&Value> {
        self.nodes.get(id).and_then(Option::as_ref)
    }

    /// Whether the node is known.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    /// Number of known nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Whether the graph has no nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Remove every node and edge.
    pub fn clear(&mut self) {
        self.order.clear();
        self.nodes.clear();
        self.edges.clear();
    }

    /// Every cycle found by depth-first search.
    ///
    /// Each reported path runs from the revisited node forward along the
    /// recursion stack, with the revisited node re-appended
    /// (`[a, b, c, a]`). All detections are retained; rotations of the same
    /// cycle are not deduplicated. Returns an empty list iff the graph is
    /// acyclic.
    #[must_use]
    pub fn detect_cycles(&self) -> Vec<Vec<String>> {
        let mut cycles = Vec::new();
        let mut visited: HashSet<&str> = HashSet::new();
        let mut stack: Vec<&str> = Vec::new();

        for id in &self.order {
            if !visited.contains(id.as_str()) {
                self.dfs(id, &mut visited, &mut stack, &mut cycles);
            }
        }
        cycles
    }

    fn dfs<'a>(
        &'a self,
        id: &'a str,
        visited: &mut HashSet<&'a str>,
        stack: &mut Vec<&'a str>,
        cycles: &mut Vec<Vec<String>>,
    ) {
        visited.insert(id);
        stack.push(id);

        if let Some(out) = self.edges.get(id) {
            for next in out {
                if !visited.contains(next.as_str()) {
                    self.dfs(next, visited, stack, cycles);
                } else if let Some(pos) = stack.iter().position(|n| *n == next.as_str()) {
                    let mut cycle: Vec<String> =
                        stack[pos..].iter().map(|s| (*s).to_string()).collect();
                    cycle.push(next.clone());
                    cycles.push(cycle);
                }
            }
        }

        stack.pop();
    }

    /// Snapshot of the adjacency relation: id → linked ids.
    #[must_use]
    pub fn export(&self) -> HashMap<String, Vec<String>> {
        self.order
            .iter()
            .map(|id| (id.clone(), self.references(id)))
            .collect()
    }
}
