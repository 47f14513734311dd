// SENTINEL Vantage - Attack Graph Core
// mod.rs - The AND/OR derivation graph and its structural algorithms
//
// The graph is an arena: vertices live in an id-keyed map and arcs are
// id pairs. Parent/child lists are never stored on vertices; they are
// served from an adjacency index that every structural mutation keeps
// consistent. Cloning the graph is therefore a plain deep copy with no
// reference rebinding step.
//
// Copyright (c) 2026 CIPS Corps. All rights reserved.

pub mod fact;
pub mod vertex;
pub mod xml;

use std::collections::{BTreeMap, HashMap, HashSet};

use crate::topology::Topology;
use crate::{VantageError, VantageResult};

pub use fact::{DatalogFact, DerivationRule, Fact, FactKind};
pub use vertex::{ImpactMetric, Vertex, VertexId, VertexType};

/// A derivation arc: `destination` is derived from `source`.
///
/// Value identity: two arcs are equal when both endpoints are equal.
/// Duplicate arcs are legal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Arc {
    pub source: VertexId,
    pub destination: VertexId,
}

impl Arc {
    pub fn new(source: VertexId, destination: VertexId) -> Self {
        Self { source, destination }
    }
}

/// The attack graph: an AND/OR/LEAF derivation graph over reasoner facts.
#[derive(Debug, Clone, Default)]
pub struct AttackGraph {
    vertices: BTreeMap<VertexId, Vertex>,
    arcs: Vec<Arc>,

    /// id -> sources of arcs ending at id.
    parents_index: HashMap<VertexId, Vec<VertexId>>,
    /// id -> destinations of arcs starting at id.
    children_index: HashMap<VertexId, Vec<VertexId>>,

    /// Global risk/impact score of the whole graph, set by the scorer.
    pub global_score: f64,
}

impl AttackGraph {
    pub fn new() -> Self {
        Self::default()
    }

    // -----------------------------------------------------------------------
    // Structure
    // -----------------------------------------------------------------------

    /// Idempotent vertex materialization: inserting an id that already
    /// exists keeps the existing vertex.
    pub fn insert_vertex(&mut self, vertex: Vertex) -> &Vertex {
        self.vertices.entry(vertex.id).or_insert(vertex)
    }

    pub fn vertex(&self, id: VertexId) -> VantageResult<&Vertex> {
        self.vertices.get(&id).ok_or(VantageError::VertexNotFound(id))
    }

    pub fn contains(&self, id: VertexId) -> bool {
        self.vertices.contains_key(&id)
    }

    pub fn vertices(&self) -> impl Iterator<Item = &Vertex> {
        self.vertices.values()
    }

    pub fn ids(&self) -> Vec<VertexId> {
        self.vertices.keys().copied().collect()
    }

    pub fn arcs(&self) -> &[Arc] {
        &self.arcs
    }

    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    /// Add an arc meaning "destination is derived from source".
    pub fn add_arc(&mut self, source: VertexId, destination: VertexId) {
        self.arcs.push(Arc::new(source, destination));
        self.parents_index.entry(destination).or_default().push(source);
        self.children_index.entry(source).or_default().push(destination);
    }

    /// Remove all arcs from `from` to `to`. Succeeds when none exist.
    pub fn delete_arc(&mut self, from: VertexId, to: VertexId) {
        self.arcs.retain(|a| !(a.source == from && a.destination == to));
        if let Some(parents) = self.parents_index.get_mut(&to) {
            parents.retain(|&p| p != from);
        }
        if let Some(children) = self.children_index.get_mut(&from) {
            children.retain(|&c| c != to);
        }
    }

    /// Sources of arcs ending at `id`. Empty for unknown ids.
    pub fn parents(&self, id: VertexId) -> &[VertexId] {
        self.parents_index.get(&id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Destinations of arcs starting at `id`. Empty for unknown ids.
    pub fn children(&self, id: VertexId) -> &[VertexId] {
        self.children_index.get(&id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// The parent of `id` whose fact is the Datalog predicate `command`,
    /// if one exists.
    pub fn parent_with_command(&self, id: VertexId, command: &str) -> Option<VertexId> {
        self.parents(id)
            .iter()
            .copied()
            .find(|&p| self.vertices.get(&p).map(|v| v.fact.is_command(command)).unwrap_or(false))
    }

    // -----------------------------------------------------------------------
    // Deletion cascade
    // -----------------------------------------------------------------------

    /// Delete a vertex and propagate the structural consequences.
    ///
    /// Idempotent: a no-op when `id` is already absent. The local cascade
    /// (an AND child cannot survive losing any input; an OR child survives
    /// while any alternative parent remains; a parent whose only purpose
    /// was feeding this vertex dies with it) is followed by a global
    /// fixed-point cleanup, because AND/OR semantics make reachability
    /// non-local: removing one leaf can orphan a distant AND branch.
    pub fn delete_vertex(&mut self, id: VertexId) {
        if !self.contains(id) {
            return;
        }
        self.delete_vertex_cascade(id);
        self.delete_unreachable_vertices();
    }

    /// The local cascade, without the global fixed-point pass.
    fn delete_vertex_cascade(&mut self, id: VertexId) {
        if !self.contains(id) {
            return;
        }

        let children: Vec<VertexId> = self.children(id).to_vec();
        let parents: Vec<VertexId> = self.parents(id).to_vec();

        self.vertices.remove(&id);

        for child in children {
            self.delete_arc(id, child);
            let Some(child_type) = self.vertices.get(&child).map(|v| v.vertex_type) else {
                continue;
            };
            match child_type {
                VertexType::And => self.delete_vertex_cascade(child),
                VertexType::Or => {
                    if self.parents(child).is_empty() {
                        self.delete_vertex_cascade(child);
                    }
                }
                VertexType::Leaf => {}
            }
        }

        for parent in parents {
            if self.contains(parent)
                && self.children(parent) == [id]
                && self.parents(parent).is_empty()
            {
                self.delete_vertex_cascade(parent);
            }
            self.delete_arc(parent, id);
        }
    }

    /// Delete every vertex that no set of leaves can reach, iterating to a
    /// fixed point.
    pub fn delete_unreachable_vertices(&mut self) {
        loop {
            let to_delete: Vec<VertexId> = self
                .ids()
                .into_iter()
                .filter(|&id| self.minimum_prerequisite_leaves(id).is_empty())
                .collect();
            if to_delete.is_empty() {
                return;
            }
            for id in to_delete {
                self.delete_vertex_cascade(id);
            }
        }
    }

    // -----------------------------------------------------------------------
    // Minimum prerequisite leaves
    // -----------------------------------------------------------------------

    /// One cheapest set of leaves sufficient to derive `id`.
    ///
    /// OR picks the smallest non-empty result among its parents; AND needs
    /// every parent and is unreachable as soon as one parent is. An empty
    /// result means no leaf set derives this vertex.
    pub fn minimum_prerequisite_leaves(&self, id: VertexId) -> Vec<VertexId> {
        let mut seen = HashSet::new();
        self.minimum_prerequisite_leaves_recursive(id, &mut seen)
    }

    fn minimum_prerequisite_leaves_recursive(
        &self,
        id: VertexId,
        seen: &mut HashSet<VertexId>,
    ) -> Vec<VertexId> {
        let Some(vertex) = self.vertices.get(&id) else {
            return Vec::new();
        };

        match vertex.vertex_type {
            VertexType::Leaf => vec![id],
            VertexType::Or if !seen.contains(&id) => {
                seen.insert(id);
                let mut minimum: Vec<VertexId> = Vec::new();
                for parent in self.parents(id).to_vec() {
                    let from_parent = self.minimum_prerequisite_leaves_recursive(parent, seen);
                    if !from_parent.is_empty()
                        && (minimum.is_empty() || from_parent.len() < minimum.len())
                    {
                        minimum = from_parent;
                    }
                }
                seen.remove(&id);
                minimum
            }
            VertexType::And if !seen.contains(&id) => {
                seen.insert(id);
                let mut union: Vec<VertexId> = Vec::new();
                for parent in self.parents(id).to_vec() {
                    let from_parent = self.minimum_prerequisite_leaves_recursive(parent, seen);
                    if from_parent.is_empty() {
                        // One mandatory input unreachable: so is the AND.
                        seen.remove(&id);
                        return Vec::new();
                    }
                    union.extend(from_parent);
                }
                seen.remove(&id);
                union
            }
            // Already on the current recursion stack: ignore the cyclic edge.
            _ => Vec::new(),
        }
    }

    // -----------------------------------------------------------------------
    // Topology binding
    // -----------------------------------------------------------------------

    /// Attach impact metrics from the topology to every code-execution
    /// vertex whose host resolves.
    pub fn load_metrics_from_topology(&mut self, topology: &Topology) {
        for vertex in self.vertices.values_mut() {
            let Some(datalog) = vertex.fact.datalog() else {
                continue;
            };
            if datalog.command != "execCode" {
                continue;
            }
            let Some(host_name) = datalog.param(0).filter(|h| !h.is_empty()) else {
                continue;
            };
            if let Some(host) = topology.host_by_name_or_ip(host_name) {
                vertex.impact_metrics.push(ImpactMetric::new(host.metric, 1.0));
                vertex.concerned_host = Some(host.name.clone());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(id: VertexId) -> Vertex {
        Vertex::new(
            id,
            VertexType::Leaf,
            Fact::parse(&format!("attackerLocated(h{})", id)).unwrap(),
        )
    }

    fn and(id: VertexId) -> Vertex {
        Vertex::new(
            id,
            VertexType::And,
            Fact::parse(&format!("RULE {} (test rule)", id)).unwrap(),
        )
    }

    fn or(id: VertexId) -> Vertex {
        Vertex::new(
            id,
            VertexType::Or,
            Fact::parse(&format!("netAccess(h{},tcp,80)", id)).unwrap(),
        )
    }

    /// LEAF(1) -> AND(2) -> OR(3), with LEAF(4) -> OR(3).
    fn scenario_graph() -> AttackGraph {
        let mut g = AttackGraph::new();
        g.insert_vertex(leaf(1));
        g.insert_vertex(and(2));
        g.insert_vertex(or(3));
        g.insert_vertex(leaf(4));
        g.add_arc(1, 2);
        g.add_arc(2, 3);
        g.add_arc(4, 3);
        g
    }

    #[test]
    fn test_insert_vertex_is_idempotent() {
        let mut g = AttackGraph::new();
        g.insert_vertex(leaf(1));
        let mut replacement = leaf(1);
        replacement.metric = 99.0;
        g.insert_vertex(replacement);
        // First insertion wins: same logical vertex.
        assert_eq!(g.vertex(1).unwrap().metric, 0.0);
        assert_eq!(g.vertex_count(), 1);
    }

    #[test]
    fn test_parents_and_children_views() {
        let g = scenario_graph();
        assert_eq!(g.parents(3), &[2, 4]);
        assert_eq!(g.children(1), &[2]);
        assert_eq!(g.parents(1), &[] as &[VertexId]);
        assert_eq!(g.children(3), &[] as &[VertexId]);
    }

    #[test]
    fn test_delete_arc_removes_duplicates_and_tolerates_absence() {
        let mut g = scenario_graph();
        g.add_arc(1, 2); // duplicate
        assert_eq!(g.parents(2), &[1, 1]);
        g.delete_arc(1, 2);
        assert_eq!(g.parents(2), &[] as &[VertexId]);
        // Deleting again must succeed silently.
        g.delete_arc(1, 2);
    }

    #[test]
    fn test_minimum_prerequisite_leaves() {
        let g = scenario_graph();
        // OR(3): cheapest alternative is LEAF(4) alone.
        assert_eq!(g.minimum_prerequisite_leaves(3), vec![4]);
        // AND(2) needs its single input.
        assert_eq!(g.minimum_prerequisite_leaves(2), vec![1]);
        // A leaf is its own prerequisite.
        assert_eq!(g.minimum_prerequisite_leaves(1), vec![1]);
    }

    #[test]
    fn test_and_with_unreachable_parent_is_unreachable() {
        let mut g = AttackGraph::new();
        g.insert_vertex(leaf(1));
        g.insert_vertex(and(2));
        g.insert_vertex(or(3)); // OR with no parents: unreachable
        g.add_arc(1, 2);
        g.add_arc(3, 2);
        assert!(g.minimum_prerequisite_leaves(2).is_empty());
    }

    #[test]
    fn test_scenario_cascade_stops_at_surviving_or() {
        let mut g = scenario_graph();
        g.delete_vertex(1);
        // AND(2) lost a mandatory input and died; OR(3) survives on LEAF(4).
        assert!(!g.contains(1));
        assert!(!g.contains(2));
        assert!(g.contains(3));
        assert!(g.contains(4));
        assert_eq!(g.parents(3), &[4]);
    }

    #[test]
    fn test_delete_vertex_is_idempotent() {
        let mut g = scenario_graph();
        g.delete_vertex(1);
        let count = g.vertex_count();
        let arcs = g.arcs().len();
        g.delete_vertex(1); // second call: no-op
        assert_eq!(g.vertex_count(), count);
        assert_eq!(g.arcs().len(), arcs);
    }

    #[test]
    fn test_cascade_through_and_chain() {
        // LEAF(1) -> AND(2) -> AND(3) -> OR(4) <- LEAF(5)
        let mut g = AttackGraph::new();
        g.insert_vertex(leaf(1));
        g.insert_vertex(and(2));
        g.insert_vertex(and(3));
        g.insert_vertex(or(4));
        g.insert_vertex(leaf(5));
        g.add_arc(1, 2);
        g.add_arc(2, 3);
        g.add_arc(3, 4);
        g.add_arc(5, 4);

        g.delete_vertex(1);
        // The whole AND chain collapses, up to but not beyond the OR
        // junction that still has a surviving input.
        assert!(!g.contains(2));
        assert!(!g.contains(3));
        assert!(g.contains(4));
        assert!(g.contains(5));
    }

    #[test]
    fn test_unreachable_fixed_point_removes_orphaned_or() {
        // OR(2) derived only from AND(1) which has no parents at all:
        // nothing is derivable from a leaf, everything must go.
        let mut g = AttackGraph::new();
        g.insert_vertex(and(1));
        g.insert_vertex(or(2));
        g.add_arc(1, 2);
        g.delete_unreachable_vertices();
        assert_eq!(g.vertex_count(), 0);
        assert!(g.arcs().is_empty());
    }

    #[test]
    fn test_cycle_does_not_overflow() {
        // OR(2) and AND(3) form a cycle; LEAF(1) feeds it.
        let mut g = AttackGraph::new();
        g.insert_vertex(leaf(1));
        g.insert_vertex(or(2));
        g.insert_vertex(and(3));
        g.add_arc(1, 2);
        g.add_arc(2, 3);
        g.add_arc(3, 2); // cyclic edge

        let leaves = g.minimum_prerequisite_leaves(3);
        assert_eq!(leaves, vec![1]);
        // And the OR ignores the cyclic alternative.
        assert_eq!(g.minimum_prerequisite_leaves(2), vec![1]);
    }

    #[test]
    fn test_diamond_dependency_is_not_a_false_cycle() {
        // LEAF(1) feeds OR(2) and OR(3), both feed AND(4): the shared
        // ancestor must be visitable down both branches.
        let mut g = AttackGraph::new();
        g.insert_vertex(leaf(1));
        g.insert_vertex(or(2));
        g.insert_vertex(or(3));
        g.insert_vertex(and(4));
        g.add_arc(1, 2);
        g.add_arc(1, 3);
        g.add_arc(2, 4);
        g.add_arc(3, 4);

        assert_eq!(g.minimum_prerequisite_leaves(4), vec![1, 1]);
    }

    #[test]
    fn test_clone_is_fully_independent() {
        let original = scenario_graph();
        let mut copy = original.clone();
        copy.delete_vertex(1);
        // The original graph must be untouched by mutations of the clone.
        assert!(original.contains(1));
        assert!(original.contains(2));
        assert_eq!(original.arcs().len(), 3);
        assert!(!copy.contains(2));
    }

    #[test]
    fn test_parent_with_command_lookup() {
        let g = scenario_graph();
        assert_eq!(g.parent_with_command(3, "attackerLocated"), Some(4));
        assert_eq!(g.parent_with_command(3, "vulExists"), None);
    }
}
