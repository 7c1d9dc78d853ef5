// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Structural validation of a workflow graph.
//!
//! Reports issues instead of throwing: the translator decides which
//! issues abort and which become warnings on the report.

use crate::graph::{NodeType, WorkflowDefinition};
use std::collections::{BTreeMap, BTreeSet};

/// Classification of a detected cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleClass {
    /// Cycle passes through a loop node with max_iterations — tolerated.
    Bounded,
    /// Cycle on the reachable-from-start subgraph with no bounding loop
    /// node — a validation error.
    Unbounded,
    /// Cycle that start nodes cannot reach — warned, never executed.
    Unreachable,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ValidationIssue {
    MissingStartNode,
    DuplicateNodeId(String),
    UnknownNodeType { node: String, node_type: String },
    EdgeEndpointMissing { edge: String, node: String },
    OrphanedNode(String),
    Cycle { through: Vec<String>, class: CycleClass },
}

impl ValidationIssue {
    /// Whether this issue must abort translation.
    pub fn is_fatal(&self) -> bool {
        match self {
            ValidationIssue::MissingStartNode
            | ValidationIssue::DuplicateNodeId(_)
            | ValidationIssue::EdgeEndpointMissing { .. } => true,
            ValidationIssue::Cycle { class, .. } => *class == CycleClass::Unbounded,
            _ => false,
        }
    }

    pub fn message(&self) -> String {
        match self {
            ValidationIssue::MissingStartNode => {
                "workflow must have at least one start node".to_string()
            }
            ValidationIssue::DuplicateNodeId(id) => format!("duplicate node id: {}", id),
            ValidationIssue::UnknownNodeType { node, node_type } => {
                format!("node {}: unknown node type {:?}, skipped", node, node_type)
            }
            ValidationIssue::EdgeEndpointMissing { edge, node } => {
                format!("edge {} references missing node {}", edge, node)
            }
            ValidationIssue::OrphanedNode(id) => format!("orphaned node: {}", id),
            ValidationIssue::Cycle { through, class } => {
                let kind = match class {
                    CycleClass::Bounded => "bounded by loop node",
                    CycleClass::Unbounded => "unbounded",
                    CycleClass::Unreachable => "unreachable from start",
                };
                format!("cycle ({}) through: {}", kind, through.join(" -> "))
            }
        }
    }
}

/// Known nodes only: the caller has already filtered unknown types.
pub struct GraphIndex {
    /// node id -> parsed type
    pub types: BTreeMap<String, NodeType>,
    /// adjacency: source -> targets (sorted for determinism)
    pub successors: BTreeMap<String, Vec<String>>,
    /// reverse adjacency: target -> sources
    pub predecessors: BTreeMap<String, Vec<String>>,
    pub start_nodes: Vec<String>,
}

impl GraphIndex {
    pub fn build(definition: &WorkflowDefinition, known: &BTreeMap<String, NodeType>) -> Self {
        let mut successors: BTreeMap<String, Vec<String>> =
            known.keys().map(|id| (id.clone(), Vec::new())).collect();
        let mut predecessors: BTreeMap<String, Vec<String>> =
            known.keys().map(|id| (id.clone(), Vec::new())).collect();
        for edge in &definition.edges {
            if known.contains_key(&edge.source) && known.contains_key(&edge.target) {
                if let Some(out) = successors.get_mut(&edge.source) {
                    out.push(edge.target.clone());
                }
                if let Some(into) = predecessors.get_mut(&edge.target) {
                    into.push(edge.source.clone());
                }
            }
        }
        for list in successors.values_mut().chain(predecessors.values_mut()) {
            list.sort();
            list.dedup();
        }
        let mut start_nodes: Vec<String> = known
            .iter()
            .filter(|(_, t)| **t == NodeType::Start)
            .map(|(id, _)| id.clone())
            .collect();
        start_nodes.sort();
        Self { types: known.clone(), successors, predecessors, start_nodes }
    }

    /// Nodes reachable from any start node (BFS, deterministic order).
    pub fn reachable_from_start(&self) -> BTreeSet<String> {
        let mut seen = BTreeSet::new();
        let mut queue: Vec<String> = self.start_nodes.clone();
        while let Some(current) = queue.pop() {
            if !seen.insert(current.clone()) {
                continue;
            }
            if let Some(next) = self.successors.get(&current) {
                for target in next {
                    if !seen.contains(target) {
                        queue.push(target.clone());
                    }
                }
            }
        }
        seen
    }
}

/// Validate graph structure. Returns all issues found; the caller splits
/// them into fatal errors and warnings via [`ValidationIssue::is_fatal`].
pub fn validate_graph(
    definition: &WorkflowDefinition,
    known: &BTreeMap<String, NodeType>,
) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();

    // Duplicate ids are checked across the full node list, unknown types
    // included — two unknown nodes sharing an id is still authoring error.
    let mut seen = BTreeSet::new();
    for node in &definition.nodes {
        if !seen.insert(node.id.as_str()) {
            issues.push(ValidationIssue::DuplicateNodeId(node.id.clone()));
        }
    }

    let index = GraphIndex::build(definition, known);
    if index.start_nodes.is_empty() {
        issues.push(ValidationIssue::MissingStartNode);
    }

    let all_ids: BTreeSet<&str> = definition.nodes.iter().map(|n| n.id.as_str()).collect();
    for edge in &definition.edges {
        let edge_name = edge.id.clone().unwrap_or_else(|| {
            format!("{}-{}", edge.source, edge.target)
        });
        for endpoint in [&edge.source, &edge.target] {
            if !all_ids.contains(endpoint.as_str()) {
                issues.push(ValidationIssue::EdgeEndpointMissing {
                    edge: edge_name.clone(),
                    node: endpoint.clone(),
                });
            }
        }
    }

    // Orphans: non-start known nodes with no edge touching them.
    let mut connected = BTreeSet::new();
    for edge in &definition.edges {
        connected.insert(edge.source.as_str());
        connected.insert(edge.target.as_str());
    }
    for (id, node_type) in known {
        if *node_type != NodeType::Start && !connected.contains(id.as_str()) {
            issues.push(ValidationIssue::OrphanedNode(id.clone()));
        }
    }

    issues.extend(find_cycles(&index));
    issues
}

/// DFS with a recursion stack; each discovered back-edge yields one cycle
/// issue, classified by reachability and loop-node bounding.
fn find_cycles(index: &GraphIndex) -> Vec<ValidationIssue> {
    let reachable = index.reachable_from_start();
    let mut issues = Vec::new();
    let mut visited = BTreeSet::new();
    let mut stack = Vec::new();

    for root in index.types.keys() {
        if !visited.contains(root.as_str()) {
            dfs(root, index, &reachable, &mut visited, &mut stack, &mut issues);
        }
    }
    issues
}

fn dfs(
    node: &str,
    index: &GraphIndex,
    reachable: &BTreeSet<String>,
    visited: &mut BTreeSet<String>,
    stack: &mut Vec<String>,
    issues: &mut Vec<ValidationIssue>,
) {
    visited.insert(node.to_string());
    stack.push(node.to_string());

    if let Some(successors) = index.successors.get(node) {
        for next in successors {
            if let Some(pos) = stack.iter().position(|n| n == next) {
                let through: Vec<String> = stack[pos..].to_vec();
                issues.push(classify_cycle(&through, index, reachable));
            } else if !visited.contains(next.as_str()) {
                dfs(next, index, reachable, visited, stack, issues);
            }
        }
    }

    stack.pop();
}

fn classify_cycle(
    through: &[String],
    index: &GraphIndex,
    reachable: &BTreeSet<String>,
) -> ValidationIssue {
    let on_reachable = through.iter().any(|n| reachable.contains(n));
    let bounded = through.iter().any(|n| {
        index.types.get(n).is_some_and(|t| t.is_loop())
    });
    let class = if bounded {
        CycleClass::Bounded
    } else if on_reachable {
        CycleClass::Unbounded
    } else {
        CycleClass::Unreachable
    };
    ValidationIssue::Cycle { through: through.to_vec(), class }
}

#[cfg(test)]
#[path = "validate_tests.rs"]
mod tests;
