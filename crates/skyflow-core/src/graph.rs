//! Dependency graph
//!
//! Resources are nodes, keyed by [`ResourceAddress`]; an edge `a -> b`
//! means `a` depends on `b`. Node indices follow declaration order, which
//! is what makes the topological order deterministic.
//!
//! Cycle detection is a separate depth-first pass with white/grey/black
//! colouring so the error can name the whole cycle. Ordering uses Kahn's
//! algorithm with a min-heap over declaration position.

use crate::address::ResourceAddress;
use crate::declaration::DeclarationSet;
use crate::error::{ModelError, Result};
use crate::resolver::DependencyEdge;
use petgraph::Direction;
use petgraph::graph::{DiGraph, NodeIndex};
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet, VecDeque};
use std::fmt::Write as _;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Color {
    White,
    Grey,
    Black,
}

#[derive(Debug, Clone)]
pub struct DependencyGraph {
    graph: DiGraph<ResourceAddress, ()>,
    index_map: HashMap<ResourceAddress, NodeIndex>,
    order: Vec<ResourceAddress>,
}

impl DependencyGraph {
    /// Build the graph of a declaration set from its resolved edges.
    pub fn build(declarations: &DeclarationSet, edges: &[DependencyEdge]) -> Result<Self> {
        Self::from_parts(declarations.addresses().cloned(), edges.iter().cloned())
    }

    /// Build a graph from arbitrary nodes and edges.
    ///
    /// Node order is the tie-break order. Edges touching unknown nodes are
    /// ignored, which lets callers feed dependencies recorded in state for
    /// resources that no longer exist.
    pub fn from_parts(
        nodes: impl IntoIterator<Item = ResourceAddress>,
        edges: impl IntoIterator<Item = DependencyEdge>,
    ) -> Result<Self> {
        let mut graph = DiGraph::new();
        let mut index_map = HashMap::new();

        for address in nodes {
            if index_map.contains_key(&address) {
                continue;
            }
            let idx = graph.add_node(address.clone());
            index_map.insert(address, idx);
        }

        for edge in edges {
            match (index_map.get(&edge.from), index_map.get(&edge.to)) {
                (Some(&from), Some(&to)) => {
                    graph.update_edge(from, to, ());
                }
                _ => debug!(from = %edge.from, to = %edge.to, "Ignoring edge to unknown node"),
            }
        }

        let mut dag = Self {
            graph,
            index_map,
            order: Vec::new(),
        };

        if let Some(cycle) = dag.find_cycle() {
            return Err(ModelError::CyclicDependency { cycle });
        }
        dag.order = dag.kahn()?;

        debug!(
            nodes = dag.node_count(),
            edges = dag.edge_count(),
            "Built dependency graph"
        );
        Ok(dag)
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn contains(&self, address: &ResourceAddress) -> bool {
        self.index_map.contains_key(address)
    }

    /// Every address after all of its dependencies; ties in declaration
    /// order.
    pub fn topological_order(&self) -> &[ResourceAddress] {
        &self.order
    }

    /// Dependents before their dependencies.
    pub fn reverse_topological_order(&self) -> Vec<ResourceAddress> {
        self.order.iter().rev().cloned().collect()
    }

    /// Direct dependencies of `address`.
    pub fn dependencies(&self, address: &ResourceAddress) -> Vec<&ResourceAddress> {
        self.neighbors_of(address, Direction::Outgoing)
    }

    /// Resources that directly depend on `address`.
    pub fn dependents(&self, address: &ResourceAddress) -> Vec<&ResourceAddress> {
        self.neighbors_of(address, Direction::Incoming)
    }

    /// `roots` plus everything they depend on, in topological order.
    pub fn transitive_dependencies(&self, roots: &[ResourceAddress]) -> Vec<ResourceAddress> {
        self.closure(roots, Direction::Outgoing)
    }

    /// `roots` plus everything depending on them, in topological order.
    pub fn transitive_dependents(&self, roots: &[ResourceAddress]) -> Vec<ResourceAddress> {
        self.closure(roots, Direction::Incoming)
    }

    /// Render in Graphviz DOT format. Arrows point at dependencies.
    pub fn to_dot(&self) -> String {
        let mut out = String::from("digraph {\n  rankdir = \"RL\";\n");
        for address in &self.order {
            let _ = writeln!(out, "  \"{}\";", address);
        }
        for address in &self.order {
            for dependency in self.dependencies(address) {
                let _ = writeln!(out, "  \"{}\" -> \"{}\";", address, dependency);
            }
        }
        out.push_str("}\n");
        out
    }

    fn sorted_neighbors(&self, idx: NodeIndex, direction: Direction) -> Vec<NodeIndex> {
        let mut neighbors: Vec<NodeIndex> =
            self.graph.neighbors_directed(idx, direction).collect();
        neighbors.sort_by_key(|n| n.index());
        neighbors.dedup();
        neighbors
    }

    fn neighbors_of(&self, address: &ResourceAddress, direction: Direction) -> Vec<&ResourceAddress> {
        let Some(&idx) = self.index_map.get(address) else {
            return Vec::new();
        };
        self.sorted_neighbors(idx, direction)
            .into_iter()
            .filter_map(|n| self.graph.node_weight(n))
            .collect()
    }

    fn closure(&self, roots: &[ResourceAddress], direction: Direction) -> Vec<ResourceAddress> {
        let mut visited: HashSet<NodeIndex> = HashSet::new();
        let mut queue: VecDeque<NodeIndex> = roots
            .iter()
            .filter_map(|r| self.index_map.get(r).copied())
            .collect();

        while let Some(idx) = queue.pop_front() {
            if !visited.insert(idx) {
                continue;
            }
            queue.extend(self.graph.neighbors_directed(idx, direction));
        }

        self.order
            .iter()
            .filter(|a| {
                self.index_map
                    .get(*a)
                    .is_some_and(|idx| visited.contains(idx))
            })
            .cloned()
            .collect()
    }

    fn find_cycle(&self) -> Option<Vec<ResourceAddress>> {
        let mut colors = vec![Color::White; self.graph.node_count()];
        let mut stack = Vec::new();

        for idx in self.graph.node_indices() {
            if colors[idx.index()] == Color::White
                && let Some(cycle) = self.visit(idx, &mut colors, &mut stack)
            {
                return Some(
                    cycle
                        .into_iter()
                        .filter_map(|n| self.graph.node_weight(n).cloned())
                        .collect(),
                );
            }
        }
        None
    }

    fn visit(
        &self,
        idx: NodeIndex,
        colors: &mut [Color],
        stack: &mut Vec<NodeIndex>,
    ) -> Option<Vec<NodeIndex>> {
        colors[idx.index()] = Color::Grey;
        stack.push(idx);

        for next in self.sorted_neighbors(idx, Direction::Outgoing) {
            match colors[next.index()] {
                Color::Grey => {
                    let start = stack.iter().position(|&n| n == next)?;
                    return Some(stack[start..].to_vec());
                }
                Color::White => {
                    if let Some(cycle) = self.visit(next, colors, stack) {
                        return Some(cycle);
                    }
                }
                Color::Black => {}
            }
        }

        stack.pop();
        colors[idx.index()] = Color::Black;
        None
    }

    fn kahn(&self) -> Result<Vec<ResourceAddress>> {
        let node_count = self.graph.node_count();
        let mut remaining: Vec<usize> = self
            .graph
            .node_indices()
            .map(|idx| self.sorted_neighbors(idx, Direction::Outgoing).len())
            .collect();

        let mut ready: BinaryHeap<Reverse<usize>> = remaining
            .iter()
            .enumerate()
            .filter(|(_, count)| **count == 0)
            .map(|(i, _)| Reverse(i))
            .collect();

        let mut order = Vec::with_capacity(node_count);
        while let Some(Reverse(i)) = ready.pop() {
            let idx = NodeIndex::new(i);
            if let Some(address) = self.graph.node_weight(idx) {
                order.push(address.clone());
            }
            for dependent in self.sorted_neighbors(idx, Direction::Incoming) {
                let count = &mut remaining[dependent.index()];
                *count = count.saturating_sub(1);
                if *count == 0 {
                    ready.push(Reverse(dependent.index()));
                }
            }
        }

        if order.len() != node_count {
            let stuck = self
                .graph
                .node_indices()
                .filter(|idx| remaining[idx.index()] > 0)
                .filter_map(|idx| self.graph.node_weight(idx).cloned())
                .collect();
            return Err(ModelError::CyclicDependency { cycle: stuck });
        }

        Ok(order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(s: &str) -> ResourceAddress {
        ResourceAddress::parse(s).unwrap()
    }

    fn edge(from: &str, to: &str) -> DependencyEdge {
        DependencyEdge::new(addr(from), addr(to))
    }

    fn graph(nodes: &[&str], edges: &[(&str, &str)]) -> Result<DependencyGraph> {
        DependencyGraph::from_parts(
            nodes.iter().map(|n| addr(n)),
            edges.iter().map(|(f, t)| edge(f, t)),
        )
    }

    fn names(order: &[ResourceAddress]) -> Vec<String> {
        order.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_empty_graph() {
        let dag = graph(&[], &[]).unwrap();
        assert!(dag.topological_order().is_empty());
    }

    #[test]
    fn test_dependencies_come_first() {
        let dag = graph(
            &["aws_subnet.a", "aws_lambda_function.api", "aws_vpc.main"],
            &[
                ("aws_subnet.a", "aws_vpc.main"),
                ("aws_lambda_function.api", "aws_subnet.a"),
            ],
        )
        .unwrap();

        assert_eq!(
            names(dag.topological_order()),
            vec!["aws_vpc.main", "aws_subnet.a", "aws_lambda_function.api"]
        );
        assert_eq!(
            names(&dag.reverse_topological_order()),
            vec!["aws_lambda_function.api", "aws_subnet.a", "aws_vpc.main"]
        );
    }

    #[test]
    fn test_ties_broken_by_declaration_order() {
        let dag = graph(
            &["s3.c", "s3.a", "s3.b", "iam.role"],
            &[("s3.a", "iam.role")],
        )
        .unwrap();

        assert_eq!(
            names(dag.topological_order()),
            vec!["s3.c", "s3.b", "iam.role", "s3.a"]
        );
    }

    #[test]
    fn test_order_is_stable_across_builds() {
        let nodes = ["d.x", "c.x", "b.x", "a.x", "e.x"];
        let edges = [("e.x", "a.x"), ("c.x", "b.x")];
        let first = graph(&nodes, &edges).unwrap();
        for _ in 0..10 {
            let again = graph(&nodes, &edges).unwrap();
            assert_eq!(first.topological_order(), again.topological_order());
        }
    }

    #[test]
    fn test_cycle_names_every_node() {
        let err = graph(
            &["a.x", "b.x", "c.x", "d.x"],
            &[("a.x", "b.x"), ("b.x", "c.x"), ("c.x", "a.x"), ("d.x", "a.x")],
        )
        .unwrap_err();

        match err {
            ModelError::CyclicDependency { cycle } => {
                assert_eq!(names(&cycle), vec!["a.x", "b.x", "c.x"]);
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_self_reference_is_cycle() {
        let err = graph(&["a.x"], &[("a.x", "a.x")]).unwrap_err();
        assert!(matches!(err, ModelError::CyclicDependency { cycle } if cycle.len() == 1));
    }

    #[test]
    fn test_unknown_edges_ignored() {
        let dag = graph(&["a.x"], &[("a.x", "gone.x")]).unwrap();
        assert_eq!(dag.edge_count(), 0);
    }

    #[test]
    fn test_transitive_closures() {
        let dag = graph(
            &["vpc.main", "subnet.a", "lambda.api", "bucket.images"],
            &[("subnet.a", "vpc.main"), ("lambda.api", "subnet.a")],
        )
        .unwrap();

        assert_eq!(
            names(&dag.transitive_dependencies(&[addr("lambda.api")])),
            vec!["vpc.main", "subnet.a", "lambda.api"]
        );
        assert_eq!(
            names(&dag.transitive_dependents(&[addr("subnet.a")])),
            vec!["subnet.a", "lambda.api"]
        );
        assert_eq!(names(&[dag.dependents(&addr("vpc.main"))[0].clone()]), vec!["subnet.a"]);
    }

    #[test]
    fn test_dot_output() {
        let dag = graph(&["vpc.main", "subnet.a"], &[("subnet.a", "vpc.main")]).unwrap();
        let dot = dag.to_dot();
        assert!(dot.starts_with("digraph {"));
        assert!(dot.contains("\"subnet.a\" -> \"vpc.main\";"));
    }
}
