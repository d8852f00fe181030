//! Graph assembly and layout.
//!
//! Thin adapter between the weighting engine and a renderer: builds petgraph
//! structures from weighted or timed edges, places nodes in 2-D through a pluggable
//! [`Layout`], and computes node sizes from incident weights.

use std::collections::HashMap;
use std::f64::consts::PI;

use chrono::NaiveDateTime;
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::edges::DirectedEdge;
use crate::error::{ChatNetError, Result};
use crate::weights::WeightTable;

// ---------------------------------------------------------------------------
// Graphs
// ---------------------------------------------------------------------------

fn ensure_node<E>(graph: &mut DiGraph<String, E>, index: &mut HashMap<String, NodeIndex>, user: &str) -> NodeIndex {
    if let Some(&idx) = index.get(user) {
        return idx;
    }
    let idx = graph.add_node(user.to_string());
    index.insert(user.to_string(), idx);
    idx
}

/// Directed graph with one weighted edge per ordered pair.
#[derive(Debug, Clone, Default)]
pub struct WeightedGraph {
    graph: DiGraph<String, f64>,
    index: HashMap<String, NodeIndex>,
}

impl WeightedGraph {
    /// Nodes are `users` in the given order, followed by any endpoint not listed.
    pub fn new(users: &[String], edges: &[(&str, &str, f64)]) -> Self {
        let mut graph = DiGraph::new();
        let mut index = HashMap::new();
        for user in users {
            ensure_node(&mut graph, &mut index, user);
        }
        for (source, target, weight) in edges {
            let s = ensure_node(&mut graph, &mut index, source);
            let t = ensure_node(&mut graph, &mut index, target);
            graph.add_edge(s, t, *weight);
        }
        debug!("[Graph] {} nodes, {} weighted edges", graph.node_count(), graph.edge_count());
        Self { graph, index }
    }

    /// Graph over one column of a weight table.
    pub fn from_table(users: &[String], table: &WeightTable, column: &str) -> Result<Self> {
        Ok(Self::new(users, &table.column(column)?))
    }

    pub fn graph(&self) -> &DiGraph<String, f64> {
        &self.graph
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Node labels in insertion order.
    pub fn nodes(&self) -> Vec<&str> {
        self.graph.node_indices().map(|i| self.graph[i].as_str()).collect()
    }

    pub fn contains(&self, user: &str) -> bool {
        self.index.contains_key(user)
    }

    pub fn weight(&self, source: &str, target: &str) -> Option<f64> {
        let s = *self.index.get(source)?;
        let t = *self.index.get(target)?;
        self.graph.find_edge(s, t).map(|e| self.graph[e])
    }

    pub fn edges(&self) -> Vec<(&str, &str, f64)> {
        self.graph
            .edge_references()
            .map(|e| (self.graph[e.source()].as_str(), self.graph[e.target()].as_str(), *e.weight()))
            .collect()
    }
}

/// A single reply instance kept in the multigraph.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimedEdge {
    /// Index of the replying message.
    pub key: usize,
    pub time: NaiveDateTime,
}

/// Directed multigraph keeping every reply instance, not aggregated.
#[derive(Debug, Clone, Default)]
pub struct TimedGraph {
    graph: DiGraph<String, TimedEdge>,
    index: HashMap<String, NodeIndex>,
}

impl TimedGraph {
    pub fn new(users: &[String], edges: &[DirectedEdge]) -> Self {
        let mut graph = DiGraph::new();
        let mut index = HashMap::new();
        for user in users {
            ensure_node(&mut graph, &mut index, user);
        }
        for edge in edges {
            let s = ensure_node(&mut graph, &mut index, &edge.source);
            let t = ensure_node(&mut graph, &mut index, &edge.target);
            graph.add_edge(s, t, TimedEdge { key: edge.index, time: edge.time });
        }
        debug!("[Graph] {} nodes, {} timed edges", graph.node_count(), graph.edge_count());
        Self { graph, index }
    }

    pub fn graph(&self) -> &DiGraph<String, TimedEdge> {
        &self.graph
    }

    pub fn nodes(&self) -> Vec<&str> {
        self.graph.node_indices().map(|i| self.graph[i].as_str()).collect()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Instances from `source` to `target`, ordered by key.
    pub fn instances(&self, source: &str, target: &str) -> Vec<&TimedEdge> {
        let (Some(&s), Some(&t)) = (self.index.get(source), self.index.get(target)) else {
            return Vec::new();
        };
        let mut found: Vec<&TimedEdge> = self.graph.edges_connecting(s, t).map(|e| e.weight()).collect();
        found.sort_by_key(|e| e.key);
        found
    }

    /// All instances in insertion order.
    pub fn timeline(&self) -> Vec<(&str, &str, &TimedEdge)> {
        self.graph
            .edge_references()
            .map(|e| (self.graph[e.source()].as_str(), self.graph[e.target()].as_str(), e.weight()))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Layout
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodePosition {
    pub user: String,
    pub x: f64,
    pub y: f64,
}

/// Positions in graph node order, looked up by user label.
#[derive(Debug, Clone, Default, Serialize)]
pub struct NodePositions {
    pub positions: Vec<NodePosition>,
}

impl NodePositions {
    pub fn get(&self, user: &str) -> Result<&NodePosition> {
        self.positions
            .iter()
            .find(|p| p.user == user)
            .ok_or_else(|| ChatNetError::UnknownNode(user.to_string()))
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Mean distance of the nodes from the origin.
    pub fn mean_radius(&self) -> f64 {
        if self.positions.is_empty() {
            return 0.0;
        }
        self.positions.iter().map(|p| p.x.hypot(p.y)).sum::<f64>() / self.positions.len() as f64
    }
}

/// 2-D placement strategy.
pub trait Layout {
    fn place(&self, graph: &WeightedGraph) -> NodePositions;
}

/// Nodes evenly spaced on a circle, first node at angle 0.
#[derive(Debug, Clone)]
pub struct CircularLayout {
    pub scale: f64,
    pub center: (f64, f64),
}

impl Default for CircularLayout {
    fn default() -> Self {
        Self { scale: 1.0, center: (0.0, 0.0) }
    }
}

impl Layout for CircularLayout {
    fn place(&self, graph: &WeightedGraph) -> NodePositions {
        let nodes = graph.nodes();
        let n = nodes.len();
        let positions = nodes
            .into_iter()
            .enumerate()
            .map(|(i, user)| {
                let (x, y) = if n == 1 {
                    self.center
                } else {
                    let theta = 2.0 * PI * i as f64 / n as f64;
                    (self.center.0 + self.scale * theta.cos(), self.center.1 + self.scale * theta.sin())
                };
                NodePosition { user: user.to_string(), x, y }
            })
            .collect();
        NodePositions { positions }
    }
}

/// Uniform positions in the unit square, reproducible through the seed.
#[derive(Debug, Clone)]
pub struct RandomLayout {
    pub seed: u64,
}

impl Layout for RandomLayout {
    fn place(&self, graph: &WeightedGraph) -> NodePositions {
        let mut rng = StdRng::seed_from_u64(self.seed);
        let positions = graph
            .nodes()
            .into_iter()
            .map(|user| NodePosition { user: user.to_string(), x: rng.gen::<f64>(), y: rng.gen::<f64>() })
            .collect();
        NodePositions { positions }
    }
}

/// Layouts selectable from settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayoutKind {
    #[default]
    Circular,
    Random,
}

impl LayoutKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LayoutKind::Circular => "circular",
            LayoutKind::Random => "random",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "circular" => Some(LayoutKind::Circular),
            "random" => Some(LayoutKind::Random),
            _ => None,
        }
    }

    pub fn build(&self, scale: f64, seed: u64) -> Box<dyn Layout> {
        match self {
            LayoutKind::Circular => Box::new(CircularLayout { scale, center: (0.0, 0.0) }),
            LayoutKind::Random => Box::new(RandomLayout { seed }),
        }
    }
}

// ---------------------------------------------------------------------------
// Node sizes
// ---------------------------------------------------------------------------

/// Which incident edges contribute to a node's size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Incidence {
    #[default]
    Incoming,
    Outgoing,
    Both,
}

/// Sum of `column` over each user's incident edges, in `users` order.
pub fn node_sizes(users: &[&str], table: &WeightTable, column: &str, incidence: Incidence) -> Result<Vec<(String, f64)>> {
    let rows = table.column(column)?;
    Ok(users
        .iter()
        .map(|user| {
            let size: f64 = rows
                .iter()
                .filter(|(source, target, _)| match incidence {
                    Incidence::Incoming => target == user,
                    Incidence::Outgoing => source == user,
                    Incidence::Both => source == user || target == user,
                })
                .map(|(_, _, w)| w)
                .sum();
            (user.to_string(), size)
        })
        .collect())
}
