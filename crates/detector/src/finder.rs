//! Bounded-depth search for profitable loops through the pair graph.

use crate::graph::{GraphEdge, PairGraph};
use crate::sizing;
use common::{Currency, Quantity};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct FinderConfig {
    /// Maximum number of legs in a loop.
    pub max_depth: usize,
    /// A loop qualifies only if its multiplier exceeds `1 + margin`.
    pub margin: f64,
}

impl FinderConfig {
    pub fn threshold(&self) -> f64 {
        1.0 + self.margin
    }
}

/// A closed sequence of edges leaving and returning to the same currency.
#[derive(Debug, Clone, PartialEq)]
pub struct Loop {
    edges: Vec<GraphEdge>,
    multiplier: f64,
    volume: Quantity,
}

impl Loop {
    /// Returns `None` unless the edges chain and close with at least two legs.
    pub fn new(edges: Vec<GraphEdge>) -> Option<Self> {
        if edges.len() < 2 {
            return None;
        }
        let chained = edges.windows(2).all(|w| w[0].to == w[1].from);
        let closed = edges.first()?.from == edges.last()?.to;
        if !chained || !closed {
            return None;
        }
        let multiplier = edges.iter().map(|e| e.weight).product();
        let volume = Quantity(sizing::deliverable_volume(&edges));
        Some(Loop {
            edges,
            multiplier,
            volume,
        })
    }

    pub fn base(&self) -> &Currency {
        &self.edges[0].from
    }

    pub fn edges(&self) -> &[GraphEdge] {
        &self.edges
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// Product of edge multipliers at the time the loop was found.
    pub fn multiplier(&self) -> f64 {
        self.multiplier
    }

    /// Deliverable volume in base currency at the time the loop was found.
    pub fn volume(&self) -> Quantity {
        self.volume
    }

    /// Product of the multipliers of the same venues in `graph` now, or
    /// `None` if any leg has disappeared.
    pub fn recompute_multiplier(&self, graph: &PairGraph) -> Option<f64> {
        self.edges.iter().try_fold(1.0, |product, edge| {
            graph
                .edge(&edge.key(), &edge.from)
                .map(|current| product * current.weight)
        })
    }

    /// The same route rebuilt from the current edges in `graph`.
    pub fn refresh(&self, graph: &PairGraph) -> Option<Loop> {
        let edges = self
            .edges
            .iter()
            .map(|edge| graph.edge(&edge.key(), &edge.from).cloned())
            .collect::<Option<Vec<_>>>()?;
        Loop::new(edges)
    }

    /// Stable identity of the route: venues, directions and order types.
    pub fn fingerprint(&self) -> [u8; 32] {
        let mut hasher = blake3::Hasher::new();
        for edge in &self.edges {
            hasher.update(edge.pair.exchange.0.as_bytes());
            hasher.update(b"\x1f");
            hasher.update(edge.from.as_str().as_bytes());
            hasher.update(b"\x1f");
            hasher.update(edge.to.as_str().as_bytes());
            hasher.update(b"\x1f");
            hasher.update(edge.order_type.to_string().as_bytes());
            hasher.update(b"\x1e");
        }
        *hasher.finalize().as_bytes()
    }

    /// Human-readable route, e.g. `BTC -kraken-> USD -kraken-> BTC`.
    pub fn route(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Loop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.base())?;
        for edge in &self.edges {
            write!(f, " -{}-> {}", edge.pair.exchange, edge.to)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct LoopFinder {
    config: FinderConfig,
}

impl LoopFinder {
    pub fn new(config: FinderConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &FinderConfig {
        &self.config
    }

    /// Lazily enumerates qualifying loops through `base`. Each call starts afresh.
    pub fn search<'g>(&self, graph: &'g PairGraph, base: &Currency) -> LoopSearch<'g> {
        LoopSearch::new(graph, base.clone(), &self.config)
    }

    /// Highest multiplier wins; exact ties go to the larger volume.
    pub fn best_loop(&self, graph: &PairGraph, base: &Currency) -> Option<Loop> {
        self.search(graph, base).fold(None, |best: Option<Loop>, candidate| match best {
            Some(current)
                if current.multiplier > candidate.multiplier
                    || (current.multiplier == candidate.multiplier
                        && current.volume >= candidate.volume) =>
            {
                Some(current)
            }
            _ => Some(candidate),
        })
    }
}

type Neighbors<'g> = Box<dyn Iterator<Item = &'g GraphEdge> + 'g>;

/// Depth-first traversal state. `frames[i]` holds the unexplored edges
/// leaving the node reached by `path[..i]`.
pub struct LoopSearch<'g> {
    graph: &'g PairGraph,
    base: Currency,
    max_depth: usize,
    threshold: f64,
    best_edge: f64,
    frames: Vec<Neighbors<'g>>,
    path: Vec<&'g GraphEdge>,
    products: Vec<f64>,
    visited: HashSet<Currency>,
}

impl<'g> LoopSearch<'g> {
    fn new(graph: &'g PairGraph, base: Currency, config: &FinderConfig) -> Self {
        let mut frames: Vec<Neighbors<'g>> = Vec::new();
        if config.max_depth >= 2 {
            frames.push(Box::new(graph.neighbors(&base)));
        }
        LoopSearch {
            graph,
            base,
            max_depth: config.max_depth,
            threshold: config.threshold(),
            best_edge: graph.best_edge_multiplier(),
            frames,
            path: Vec::new(),
            products: Vec::new(),
            visited: HashSet::new(),
        }
    }

    fn running_product(&self) -> f64 {
        self.products.last().copied().unwrap_or(1.0)
    }

    /// Upper bound on any loop completing from a path of `depth` legs with
    /// running product `product`. Every edge is at most `best_edge`.
    fn can_exceed(&self, product: f64, depth: usize) -> bool {
        let remaining = self.max_depth.saturating_sub(depth);
        if remaining == 0 {
            return false;
        }
        let bound = if self.best_edge >= 1.0 {
            product * self.best_edge.powi(remaining.min(i32::MAX as usize) as i32)
        } else {
            product * self.best_edge
        };
        bound > self.threshold
    }
}

impl<'g> Iterator for LoopSearch<'g> {
    type Item = Loop;

    fn next(&mut self) -> Option<Loop> {
        loop {
            let next_edge = self.frames.last_mut()?.next();
            let Some(edge) = next_edge else {
                self.frames.pop();
                if let Some(edge) = self.path.pop() {
                    self.visited.remove(&edge.to);
                    self.products.pop();
                }
                continue;
            };

            let depth = self.path.len() + 1;
            let product = self.running_product() * edge.weight;

            if edge.to == self.base {
                if depth >= 2 && product > self.threshold {
                    let edges = self
                        .path
                        .iter()
                        .map(|e| (*e).clone())
                        .chain(std::iter::once(edge.clone()))
                        .collect();
                    if let Some(found) = Loop::new(edges) {
                        return Some(found);
                    }
                }
                continue;
            }

            if depth >= self.max_depth
                || self.visited.contains(&edge.to)
                || !self.can_exceed(product, depth)
            {
                continue;
            }

            self.path.push(edge);
            self.products.push(product);
            self.visited.insert(edge.to.clone());
            self.frames.push(Box::new(self.graph.neighbors(&edge.to)));
        }
    }
}
