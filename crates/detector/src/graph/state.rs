use crate::graph::{CurrencyId, FeeSchedule, GraphEdge};
use crate::translator;
use common::{Currency, OrderBookSnapshot, PairKey};
use market_data::BookEvent;
use petgraph::graphmap::DiGraphMap;
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Parallel venue edges between one ordered currency pair.
pub type VenueEdges = BTreeMap<PairKey, GraphEdge>;

/// Directed multigraph of currencies, one edge per venue and direction.
#[derive(Clone, Debug)]
pub struct PairGraph {
    graph: DiGraphMap<CurrencyId, VenueEdges>,
    ids: HashMap<Currency, CurrencyId>,
    currencies: Vec<Currency>,
    fees: FeeSchedule,
    dust_threshold: Decimal,
    best_multiplier: f64,
}

impl PairGraph {
    pub fn new(fees: FeeSchedule, dust_threshold: Decimal) -> Self {
        PairGraph {
            graph: DiGraphMap::new(),
            ids: HashMap::new(),
            currencies: Vec::new(),
            fees,
            dust_threshold,
            best_multiplier: 0.0,
        }
    }

    /// Applies one store notification. Only the two edges of the affected pair change.
    pub fn apply(&mut self, event: &BookEvent) {
        match event {
            BookEvent::Updated(snapshot) => self.upsert_snapshot(snapshot),
            BookEvent::Pruned(key) => {
                self.remove_pair(key);
            }
        }
    }

    /// Replaces both directed edges of the snapshot's pair.
    pub fn upsert_snapshot(&mut self, snapshot: &OrderBookSnapshot) {
        let key = snapshot.pair.key();
        self.remove_pair(&key);
        let fee = self.fees.rate(&snapshot.pair.exchange);
        for edge in translator::snapshot_to_edges(snapshot, fee) {
            let from = self.get_or_create_currency_id(&edge.from);
            let to = self.get_or_create_currency_id(&edge.to);
            if edge.weight > self.best_multiplier {
                self.best_multiplier = edge.weight;
            }
            match self.graph.edge_weight_mut(from, to) {
                Some(venues) => {
                    venues.insert(key.clone(), edge);
                }
                None => {
                    let mut venues = VenueEdges::new();
                    venues.insert(key.clone(), edge);
                    self.graph.add_edge(from, to, venues);
                }
            }
        }
    }

    /// Removes both directed edges of a venue. Returns whether anything was removed.
    pub fn remove_pair(&mut self, key: &PairKey) -> bool {
        let (Some(&a), Some(&b)) = (self.ids.get(&key.a), self.ids.get(&key.b)) else {
            return false;
        };
        let mut removed = false;
        for (from, to) in [(a, b), (b, a)] {
            let now_empty = match self.graph.edge_weight_mut(from, to) {
                Some(venues) => {
                    removed |= venues.remove(key).is_some();
                    venues.is_empty()
                }
                None => false,
            };
            if now_empty {
                self.graph.remove_edge(from, to);
            }
        }
        removed
    }

    /// Outgoing edges of `currency`, skipping edges below the dust threshold.
    /// Each call starts a fresh traversal.
    pub fn neighbors<'a>(&'a self, currency: &Currency) -> impl Iterator<Item = &'a GraphEdge> + 'a {
        let id = self.ids.get(currency).copied();
        let dust = self.dust_threshold;
        id.into_iter()
            .flat_map(move |id| self.graph.edges(id))
            .flat_map(|(_, _, venues)| venues.values())
            .filter(move |edge| edge.volume.0 >= dust)
    }

    /// The current edge of venue `key` leaving `from`.
    pub fn edge(&self, key: &PairKey, from: &Currency) -> Option<&GraphEdge> {
        let to = if *from == key.a {
            &key.b
        } else if *from == key.b {
            &key.a
        } else {
            return None;
        };
        let from_id = *self.ids.get(from)?;
        let to_id = *self.ids.get(to)?;
        self.graph.edge_weight(from_id, to_id)?.get(key)
    }

    /// Discards all edges and re-inserts every snapshot.
    pub fn rebuild<I>(&mut self, snapshots: I)
    where
        I: IntoIterator<Item = Arc<OrderBookSnapshot>>,
    {
        let nodes: Vec<CurrencyId> = self.graph.nodes().collect();
        self.graph = DiGraphMap::with_capacity(nodes.len(), nodes.len() * 2);
        let mut count = 0usize;
        for snapshot in snapshots {
            self.upsert_snapshot(&snapshot);
            count += 1;
        }
        log::info!("Rebuilt pair graph from {} snapshots", count);
    }

    /// Largest edge multiplier ever inserted. Never decreases.
    pub fn best_edge_multiplier(&self) -> f64 {
        self.best_multiplier
    }

    pub fn currency(&self, id: CurrencyId) -> Option<&Currency> {
        self.currencies.get(id.index())
    }

    pub fn currency_count(&self) -> usize {
        self.graph.node_count()
    }

    /// Number of venue edges across all directions.
    pub fn edge_count(&self) -> usize {
        self.graph
            .all_edges()
            .map(|(_, _, venues)| venues.len())
            .sum()
    }

    fn get_or_create_currency_id(&mut self, currency: &Currency) -> CurrencyId {
        if let Some(&id) = self.ids.get(currency) {
            if !self.graph.contains_node(id) {
                self.graph.add_node(id);
            }
            return id;
        }
        let id = CurrencyId::new(self.currencies.len() as u32);
        self.currencies.push(currency.clone());
        self.ids.insert(currency.clone(), id);
        self.graph.add_node(id);
        id
    }
}
