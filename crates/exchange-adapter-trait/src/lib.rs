use async_trait::async_trait;
use common::{
    AdapterResult, Currency, ExchangeId, OrderBookSnapshot, OrderId, OrderRequest, OrderStatus,
    Pair, Quantity,
};
use futures::stream::BoxStream;
use std::collections::HashMap;
use std::sync::Arc;

/// A stream of book snapshots for one pair. Ends when the exchange closes the feed.
pub type BookStream = BoxStream<'static, AdapterResult<OrderBookSnapshot>>;

/// Capability interface for a single exchange. The engine only ever talks to
/// exchanges through this trait.
#[async_trait]
pub trait ExchangeAdapter: Send + Sync {
    /// Returns the unique identifier for the exchange.
    fn id(&self) -> ExchangeId;

    /// Opens a feed of order-book snapshots for `pair`.
    async fn subscribe_order_book(&self, pair: &Pair) -> AdapterResult<BookStream>;

    /// Free balance of `currency` on this exchange.
    async fn get_balance(&self, currency: &Currency) -> AdapterResult<Quantity>;

    async fn place_order(&self, request: &OrderRequest) -> AdapterResult<OrderId>;

    /// Returns `true` when the exchange acknowledged the cancel.
    async fn cancel_order(&self, order_id: &OrderId) -> AdapterResult<bool>;

    async fn get_order_status(&self, order_id: &OrderId) -> AdapterResult<OrderStatus>;
}

/// Adapters keyed by the exchange they serve.
pub type ExchangeAdapters = HashMap<ExchangeId, Arc<dyn ExchangeAdapter>>;

/// Builds the registry from a list of adapters, keyed by their own `id()`.
pub fn registry(adapters: impl IntoIterator<Item = Arc<dyn ExchangeAdapter>>) -> ExchangeAdapters {
    adapters
        .into_iter()
        .map(|adapter| (adapter.id(), adapter))
        .collect()
}
