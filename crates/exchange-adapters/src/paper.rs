use async_trait::async_trait;
use common::{
    AdapterError, AdapterResult, Currency, ExchangeId, OrderBookSnapshot, OrderId, OrderRequest,
    OrderStatus, OrderType, Pair, PairKey, Quantity,
};
use dashmap::DashMap;
use exchange_adapter_trait::{BookStream, ExchangeAdapter};
use futures::StreamExt;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use tokio::sync::broadcast;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;

const FEED_CAPACITY: usize = 64;

/// How a paper order behaves once placed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FillPolicy {
    /// Fills completely at the limit price on placement.
    Immediate,
    /// Fills the given fraction of the amount, then closes.
    Partial(Decimal),
    /// Stays open and unfilled for `n` status polls, then fills completely.
    AfterPolls(u32),
    /// Stays open and unfilled until cancelled.
    Resting,
    /// Accepted, but never answers a status query and never acknowledges a cancel.
    Unresponsive,
    /// Fills the given fraction on placement and keeps the remainder open.
    /// Status queries are answered; cancels are never acknowledged.
    Lingering(Decimal),
    /// Rejected at placement.
    Reject,
}

#[derive(Debug, Clone)]
struct PaperOrder {
    request: OrderRequest,
    policy: FillPolicy,
    polls: u32,
    filled: Decimal,
    is_open: bool,
}

/// In-memory exchange with scripted fill behaviour.
pub struct PaperExchange {
    id: ExchangeId,
    fee_rate: Decimal,
    balances: DashMap<Currency, Decimal>,
    orders: DashMap<OrderId, PaperOrder>,
    feeds: DashMap<PairKey, broadcast::Sender<OrderBookSnapshot>>,
    last_books: DashMap<PairKey, OrderBookSnapshot>,
    script: Mutex<VecDeque<FillPolicy>>,
    default_policy: Mutex<FillPolicy>,
    placed: Mutex<Vec<OrderRequest>>,
    transient_failures: AtomicU32,
    offline: AtomicBool,
    next_order: AtomicU64,
}

impl PaperExchange {
    pub fn new(id: ExchangeId, fee_rate: Decimal) -> Self {
        PaperExchange {
            id,
            fee_rate,
            balances: DashMap::new(),
            orders: DashMap::new(),
            feeds: DashMap::new(),
            last_books: DashMap::new(),
            script: Mutex::new(VecDeque::new()),
            default_policy: Mutex::new(FillPolicy::Immediate),
            placed: Mutex::new(Vec::new()),
            transient_failures: AtomicU32::new(0),
            offline: AtomicBool::new(false),
            next_order: AtomicU64::new(1),
        }
    }

    pub fn with_balance(self, currency: Currency, amount: Decimal) -> Self {
        self.set_balance(currency, amount);
        self
    }

    pub fn set_balance(&self, currency: Currency, amount: Decimal) {
        self.balances.insert(currency, amount);
    }

    pub fn balance(&self, currency: &Currency) -> Decimal {
        self.balances
            .get(currency)
            .map(|b| *b.value())
            .unwrap_or(Decimal::ZERO)
    }

    pub fn fee_rate(&self) -> Decimal {
        self.fee_rate
    }

    /// Policies for the next orders, consumed in placement order.
    pub fn script_fills(&self, policies: impl IntoIterator<Item = FillPolicy>) {
        self.script.lock().extend(policies);
    }

    /// Policy used once the script is exhausted.
    pub fn set_default_policy(&self, policy: FillPolicy) {
        *self.default_policy.lock() = policy;
    }

    /// Makes the next `n` order placements fail with a transient error.
    pub fn fail_next_placements(&self, n: u32) {
        self.transient_failures.store(n, Ordering::SeqCst);
    }

    /// While offline every trading call fails with a transient error.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Every order request that was accepted, in placement order.
    pub fn placed_orders(&self) -> Vec<OrderRequest> {
        self.placed.lock().clone()
    }

    /// Replaces the current book for the snapshot's pair and publishes it to subscribers.
    pub fn set_book(&self, snapshot: OrderBookSnapshot) {
        let key = snapshot.pair.key();
        self.last_books.insert(key.clone(), snapshot.clone());
        if let Some(feed) = self.feeds.get(&key) {
            // No receivers is fine; the book is replayed on the next subscribe.
            let _ = feed.send(snapshot);
        }
    }

    pub fn book(&self, pair: &Pair) -> Option<OrderBookSnapshot> {
        self.last_books.get(&pair.key()).map(|b| b.value().clone())
    }

    /// Pairs with a current book.
    pub fn pairs(&self) -> Vec<Pair> {
        self.last_books
            .iter()
            .map(|b| b.value().pair.clone())
            .collect()
    }

    fn check_online(&self) -> AdapterResult<()> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(AdapterError::Transient(format!("{} is offline", self.id)));
        }
        Ok(())
    }

    fn next_policy(&self) -> FillPolicy {
        self.script
            .lock()
            .pop_front()
            .unwrap_or_else(|| *self.default_policy.lock())
    }

    fn adjust(&self, currency: &Currency, delta: Decimal) {
        *self.balances.entry(currency.clone()).or_insert(Decimal::ZERO) += delta;
    }

    fn settle(&self, request: &OrderRequest, filled: Decimal) {
        if filled.is_zero() {
            return;
        }
        let price = request.limit_price.0;
        let keep = Decimal::ONE - self.fee_rate;
        let pair = &request.pair;
        match request.order_type {
            OrderType::Sell => {
                self.adjust(&pair.base, -filled);
                self.adjust(&pair.quote, filled * price * keep);
            }
            OrderType::Buy => {
                self.adjust(&pair.quote, -(filled * price));
                self.adjust(&pair.base, filled * keep);
            }
        }
        log::debug!(
            "{} settled {} {} {} @ {}",
            self.id,
            request.order_type,
            filled,
            pair,
            price
        );
    }

    fn check_funds(&self, request: &OrderRequest) -> AdapterResult<()> {
        let (currency, needed) = match request.order_type {
            OrderType::Sell => (&request.pair.base, request.amount.0),
            OrderType::Buy => (&request.pair.quote, request.amount.0 * request.limit_price.0),
        };
        let available = self.balance(currency);
        if available < needed {
            return Err(AdapterError::Permanent(format!(
                "insufficient {} on {}: need {}, have {}",
                currency, self.id, needed, available
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl ExchangeAdapter for PaperExchange {
    fn id(&self) -> ExchangeId {
        self.id.clone()
    }

    async fn subscribe_order_book(&self, pair: &Pair) -> AdapterResult<BookStream> {
        if pair.exchange != self.id {
            return Err(AdapterError::Permanent(format!(
                "{} is not listed on {}",
                pair, self.id
            )));
        }
        let key = pair.key();
        let receiver = self
            .feeds
            .entry(key.clone())
            .or_insert_with(|| broadcast::channel(FEED_CAPACITY).0)
            .subscribe();
        // Subscribed before reading the replay, so no publish falls in between.
        let replay = self.last_books.get(&key).map(|b| b.value().clone());

        let live = BroadcastStream::new(receiver).map(|item| match item {
            Ok(book) => Ok(book),
            Err(BroadcastStreamRecvError::Lagged(missed)) => Err(AdapterError::Transient(
                format!("book feed lagged by {} updates", missed),
            )),
        });
        Ok(futures::stream::iter(replay.map(Ok::<_, AdapterError>)).chain(live).boxed())
    }

    async fn get_balance(&self, currency: &Currency) -> AdapterResult<Quantity> {
        self.check_online()?;
        Ok(Quantity(self.balance(currency)))
    }

    async fn place_order(&self, request: &OrderRequest) -> AdapterResult<OrderId> {
        self.check_online()?;
        let pending_failures = self.transient_failures.load(Ordering::SeqCst);
        if pending_failures > 0 {
            self.transient_failures
                .store(pending_failures - 1, Ordering::SeqCst);
            return Err(AdapterError::Transient("order gateway busy".into()));
        }
        if request.pair.exchange != self.id {
            return Err(AdapterError::Permanent(format!(
                "{} is not listed on {}",
                request.pair, self.id
            )));
        }
        if request.amount.0 <= Decimal::ZERO {
            return Err(AdapterError::Permanent("order amount must be positive".into()));
        }
        self.check_funds(request)?;

        let policy = self.next_policy();
        if policy == FillPolicy::Reject {
            return Err(AdapterError::Permanent(format!(
                "{} rejected {} {}",
                self.id, request.order_type, request.pair
            )));
        }

        let order_id = OrderId(format!(
            "{}-{}",
            self.id,
            self.next_order.fetch_add(1, Ordering::SeqCst)
        ));
        let (filled, is_open) = match policy {
            FillPolicy::Immediate => (request.amount.0, false),
            FillPolicy::Partial(fraction) => (request.amount.0 * fraction, false),
            FillPolicy::Lingering(fraction) => (request.amount.0 * fraction, true),
            _ => (Decimal::ZERO, true),
        };
        self.settle(request, filled);
        self.placed.lock().push(request.clone());
        self.orders.insert(
            order_id.clone(),
            PaperOrder {
                request: request.clone(),
                policy,
                polls: 0,
                filled,
                is_open,
            },
        );
        log::debug!("{} accepted order {} ({:?})", self.id, order_id, policy);
        Ok(order_id)
    }

    async fn cancel_order(&self, order_id: &OrderId) -> AdapterResult<bool> {
        self.check_online()?;
        let mut order = self
            .orders
            .get_mut(order_id)
            .ok_or_else(|| AdapterError::Permanent(format!("unknown order {}", order_id)))?;
        if matches!(
            order.policy,
            FillPolicy::Unresponsive | FillPolicy::Lingering(_)
        ) {
            return Ok(false);
        }
        order.is_open = false;
        Ok(true)
    }

    async fn get_order_status(&self, order_id: &OrderId) -> AdapterResult<OrderStatus> {
        self.check_online()?;
        let mut order = self
            .orders
            .get_mut(order_id)
            .ok_or_else(|| AdapterError::Permanent(format!("unknown order {}", order_id)))?;
        match order.policy {
            FillPolicy::Unresponsive => {
                return Err(AdapterError::Transient(format!(
                    "no response for order {}",
                    order_id
                )));
            }
            FillPolicy::AfterPolls(n) if order.is_open => {
                order.polls += 1;
                if order.polls >= n {
                    let amount = order.request.amount.0;
                    self.settle(&order.request, amount);
                    order.filled = amount;
                    order.is_open = false;
                }
            }
            _ => {}
        }
        Ok(OrderStatus {
            is_open: order.is_open,
            filled_quantity: Quantity(order.filled),
            average_price: (!order.filled.is_zero()).then_some(order.request.limit_price),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::test_utils::{at, book, pair};
    use common::Price;
    use rust_decimal_macros::dec;

    fn exchange() -> PaperExchange {
        PaperExchange::new(ExchangeId::from("paper"), dec!(0.001))
            .with_balance(Currency::from("BTC"), dec!(2))
            .with_balance(Currency::from("USD"), dec!(100000))
    }

    fn order(order_type: OrderType, amount: Decimal) -> OrderRequest {
        OrderRequest {
            pair: pair("paper", "BTC/USD"),
            order_type,
            limit_price: Price(dec!(50000)),
            amount: Quantity(amount),
        }
    }

    #[tokio::test]
    async fn test_immediate_sell_settles_with_fee() {
        let ex = exchange();
        let id = ex.place_order(&order(OrderType::Sell, dec!(1))).await.unwrap();
        let status = ex.get_order_status(&id).await.unwrap();
        assert!(!status.is_open);
        assert_eq!(status.filled_quantity, Quantity(dec!(1)));
        assert_eq!(status.average_price, Some(Price(dec!(50000))));
        assert_eq!(ex.balance(&Currency::from("BTC")), dec!(1));
        assert_eq!(ex.balance(&Currency::from("USD")), dec!(149950));
    }

    #[tokio::test]
    async fn test_buy_settles_base_net_of_fee() {
        let ex = exchange();
        ex.place_order(&order(OrderType::Buy, dec!(1))).await.unwrap();
        assert_eq!(ex.balance(&Currency::from("USD")), dec!(50000));
        assert_eq!(ex.balance(&Currency::from("BTC")), dec!(2.999));
    }

    #[tokio::test]
    async fn test_insufficient_funds_is_permanent() {
        let ex = exchange();
        let err = ex
            .place_order(&order(OrderType::Sell, dec!(3)))
            .await
            .unwrap_err();
        assert!(!err.is_transient());
        assert!(ex.placed_orders().is_empty());
    }

    #[tokio::test]
    async fn test_scripted_policies_apply_in_order() {
        let ex = exchange();
        ex.script_fills([FillPolicy::Partial(dec!(0.5)), FillPolicy::AfterPolls(2)]);

        let partial = ex.place_order(&order(OrderType::Sell, dec!(1))).await.unwrap();
        let status = ex.get_order_status(&partial).await.unwrap();
        assert!(!status.is_open);
        assert_eq!(status.filled_quantity, Quantity(dec!(0.5)));

        let delayed = ex.place_order(&order(OrderType::Sell, dec!(1))).await.unwrap();
        assert!(ex.get_order_status(&delayed).await.unwrap().is_open);
        let filled = ex.get_order_status(&delayed).await.unwrap();
        assert!(!filled.is_open);
        assert_eq!(filled.filled_quantity, Quantity(dec!(1)));

        // Script exhausted, default policy applies.
        let third = ex.place_order(&order(OrderType::Buy, dec!(0.1))).await.unwrap();
        assert!(!ex.get_order_status(&third).await.unwrap().is_open);
        assert_eq!(ex.placed_orders().len(), 3);
    }

    #[tokio::test]
    async fn test_unresponsive_order_never_acknowledges_cancel() {
        let ex = exchange();
        ex.script_fills([FillPolicy::Unresponsive, FillPolicy::Resting]);

        let silent = ex.place_order(&order(OrderType::Sell, dec!(1))).await.unwrap();
        assert!(ex.get_order_status(&silent).await.unwrap_err().is_transient());
        assert!(!ex.cancel_order(&silent).await.unwrap());

        let resting = ex.place_order(&order(OrderType::Sell, dec!(1))).await.unwrap();
        assert!(ex.cancel_order(&resting).await.unwrap());
        let status = ex.get_order_status(&resting).await.unwrap();
        assert!(!status.is_open);
        assert!(status.filled_quantity.is_zero());
    }

    #[tokio::test]
    async fn test_lingering_remainder_stays_open_after_cancel() {
        let ex = exchange();
        ex.script_fills([FillPolicy::Lingering(dec!(0.995))]);

        let id = ex.place_order(&order(OrderType::Sell, dec!(1))).await.unwrap();
        assert!(!ex.cancel_order(&id).await.unwrap());
        let status = ex.get_order_status(&id).await.unwrap();
        assert!(status.is_open);
        assert_eq!(status.filled_quantity, Quantity(dec!(0.995)));
        assert_eq!(ex.balance(&Currency::from("BTC")), dec!(1.005));
    }

    #[tokio::test]
    async fn test_transient_placement_failures_then_success() {
        let ex = exchange();
        ex.fail_next_placements(2);
        for _ in 0..2 {
            let err = ex
                .place_order(&order(OrderType::Sell, dec!(0.1)))
                .await
                .unwrap_err();
            assert!(err.is_transient());
        }
        assert!(ex.place_order(&order(OrderType::Sell, dec!(0.1))).await.is_ok());

        ex.set_offline(true);
        assert!(ex
            .get_balance(&Currency::from("BTC"))
            .await
            .unwrap_err()
            .is_transient());
    }

    #[tokio::test]
    async fn test_subscribe_replays_last_book_then_streams_updates() {
        let ex = exchange();
        let btc_usd = pair("paper", "BTC/USD");
        ex.set_book(book(&btc_usd, (dec!(100), dec!(1)), (dec!(101), dec!(1)), at(1)));

        let mut feed = ex.subscribe_order_book(&btc_usd).await.unwrap();
        let first = feed.next().await.unwrap().unwrap();
        assert_eq!(first.last_updated, at(1));

        ex.set_book(book(&btc_usd, (dec!(102), dec!(1)), (dec!(103), dec!(1)), at(2)));
        let second = feed.next().await.unwrap().unwrap();
        assert_eq!(second.last_updated, at(2));
        assert_eq!(ex.pairs(), vec![btc_usd]);
    }

    #[tokio::test]
    async fn test_subscribe_rejects_foreign_pair() {
        let ex = exchange();
        let result = ex.subscribe_order_book(&pair("kraken", "BTC/USD")).await;
        assert!(matches!(result, Err(AdapterError::Permanent(_))));
    }
}
