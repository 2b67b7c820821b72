use crate::errors::CommonError;
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashSet;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use std::sync::{Arc, OnceLock};

/// Represents a price, typically using a high-precision decimal type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Price(pub Decimal);

impl fmt::Display for Price {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Represents a quantity of a currency, typically using a high-precision decimal type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Quantity(pub Decimal);

impl Quantity {
    pub const ZERO: Quantity = Quantity(Decimal::ZERO);

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

static CURRENCY_REGISTRY: OnceLock<Mutex<HashSet<Arc<str>>>> = OnceLock::new();

fn intern(symbol: &str) -> Arc<str> {
    let registry = CURRENCY_REGISTRY.get_or_init(|| Mutex::new(HashSet::new()));
    let mut symbols = registry.lock();
    if let Some(existing) = symbols.get(symbol) {
        return existing.clone();
    }
    let interned: Arc<str> = Arc::from(symbol);
    symbols.insert(interned.clone());
    interned
}

/// A currency symbol such as `BTC`.
///
/// Symbols are upper-cased and interned, so two `Currency` values for the
/// same symbol share one allocation and compare by pointer.
#[derive(Clone)]
pub struct Currency(Arc<str>);

impl Currency {
    pub fn new(symbol: &str) -> Self {
        Currency(intern(&symbol.trim().to_uppercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl PartialEq for Currency {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0) || self.0 == other.0
    }
}

impl Eq for Currency {}

impl Hash for Currency {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.hash(state);
    }
}

impl PartialOrd for Currency {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Currency {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.0.cmp(&other.0)
    }
}

impl fmt::Debug for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Currency({})", self.0)
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Currency {
    fn from(s: &str) -> Self {
        Currency::new(s)
    }
}

impl FromStr for Currency {
    type Err = CommonError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let symbol = s.trim();
        if symbol.is_empty() || symbol.contains('/') || symbol.contains(char::is_whitespace) {
            return Err(CommonError::ParseError(format!(
                "invalid currency symbol '{}'",
                s
            )));
        }
        Ok(Currency::new(symbol))
    }
}

impl Serialize for Currency {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Currency {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let symbol = String::deserialize(deserializer)?;
        symbol.parse().map_err(serde::de::Error::custom)
    }
}

/// Represents a unique identifier for an exchange.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExchangeId(pub String);

impl fmt::Display for ExchangeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ExchangeId {
    fn from(s: &str) -> Self {
        ExchangeId(s.to_string())
    }
}

/// Identity of an order-book venue: the unordered currency pair on one exchange.
///
/// `a` is always the smaller of the two currencies.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PairKey {
    pub exchange: ExchangeId,
    pub a: Currency,
    pub b: Currency,
}

impl fmt::Display for PairKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}-{}", self.exchange, self.a, self.b)
    }
}

/// A tradeable market on one exchange. Prices are quoted in `quote` per unit of `base`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Pair {
    pub exchange: ExchangeId,
    pub base: Currency,
    pub quote: Currency,
}

impl Pair {
    /// Creates a new pair.
    pub fn new(exchange: ExchangeId, base: Currency, quote: Currency) -> Self {
        Pair {
            exchange,
            base,
            quote,
        }
    }

    /// Parses a `BASE/QUOTE` symbol for the given exchange.
    pub fn parse(exchange: ExchangeId, symbol: &str) -> Result<Self, CommonError> {
        let (base, quote) = symbol.split_once('/').ok_or_else(|| {
            CommonError::ParseError(format!("pair '{}' is not of the form BASE/QUOTE", symbol))
        })?;
        let base: Currency = base.parse()?;
        let quote: Currency = quote.parse()?;
        if base == quote {
            return Err(CommonError::ParseError(format!(
                "pair '{}' uses the same currency twice",
                symbol
            )));
        }
        Ok(Pair::new(exchange, base, quote))
    }

    pub fn key(&self) -> PairKey {
        let (a, b) = if self.base <= self.quote {
            (self.base.clone(), self.quote.clone())
        } else {
            (self.quote.clone(), self.base.clone())
        };
        PairKey {
            exchange: self.exchange.clone(),
            a,
            b,
        }
    }

    pub fn symbol(&self) -> String {
        format!("{}/{}", self.base, self.quote)
    }
}

impl fmt::Display for Pair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}/{}", self.exchange, self.base, self.quote)
    }
}

/// Which side of an order book a level belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Bid,
    Ask,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Bid => write!(f, "bid"),
            Side::Ask => write!(f, "ask"),
        }
    }
}

/// Represents the type of an order (Buy or Sell) relative to the pair's base currency.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OrderType {
    Buy,
    Sell,
}

impl fmt::Display for OrderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderType::Buy => write!(f, "BUY"),
            OrderType::Sell => write!(f, "SELL"),
        }
    }
}

impl FromStr for OrderType {
    type Err = CommonError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "BUY" => Ok(OrderType::Buy),
            "SELL" => Ok(OrderType::Sell),
            other => Err(CommonError::ParseError(format!("unknown order type '{}'", other))),
        }
    }
}

/// Identifier returned by an exchange when an order is accepted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(pub String);

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for OrderId {
    fn from(s: String) -> Self {
        OrderId(s)
    }
}

/// A limit order to be placed on `pair.exchange`. `amount` is in base units.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderRequest {
    pub pair: Pair,
    pub order_type: OrderType,
    pub limit_price: Price,
    pub amount: Quantity,
}

/// Exchange-reported state of a previously placed order.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderStatus {
    pub is_open: bool,
    pub filled_quantity: Quantity,
    pub average_price: Option<Price>,
}
