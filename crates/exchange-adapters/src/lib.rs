//! Exchange adapter implementations.

pub mod paper;

pub use paper::{FillPolicy, PaperExchange};
