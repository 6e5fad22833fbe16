//! Data models for trade events, order intents, and order results.

mod order;
mod trade_event;

pub use order::{CopyFailure, MarketOrderType, OrderIntent, OrderResult, TickSize};
pub use trade_event::{TradeEvent, TradeSide};
