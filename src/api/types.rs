//! Wire types for the Polymarket CLOB API and real-time activity feed.

use chrono::{TimeZone, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::models::{TradeEvent, TradeSide};

/// Response from order placement.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderPlacement {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub error_msg: String,
    #[serde(rename = "orderID")]
    pub order_id: Option<String>,
    pub status: Option<String>,
    /// Amount the maker side gave up; token quantity for our sells.
    pub making_amount: Option<String>,
    /// Amount the taker side received; token quantity for our buys.
    pub taking_amount: Option<String>,
    #[serde(rename = "transactionsHashes", default)]
    pub transaction_hashes: Vec<String>,
}

impl OrderPlacement {
    /// Whether the reported status indicates the order traded.
    ///
    /// Anything other than matched/delayed is treated as "may not have
    /// succeeded" and left to the caller to log; it is not a hard failure.
    pub fn looks_filled(&self) -> bool {
        matches!(
            self.status.as_deref(),
            Some("matched") | Some("delayed") | Some("live")
        )
    }
}

/// Order book price level.
#[derive(Debug, Clone, Deserialize)]
pub struct BookLevel {
    pub price: String,
    pub size: String,
}

/// Order book snapshot for a token.
#[derive(Debug, Clone, Deserialize)]
pub struct OrderBook {
    pub bids: Vec<BookLevel>,
    pub asks: Vec<BookLevel>,
}

/// Token information within a market.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenInfo {
    pub token_id: String,
    #[serde(default)]
    pub outcome: String,
    pub winner: Option<bool>,
}

/// Market information from the CLOB markets endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketInfo {
    pub condition_id: String,
    #[serde(default)]
    pub tokens: Vec<TokenInfo>,
    #[serde(default)]
    pub closed: bool,
    #[serde(default)]
    pub neg_risk: bool,
    #[serde(default)]
    pub minimum_tick_size: String,
}

/// Resolution view of a market, derived from [`MarketInfo`].
#[derive(Debug, Clone)]
pub struct MarketResolution {
    pub resolved: bool,
    pub tokens: Vec<TokenInfo>,
}

impl From<MarketInfo> for MarketResolution {
    fn from(market: MarketInfo) -> Self {
        // A market is settled once the exchange has flagged a winning token.
        let resolved = market.tokens.iter().any(|t| t.winner == Some(true));
        Self {
            resolved,
            tokens: market.tokens,
        }
    }
}

/// Balance/allowance state for an asset, amounts in base units.
#[derive(Debug, Clone, Deserialize)]
pub struct BalanceAllowance {
    #[serde(default)]
    pub balance: String,
}

/// Which asset a balance/allowance operation refers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssetKind {
    /// USDC collateral
    Collateral,
    /// A specific outcome token
    Conditional(String),
}

/// Envelope for real-time data service messages.
#[derive(Debug, Deserialize)]
pub struct FeedMessage {
    #[serde(default)]
    pub topic: String,
    #[serde(rename = "type", default)]
    pub message_type: String,
    pub payload: Option<ActivityTrade>,
}

/// One trade from the activity feed payload.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityTrade {
    pub proxy_wallet: String,
    pub condition_id: String,
    #[serde(default)]
    pub asset: String,
    pub side: String,
    pub price: Decimal,
    pub size: Decimal,
    #[serde(default)]
    pub outcome: String,
    #[serde(default)]
    pub outcome_index: u32,
    pub timestamp: i64,
    #[serde(default)]
    pub transaction_hash: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub slug: String,
}

impl ActivityTrade {
    /// Convert the wire payload into a domain event, rejecting unknown sides.
    pub fn into_event(self) -> Option<TradeEvent> {
        let side: TradeSide = self.side.parse().ok()?;
        let timestamp = Utc.timestamp_opt(self.timestamp, 0).single()?;

        Some(TradeEvent {
            wallet: self.proxy_wallet,
            condition_id: self.condition_id,
            token_id: self.asset,
            side,
            price: self.price,
            size: self.size,
            outcome: self.outcome,
            outcome_index: self.outcome_index,
            timestamp,
            transaction_hash: self.transaction_hash,
            title: self.title,
            slug: self.slug,
        })
    }
}

/// Subscription request sent once per feed connection.
#[derive(Debug, Serialize)]
pub struct SubscribeRequest {
    pub action: &'static str,
    pub subscriptions: Vec<Subscription>,
}

#[derive(Debug, Serialize)]
pub struct Subscription {
    pub topic: &'static str,
    #[serde(rename = "type")]
    pub message_type: &'static str,
}

impl SubscribeRequest {
    /// Subscribe to the trade-activity topic.
    pub fn trade_activity() -> Self {
        Self {
            action: "subscribe",
            subscriptions: vec![Subscription {
                topic: "activity",
                message_type: "trades",
            }],
        }
    }
}
