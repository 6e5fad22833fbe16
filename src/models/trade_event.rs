//! Trade event model for activity observed on the tracked wallet.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Direction of a trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeSide {
    Buy,
    Sell,
}

impl TradeSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeSide::Buy => "BUY",
            TradeSide::Sell => "SELL",
        }
    }
}

impl std::str::FromStr for TradeSide {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "BUY" => Ok(TradeSide::Buy),
            "SELL" => Ok(TradeSide::Sell),
            other => Err(anyhow::anyhow!("unknown trade side: {other}")),
        }
    }
}

/// One trade notification from the activity feed.
///
/// Fields arrive already deserialized from the feed payload; `title` and
/// `slug` are optional in the upstream message and default to empty.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeEvent {
    /// Wallet that made the trade
    pub wallet: String,

    /// Market condition ID (0x-prefixed)
    pub condition_id: String,

    /// Outcome token being traded
    pub token_id: String,

    /// Trade direction
    pub side: TradeSide,

    /// Price per token in USDC (0.0 to 1.0)
    pub price: Decimal,

    /// Number of outcome tokens traded
    pub size: Decimal,

    /// Outcome label (e.g. "Yes", "No")
    #[serde(default)]
    pub outcome: String,

    /// Index of the outcome within the market
    #[serde(default)]
    pub outcome_index: u32,

    /// When the trade occurred
    pub timestamp: DateTime<Utc>,

    /// On-chain transaction hash
    #[serde(default)]
    pub transaction_hash: String,

    /// Market title for display
    #[serde(default)]
    pub title: String,

    /// Market slug for display
    #[serde(default)]
    pub slug: String,
}

impl TradeEvent {
    /// USDC notional of the trade.
    pub fn notional(&self) -> Decimal {
        self.price * self.size
    }

    /// Short display label for the market (title, slug, or condition id).
    pub fn market_label(&self) -> &str {
        if !self.title.is_empty() {
            &self.title
        } else if !self.slug.is_empty() {
            &self.slug
        } else {
            &self.condition_id
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn event() -> TradeEvent {
        TradeEvent {
            wallet: "0xAbCd".to_string(),
            condition_id: "0x123".to_string(),
            token_id: "456".to_string(),
            side: TradeSide::Buy,
            price: dec!(0.40),
            size: dec!(50),
            outcome: "Yes".to_string(),
            outcome_index: 0,
            timestamp: Utc::now(),
            transaction_hash: String::new(),
            title: String::new(),
            slug: String::new(),
        }
    }

    #[test]
    fn test_notional() {
        assert_eq!(event().notional(), dec!(20));
    }

    #[test]
    fn test_market_label_falls_back_to_condition_id() {
        let mut e = event();
        assert_eq!(e.market_label(), "0x123");
        e.slug = "will-it-rain".to_string();
        assert_eq!(e.market_label(), "will-it-rain");
        e.title = "Will it rain?".to_string();
        assert_eq!(e.market_label(), "Will it rain?");
    }

    #[test]
    fn test_side_parsing() {
        assert_eq!("buy".parse::<TradeSide>().unwrap(), TradeSide::Buy);
        assert_eq!("SELL".parse::<TradeSide>().unwrap(), TradeSide::Sell);
        assert!("HOLD".parse::<TradeSide>().is_err());
    }
}
