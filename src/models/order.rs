//! Order intents and results produced by the copy pipeline.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::TradeSide;

/// Market order variant accepted by the CLOB.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MarketOrderType {
    /// Fill-and-kill: partial fills allowed, remainder cancelled
    Fak,
    /// Fill-or-kill: entire order fills immediately or is cancelled
    Fok,
}

impl MarketOrderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MarketOrderType::Fak => "FAK",
            MarketOrderType::Fok => "FOK",
        }
    }
}

impl std::str::FromStr for MarketOrderType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "FAK" => Ok(MarketOrderType::Fak),
            "FOK" => Ok(MarketOrderType::Fok),
            other => Err(anyhow::anyhow!("unknown order type: {other}")),
        }
    }
}

/// Minimum price increment accepted by the exchange for a market.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TickSize {
    Tenth,
    Hundredth,
    Thousandth,
    TenThousandth,
}

impl TickSize {
    /// Tick value as a decimal.
    pub fn value(&self) -> Decimal {
        match self {
            TickSize::Tenth => Decimal::new(1, 1),
            TickSize::Hundredth => Decimal::new(1, 2),
            TickSize::Thousandth => Decimal::new(1, 3),
            TickSize::TenThousandth => Decimal::new(1, 4),
        }
    }

    /// Number of decimal places of the tick.
    pub fn decimals(&self) -> u32 {
        match self {
            TickSize::Tenth => 1,
            TickSize::Hundredth => 2,
            TickSize::Thousandth => 3,
            TickSize::TenThousandth => 4,
        }
    }
}

impl std::str::FromStr for TickSize {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "0.1" => Ok(TickSize::Tenth),
            "0.01" => Ok(TickSize::Hundredth),
            "0.001" => Ok(TickSize::Thousandth),
            "0.0001" => Ok(TickSize::TenThousandth),
            other => Err(anyhow::anyhow!("unknown tick size: {other}")),
        }
    }
}

/// A fully-specified order ready for the execution gateway.
///
/// For buys `amount` is the USDC spend; for sells it is the token quantity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderIntent {
    pub token_id: String,
    pub side: TradeSide,
    pub amount: Decimal,
    pub order_type: MarketOrderType,
    pub limit_price: Option<Decimal>,
    pub tick_size: TickSize,
    pub neg_risk: bool,
}

/// Failure taxonomy for a single copy operation.
#[derive(Debug, Error)]
pub enum CopyFailure {
    #[error("no holdings to sell for market {market} token {token}")]
    NoHoldings { market: String, token: String },

    #[error("insufficient balance: no collateral available")]
    InsufficientBalance,

    #[error("order rejected by exchange: {0}")]
    GatewayRejection(String),

    #[error("balance/allowance sync failed: {0}")]
    BalanceSync(String),
}

impl CopyFailure {
    /// Whether a raw gateway error message points at a balance or allowance
    /// problem and warrants the diagnostic re-sync pass.
    pub fn is_balance_related(message: &str) -> bool {
        let lower = message.to_lowercase();
        lower.contains("balance") || lower.contains("allowance")
    }
}

/// Outcome of one copy or manual order operation.
#[derive(Debug, Clone)]
pub struct OrderResult {
    pub success: bool,
    pub order_id: Option<String>,
    pub transaction_hashes: Vec<String>,
    pub intent: Option<OrderIntent>,
    pub error: Option<String>,
}

impl OrderResult {
    /// A successful placement with whatever the gateway reported.
    pub fn filled(
        intent: OrderIntent,
        order_id: Option<String>,
        transaction_hashes: Vec<String>,
    ) -> Self {
        Self {
            success: true,
            order_id,
            transaction_hashes,
            intent: Some(intent),
            error: None,
        }
    }

    /// A failed operation carrying its classification.
    pub fn rejected(failure: &CopyFailure) -> Self {
        Self {
            success: false,
            order_id: None,
            transaction_hashes: Vec::new(),
            intent: None,
            error: Some(failure.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_tick_size_values() {
        assert_eq!(TickSize::Hundredth.value(), dec!(0.01));
        assert_eq!(TickSize::Hundredth.decimals(), 2);
        assert_eq!("0.001".parse::<TickSize>().unwrap(), TickSize::Thousandth);
        assert!("0.5".parse::<TickSize>().is_err());
    }

    #[test]
    fn test_order_type_parsing() {
        assert_eq!("fak".parse::<MarketOrderType>().unwrap(), MarketOrderType::Fak);
        assert_eq!("FOK".parse::<MarketOrderType>().unwrap(), MarketOrderType::Fok);
        assert!("GTC".parse::<MarketOrderType>().is_err());
    }

    #[test]
    fn test_balance_related_detection() {
        assert!(CopyFailure::is_balance_related("not enough BALANCE / allowance"));
        assert!(CopyFailure::is_balance_related("insufficient allowance for token"));
        assert!(!CopyFailure::is_balance_related("order book is empty"));
    }

    #[test]
    fn test_rejected_carries_classification() {
        let failure = CopyFailure::NoHoldings {
            market: "0xabc".to_string(),
            token: "42".to_string(),
        };
        let result = OrderResult::rejected(&failure);
        assert!(!result.success);
        assert!(result.error.unwrap().contains("no holdings"));
    }
}
