//! Collaborator seams used by the copy pipeline and the redemption sweeper.
//!
//! The core logic only ever talks to these traits; production wiring plugs in
//! [`crate::api::ClobClient`], [`crate::onchain::CtfRedeemer`], and
//! [`crate::onchain::OnchainApprovals`], while tests use in-memory fakes.

use anyhow::Result;
use async_trait::async_trait;
use rust_decimal::Decimal;

use crate::models::OrderIntent;

use super::types::{AssetKind, MarketResolution, OrderPlacement};

/// Exchange order-execution endpoint.
#[async_trait]
pub trait ExecutionGateway: Send + Sync {
    /// Create, sign, and post a marketable order.
    async fn post_market_order(&self, intent: &OrderIntent) -> Result<OrderPlacement>;

    /// Ask the exchange to refresh its view of our balance/allowance state.
    async fn refresh_balance_allowance(&self, asset: AssetKind) -> Result<()>;

    /// Available USDC collateral.
    async fn collateral_balance(&self) -> Result<Decimal>;
}

/// Market resolution lookup and on-chain redemption.
#[async_trait]
pub trait ResolutionGateway: Send + Sync {
    /// Resolution status of a market, including per-token winner flags.
    async fn resolution(&self, condition_id: &str) -> Result<MarketResolution>;

    /// Redeem our position in a resolved market for the given outcome index.
    /// Returns the settlement transaction hash.
    async fn redeem(&self, condition_id: &str, outcome_index: u32) -> Result<String>;
}

/// On-chain token approval issuance.
#[async_trait]
pub trait AllowanceManager: Send + Sync {
    /// Raise collateral and position-token allowances to maximum (startup).
    async fn approve_max(&self) -> Result<()>;

    /// Best-effort approval for a freshly-bought position token.
    async fn approve_post_buy(&self, token_id: &str) -> Result<()>;
}
