//! Runtime configuration loaded from the environment.

use anyhow::{Context, Result};
use rust_decimal::Decimal;

use crate::api::{CLOB_URL, FEED_WS_URL};
use crate::models::{MarketOrderType, TickSize};
use crate::onchain::POLYGON_RPC;
use crate::trading::CopyConfig;

/// Everything the bot needs to run, sourced from `.env` / the environment.
#[derive(Debug, Clone)]
pub struct Config {
    /// Wallet whose trades are mirrored (required)
    pub tracked_wallet: String,

    /// Scale applied to the tracked wallet's spend (default 1.0)
    pub size_multiplier: Decimal,

    /// Cap on a single buy in USDC; unlimited if unset
    pub max_order_amount: Option<Decimal>,

    /// FAK or FOK (default FAK)
    pub order_type: MarketOrderType,

    /// Price precision of the traded markets (default 0.01)
    pub tick_size: TickSize,

    /// Whether orders target the neg-risk exchange
    pub neg_risk: bool,

    /// Master switch for forwarding trades into the copier
    pub copy_enabled: bool,

    /// Minutes between redemption sweeps; 0 disables the sweeper
    pub redeem_interval_mins: u64,

    /// Signing key for orders and on-chain transactions
    pub private_key: String,

    /// CLOB API credentials
    pub api_key: String,
    pub api_passphrase: String,

    /// Polygon chain id
    pub chain_id: u64,

    /// Endpoints and storage
    pub clob_url: String,
    pub feed_url: String,
    pub rpc_url: String,
    pub database_url: String,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let tracked_wallet =
            std::env::var("TRACKED_WALLET").context("TRACKED_WALLET not set")?;

        let size_multiplier = match std::env::var("SIZE_MULTIPLIER") {
            Ok(raw) => raw.parse().context("Invalid SIZE_MULTIPLIER")?,
            Err(_) => Decimal::ONE,
        };

        let max_order_amount = match std::env::var("MAX_ORDER_AMOUNT") {
            Ok(raw) => Some(raw.parse::<Decimal>().context("Invalid MAX_ORDER_AMOUNT")?),
            Err(_) => None,
        };

        let order_type = match std::env::var("ORDER_TYPE") {
            Ok(raw) => raw.parse().context("Invalid ORDER_TYPE")?,
            Err(_) => MarketOrderType::Fak,
        };

        let tick_size = match std::env::var("TICK_SIZE") {
            Ok(raw) => raw.parse().context("Invalid TICK_SIZE")?,
            Err(_) => TickSize::Hundredth,
        };

        let neg_risk = env_flag("NEG_RISK", false)?;
        let copy_enabled = env_flag("COPY_TRADING_ENABLED", true)?;

        let redeem_interval_mins = match std::env::var("REDEEM_INTERVAL_MINUTES") {
            Ok(raw) => raw.parse().context("Invalid REDEEM_INTERVAL_MINUTES")?,
            Err(_) => 0,
        };

        let private_key =
            std::env::var("POLYMARKET_PRIVATE_KEY").context("POLYMARKET_PRIVATE_KEY not set")?;
        let api_key = std::env::var("POLYMARKET_API_KEY").context("POLYMARKET_API_KEY not set")?;
        let api_passphrase = std::env::var("POLYMARKET_API_PASSPHRASE")
            .context("POLYMARKET_API_PASSPHRASE not set")?;

        let chain_id: u64 = std::env::var("POLYMARKET_CHAIN_ID")
            .unwrap_or_else(|_| "137".to_string())
            .parse()
            .context("Invalid POLYMARKET_CHAIN_ID")?;

        let clob_url = std::env::var("CLOB_URL").unwrap_or_else(|_| CLOB_URL.to_string());
        let feed_url = std::env::var("FEED_WS_URL").unwrap_or_else(|_| FEED_WS_URL.to_string());
        let rpc_url = std::env::var("POLYGON_RPC_URL").unwrap_or_else(|_| POLYGON_RPC.to_string());
        let database_url = std::env::var("DATABASE_URL")
            .unwrap_or_else(|_| "sqlite:./polymirror.db?mode=rwc".to_string());

        Ok(Self {
            tracked_wallet,
            size_multiplier,
            max_order_amount,
            order_type,
            tick_size,
            neg_risk,
            copy_enabled,
            redeem_interval_mins,
            private_key,
            api_key,
            api_passphrase,
            chain_id,
            clob_url,
            feed_url,
            rpc_url,
            database_url,
        })
    }

    /// The slice of configuration the order builder consumes.
    pub fn copy_config(&self) -> CopyConfig {
        CopyConfig {
            size_multiplier: self.size_multiplier,
            max_order_amount: self.max_order_amount,
            order_type: self.order_type,
            tick_size: self.tick_size,
            neg_risk: self.neg_risk,
        }
    }
}

fn env_flag(name: &str, default: bool) -> Result<bool> {
    match std::env::var(name) {
        Ok(raw) => match raw.to_lowercase().as_str() {
            "1" | "true" | "yes" => Ok(true),
            "0" | "false" | "no" => Ok(false),
            other => Err(anyhow::anyhow!("Invalid {name}: {other}")),
        },
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_flag_parsing() {
        std::env::set_var("POLYMIRROR_TEST_FLAG", "true");
        assert!(env_flag("POLYMIRROR_TEST_FLAG", false).unwrap());

        std::env::set_var("POLYMIRROR_TEST_FLAG", "0");
        assert!(!env_flag("POLYMIRROR_TEST_FLAG", true).unwrap());

        std::env::set_var("POLYMIRROR_TEST_FLAG", "maybe");
        assert!(env_flag("POLYMIRROR_TEST_FLAG", true).is_err());

        std::env::remove_var("POLYMIRROR_TEST_FLAG");
        assert!(env_flag("POLYMIRROR_TEST_FLAG", true).unwrap());
    }
}
