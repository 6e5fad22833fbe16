//! Polymarket CLOB (Central Limit Order Book) client for order execution.
//!
//! The CLOB is Polymarket's off-chain order matching engine that settles on
//! Polygon. This client handles:
//! - API authentication (L1 headers for read, L2 for write operations)
//! - Order signing using EIP-712 typed data
//! - Marketable order placement (FAK/FOK) priced off the live order book
//! - Balance/allowance queries and refreshes

use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use alloy_primitives::{Address, U256};
use alloy_signer::Signer;
use alloy_signer_local::PrivateKeySigner;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::Serialize;

use crate::models::{MarketOrderType, OrderIntent, TickSize, TradeSide};

use super::gateway::ExecutionGateway;
use super::types::{AssetKind, BalanceAllowance, OrderBook, OrderPlacement};

/// CLOB API base URL
pub const CLOB_URL: &str = "https://clob.polymarket.com";

/// Polymarket CTF Exchange contract on Polygon
pub const CTF_EXCHANGE: &str = "0x4bFb41d5B3570DeFd03C39a9A4D8dE6Bd8B8982E";
/// Neg Risk CTF Exchange for risk-pooled multi-outcome markets
pub const NEG_RISK_CTF_EXCHANGE: &str = "0xC5d563A36AE78145C45a50134d48A1215220f80a";

/// Slippage buffer applied when pricing marketable orders off the book.
const SLIPPAGE: &str = "0.005";

/// CLOB API client for executing trades on Polymarket.
pub struct ClobClient {
    http: Client,
    base_url: String,
    signer: PrivateKeySigner,
    api_key: String,
    api_passphrase: String,
    chain_id: u64,
}

/// Signed order ready for submission.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct SignedOrder {
    salt: String,
    maker: String,
    signer: String,
    taker: String,
    token_id: String,
    maker_amount: String,
    taker_amount: String,
    side: String,
    expiration: String,
    nonce: String,
    fee_rate_bps: String,
    signature_type: u8,
    signature: String,
}

/// Order submission request body.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct OrderPayload {
    order: SignedOrder,
    owner: String,
    order_type: MarketOrderType,
}

impl ClobClient {
    /// Create a new CLOB client.
    pub fn new(
        private_key: &str,
        api_key: &str,
        api_passphrase: &str,
        chain_id: u64,
    ) -> Result<Self> {
        let pk = private_key.strip_prefix("0x").unwrap_or(private_key);
        let signer = PrivateKeySigner::from_str(pk).context("Invalid private key")?;

        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()?;

        Ok(Self {
            http,
            base_url: CLOB_URL.to_string(),
            signer,
            api_key: api_key.to_string(),
            api_passphrase: api_passphrase.to_string(),
            chain_id,
        })
    }

    /// Override the API base URL (for testing).
    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url;
        self
    }

    /// Get the wallet address.
    pub fn address(&self) -> Address {
        self.signer.address()
    }

    /// Get order book for a token.
    pub async fn get_order_book(&self, token_id: &str) -> Result<OrderBook> {
        let url = format!("{}/book?token_id={}", self.base_url, token_id);
        let resp = self.http.get(&url).send().await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(anyhow!("Failed to get order book: {} - {}", status, text));
        }

        resp.json().await.context("Failed to parse order book")
    }

    /// Get current best bid price for a token.
    pub async fn get_best_bid(&self, token_id: &str) -> Result<Option<Decimal>> {
        let book = self.get_order_book(token_id).await?;
        match book.bids.first() {
            Some(best) => Ok(Some(Decimal::from_str(&best.price)?)),
            None => Ok(None),
        }
    }

    /// Get current best ask price for a token.
    pub async fn get_best_ask(&self, token_id: &str) -> Result<Option<Decimal>> {
        let book = self.get_order_book(token_id).await?;
        match book.asks.first() {
            Some(best) => Ok(Some(Decimal::from_str(&best.price)?)),
            None => Ok(None),
        }
    }

    /// Price a marketable order: the intent's limit price when set, otherwise
    /// the touch plus a slippage buffer, rounded to the market's tick.
    async fn marketable_price(&self, intent: &OrderIntent) -> Result<Decimal> {
        let slippage = Decimal::from_str(SLIPPAGE)?;

        let raw = match intent.limit_price {
            Some(limit) => limit,
            None => match intent.side {
                TradeSide::Buy => {
                    let ask = self
                        .get_best_ask(&intent.token_id)
                        .await?
                        .ok_or_else(|| anyhow!("No asks available for {}", intent.token_id))?;
                    ask * (Decimal::ONE + slippage)
                }
                TradeSide::Sell => {
                    let bid = self
                        .get_best_bid(&intent.token_id)
                        .await?
                        .ok_or_else(|| anyhow!("No bids available for {}", intent.token_id))?;
                    bid * (Decimal::ONE - slippage)
                }
            },
        };

        Ok(Self::round_to_tick(raw, intent.tick_size, intent.side))
    }

    /// Round a price to the tick, keeping the order marketable: buys round
    /// up, sells round down. The result stays within [tick, 1 - tick].
    fn round_to_tick(price: Decimal, tick_size: TickSize, side: TradeSide) -> Decimal {
        let strategy = match side {
            TradeSide::Buy => RoundingStrategy::ToPositiveInfinity,
            TradeSide::Sell => RoundingStrategy::ToZero,
        };
        let tick = tick_size.value();
        price
            .round_dp_with_strategy(tick_size.decimals(), strategy)
            .clamp(tick, Decimal::ONE - tick)
    }

    /// Submit a signed marketable order built from the intent.
    pub async fn submit_order(&self, intent: &OrderIntent) -> Result<OrderPlacement> {
        let price = self.marketable_price(intent).await?;
        let signed_order = self.build_signed_order(intent, price).await?;

        let payload = OrderPayload {
            order: signed_order,
            owner: self.api_key.clone(),
            order_type: intent.order_type,
        };

        let url = format!("{}/order", self.base_url);
        let resp = self
            .http
            .post(&url)
            .headers(self.build_l2_headers()?)
            .json(&payload)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(anyhow!("Order placement failed: {} - {}", status, text));
        }

        resp.json().await.context("Failed to parse order response")
    }

    /// Build a signed order for submission.
    async fn build_signed_order(&self, intent: &OrderIntent, price: Decimal) -> Result<SignedOrder> {
        let maker = format!("{:?}", self.address());
        let signer = maker.clone();
        let taker = "0x0000000000000000000000000000000000000000".to_string();

        // BUY: maker gives `amount` USDC and takes `amount / price` tokens.
        // SELL: maker gives `amount` tokens and takes `amount * price` USDC.
        let (maker_amount, taker_amount) = match intent.side {
            TradeSide::Buy => {
                if price.is_zero() {
                    return Err(anyhow!("Cannot size a buy at zero price"));
                }
                let tokens = intent.amount / price;
                (Self::to_base_units(intent.amount), Self::to_base_units(tokens))
            }
            TradeSide::Sell => {
                let usdc = intent.amount * price;
                (Self::to_base_units(intent.amount), Self::to_base_units(usdc))
            }
        };

        let nonce = Self::generate_nonce();
        let expiration =
            (SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs() + 3600).to_string();
        let salt = Self::generate_salt();
        let fee_rate_bps = "0".to_string();
        let side_code = match intent.side {
            TradeSide::Buy => 0u8,
            TradeSide::Sell => 1u8,
        };

        let signature = self
            .sign_order(
                &salt,
                &maker,
                &signer,
                &taker,
                &intent.token_id,
                &maker_amount,
                &taker_amount,
                side_code,
                &expiration,
                &nonce,
                &fee_rate_bps,
                intent.neg_risk,
            )
            .await?;

        Ok(SignedOrder {
            salt,
            maker,
            signer,
            taker,
            token_id: intent.token_id.clone(),
            maker_amount,
            taker_amount,
            side: intent.side.as_str().to_string(),
            expiration,
            nonce,
            fee_rate_bps,
            signature_type: 0,
            signature,
        })
    }

    /// Sign an order using EIP-712 typed data.
    #[allow(clippy::too_many_arguments)]
    async fn sign_order(
        &self,
        salt: &str,
        maker: &str,
        signer: &str,
        taker: &str,
        token_id: &str,
        maker_amount: &str,
        taker_amount: &str,
        side: u8,
        expiration: &str,
        nonce: &str,
        fee_rate_bps: &str,
        neg_risk: bool,
    ) -> Result<String> {
        let order_hash = self.compute_order_hash(
            salt,
            maker,
            signer,
            taker,
            token_id,
            maker_amount,
            taker_amount,
            expiration,
            nonce,
            fee_rate_bps,
            side,
        )?;

        let domain_hash = self.compute_domain_separator(neg_risk)?;

        // keccak256("\x19\x01" + domainSeparator + orderHash)
        let mut message = vec![0x19, 0x01];
        message.extend_from_slice(&domain_hash);
        message.extend_from_slice(&order_hash);

        let final_hash = alloy_primitives::keccak256(&message);

        let signature = self
            .signer
            .sign_hash(&final_hash)
            .await
            .context("Failed to sign order")?;

        Ok(format!("0x{}", hex::encode(signature.as_bytes())))
    }

    /// Compute the EIP-712 order struct hash.
    #[allow(clippy::too_many_arguments)]
    fn compute_order_hash(
        &self,
        salt: &str,
        maker: &str,
        signer: &str,
        taker: &str,
        token_id: &str,
        maker_amount: &str,
        taker_amount: &str,
        expiration: &str,
        nonce: &str,
        fee_rate_bps: &str,
        side: u8,
    ) -> Result<[u8; 32]> {
        let type_hash = alloy_primitives::keccak256(
            b"Order(uint256 salt,address maker,address signer,address taker,uint256 tokenId,uint256 makerAmount,uint256 takerAmount,uint256 expiration,uint256 nonce,uint256 feeRateBps,uint8 side,uint8 signatureType)"
        );

        let mut encoded = Vec::new();
        encoded.extend_from_slice(type_hash.as_slice());
        encoded.extend_from_slice(&Self::encode_uint256(salt)?);
        encoded.extend_from_slice(&Self::encode_address(maker)?);
        encoded.extend_from_slice(&Self::encode_address(signer)?);
        encoded.extend_from_slice(&Self::encode_address(taker)?);
        encoded.extend_from_slice(&Self::encode_uint256(token_id)?);
        encoded.extend_from_slice(&Self::encode_uint256(maker_amount)?);
        encoded.extend_from_slice(&Self::encode_uint256(taker_amount)?);
        encoded.extend_from_slice(&Self::encode_uint256(expiration)?);
        encoded.extend_from_slice(&Self::encode_uint256(nonce)?);
        encoded.extend_from_slice(&Self::encode_uint256(fee_rate_bps)?);
        encoded.extend_from_slice(&Self::encode_uint8(side));
        encoded.extend_from_slice(&Self::encode_uint8(0));

        Ok(alloy_primitives::keccak256(&encoded).0)
    }

    /// Compute the EIP-712 domain separator for the exchange the order
    /// targets (regular or neg-risk).
    fn compute_domain_separator(&self, neg_risk: bool) -> Result<[u8; 32]> {
        let type_hash = alloy_primitives::keccak256(
            b"EIP712Domain(string name,string version,uint256 chainId,address verifyingContract)",
        );

        let name_hash = alloy_primitives::keccak256(b"Polymarket CTF Exchange");
        let version_hash = alloy_primitives::keccak256(b"1");
        let exchange = if neg_risk { NEG_RISK_CTF_EXCHANGE } else { CTF_EXCHANGE };

        let mut encoded = Vec::new();
        encoded.extend_from_slice(type_hash.as_slice());
        encoded.extend_from_slice(name_hash.as_slice());
        encoded.extend_from_slice(version_hash.as_slice());
        encoded.extend_from_slice(&Self::encode_uint256(&self.chain_id.to_string())?);
        encoded.extend_from_slice(&Self::encode_address(exchange)?);

        Ok(alloy_primitives::keccak256(&encoded).0)
    }

    /// Current balance/allowance for an asset, in base units.
    async fn get_balance_allowance(&self, asset: &AssetKind) -> Result<BalanceAllowance> {
        let url = match asset {
            AssetKind::Collateral => {
                format!("{}/balance-allowance?asset_type=COLLATERAL", self.base_url)
            }
            AssetKind::Conditional(token_id) => format!(
                "{}/balance-allowance?asset_type=CONDITIONAL&token_id={}",
                self.base_url, token_id
            ),
        };

        let resp = self
            .http
            .get(&url)
            .headers(self.build_l1_headers()?)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(anyhow!("Failed to get balance: {} - {}", status, text));
        }

        resp.json().await.context("Failed to parse balance response")
    }

    /// Build L1 authentication headers (for read operations).
    fn build_l1_headers(&self) -> Result<reqwest::header::HeaderMap> {
        use reqwest::header::{HeaderMap, HeaderName, HeaderValue};

        let timestamp = Utc::now().timestamp().to_string();
        let signature = self.sign_l1_auth(&timestamp)?;

        let mut headers = HeaderMap::new();
        headers.insert(
            HeaderName::from_static("poly-address"),
            HeaderValue::from_str(&format!("{:?}", self.address()))?,
        );
        headers.insert(
            HeaderName::from_static("poly-signature"),
            HeaderValue::from_str(&signature)?,
        );
        headers.insert(
            HeaderName::from_static("poly-timestamp"),
            HeaderValue::from_str(&timestamp)?,
        );
        headers.insert(
            HeaderName::from_static("poly-api-key"),
            HeaderValue::from_str(&self.api_key)?,
        );
        headers.insert(
            HeaderName::from_static("poly-passphrase"),
            HeaderValue::from_str(&self.api_passphrase)?,
        );

        Ok(headers)
    }

    /// Build L2 authentication headers (for write operations).
    fn build_l2_headers(&self) -> Result<reqwest::header::HeaderMap> {
        // TODO: add the HMAC body signature from the CLOB L2 auth flow.
        self.build_l1_headers()
    }

    /// Sign L1 authentication message.
    fn sign_l1_auth(&self, timestamp: &str) -> Result<String> {
        let message_hash = alloy_primitives::keccak256(timestamp.as_bytes());
        Ok(format!("0x{}", hex::encode(message_hash.as_slice())))
    }

    /// Convert a decimal amount to base units (USDC and outcome tokens both
    /// use 6 decimals), truncating sub-unit precision.
    fn to_base_units(amount: Decimal) -> String {
        let units = amount * Decimal::from(10u64.pow(6));
        units.to_string().split('.').next().unwrap_or("0").to_string()
    }

    /// Encode address to 32-byte padded format.
    fn encode_address(addr: &str) -> Result<[u8; 32]> {
        let addr = Address::from_str(addr.strip_prefix("0x").unwrap_or(addr))?;
        let mut buf = [0u8; 32];
        buf[12..].copy_from_slice(addr.as_slice());
        Ok(buf)
    }

    /// Encode uint256 from string.
    fn encode_uint256(value: &str) -> Result<[u8; 32]> {
        let n = U256::from_str(value).unwrap_or(U256::ZERO);
        Ok(n.to_be_bytes())
    }

    /// Encode uint8 to 32-byte padded format.
    fn encode_uint8(value: u8) -> [u8; 32] {
        let mut buf = [0u8; 32];
        buf[31] = value;
        buf
    }

    /// Generate a random nonce.
    fn generate_nonce() -> String {
        uuid::Uuid::new_v4().as_u128().to_string()
    }

    /// Generate a random salt.
    fn generate_salt() -> String {
        uuid::Uuid::new_v4().as_u128().to_string()
    }
}

#[async_trait]
impl ExecutionGateway for ClobClient {
    async fn post_market_order(&self, intent: &OrderIntent) -> Result<OrderPlacement> {
        self.submit_order(intent).await
    }

    async fn refresh_balance_allowance(&self, asset: AssetKind) -> Result<()> {
        let url = match &asset {
            AssetKind::Collateral => format!(
                "{}/balance-allowance/update?asset_type=COLLATERAL",
                self.base_url
            ),
            AssetKind::Conditional(token_id) => format!(
                "{}/balance-allowance/update?asset_type=CONDITIONAL&token_id={}",
                self.base_url, token_id
            ),
        };

        let resp = self
            .http
            .get(&url)
            .headers(self.build_l2_headers()?)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(anyhow!(
                "Balance/allowance refresh failed: {} - {}",
                status,
                text
            ));
        }

        Ok(())
    }

    async fn collateral_balance(&self) -> Result<Decimal> {
        let state = self.get_balance_allowance(&AssetKind::Collateral).await?;
        let units = Decimal::from_str(state.balance.trim())
            .with_context(|| format!("Unparseable balance: {}", state.balance))?;
        Ok(units / Decimal::from(10u64.pow(6)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_to_base_units() {
        assert_eq!(ClobClient::to_base_units(dec!(100.5)), "100500000");
        assert_eq!(ClobClient::to_base_units(dec!(0.000001)), "1");
        assert_eq!(ClobClient::to_base_units(dec!(0)), "0");
    }

    #[test]
    fn test_encode_uint8() {
        let encoded = ClobClient::encode_uint8(1);
        assert_eq!(encoded[31], 1);
        assert!(encoded[..31].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_round_to_tick_keeps_order_marketable() {
        // Buys round up, sells round down
        let buy = ClobClient::round_to_tick(dec!(0.12345), TickSize::Hundredth, TradeSide::Buy);
        assert_eq!(buy, dec!(0.13));

        let sell = ClobClient::round_to_tick(dec!(0.12945), TickSize::Hundredth, TradeSide::Sell);
        assert_eq!(sell, dec!(0.12));
    }

    #[test]
    fn test_round_to_tick_clamps_to_valid_range() {
        let low = ClobClient::round_to_tick(dec!(0.0001), TickSize::Hundredth, TradeSide::Sell);
        assert_eq!(low, dec!(0.01));

        let high = ClobClient::round_to_tick(dec!(1.2), TickSize::Hundredth, TradeSide::Buy);
        assert_eq!(high, dec!(0.99));
    }
}
