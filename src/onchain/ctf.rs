//! Market resolution lookup and on-chain redemption.
//!
//! Resolution status comes from the CLOB markets endpoint (winner flags per
//! outcome token). Redemption converts winning outcome tokens back to USDC
//! by calling `redeemPositions` on the Conditional Tokens Framework contract
//! on Polygon.

use std::str::FromStr;

use alloy_primitives::{Address, B256, U256};
use alloy_provider::network::EthereumWallet;
use alloy_provider::ProviderBuilder;
use alloy_signer::Signer as _;
use alloy_signer_local::PrivateKeySigner;
use alloy_sol_types::sol;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use tracing::info;

use crate::api::{MarketInfo, MarketResolution, ResolutionGateway};

use super::{CTF_ADDRESS, USDC_ADDRESS};

sol! {
    #[sol(rpc)]
    contract ConditionalTokens {
        function redeemPositions(
            address collateralToken,
            bytes32 parentCollectionId,
            bytes32 conditionId,
            uint256[] calldata indexSets
        ) external;
    }
}

/// Resolution/redemption collaborator backed by the CLOB API and the CTF
/// contract.
pub struct CtfRedeemer {
    http: Client,
    clob_url: String,
    signer: PrivateKeySigner,
    rpc_url: url::Url,
}

impl CtfRedeemer {
    pub fn new(private_key: &str, clob_url: &str, rpc_url: &str, chain_id: u64) -> Result<Self> {
        let pk = private_key.strip_prefix("0x").unwrap_or(private_key);
        let signer = PrivateKeySigner::from_str(pk)
            .context("Invalid private key")?
            .with_chain_id(Some(chain_id));
        let rpc_url: url::Url = rpc_url.parse().context("Invalid RPC URL")?;

        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()?;

        Ok(Self {
            http,
            clob_url: clob_url.to_string(),
            signer,
            rpc_url,
        })
    }

    async fn get_market(&self, condition_id: &str) -> Result<MarketInfo> {
        let url = format!("{}/markets/{}", self.clob_url, condition_id);
        let resp = self.http.get(&url).send().await?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(anyhow!("Failed to get market: {} - {}", status, text));
        }

        resp.json().await.context("Failed to parse market response")
    }
}

#[async_trait]
impl ResolutionGateway for CtfRedeemer {
    async fn resolution(&self, condition_id: &str) -> Result<MarketResolution> {
        let market = self.get_market(condition_id).await?;
        Ok(MarketResolution::from(market))
    }

    async fn redeem(&self, condition_id: &str, outcome_index: u32) -> Result<String> {
        let condition = B256::from_str(condition_id)
            .with_context(|| format!("Invalid condition id: {condition_id}"))?;
        let usdc: Address = USDC_ADDRESS.parse().context("Invalid USDC address")?;
        let ctf_address: Address = CTF_ADDRESS.parse().context("Invalid CTF address")?;

        // The CTF partitions a binary market into index sets 1 (outcome 0)
        // and 2 (outcome 1); each held side is redeemed with its own set.
        let index_set = U256::from(1u64 << outcome_index);

        let wallet = EthereumWallet::from(self.signer.clone());
        let provider = ProviderBuilder::new()
            .wallet(wallet)
            .connect_http(self.rpc_url.clone());

        let ctf = ConditionalTokens::new(ctf_address, &provider);

        let pending = ctf
            .redeemPositions(usdc, B256::ZERO, condition, vec![index_set])
            .send()
            .await
            .context("Failed to send redemption transaction")?;

        let receipt = pending
            .get_receipt()
            .await
            .context("Redemption transaction not confirmed")?;

        if !receipt.status() {
            return Err(anyhow!(
                "Redemption transaction reverted: {:?}",
                receipt.transaction_hash
            ));
        }

        let tx_hash = format!("{:?}", receipt.transaction_hash);
        info!(
            condition_id = %condition_id,
            outcome_index,
            tx_hash = %tx_hash,
            "Position redeemed"
        );

        Ok(tx_hash)
    }
}
