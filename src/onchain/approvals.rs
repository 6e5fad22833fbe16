//! On-chain token approvals for Polymarket trading.
//!
//! The exchange contracts need an ERC-20 allowance to pull USDC on buys and
//! an ERC-1155 operator approval to move outcome tokens on sells. Approvals
//! are raised to maximum once at startup; after each buy the operator
//! approval is re-checked as a best-effort safety net.

use std::str::FromStr;

use alloy_primitives::{Address, U256};
use alloy_provider::network::EthereumWallet;
use alloy_provider::ProviderBuilder;
use alloy_signer::Signer as _;
use alloy_signer_local::PrivateKeySigner;
use alloy_sol_types::sol;
use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::{debug, info};

use crate::api::{AllowanceManager, CTF_EXCHANGE, NEG_RISK_CTF_EXCHANGE};

use super::{CTF_ADDRESS, NEG_RISK_ADAPTER, USDC_ADDRESS};

sol! {
    #[sol(rpc)]
    contract IERC20 {
        function allowance(address owner, address spender) external view returns (uint256);
        function approve(address spender, uint256 amount) external returns (bool);
    }

    #[sol(rpc)]
    contract IERC1155 {
        function setApprovalForAll(address operator, bool approved) external;
        function isApprovedForAll(address account, address operator) external view returns (bool);
    }
}

/// Contracts that must be approved to move our funds and positions.
fn spenders() -> Vec<(&'static str, &'static str)> {
    vec![
        ("CTF Exchange", CTF_EXCHANGE),
        ("Neg Risk CTF Exchange", NEG_RISK_CTF_EXCHANGE),
        ("Neg Risk Adapter", NEG_RISK_ADAPTER),
    ]
}

/// Issues ERC-20/ERC-1155 approvals from the trading wallet.
pub struct OnchainApprovals {
    signer: PrivateKeySigner,
    rpc_url: url::Url,
}

impl OnchainApprovals {
    pub fn new(private_key: &str, rpc_url: &str, chain_id: u64) -> Result<Self> {
        let pk = private_key.strip_prefix("0x").unwrap_or(private_key);
        let signer = PrivateKeySigner::from_str(pk)
            .context("Invalid private key")?
            .with_chain_id(Some(chain_id));
        let rpc_url: url::Url = rpc_url.parse().context("Invalid RPC URL")?;

        Ok(Self { signer, rpc_url })
    }

    /// Wallet address derived from the private key.
    pub fn wallet_address(&self) -> Address {
        self.signer.address()
    }

    /// Ensure one spender has a max USDC allowance and operator approval.
    async fn approve_spender(&self, name: &str, spender: Address) -> Result<()> {
        let wallet = EthereumWallet::from(self.signer.clone());
        let provider = ProviderBuilder::new()
            .wallet(wallet)
            .connect_http(self.rpc_url.clone());

        let owner = self.signer.address();
        let usdc_address: Address = USDC_ADDRESS.parse().context("Invalid USDC address")?;
        let ctf_address: Address = CTF_ADDRESS.parse().context("Invalid CTF address")?;

        let usdc = IERC20::new(usdc_address, &provider);
        let ctf = IERC1155::new(ctf_address, &provider);

        let allowance = usdc
            .allowance(owner, spender)
            .call()
            .await
            .with_context(|| format!("Failed to read USDC allowance for {name}"))?;

        if allowance < U256::MAX / U256::from(2) {
            let pending = usdc
                .approve(spender, U256::MAX)
                .send()
                .await
                .with_context(|| format!("Failed to send USDC approval for {name}"))?;
            let receipt = pending
                .get_receipt()
                .await
                .with_context(|| format!("USDC approval not confirmed for {name}"))?;
            info!(
                spender = name,
                tx_hash = ?receipt.transaction_hash,
                "USDC allowance raised to maximum"
            );
        } else {
            debug!(spender = name, "USDC allowance already at maximum");
        }

        let approved = ctf
            .isApprovedForAll(owner, spender)
            .call()
            .await
            .with_context(|| format!("Failed to read CTF approval for {name}"))?;

        if !approved {
            let pending = ctf
                .setApprovalForAll(spender, true)
                .send()
                .await
                .with_context(|| format!("Failed to send CTF approval for {name}"))?;
            let receipt = pending
                .get_receipt()
                .await
                .with_context(|| format!("CTF approval not confirmed for {name}"))?;
            info!(
                spender = name,
                tx_hash = ?receipt.transaction_hash,
                "Position token approval set"
            );
        } else {
            debug!(spender = name, "Position token approval already set");
        }

        Ok(())
    }
}

#[async_trait]
impl AllowanceManager for OnchainApprovals {
    async fn approve_max(&self) -> Result<()> {
        for (name, address) in spenders() {
            let spender: Address = address.parse().context("Invalid spender address")?;
            self.approve_spender(name, spender).await?;
        }
        Ok(())
    }

    async fn approve_post_buy(&self, token_id: &str) -> Result<()> {
        // Outcome tokens all live on the single CTF ERC-1155 contract, so the
        // per-token approval reduces to re-checking operator approvals.
        debug!(token = %token_id, "Post-buy approval check");
        for (name, address) in spenders() {
            let spender: Address = address.parse().context("Invalid spender address")?;
            self.approve_spender(name, spender).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    #[test]
    fn test_construction_derives_wallet() {
        let approvals = OnchainApprovals::new(TEST_KEY, "https://polygon-rpc.com", 137).unwrap();
        assert_ne!(approvals.wallet_address(), Address::ZERO);
    }

    #[test]
    fn test_invalid_key_rejected() {
        assert!(OnchainApprovals::new("nope", "https://polygon-rpc.com", 137).is_err());
    }

    #[test]
    fn test_spender_addresses_parse() {
        for (_, address) in spenders() {
            assert!(address.parse::<Address>().is_ok());
        }
    }
}
