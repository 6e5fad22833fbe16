//! On-chain collaborators: token approvals and position redemption.

mod approvals;
mod ctf;

pub use approvals::OnchainApprovals;
pub use ctf::CtfRedeemer;

/// USDC.e contract on Polygon mainnet.
pub const USDC_ADDRESS: &str = "0x2791Bca1f2de4661ED88A30C99A7a9449Aa84174";

/// Conditional Tokens Framework contract on Polygon mainnet.
pub const CTF_ADDRESS: &str = "0x4D97DCd97eC945f40cF65F87097ACe5EA0476045";

/// Neg Risk Adapter on Polygon mainnet.
pub const NEG_RISK_ADAPTER: &str = "0xd91E80cF2E7be2e162c6513ceD06f1dD0dA35296";

/// Default public Polygon RPC endpoint.
pub const POLYGON_RPC: &str = "https://polygon-rpc.com";
