//! Polymarket API clients and the collaborator seams consumed by the core.

mod clob_client;
mod feed;
mod gateway;
mod types;

pub use clob_client::{ClobClient, CLOB_URL, CTF_EXCHANGE, NEG_RISK_CTF_EXCHANGE};
pub use feed::{ActivityFeed, FEED_WS_URL};
pub use gateway::{AllowanceManager, ExecutionGateway, ResolutionGateway};
pub use types::*;
