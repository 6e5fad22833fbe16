//! Bot runner: wires the feed, monitor, copier, and redemption sweeper.
//!
//! Data flow: activity feed -> event channel -> trade monitor -> order
//! builder -> CLOB, with the ledger updated after each fill. Independently,
//! the redemption sweeper ticks on its interval, pausing the monitor through
//! the shared copy gate while it runs.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::api::{ActivityFeed, AllowanceManager, ClobClient};
use crate::config::Config;
use crate::ledger::HoldingsLedger;
use crate::onchain::{CtfRedeemer, OnchainApprovals};
use crate::trading::{CopyGate, RedemptionSweeper, TradeCopier, TradeMonitor};

/// Size of the inbound trade-event channel.
const EVENT_BUFFER: usize = 256;

/// Fully-wired bot.
pub struct Bot {
    config: Config,
    ledger: Arc<HoldingsLedger>,
    exec: Arc<ClobClient>,
    allowances: Arc<OnchainApprovals>,
    resolver: Arc<CtfRedeemer>,
    gate: CopyGate,
}

impl Bot {
    /// Build every collaborator from configuration.
    pub async fn new(config: Config) -> Result<Self> {
        let ledger = Arc::new(
            HoldingsLedger::new(&config.database_url)
                .await
                .context("Failed to open holdings ledger")?,
        );

        let exec = Arc::new(
            ClobClient::new(
                &config.private_key,
                &config.api_key,
                &config.api_passphrase,
                config.chain_id,
            )?
            .with_base_url(config.clob_url.clone()),
        );

        let allowances = Arc::new(OnchainApprovals::new(
            &config.private_key,
            &config.rpc_url,
            config.chain_id,
        )?);

        let resolver = Arc::new(CtfRedeemer::new(
            &config.private_key,
            &config.clob_url,
            &config.rpc_url,
            config.chain_id,
        )?);

        info!(
            wallet = ?exec.address(),
            tracked = %config.tracked_wallet,
            "Bot initialized"
        );

        Ok(Self {
            config,
            ledger,
            exec,
            allowances,
            resolver,
            gate: CopyGate::new(),
        })
    }

    /// The holdings ledger (shared with administrative commands).
    pub fn ledger(&self) -> Arc<HoldingsLedger> {
        self.ledger.clone()
    }

    /// A fresh order builder over the shared collaborators.
    pub fn copier(&self) -> TradeCopier<ClobClient, OnchainApprovals> {
        TradeCopier::new(
            self.exec.clone(),
            self.allowances.clone(),
            self.ledger.clone(),
            self.config.copy_config(),
        )
    }

    /// A redemption sweeper over the shared ledger and gate.
    pub fn sweeper(&self) -> RedemptionSweeper<CtfRedeemer> {
        RedemptionSweeper::new(
            self.resolver.clone(),
            self.ledger.clone(),
            self.gate.clone(),
            Duration::from_secs(self.config.redeem_interval_mins * 60),
        )
    }

    /// Run until Ctrl-C.
    pub async fn run(self) -> Result<()> {
        // Raise allowances once up front; trading can still proceed on a
        // failure if approvals were already in place from an earlier run.
        match self.allowances.approve_max().await {
            Ok(()) => info!("Startup allowances confirmed"),
            Err(e) => error!(error = %e, "Startup allowance setup failed; trading may fail"),
        }

        let (tx, rx) = mpsc::channel(EVENT_BUFFER);

        let feed = ActivityFeed::new(self.config.feed_url.clone(), tx);
        let feed_handle = tokio::spawn(feed.run());

        let sweeper_handle = if self.config.redeem_interval_mins > 0 {
            Some(tokio::spawn(self.sweeper().run()))
        } else {
            info!("Redemption sweeper disabled (REDEEM_INTERVAL_MINUTES unset or zero)");
            None
        };

        if !self.config.copy_enabled {
            warn!("Copy-trading disabled: trades will be logged but not mirrored");
        }

        let monitor = TradeMonitor::new(
            self.copier(),
            self.config.tracked_wallet.clone(),
            self.gate.clone(),
            self.config.copy_enabled,
        );

        tokio::select! {
            _ = monitor.run(rx) => {
                warn!("Monitor stopped");
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
            }
        }

        feed_handle.abort();
        if let Some(handle) = sweeper_handle {
            handle.abort();
        }

        info!("Bot shutdown complete");
        Ok(())
    }
}
