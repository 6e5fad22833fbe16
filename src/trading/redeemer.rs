//! Redemption sweeper: converts resolved winning positions back to USDC.
//!
//! On each tick the sweeper pauses copying, walks the holdings ledger, looks
//! up resolution per market, redeems winning positions with bounded retry,
//! and drops redeemed entries. One market's failure never aborts the sweep
//! over the remaining markets, and the pause flag is cleared by an RAII
//! guard no matter how the sweep terminates.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::interval;
use tracing::{debug, error, info, warn};

use crate::api::ResolutionGateway;
use crate::ledger::{Holding, HoldingsLedger};

use super::gate::CopyGate;

/// Redemption attempts per market before it is counted as failed.
const MAX_REDEEM_ATTEMPTS: u32 = 3;

/// Delay between redemption attempts.
const RETRY_DELAY: Duration = Duration::from_secs(5);

/// Aggregate counts for one sweep.
///
/// Invariant: `redeemed + failed <= resolved <= total`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepOutcome {
    /// Markets examined
    pub total: usize,
    /// Markets found resolved
    pub resolved: usize,
    /// Markets whose winning positions were redeemed
    pub redeemed: usize,
    /// Markets where redemption exhausted its retries
    pub failed: usize,
}

impl std::fmt::Display for SweepOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} examined, {} resolved, {} redeemed, {} failed",
            self.total, self.resolved, self.redeemed, self.failed
        )
    }
}

/// Timer-driven coordinator that sweeps the ledger for redeemable positions.
pub struct RedemptionSweeper<R> {
    resolver: Arc<R>,
    ledger: Arc<HoldingsLedger>,
    gate: CopyGate,
    sweep_interval: Duration,
    retry_delay: Duration,
}

impl<R: ResolutionGateway> RedemptionSweeper<R> {
    pub fn new(
        resolver: Arc<R>,
        ledger: Arc<HoldingsLedger>,
        gate: CopyGate,
        sweep_interval: Duration,
    ) -> Self {
        Self {
            resolver,
            ledger,
            gate,
            sweep_interval,
            retry_delay: RETRY_DELAY,
        }
    }

    /// Override the retry delay (tests).
    #[cfg(test)]
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    /// Run sweeps forever on the configured interval.
    pub async fn run(self) {
        info!(
            interval_secs = self.sweep_interval.as_secs(),
            "Redemption sweeper started"
        );

        let mut ticker = interval(self.sweep_interval);
        // Skip the immediate first tick so the first sweep lands one full
        // interval after startup.
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let outcome = self.sweep().await;
            info!(%outcome, "Redemption sweep complete");
        }
    }

    /// Perform one sweep over the ledger.
    ///
    /// Copying stays paused for the duration; the guard clears the flag on
    /// every exit path.
    pub async fn sweep(&self) -> SweepOutcome {
        let _pause = self.gate.pause_guard();

        let entries = match self.ledger.entries().await {
            Ok(entries) => entries,
            Err(e) => {
                error!(error = %e, "Sweep aborted: ledger enumeration failed");
                return SweepOutcome::default();
            }
        };

        if entries.is_empty() {
            debug!("Sweep found no holdings");
            return SweepOutcome::default();
        }

        let mut by_market: BTreeMap<String, Vec<Holding>> = BTreeMap::new();
        for entry in entries {
            by_market.entry(entry.condition_id.clone()).or_default().push(entry);
        }

        let mut outcome = SweepOutcome {
            total: by_market.len(),
            ..Default::default()
        };

        for (condition_id, holdings) in by_market {
            let resolution = match self.resolver.resolution(&condition_id).await {
                Ok(resolution) => resolution,
                Err(e) => {
                    // Treated as unresolved for this sweep; tried again next tick.
                    warn!(market = %condition_id, error = %e, "Resolution lookup failed");
                    continue;
                }
            };

            if !resolution.resolved {
                debug!(market = %condition_id, "Market not yet resolved");
                continue;
            }
            outcome.resolved += 1;

            let mut market_failed = false;
            let mut market_redeemed = false;

            for holding in &holdings {
                let token = resolution
                    .tokens
                    .iter()
                    .enumerate()
                    .find(|(_, t)| t.token_id == holding.token_id);

                match token {
                    Some((index, info)) if info.winner == Some(true) => {
                        match self.redeem_with_retry(&condition_id, index as u32).await {
                            Ok(tx_hash) => {
                                info!(
                                    market = %condition_id,
                                    token = %holding.token_id,
                                    quantity = %holding.quantity,
                                    tx = %tx_hash,
                                    "Winning position redeemed"
                                );
                                if let Err(e) =
                                    self.ledger.remove_entry(&condition_id, &holding.token_id).await
                                {
                                    error!(error = %e, "Failed to drop redeemed ledger entry");
                                }
                                market_redeemed = true;
                            }
                            Err(e) => {
                                warn!(
                                    market = %condition_id,
                                    token = %holding.token_id,
                                    error = %e,
                                    "Redemption failed after {MAX_REDEEM_ATTEMPTS} attempts"
                                );
                                market_failed = true;
                            }
                        }
                    }
                    Some((_, info)) if info.winner == Some(false) => {
                        // Worthless after resolution; drop so future sweeps
                        // stop examining it.
                        info!(
                            market = %condition_id,
                            token = %holding.token_id,
                            "Dropping losing position"
                        );
                        if let Err(e) =
                            self.ledger.remove_entry(&condition_id, &holding.token_id).await
                        {
                            error!(error = %e, "Failed to drop losing ledger entry");
                        }
                    }
                    _ => {
                        warn!(
                            market = %condition_id,
                            token = %holding.token_id,
                            "Held token not listed in market resolution"
                        );
                    }
                }
            }

            if market_failed {
                outcome.failed += 1;
            } else if market_redeemed {
                outcome.redeemed += 1;
            }
        }

        outcome
    }

    async fn redeem_with_retry(&self, condition_id: &str, outcome_index: u32) -> anyhow::Result<String> {
        let mut last_error = None;

        for attempt in 1..=MAX_REDEEM_ATTEMPTS {
            if attempt > 1 {
                tokio::time::sleep(self.retry_delay).await;
            }

            match self.resolver.redeem(condition_id, outcome_index).await {
                Ok(tx_hash) => return Ok(tx_hash),
                Err(e) => {
                    warn!(
                        market = %condition_id,
                        attempt,
                        error = %e,
                        "Redemption attempt failed"
                    );
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| anyhow::anyhow!("redemption failed")))
    }
}
