//! Trade monitor: filters the activity stream down to the tracked wallet.
//!
//! Consumes trade events from the feed channel one at a time, so two events
//! are never processed concurrently. Matching events are always logged for
//! audit visibility; they are only forwarded into the copier when the copy
//! gate is clear and copy-trading is enabled.

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::api::{AllowanceManager, ExecutionGateway};
use crate::models::{OrderResult, TradeEvent};

use super::copier::TradeCopier;
use super::gate::CopyGate;

/// Watches the event stream for trades from the tracked wallet.
pub struct TradeMonitor<E, A> {
    copier: TradeCopier<E, A>,
    tracked_wallet: String,
    gate: CopyGate,
    enabled: bool,
}

impl<E: ExecutionGateway, A: AllowanceManager> TradeMonitor<E, A> {
    pub fn new(copier: TradeCopier<E, A>, tracked_wallet: String, gate: CopyGate, enabled: bool) -> Self {
        Self {
            copier,
            tracked_wallet,
            gate,
            enabled,
        }
    }

    /// Consume the event channel until it closes.
    pub async fn run(&self, mut rx: mpsc::Receiver<TradeEvent>) {
        info!(wallet = %self.tracked_wallet, "Monitoring trades");

        while let Some(event) = rx.recv().await {
            self.handle_event(&event).await;
        }

        info!("Event stream closed, monitor stopping");
    }

    /// Process one inbound event. Returns the copy result when the event was
    /// forwarded into the copier.
    pub async fn handle_event(&self, event: &TradeEvent) -> Option<OrderResult> {
        if !event.wallet.eq_ignore_ascii_case(&self.tracked_wallet) {
            debug!(wallet = %event.wallet, "Ignoring trade from other wallet");
            return None;
        }

        info!(
            market = %event.market_label(),
            side = %event.side.as_str(),
            size = %event.size,
            price = %event.price,
            tx = %event.transaction_hash,
            "Tracked wallet trade detected"
        );

        if self.gate.is_paused() {
            info!("Trade detected but not copied: redemption sweep in progress");
            return None;
        }

        if !self.enabled {
            info!("Trade detected but not copied: copy-trading disabled");
            return None;
        }

        let result = self.copier.copy_trade(event).await;

        if result.success {
            info!(order_id = ?result.order_id, "Copy trade executed");
        } else {
            warn!(error = ?result.error, "Copy trade failed");
        }

        Some(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{AssetKind, OrderPlacement};
    use crate::ledger::HoldingsLedger;
    use crate::models::{OrderIntent, TradeSide};
    use crate::trading::copier::CopyConfig;
    use anyhow::Result;
    use async_trait::async_trait;
    use chrono::Utc;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Default)]
    struct CountingExec {
        orders: AtomicUsize,
    }

    #[async_trait]
    impl ExecutionGateway for CountingExec {
        async fn post_market_order(&self, _intent: &OrderIntent) -> Result<OrderPlacement> {
            self.orders.fetch_add(1, Ordering::SeqCst);
            Ok(OrderPlacement {
                success: true,
                status: Some("matched".to_string()),
                ..Default::default()
            })
        }

        async fn refresh_balance_allowance(&self, _asset: AssetKind) -> Result<()> {
            Ok(())
        }

        async fn collateral_balance(&self) -> Result<Decimal> {
            Ok(dec!(1000))
        }
    }

    struct NoopAllowances;

    #[async_trait]
    impl AllowanceManager for NoopAllowances {
        async fn approve_max(&self) -> Result<()> {
            Ok(())
        }

        async fn approve_post_buy(&self, _token_id: &str) -> Result<()> {
            Ok(())
        }
    }

    async fn monitor(
        gate: CopyGate,
        enabled: bool,
    ) -> (TradeMonitor<CountingExec, NoopAllowances>, Arc<CountingExec>) {
        let exec = Arc::new(CountingExec::default());
        let ledger = Arc::new(HoldingsLedger::new("sqlite::memory:").await.unwrap());
        let copier = TradeCopier::new(
            exec.clone(),
            Arc::new(NoopAllowances),
            ledger,
            CopyConfig::default(),
        );
        (
            TradeMonitor::new(copier, "0xTracked".to_string(), gate, enabled),
            exec,
        )
    }

    fn event_from(wallet: &str) -> TradeEvent {
        TradeEvent {
            wallet: wallet.to_string(),
            condition_id: "0xmarket".to_string(),
            token_id: "token-1".to_string(),
            side: TradeSide::Buy,
            price: dec!(0.5),
            size: dec!(10),
            outcome: "Yes".to_string(),
            outcome_index: 0,
            timestamp: Utc::now(),
            transaction_hash: "0xabc".to_string(),
            title: String::new(),
            slug: String::new(),
        }
    }

    #[tokio::test]
    async fn test_other_wallets_ignored() {
        let (monitor, exec) = monitor(CopyGate::new(), true).await;

        let result = monitor.handle_event(&event_from("0xSomeoneElse")).await;

        assert!(result.is_none());
        assert_eq!(exec.orders.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_wallet_match_is_case_insensitive() {
        let (monitor, exec) = monitor(CopyGate::new(), true).await;

        let result = monitor.handle_event(&event_from("0xtracked")).await;

        assert!(result.unwrap().success);
        assert_eq!(exec.orders.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_paused_event_logged_but_not_copied() {
        let gate = CopyGate::new();
        let (monitor, exec) = monitor(gate.clone(), true).await;

        gate.pause();
        let result = monitor.handle_event(&event_from("0xTracked")).await;

        assert!(result.is_none());
        assert_eq!(exec.orders.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_copying_resumes_after_pause_clears() {
        let gate = CopyGate::new();
        let (monitor, exec) = monitor(gate.clone(), true).await;

        gate.pause();
        assert!(monitor.handle_event(&event_from("0xTracked")).await.is_none());

        gate.resume();
        assert!(monitor.handle_event(&event_from("0xTracked")).await.is_some());
        assert_eq!(exec.orders.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_disabled_copying_never_forwards() {
        let (monitor, exec) = monitor(CopyGate::new(), false).await;

        let result = monitor.handle_event(&event_from("0xTracked")).await;

        assert!(result.is_none());
        assert_eq!(exec.orders.load(Ordering::SeqCst), 0);
    }
}
