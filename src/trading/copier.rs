//! Order builder: turns one tracked-wallet trade into a mirrored order.
//!
//! `copy_trade` validates preconditions against the holdings ledger and the
//! exchange balance, sizes and submits the order, then reconciles the ledger
//! against what the gateway reports as actually filled. Every failure is
//! returned as a structured [`OrderResult`] rather than an error; the caller
//! decides whether to re-trigger.

use std::str::FromStr;
use std::sync::Arc;

use rust_decimal::Decimal;
use tracing::{error, info, warn};

use crate::api::{AllowanceManager, AssetKind, ExecutionGateway, OrderPlacement};
use crate::ledger::HoldingsLedger;
use crate::models::{
    CopyFailure, MarketOrderType, OrderIntent, OrderResult, TickSize, TradeEvent, TradeSide,
};

/// Sizing and order-shape configuration for copied trades.
#[derive(Debug, Clone)]
pub struct CopyConfig {
    /// Scale applied to the tracked wallet's spend on buys
    pub size_multiplier: Decimal,

    /// Hard cap on a single buy in USDC; unlimited if unset
    pub max_order_amount: Option<Decimal>,

    /// Order variant submitted to the exchange
    pub order_type: MarketOrderType,

    /// Price precision of the traded markets
    pub tick_size: TickSize,

    /// Whether orders target the neg-risk exchange
    pub neg_risk: bool,
}

impl Default for CopyConfig {
    fn default() -> Self {
        Self {
            size_multiplier: Decimal::ONE,
            max_order_amount: None,
            order_type: MarketOrderType::Fak,
            tick_size: TickSize::Hundredth,
            neg_risk: false,
        }
    }
}

/// Builds, validates, and reconciles mirrored orders.
pub struct TradeCopier<E, A> {
    exec: Arc<E>,
    allowances: Arc<A>,
    ledger: Arc<HoldingsLedger>,
    config: CopyConfig,
}

impl<E: ExecutionGateway, A: AllowanceManager> TradeCopier<E, A> {
    pub fn new(
        exec: Arc<E>,
        allowances: Arc<A>,
        ledger: Arc<HoldingsLedger>,
        config: CopyConfig,
    ) -> Self {
        Self {
            exec,
            allowances,
            ledger,
            config,
        }
    }

    /// Mirror one trade event. SELLs exit the full held quantity; BUYs spend
    /// the event's notional scaled by the multiplier, capped and clamped to
    /// the available balance.
    pub async fn copy_trade(&self, event: &TradeEvent) -> OrderResult {
        match event.side {
            TradeSide::Sell => self.copy_sell(event).await,
            TradeSide::Buy => self.copy_buy(event).await,
        }
    }

    async fn copy_sell(&self, event: &TradeEvent) -> OrderResult {
        let held = match self.ledger.get(&event.condition_id, &event.token_id).await {
            Ok(quantity) => quantity,
            Err(e) => {
                error!(error = %e, "Ledger read failed");
                return OrderResult::rejected(&CopyFailure::GatewayRejection(format!(
                    "ledger read failed: {e:#}"
                )));
            }
        };

        if held <= Decimal::ZERO {
            let failure = CopyFailure::NoHoldings {
                market: event.condition_id.clone(),
                token: event.token_id.clone(),
            };
            warn!(
                market = %event.market_label(),
                token = %event.token_id,
                "Sell skipped: {failure}"
            );
            return OrderResult::rejected(&failure);
        }

        // Full exit: the entire held quantity goes out regardless of the
        // event's size.
        let intent = self.build_intent(&event.token_id, TradeSide::Sell, held, None);

        info!(
            market = %event.market_label(),
            token = %event.token_id,
            quantity = %held,
            "Submitting full-exit sell"
        );

        let placement = match self.exec.post_market_order(&intent).await {
            Ok(p) => p,
            Err(e) => return self.fail_with_diagnostics(e).await,
        };

        self.log_placement_status(&placement);

        let sold = placement
            .making_amount
            .as_deref()
            .and_then(|raw| Decimal::from_str(raw).ok())
            .unwrap_or(held);

        if sold != held {
            warn!(
                requested = %held,
                filled = %sold,
                "Sell fill differs from requested amount; reconciling against fill"
            );
        }

        if let Err(e) = self.ledger.remove(&event.condition_id, &event.token_id, sold).await {
            error!(error = %e, "Ledger update failed after sell");
        }

        info!(
            market = %event.market_label(),
            sold = %sold,
            order_id = ?placement.order_id,
            "Sell copied"
        );

        OrderResult::filled(intent, placement.order_id, placement.transaction_hashes)
    }

    async fn copy_buy(&self, event: &TradeEvent) -> OrderResult {
        let mut amount = event.notional() * self.config.size_multiplier;
        if let Some(cap) = self.config.max_order_amount {
            if amount > cap {
                info!(intended = %amount, cap = %cap, "Buy capped at maximum order amount");
                amount = cap;
            }
        }

        // Non-fatal: the exchange's cached balance may be stale; a failed
        // refresh only means we validate against the cached value.
        if let Err(e) = self
            .exec
            .refresh_balance_allowance(AssetKind::Collateral)
            .await
        {
            warn!(error = %e, "Balance/allowance refresh failed before buy");
        }

        let available = match self.exec.collateral_balance().await {
            Ok(balance) => balance,
            Err(e) => return self.fail_with_diagnostics(e).await,
        };

        if available <= Decimal::ZERO {
            let failure = CopyFailure::InsufficientBalance;
            warn!(market = %event.market_label(), "Buy skipped: {failure}");
            return OrderResult::rejected(&failure);
        }

        if available < amount {
            info!(
                intended = %amount,
                available = %available,
                "Buy clamped to available balance"
            );
            amount = available;
        }

        let intent = self.build_intent(&event.token_id, TradeSide::Buy, amount, None);

        info!(
            market = %event.market_label(),
            token = %event.token_id,
            amount = %amount,
            price = %event.price,
            "Submitting buy"
        );

        let placement = match self.exec.post_market_order(&intent).await {
            Ok(p) => p,
            Err(e) => return self.fail_with_diagnostics(e).await,
        };

        self.log_placement_status(&placement);

        // Tokens received, as reported by the gateway; estimated from the
        // event price when absent.
        let received = placement
            .taking_amount
            .as_deref()
            .and_then(|raw| Decimal::from_str(raw).ok())
            .unwrap_or_else(|| {
                if event.price > Decimal::ZERO {
                    amount / event.price
                } else {
                    Decimal::ZERO
                }
            });

        if received > Decimal::ZERO {
            if let Err(e) = self
                .ledger
                .add(&event.condition_id, &event.token_id, received)
                .await
            {
                error!(error = %e, "Ledger update failed after buy");
            }
        }

        // Best-effort: the exchange fill already happened, so an approval
        // failure is logged and discarded rather than rolled back.
        if let Err(e) = self.allowances.approve_post_buy(&event.token_id).await {
            warn!(error = %e, token = %event.token_id, "Post-buy approval failed");
        }

        info!(
            market = %event.market_label(),
            spent = %amount,
            received = %received,
            order_id = ?placement.order_id,
            "Buy copied"
        );

        OrderResult::filled(intent, placement.order_id, placement.transaction_hashes)
    }

    /// Manual buy: `amount` USDC of the token, no ledger preconditions and no
    /// ledger reconciliation (the key for it is unknown here).
    pub async fn place_market_buy(
        &self,
        token_id: &str,
        amount: Decimal,
        limit_price: Option<Decimal>,
    ) -> OrderResult {
        let intent = self.build_intent(token_id, TradeSide::Buy, amount, limit_price);
        self.place(intent).await
    }

    /// Manual sell: `amount` tokens, no ledger preconditions and no ledger
    /// reconciliation.
    pub async fn place_market_sell(
        &self,
        token_id: &str,
        amount: Decimal,
        limit_price: Option<Decimal>,
    ) -> OrderResult {
        let intent = self.build_intent(token_id, TradeSide::Sell, amount, limit_price);
        self.place(intent).await
    }

    async fn place(&self, intent: OrderIntent) -> OrderResult {
        info!(
            token = %intent.token_id,
            side = %intent.side.as_str(),
            amount = %intent.amount,
            "Submitting manual order"
        );

        match self.exec.post_market_order(&intent).await {
            Ok(placement) => {
                self.log_placement_status(&placement);
                OrderResult::filled(intent, placement.order_id, placement.transaction_hashes)
            }
            Err(e) => self.fail_with_diagnostics(e).await,
        }
    }

    fn build_intent(
        &self,
        token_id: &str,
        side: TradeSide,
        amount: Decimal,
        limit_price: Option<Decimal>,
    ) -> OrderIntent {
        OrderIntent {
            token_id: token_id.to_string(),
            side,
            amount,
            order_type: self.config.order_type,
            limit_price,
            tick_size: self.config.tick_size,
            neg_risk: self.config.neg_risk,
        }
    }

    fn log_placement_status(&self, placement: &OrderPlacement) {
        if !placement.looks_filled() {
            warn!(
                status = ?placement.status,
                error_msg = %placement.error_msg,
                "Order status does not confirm a fill"
            );
        }
    }

    /// Surface a gateway error, running the balance/allowance diagnostic
    /// pass first when the message points at one.
    async fn fail_with_diagnostics(&self, err: anyhow::Error) -> OrderResult {
        let message = format!("{err:#}");

        let failure = if CopyFailure::is_balance_related(&message) {
            match self.exec.collateral_balance().await {
                Ok(balance) => info!(balance = %balance, "Collateral balance at failure"),
                Err(e) => warn!(error = %e, "Balance re-read failed during diagnostics"),
            }
            if let Err(e) = self
                .exec
                .refresh_balance_allowance(AssetKind::Collateral)
                .await
            {
                warn!(error = %e, "Allowance refresh failed during diagnostics");
            }
            CopyFailure::BalanceSync(message)
        } else {
            CopyFailure::GatewayRejection(message)
        };

        error!(error = %failure, "Order failed");
        OrderResult::rejected(&failure)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct MockExec {
        balance: Mutex<Decimal>,
        placement: Mutex<Option<OrderPlacement>>,
        fail_order: Mutex<Option<String>>,
        orders: Mutex<Vec<OrderIntent>>,
        refreshes: AtomicUsize,
        balance_reads: AtomicUsize,
    }

    impl MockExec {
        fn new(balance: Decimal) -> Self {
            Self {
                balance: Mutex::new(balance),
                placement: Mutex::new(Some(OrderPlacement {
                    success: true,
                    status: Some("matched".to_string()),
                    order_id: Some("order-1".to_string()),
                    ..Default::default()
                })),
                fail_order: Mutex::new(None),
                orders: Mutex::new(Vec::new()),
                refreshes: AtomicUsize::new(0),
                balance_reads: AtomicUsize::new(0),
            }
        }

        fn with_placement(self, placement: OrderPlacement) -> Self {
            *self.placement.lock().unwrap() = Some(placement);
            self
        }

        fn failing_with(self, message: &str) -> Self {
            *self.fail_order.lock().unwrap() = Some(message.to_string());
            self
        }

        fn submitted(&self) -> Vec<OrderIntent> {
            self.orders.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ExecutionGateway for MockExec {
        async fn post_market_order(&self, intent: &OrderIntent) -> Result<OrderPlacement> {
            if let Some(message) = self.fail_order.lock().unwrap().clone() {
                return Err(anyhow!(message));
            }
            self.orders.lock().unwrap().push(intent.clone());
            Ok(self.placement.lock().unwrap().clone().unwrap_or_default())
        }

        async fn refresh_balance_allowance(&self, _asset: AssetKind) -> Result<()> {
            self.refreshes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn collateral_balance(&self) -> Result<Decimal> {
            self.balance_reads.fetch_add(1, Ordering::SeqCst);
            Ok(*self.balance.lock().unwrap())
        }
    }

    struct MockAllowances {
        post_buy_calls: Mutex<Vec<String>>,
        fail: bool,
    }

    impl MockAllowances {
        fn new() -> Self {
            Self {
                post_buy_calls: Mutex::new(Vec::new()),
                fail: false,
            }
        }

        fn failing() -> Self {
            Self {
                post_buy_calls: Mutex::new(Vec::new()),
                fail: true,
            }
        }
    }

    #[async_trait]
    impl AllowanceManager for MockAllowances {
        async fn approve_max(&self) -> Result<()> {
            Ok(())
        }

        async fn approve_post_buy(&self, token_id: &str) -> Result<()> {
            self.post_buy_calls.lock().unwrap().push(token_id.to_string());
            if self.fail {
                Err(anyhow!("approval rpc down"))
            } else {
                Ok(())
            }
        }
    }

    fn event(side: TradeSide, price: Decimal, size: Decimal) -> TradeEvent {
        TradeEvent {
            wallet: "0xtracked".to_string(),
            condition_id: "0xmarket".to_string(),
            token_id: "token-1".to_string(),
            side,
            price,
            size,
            outcome: "Yes".to_string(),
            outcome_index: 0,
            timestamp: Utc::now(),
            transaction_hash: String::new(),
            title: String::new(),
            slug: String::new(),
        }
    }

    async fn copier(
        exec: MockExec,
        allowances: MockAllowances,
        config: CopyConfig,
    ) -> (TradeCopier<MockExec, MockAllowances>, Arc<HoldingsLedger>, Arc<MockExec>, Arc<MockAllowances>) {
        let ledger = Arc::new(HoldingsLedger::new("sqlite::memory:").await.unwrap());
        let exec = Arc::new(exec);
        let allowances = Arc::new(allowances);
        let copier = TradeCopier::new(exec.clone(), allowances.clone(), ledger.clone(), config);
        (copier, ledger, exec, allowances)
    }

    #[tokio::test]
    async fn test_sell_with_no_holdings_fails_without_gateway_call() {
        let (copier, ledger, exec, _) =
            copier(MockExec::new(dec!(100)), MockAllowances::new(), CopyConfig::default()).await;

        let result = copier.copy_trade(&event(TradeSide::Sell, dec!(0.5), dec!(10))).await;

        assert!(!result.success);
        assert!(result.error.unwrap().contains("no holdings"));
        assert!(exec.submitted().is_empty());
        assert_eq!(ledger.get("0xmarket", "token-1").await.unwrap(), Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_full_exit_sell_reconciles_against_reported_fill() {
        let exec = MockExec::new(dec!(100)).with_placement(OrderPlacement {
            success: true,
            status: Some("matched".to_string()),
            making_amount: Some("5".to_string()),
            ..Default::default()
        });
        let (copier, ledger, exec, _) = copier(exec, MockAllowances::new(), CopyConfig::default()).await;
        ledger.add("0xmarket", "token-1", dec!(5)).await.unwrap();

        // Event size is ignored; the entire position is submitted.
        let result = copier.copy_trade(&event(TradeSide::Sell, dec!(0.5), dec!(2))).await;

        assert!(result.success);
        let orders = exec.submitted();
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].amount, dec!(5));
        assert_eq!(orders[0].side, TradeSide::Sell);
        assert_eq!(ledger.get("0xmarket", "token-1").await.unwrap(), Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_sell_without_reported_fill_decrements_requested_amount() {
        let exec = MockExec::new(dec!(100)).with_placement(OrderPlacement {
            success: true,
            status: Some("matched".to_string()),
            making_amount: None,
            ..Default::default()
        });
        let (copier, ledger, _, _) = copier(exec, MockAllowances::new(), CopyConfig::default()).await;
        ledger.add("0xmarket", "token-1", dec!(5)).await.unwrap();

        let result = copier.copy_trade(&event(TradeSide::Sell, dec!(0.5), dec!(5))).await;

        assert!(result.success);
        assert_eq!(ledger.get("0xmarket", "token-1").await.unwrap(), Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_partial_sell_fill_leaves_remainder() {
        let exec = MockExec::new(dec!(100)).with_placement(OrderPlacement {
            success: true,
            status: Some("matched".to_string()),
            making_amount: Some("3".to_string()),
            ..Default::default()
        });
        let (copier, ledger, _, _) = copier(exec, MockAllowances::new(), CopyConfig::default()).await;
        ledger.add("0xmarket", "token-1", dec!(5)).await.unwrap();

        copier.copy_trade(&event(TradeSide::Sell, dec!(0.5), dec!(5))).await;

        // Only the reported fill is decremented; no re-attempt for the rest.
        assert_eq!(ledger.get("0xmarket", "token-1").await.unwrap(), dec!(2));
    }

    #[tokio::test]
    async fn test_buy_clamps_to_available_balance() {
        let (copier, _, exec, _) =
            copier(MockExec::new(dec!(2)), MockAllowances::new(), CopyConfig::default()).await;

        // Intended spend: 0.5 * 8 = 4; only 2 available.
        let result = copier.copy_trade(&event(TradeSide::Buy, dec!(0.5), dec!(8))).await;

        assert!(result.success);
        let orders = exec.submitted();
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].amount, dec!(2));
    }

    #[tokio::test]
    async fn test_buy_with_zero_balance_fails_without_gateway_call() {
        let (copier, _, exec, _) =
            copier(MockExec::new(Decimal::ZERO), MockAllowances::new(), CopyConfig::default()).await;

        let result = copier.copy_trade(&event(TradeSide::Buy, dec!(0.5), dec!(8))).await;

        assert!(!result.success);
        assert!(result.error.unwrap().contains("insufficient balance"));
        assert!(exec.submitted().is_empty());
    }

    #[tokio::test]
    async fn test_buy_applies_multiplier_and_cap() {
        let config = CopyConfig {
            size_multiplier: dec!(0.5),
            max_order_amount: Some(dec!(3)),
            ..Default::default()
        };
        let (copier, _, exec, _) = copier(MockExec::new(dec!(100)), MockAllowances::new(), config).await;

        // Notional 0.5 * 20 = 10, scaled to 5, capped at 3.
        let result = copier.copy_trade(&event(TradeSide::Buy, dec!(0.5), dec!(20))).await;

        assert!(result.success);
        assert_eq!(exec.submitted()[0].amount, dec!(3));
    }

    #[tokio::test]
    async fn test_buy_credits_reported_tokens() {
        let exec = MockExec::new(dec!(100)).with_placement(OrderPlacement {
            success: true,
            status: Some("matched".to_string()),
            taking_amount: Some("12.5".to_string()),
            ..Default::default()
        });
        let (copier, ledger, _, _) = copier(exec, MockAllowances::new(), CopyConfig::default()).await;

        copier.copy_trade(&event(TradeSide::Buy, dec!(0.4), dec!(10))).await;

        assert_eq!(ledger.get("0xmarket", "token-1").await.unwrap(), dec!(12.5));
    }

    #[tokio::test]
    async fn test_buy_estimates_tokens_when_fill_unreported() {
        let exec = MockExec::new(dec!(100)).with_placement(OrderPlacement {
            success: true,
            status: Some("matched".to_string()),
            taking_amount: None,
            ..Default::default()
        });
        let (copier, ledger, _, _) = copier(exec, MockAllowances::new(), CopyConfig::default()).await;

        // Spend 0.4 * 10 = 4; estimate 4 / 0.4 = 10 tokens.
        copier.copy_trade(&event(TradeSide::Buy, dec!(0.4), dec!(10))).await;

        assert_eq!(ledger.get("0xmarket", "token-1").await.unwrap(), dec!(10));
    }

    #[tokio::test]
    async fn test_post_buy_approval_failure_is_non_fatal() {
        let (copier, ledger, _, allowances) =
            copier(MockExec::new(dec!(100)), MockAllowances::failing(), CopyConfig::default()).await;

        let result = copier.copy_trade(&event(TradeSide::Buy, dec!(0.4), dec!(10))).await;

        assert!(result.success);
        assert_eq!(allowances.post_buy_calls.lock().unwrap().len(), 1);
        // Ledger update was not rolled back.
        assert!(ledger.get("0xmarket", "token-1").await.unwrap() > Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_balance_error_triggers_diagnostic_pass() {
        let exec = MockExec::new(dec!(100)).failing_with("not enough balance / allowance");
        let (copier, _, exec, _) = copier(exec, MockAllowances::new(), CopyConfig::default()).await;

        let result = copier.place_market_buy("token-1", dec!(5), None).await;

        assert!(!result.success);
        // Diagnostic pass re-read the balance and attempted a refresh.
        assert!(exec.balance_reads.load(Ordering::SeqCst) >= 1);
        assert!(exec.refreshes.load(Ordering::SeqCst) >= 1);
        assert!(result.error.unwrap().contains("balance"));
    }

    #[tokio::test]
    async fn test_manual_orders_do_not_touch_ledger() {
        let (copier, ledger, exec, _) =
            copier(MockExec::new(dec!(100)), MockAllowances::new(), CopyConfig::default()).await;

        let buy = copier.place_market_buy("token-9", dec!(5), None).await;
        let sell = copier.place_market_sell("token-9", dec!(5), Some(dec!(0.7))).await;

        assert!(buy.success);
        assert!(sell.success);
        assert_eq!(exec.submitted().len(), 2);
        assert_eq!(exec.submitted()[1].limit_price, Some(dec!(0.7)));
        assert!(ledger.entries().await.unwrap().is_empty());
    }
}
