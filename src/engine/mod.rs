// Polling loop: bars -> signal -> position actions -> orders -> state
use anyhow::Context;
use std::future::Future;
use std::sync::Arc;
use tokio::time::Duration;

use crate::api::Exchange;
use crate::config::BotConfig;
use crate::execution::{
    OrderExecutor, PositionManager, PositionState, Quantizer, StateSnapshot,
};
use crate::persistence::StateStore;
use crate::risk::PositionSizer;
use crate::strategy::{BreakoutStrategy, Strategy};

/// Always-considered symbols when no explicit list is configured
pub const DEFAULT_SYMBOLS: &[&str] = &[
    "BTCUSDT", "ETHUSDT", "SOLUSDT", "BNBUSDT", "TONUSDT", "SUIUSDT", "SEIUSDT", "XRPUSDT",
    "DOGEUSDT",
];

const TOP_VOLUME_CANDIDATES: usize = 20;
const LOOP_ERROR_PAUSE_SECS: u64 = 5;

/// Outcome of one sweep across the universe
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CycleReport {
    pub equity: f64,
    pub processed: usize,
    /// Symbols still waiting for enough data
    pub waiting: usize,
    pub actions_applied: usize,
    /// (symbol, error) for every symbol whose processing failed
    pub failures: Vec<(String, String)>,
}

enum SymbolOutcome {
    Waiting,
    Applied(usize),
}

/// Drives the sequential per-symbol cycle and owns nothing mutable:
/// the snapshot is passed in by the caller
pub struct TradingEngine<E: Exchange> {
    exchange: Arc<E>,
    strategy: BreakoutStrategy,
    manager: PositionManager,
    executor: OrderExecutor,
    quantizer: Quantizer,
    symbols: Vec<String>,
    timeframe: String,
    base_equity: f64,
    leverage: u32,
    loop_sleep: Duration,
}

impl<E: Exchange> TradingEngine<E> {
    pub fn new(
        config: &BotConfig,
        exchange: Arc<E>,
        quantizer: Quantizer,
        symbols: Vec<String>,
    ) -> Self {
        Self {
            exchange,
            strategy: BreakoutStrategy::new(config.signal_config()),
            manager: PositionManager::new(
                config.position_config(),
                PositionSizer::new(config.risk_config()),
            ),
            executor: OrderExecutor::new(config.dry_run),
            quantizer,
            symbols,
            timeframe: config.timeframe.clone(),
            base_equity: config.base_equity,
            leverage: config.leverage,
            loop_sleep: Duration::from_secs(config.loop_sleep_secs),
        }
    }

    pub fn symbols(&self) -> &[String] {
        &self.symbols
    }

    /// Best-effort account setup: one-way mode and per-symbol leverage
    pub async fn configure_account(&self) {
        if let Err(e) = self.exchange.set_position_mode(true).await {
            tracing::warn!("Failed to set one-way position mode: {}", e);
        }

        for symbol in &self.symbols {
            if let Err(e) = self.exchange.set_leverage(symbol, self.leverage).await {
                tracing::warn!("set_leverage {} failed: {}", symbol, e);
            }
        }
    }

    /// Wallet balance, or the configured base equity when it reads as zero
    pub async fn current_equity(&self) -> f64 {
        match self.exchange.account_balance().await {
            Ok(balance) if balance > 0.0 => balance,
            Ok(_) => self.base_equity,
            Err(e) => {
                tracing::warn!("Balance query failed: {}, using base equity", e);
                self.base_equity
            }
        }
    }

    /// One sweep over every symbol, in configured order
    ///
    /// A failing symbol is logged and recorded in the report; the others
    /// still run. Nothing is persisted here.
    pub async fn run_cycle(&self, snapshot: &mut StateSnapshot) -> CycleReport {
        let equity = self.current_equity().await;
        let mut report = CycleReport {
            equity,
            ..Default::default()
        };

        for symbol in &self.symbols {
            let state = snapshot.position_mut(symbol);
            match self.process_symbol(symbol, state, equity).await {
                Ok(SymbolOutcome::Waiting) => {
                    report.processed += 1;
                    report.waiting += 1;
                }
                Ok(SymbolOutcome::Applied(count)) => {
                    report.processed += 1;
                    report.actions_applied += count;
                }
                Err(e) => {
                    tracing::error!("[{}] cycle failed: {:#}", symbol, e);
                    report.failures.push((symbol.clone(), format!("{:#}", e)));
                }
            }
        }

        report
    }

    async fn process_symbol(
        &self,
        symbol: &str,
        state: &mut PositionState,
        equity: f64,
    ) -> anyhow::Result<SymbolOutcome> {
        let bars = self
            .exchange
            .fetch_bars(symbol, &self.timeframe, self.strategy.min_candles_required())
            .await
            .with_context(|| format!("Failed to fetch bars for {}", symbol))?;

        let frame = self.strategy.build_frame(&bars);
        let info = self.strategy.evaluate(&frame);
        if !info.has_valid_atr() {
            tracing::debug!("[{}] waiting for data ({} bars)", symbol, bars.len());
            return Ok(SymbolOutcome::Waiting);
        }

        let actions = self
            .manager
            .plan(symbol, state, &frame, &info, equity, &self.quantizer);

        let mut applied = 0;
        for action in &actions {
            self.executor
                .execute(self.exchange.as_ref(), symbol, action, &self.quantizer)
                .await?;
            state.apply(action)?;
            applied += 1;
        }

        Ok(SymbolOutcome::Applied(applied))
    }

    /// Poll until Ctrl+C, then return cleanly
    pub async fn run(&self, store: &StateStore, snapshot: StateSnapshot) -> anyhow::Result<()> {
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    tracing::info!("⚠️  Received Ctrl+C, finishing current sweep...");
                    let _ = tx.send(());
                }
                Err(e) => {
                    tracing::error!("Unable to listen for Ctrl+C: {}", e);
                    // Keep the sender alive so the loop is not stopped
                    let _tx = tx;
                    std::future::pending::<()>().await;
                }
            }
        });

        let snapshot = self
            .run_until(store, snapshot, async {
                let _ = rx.await;
            })
            .await;

        tracing::info!(
            "👋 Trading loop stopped with {} open positions",
            snapshot.open_positions().count()
        );
        Ok(())
    }

    /// Sweep, persist, sleep; repeat until `shutdown` resolves
    ///
    /// A sweep is never interrupted: shutdown is honored between sweeps,
    /// after the snapshot has been saved, so the file on disk always
    /// reflects every order that was sent.
    pub async fn run_until<F>(
        &self,
        store: &StateStore,
        mut snapshot: StateSnapshot,
        shutdown: F,
    ) -> StateSnapshot
    where
        F: Future<Output = ()>,
    {
        tracing::info!(
            "🔄 Trading loop started: {} on {} symbols, timeframe {}, sleep {}s, dry_run={}",
            self.strategy.name(),
            self.symbols.len(),
            self.timeframe,
            self.loop_sleep.as_secs(),
            self.executor.is_dry_run()
        );

        tokio::pin!(shutdown);

        loop {
            let report = self.run_cycle(&mut snapshot).await;

            let pause = match store.save(&snapshot) {
                Ok(()) => {
                    tracing::info!(
                        "Cycle done: equity ${:.2}, {} symbols, {} actions, {} waiting, {} failed, {} open",
                        report.equity,
                        report.processed,
                        report.actions_applied,
                        report.waiting,
                        report.failures.len(),
                        snapshot.open_positions().count()
                    );
                    self.loop_sleep
                }
                Err(e) => {
                    tracing::error!("Loop error: {:#}", e);
                    Duration::from_secs(LOOP_ERROR_PAUSE_SECS)
                }
            };

            tokio::select! {
                biased;
                _ = &mut shutdown => break,
                _ = tokio::time::sleep(pause) => {}
            }
        }

        snapshot
    }
}

/// Symbol universe for the session
///
/// An explicit `SYMBOLS` list wins. Otherwise the default list is
/// extended with the most-traded USDT pairs. Either way the result is
/// capped at `max_parallel_symbols`.
pub async fn select_symbols<E: Exchange + ?Sized>(config: &BotConfig, exchange: &E) -> Vec<String> {
    let mut symbols = config.explicit_symbols();

    if symbols.is_empty() {
        symbols = DEFAULT_SYMBOLS.iter().map(|s| s.to_string()).collect();

        match exchange.top_symbols_by_volume(TOP_VOLUME_CANDIDATES).await {
            Ok(top) => {
                for symbol in top {
                    if symbol.ends_with("USDT") && !symbols.contains(&symbol) {
                        symbols.push(symbol);
                    }
                }
            }
            Err(e) => tracing::warn!("Top-volume query failed: {}, using default list", e),
        }
    }

    symbols.truncate(config.max_parallel_symbols);
    symbols
}
