pub mod binance;

pub use binance::BinanceFuturesClient;

use async_trait::async_trait;
use std::collections::HashMap;
use thiserror::Error;

use crate::models::{Candle, ExchangePosition, OrderReceipt, OrderSide, Side, SymbolFilter};

#[derive(Debug, Error)]
pub enum ExchangeError {
    #[error("network error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("exchange returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("exchange rejected request ({code}): {msg}")]
    Api { code: i64, msg: String },

    #[error("failed to decode response: {0}")]
    Decode(String),

    #[error("failed to sign request: {0}")]
    Signing(String),
}

/// Capabilities the trading core needs from a futures exchange
///
/// Every call is fallible. Callers decide which failures are best-effort
/// (configuration, balance, universe) and which must propagate (bars,
/// orders).
#[async_trait]
pub trait Exchange: Send + Sync {
    async fn set_position_mode(&self, one_way: bool) -> Result<(), ExchangeError>;

    async fn set_leverage(&self, symbol: &str, leverage: u32) -> Result<(), ExchangeError>;

    /// Quote-currency (USDT) wallet balance
    async fn account_balance(&self) -> Result<f64, ExchangeError>;

    /// Bars for a symbol, oldest first
    async fn fetch_bars(
        &self,
        symbol: &str,
        interval: &str,
        limit: usize,
    ) -> Result<Vec<Candle>, ExchangeError>;

    async fn top_symbols_by_volume(&self, limit: usize) -> Result<Vec<String>, ExchangeError>;

    async fn place_market_order(
        &self,
        symbol: &str,
        side: OrderSide,
        quantity: f64,
        reduce_only: bool,
    ) -> Result<OrderReceipt, ExchangeError>;

    /// Stop-market order that closes the whole `side` position on trigger
    async fn place_stop_market_close(
        &self,
        symbol: &str,
        side: Side,
        stop_price: f64,
    ) -> Result<OrderReceipt, ExchangeError>;

    async fn cancel_all_open_orders(&self, symbol: &str) -> Result<(), ExchangeError>;

    async fn fetch_symbol_filters(&self) -> Result<HashMap<String, SymbolFilter>, ExchangeError>;

    async fn fetch_position_info(
        &self,
        symbol: Option<&str>,
    ) -> Result<Vec<ExchangePosition>, ExchangeError>;
}
