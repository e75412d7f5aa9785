// Shared in-memory exchange for integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use trendbot::api::{Exchange, ExchangeError};
use trendbot::models::{Candle, ExchangePosition, OrderReceipt, OrderSide, Side, SymbolFilter};

/// Scripted exchange: serves fixed bars per symbol and records every order
#[derive(Default)]
pub struct MockExchange {
    balance: f64,
    bars: Mutex<HashMap<String, Vec<Candle>>>,
    failing_symbols: Mutex<HashSet<String>>,
    reject_stops: Mutex<bool>,
    orders: Mutex<Vec<String>>,
    leverage_calls: Mutex<Vec<(String, u32)>>,
}

impl MockExchange {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_balance(balance: f64) -> Self {
        Self {
            balance,
            ..Default::default()
        }
    }

    pub fn set_bars(&self, symbol: &str, bars: Vec<Candle>) {
        self.bars.lock().unwrap().insert(symbol.to_string(), bars);
    }

    pub fn fail_bars_for(&self, symbol: &str) {
        self.failing_symbols.lock().unwrap().insert(symbol.to_string());
    }

    pub fn reject_stops(&self) {
        *self.reject_stops.lock().unwrap() = true;
    }

    pub fn orders(&self) -> Vec<String> {
        self.orders.lock().unwrap().clone()
    }

    pub fn leverage_calls(&self) -> Vec<(String, u32)> {
        self.leverage_calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Exchange for MockExchange {
    async fn set_position_mode(&self, _one_way: bool) -> Result<(), ExchangeError> {
        Ok(())
    }

    async fn set_leverage(&self, symbol: &str, leverage: u32) -> Result<(), ExchangeError> {
        self.leverage_calls
            .lock()
            .unwrap()
            .push((symbol.to_string(), leverage));
        Ok(())
    }

    async fn account_balance(&self) -> Result<f64, ExchangeError> {
        Ok(self.balance)
    }

    async fn fetch_bars(
        &self,
        symbol: &str,
        _interval: &str,
        limit: usize,
    ) -> Result<Vec<Candle>, ExchangeError> {
        if self.failing_symbols.lock().unwrap().contains(symbol) {
            return Err(ExchangeError::Status {
                status: 503,
                body: "Service Unavailable".to_string(),
            });
        }

        let bars = self
            .bars
            .lock()
            .unwrap()
            .get(symbol)
            .cloned()
            .unwrap_or_default();
        let start = bars.len().saturating_sub(limit);
        Ok(bars[start..].to_vec())
    }

    async fn top_symbols_by_volume(&self, _limit: usize) -> Result<Vec<String>, ExchangeError> {
        Ok(Vec::new())
    }

    async fn place_market_order(
        &self,
        symbol: &str,
        side: OrderSide,
        quantity: f64,
        _reduce_only: bool,
    ) -> Result<OrderReceipt, ExchangeError> {
        self.orders
            .lock()
            .unwrap()
            .push(format!("MARKET {} {} {}", side.as_str(), quantity, symbol));
        Ok(receipt(symbol))
    }

    async fn place_stop_market_close(
        &self,
        symbol: &str,
        side: Side,
        stop_price: f64,
    ) -> Result<OrderReceipt, ExchangeError> {
        if *self.reject_stops.lock().unwrap() {
            return Err(ExchangeError::Api {
                code: -2021,
                msg: "Order would immediately trigger.".to_string(),
            });
        }
        self.orders
            .lock()
            .unwrap()
            .push(format!("STOP {} {} {}", side, stop_price, symbol));
        Ok(receipt(symbol))
    }

    async fn cancel_all_open_orders(&self, symbol: &str) -> Result<(), ExchangeError> {
        self.orders.lock().unwrap().push(format!("CANCEL {}", symbol));
        Ok(())
    }

    async fn fetch_symbol_filters(&self) -> Result<HashMap<String, SymbolFilter>, ExchangeError> {
        Ok(HashMap::new())
    }

    async fn fetch_position_info(
        &self,
        _symbol: Option<&str>,
    ) -> Result<Vec<ExchangePosition>, ExchangeError> {
        Ok(Vec::new())
    }
}

fn receipt(symbol: &str) -> OrderReceipt {
    OrderReceipt {
        order_id: "1".to_string(),
        symbol: symbol.to_string(),
        status: "NEW".to_string(),
    }
}

pub fn candle(index: usize, high: f64, low: f64, close: f64) -> Candle {
    let start = DateTime::<Utc>::from_timestamp(1_700_000_000, 0).unwrap();
    Candle {
        open_time: start + Duration::minutes(5 * index as i64),
        open: close,
        high,
        low,
        close,
        volume: 1000.0,
    }
}

/// `count` quiet bars around `price` (high/low one unit away)
pub fn flat_bars(count: usize, price: f64) -> Vec<Candle> {
    (0..count)
        .map(|i| candle(i, price + 1.0, price - 1.0, price))
        .collect()
}

/// Tick 0.1, step 0.001 filters for BTCUSDT and ETHUSDT
pub fn filters() -> HashMap<String, SymbolFilter> {
    let filter = SymbolFilter {
        tick_size: 0.1,
        step_size: 0.001,
        min_qty: 0.001,
        min_notional: 0.0,
    };
    let mut filters = HashMap::new();
    filters.insert("BTCUSDT".to_string(), filter);
    filters.insert("ETHUSDT".to_string(), filter);
    filters
}
