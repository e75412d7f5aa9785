use async_trait::async_trait;
use chrono::{DateTime, Utc};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use hmac::{Hmac, Mac};
use reqwest::{Client, Method, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use sha2::Sha256;
use std::collections::HashMap;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use super::{Exchange, ExchangeError};
use crate::execution::quantizer::format_decimal;
use crate::models::{Candle, ExchangePosition, OrderReceipt, OrderSide, Side, SymbolFilter};

const TESTNET_API_BASE: &str = "https://testnet.binancefuture.com";
const MAINNET_API_BASE: &str = "https://fapi.binance.com";
const QUOTE_ASSET: &str = "USDT";
const MAX_RETRIES: u32 = 3;
const RATE_LIMIT_PER_SEC: NonZeroU32 = match NonZeroU32::new(10) {
    Some(n) => n,
    None => panic!("rate limit must be non-zero"),
};

type HmacSha256 = Hmac<Sha256>;

/// USDⓈ-M futures REST client
///
/// Cloneable; all clones share the same rate limiter.
#[derive(Clone)]
pub struct BinanceFuturesClient {
    client: Client,
    api_key: String,
    secret_key: String,
    base_url: String,
    rate_limiter: Arc<DefaultDirectRateLimiter>,
}

// ============== Response Types ==============

#[derive(Debug, Deserialize)]
struct ErrorBody {
    code: i64,
    msg: String,
}

#[derive(Debug, Deserialize)]
struct BalanceEntry {
    asset: String,
    balance: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Ticker24h {
    symbol: String,
    quote_volume: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderResponse {
    order_id: u64,
    symbol: String,
    status: String,
}

#[derive(Debug, Deserialize)]
struct ExchangeInfo {
    symbols: Vec<SymbolInfo>,
}

#[derive(Debug, Deserialize)]
struct SymbolInfo {
    symbol: String,
    status: String,
    #[serde(default)]
    filters: Vec<RawFilter>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawFilter {
    filter_type: String,
    step_size: Option<String>,
    min_qty: Option<String>,
    tick_size: Option<String>,
    notional: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PositionRisk {
    symbol: String,
    position_amt: String,
    entry_price: String,
    un_realized_profit: String,
    leverage: String,
}

// ============== Implementation ==============

impl BinanceFuturesClient {
    pub fn new(api_key: String, secret_key: String, testnet: bool) -> Result<Self, ExchangeError> {
        let base_url = if testnet {
            TESTNET_API_BASE
        } else {
            MAINNET_API_BASE
        };
        Self::with_base_url(api_key, secret_key, base_url)
    }

    pub fn with_base_url(
        api_key: String,
        secret_key: String,
        base_url: impl Into<String>,
    ) -> Result<Self, ExchangeError> {
        let client = Client::builder().timeout(Duration::from_secs(15)).build()?;

        Ok(Self {
            client,
            api_key,
            secret_key,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            rate_limiter: Arc::new(RateLimiter::direct(Quota::per_second(RATE_LIMIT_PER_SEC))),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Query string with timestamp and HMAC-SHA256 signature appended
    fn signed_query(&self, params: &[(&str, String)]) -> Result<String, ExchangeError> {
        let mut params = params.to_vec();
        params.push(("timestamp", Utc::now().timestamp_millis().to_string()));

        let query =
            serde_urlencoded::to_string(&params).map_err(|e| ExchangeError::Signing(e.to_string()))?;

        let mut mac = HmacSha256::new_from_slice(self.secret_key.as_bytes())
            .map_err(|e| ExchangeError::Signing(e.to_string()))?;
        mac.update(query.as_bytes());
        let signature = hex::encode(mac.finalize().into_bytes());

        Ok(format!("{}&signature={}", query, signature))
    }

    fn build_url(&self, path: &str, params: &[(&str, String)], signed: bool) -> Result<String, ExchangeError> {
        let query = if signed {
            self.signed_query(params)?
        } else {
            serde_urlencoded::to_string(params).map_err(|e| ExchangeError::Signing(e.to_string()))?
        };

        if query.is_empty() {
            Ok(format!("{}{}", self.base_url, path))
        } else {
            Ok(format!("{}{}?{}", self.base_url, path, query))
        }
    }

    /// Rate-limited request; GETs are retried on 429/5xx/network errors,
    /// order-mutating calls are sent exactly once
    async fn send(
        &self,
        method: Method,
        path: &str,
        params: &[(&str, String)],
        signed: bool,
    ) -> Result<Response, ExchangeError> {
        let attempts = if method == Method::GET { MAX_RETRIES } else { 1 };
        let mut attempt = 0;

        loop {
            attempt += 1;
            self.rate_limiter.until_ready().await;

            // Re-sign every attempt so the timestamp stays fresh
            let url = self.build_url(path, params, signed)?;
            let mut request = self.client.request(method.clone(), &url);
            if signed {
                request = request.header("X-MBX-APIKEY", &self.api_key);
            }

            match request.send().await {
                Ok(response) if response.status().is_success() => return Ok(response),
                Ok(response) => {
                    let status = response.status();
                    let retryable = status.as_u16() == 429 || status.is_server_error();
                    if retryable && attempt < attempts {
                        let backoff_secs = 2u64.pow(attempt);
                        tracing::warn!(
                            "Binance {} {} returned {}, retrying in {}s (attempt {}/{})",
                            method,
                            path,
                            status,
                            backoff_secs,
                            attempt,
                            attempts
                        );
                        tokio::time::sleep(Duration::from_secs(backoff_secs)).await;
                        continue;
                    }

                    let body = response.text().await.unwrap_or_default();
                    return Err(error_from_body(status.as_u16(), body));
                }
                Err(e) if attempt < attempts => {
                    let backoff_secs = 2u64.pow(attempt);
                    tracing::warn!(
                        "Network error on {} {}: {}, retrying in {}s (attempt {}/{})",
                        method,
                        path,
                        e,
                        backoff_secs,
                        attempt,
                        attempts
                    );
                    tokio::time::sleep(Duration::from_secs(backoff_secs)).await;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    async fn request_json<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        params: &[(&str, String)],
        signed: bool,
    ) -> Result<T, ExchangeError> {
        let response = self.send(method, path, params, signed).await?;
        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| ExchangeError::Decode(format!("{}: {}", path, e)))
    }

    async fn submit_order(&self, params: Vec<(&str, String)>) -> Result<OrderReceipt, ExchangeError> {
        let mut params = params;
        params.push(("newClientOrderId", uuid::Uuid::new_v4().simple().to_string()));

        let resp: OrderResponse = self
            .request_json(Method::POST, "/fapi/v1/order", &params, true)
            .await?;

        Ok(OrderReceipt {
            order_id: resp.order_id.to_string(),
            symbol: resp.symbol,
            status: resp.status,
        })
    }
}

fn error_from_body(status: u16, body: String) -> ExchangeError {
    match serde_json::from_str::<ErrorBody>(&body) {
        Ok(err) => ExchangeError::Api {
            code: err.code,
            msg: err.msg,
        },
        Err(_) => ExchangeError::Status { status, body },
    }
}

fn parse_number(text: &str, field: &str) -> Result<f64, ExchangeError> {
    text.parse::<f64>()
        .map_err(|_| ExchangeError::Decode(format!("invalid {} '{}'", field, text)))
}

fn value_number(value: Option<&serde_json::Value>, field: &str) -> Result<f64, ExchangeError> {
    match value {
        Some(serde_json::Value::String(s)) => parse_number(s, field),
        Some(serde_json::Value::Number(n)) => n
            .as_f64()
            .ok_or_else(|| ExchangeError::Decode(format!("invalid {}", field))),
        _ => Err(ExchangeError::Decode(format!("missing {}", field))),
    }
}

/// Kline rows are positional arrays: [open_time, open, high, low, close, volume, ...]
fn parse_kline(row: &[serde_json::Value]) -> Result<Candle, ExchangeError> {
    let open_time_ms = row
        .first()
        .and_then(|v| v.as_i64())
        .ok_or_else(|| ExchangeError::Decode("missing kline open time".to_string()))?;
    let open_time = DateTime::<Utc>::from_timestamp_millis(open_time_ms)
        .ok_or_else(|| ExchangeError::Decode(format!("invalid open time {}", open_time_ms)))?;

    Ok(Candle {
        open_time,
        open: value_number(row.get(1), "open")?,
        high: value_number(row.get(2), "high")?,
        low: value_number(row.get(3), "low")?,
        close: value_number(row.get(4), "close")?,
        volume: value_number(row.get(5), "volume")?,
    })
}

fn parse_filter(info: &SymbolInfo) -> Result<SymbolFilter, ExchangeError> {
    let mut filter = SymbolFilter {
        tick_size: 0.0,
        step_size: 0.0,
        min_qty: 0.0,
        min_notional: 0.0,
    };

    for raw in &info.filters {
        match raw.filter_type.as_str() {
            "LOT_SIZE" => {
                if let Some(step) = &raw.step_size {
                    filter.step_size = parse_number(step, "stepSize")?;
                }
                if let Some(min_qty) = &raw.min_qty {
                    filter.min_qty = parse_number(min_qty, "minQty")?;
                }
            }
            "PRICE_FILTER" => {
                if let Some(tick) = &raw.tick_size {
                    filter.tick_size = parse_number(tick, "tickSize")?;
                }
            }
            "MIN_NOTIONAL" => {
                if let Some(notional) = &raw.notional {
                    filter.min_notional = parse_number(notional, "notional")?;
                }
            }
            _ => {}
        }
    }

    Ok(filter)
}

#[async_trait]
impl Exchange for BinanceFuturesClient {
    async fn set_position_mode(&self, one_way: bool) -> Result<(), ExchangeError> {
        let params = [("dualSidePosition", (!one_way).to_string())];
        self.send(Method::POST, "/fapi/v1/positionSide/dual", &params, true)
            .await?;
        Ok(())
    }

    async fn set_leverage(&self, symbol: &str, leverage: u32) -> Result<(), ExchangeError> {
        let params = [
            ("symbol", symbol.to_string()),
            ("leverage", leverage.to_string()),
        ];
        self.send(Method::POST, "/fapi/v1/leverage", &params, true)
            .await?;
        Ok(())
    }

    async fn account_balance(&self) -> Result<f64, ExchangeError> {
        let balances: Vec<BalanceEntry> = self
            .request_json(Method::GET, "/fapi/v2/balance", &[], true)
            .await?;

        match balances.iter().find(|b| b.asset == QUOTE_ASSET) {
            Some(entry) => parse_number(&entry.balance, "balance"),
            None => Ok(0.0),
        }
    }

    async fn fetch_bars(
        &self,
        symbol: &str,
        interval: &str,
        limit: usize,
    ) -> Result<Vec<Candle>, ExchangeError> {
        let params = [
            ("symbol", symbol.to_string()),
            ("interval", interval.to_string()),
            ("limit", limit.to_string()),
        ];
        let rows: Vec<Vec<serde_json::Value>> = self
            .request_json(Method::GET, "/fapi/v1/klines", &params, false)
            .await?;

        rows.iter().map(|row| parse_kline(row)).collect()
    }

    async fn top_symbols_by_volume(&self, limit: usize) -> Result<Vec<String>, ExchangeError> {
        let tickers: Vec<Ticker24h> = self
            .request_json(Method::GET, "/fapi/v1/ticker/24hr", &[], false)
            .await?;

        let mut pairs: Vec<(String, f64)> = tickers
            .into_iter()
            .filter(|t| t.symbol.ends_with(QUOTE_ASSET))
            .map(|t| {
                let volume = t.quote_volume.parse::<f64>().unwrap_or(0.0);
                (t.symbol, volume)
            })
            .collect();
        pairs.sort_by(|a, b| b.1.total_cmp(&a.1));

        Ok(pairs.into_iter().take(limit).map(|(s, _)| s).collect())
    }

    async fn place_market_order(
        &self,
        symbol: &str,
        side: OrderSide,
        quantity: f64,
        reduce_only: bool,
    ) -> Result<OrderReceipt, ExchangeError> {
        let mut params = vec![
            ("symbol", symbol.to_string()),
            ("side", side.as_str().to_string()),
            ("type", "MARKET".to_string()),
            ("quantity", format_decimal(quantity)),
        ];
        if reduce_only {
            params.push(("reduceOnly", "true".to_string()));
        }

        tracing::info!("Sending MARKET {} {} {}", side.as_str(), format_decimal(quantity), symbol);
        self.submit_order(params).await
    }

    async fn place_stop_market_close(
        &self,
        symbol: &str,
        side: Side,
        stop_price: f64,
    ) -> Result<OrderReceipt, ExchangeError> {
        let params = vec![
            ("symbol", symbol.to_string()),
            ("side", side.exit_order_side().as_str().to_string()),
            ("type", "STOP_MARKET".to_string()),
            ("stopPrice", format_decimal(stop_price)),
            ("closePosition", "true".to_string()),
            ("timeInForce", "GTC".to_string()),
        ];

        tracing::info!("Sending STOP_MARKET close for {} {} @ {}", side, symbol, format_decimal(stop_price));
        self.submit_order(params).await
    }

    async fn cancel_all_open_orders(&self, symbol: &str) -> Result<(), ExchangeError> {
        let params = [("symbol", symbol.to_string())];
        self.send(Method::DELETE, "/fapi/v1/allOpenOrders", &params, true)
            .await?;
        Ok(())
    }

    async fn fetch_symbol_filters(&self) -> Result<HashMap<String, SymbolFilter>, ExchangeError> {
        let info: ExchangeInfo = self
            .request_json(Method::GET, "/fapi/v1/exchangeInfo", &[], false)
            .await?;

        let mut filters = HashMap::new();
        for symbol in info.symbols.iter().filter(|s| s.status == "TRADING") {
            filters.insert(symbol.symbol.clone(), parse_filter(symbol)?);
        }

        tracing::info!("Loaded symbol filters for {} symbols", filters.len());
        Ok(filters)
    }

    async fn fetch_position_info(
        &self,
        symbol: Option<&str>,
    ) -> Result<Vec<ExchangePosition>, ExchangeError> {
        let params: Vec<(&str, String)> = symbol
            .map(|s| vec![("symbol", s.to_string())])
            .unwrap_or_default();

        let rows: Vec<PositionRisk> = self
            .request_json(Method::GET, "/fapi/v2/positionRisk", &params, true)
            .await?;

        rows.into_iter()
            .map(|row| {
                Ok(ExchangePosition {
                    quantity: parse_number(&row.position_amt, "positionAmt")?,
                    entry_price: parse_number(&row.entry_price, "entryPrice")?,
                    unrealized_pnl: parse_number(&row.un_realized_profit, "unRealizedProfit")?,
                    leverage: row.leverage.parse().unwrap_or(0),
                    symbol: row.symbol,
                })
            })
            .collect()
    }
}
