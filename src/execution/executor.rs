use anyhow::Context;

use crate::api::Exchange;
use crate::execution::{format_decimal, PositionAction, Quantizer};
use crate::models::{OrderReceipt, Side};

/// Turns planned position actions into exchange orders
///
/// In dry-run mode nothing is sent: each order is logged with a
/// `[DRY_RUN]` prefix and a synthetic receipt is produced, so the
/// state machine still advances exactly as it would live.
pub struct OrderExecutor {
    dry_run: bool,
}

impl OrderExecutor {
    pub fn new(dry_run: bool) -> Self {
        Self { dry_run }
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Submit the orders for one action
    ///
    /// Returns an error if a required order fails; the caller must not
    /// apply the action in that case.
    pub async fn execute<E: Exchange + ?Sized>(
        &self,
        exchange: &E,
        symbol: &str,
        action: &PositionAction,
        quantizer: &Quantizer,
    ) -> anyhow::Result<()> {
        if !self.dry_run {
            quantizer.require(symbol)?;
        } else if quantizer.filter(symbol).is_none() {
            tracing::warn!("[{}] no symbol filter loaded, using fallback rounding", symbol);
        }

        match action {
            PositionAction::Open {
                side,
                quantity,
                entry_price,
                stop_price,
                reason,
            } => {
                tracing::info!(
                    "📈 [{}] OPEN {} qty={} entry≈{} stop={} ({})",
                    symbol,
                    side,
                    format_decimal(*quantity),
                    format_decimal(*entry_price),
                    format_decimal(*stop_price),
                    reason
                );

                self.market_order(exchange, symbol, *side, *quantity)
                    .await
                    .with_context(|| format!("Entry order failed for {}", symbol))?;
                self.replace_stop(exchange, symbol, *side, *stop_price).await?;
            }
            PositionAction::UpdateTrail { side, stop_price } => {
                tracing::info!(
                    "[{}] trail {} -> {}",
                    symbol,
                    side,
                    format_decimal(*stop_price)
                );
                self.replace_stop(exchange, symbol, *side, *stop_price).await?;
            }
            PositionAction::Pyramid {
                side,
                add_quantity,
                price,
            } => {
                tracing::info!(
                    "➕ [{}] PYRAMID {} add={} @ {}",
                    symbol,
                    side,
                    format_decimal(*add_quantity),
                    format_decimal(*price)
                );
                self.market_order(exchange, symbol, *side, *add_quantity)
                    .await
                    .with_context(|| format!("Pyramid order failed for {}", symbol))?;
            }
            PositionAction::ReplaceStop { side, stop_price } => {
                self.replace_stop(exchange, symbol, *side, *stop_price).await?;
            }
            PositionAction::Exit { side, price, trail } => {
                // The resting stop is assumed to have filled; nothing to send
                tracing::info!(
                    "📉 [{}] EXIT {}: close {} crossed trail {}",
                    symbol,
                    side,
                    format_decimal(*price),
                    format_decimal(*trail)
                );
            }
        }

        Ok(())
    }

    /// Cancel resting orders, then place the close-position stop
    ///
    /// Once the cancel has gone out the position has no stop, so a rejected
    /// stop is escalated before the error is returned.
    async fn replace_stop<E: Exchange + ?Sized>(
        &self,
        exchange: &E,
        symbol: &str,
        side: Side,
        stop_price: f64,
    ) -> anyhow::Result<()> {
        self.cancel_orders(exchange, symbol).await;

        if let Err(e) = self.stop_order(exchange, symbol, side, stop_price).await {
            tracing::error!(
                "🚨 [{}] {} position is UNPROTECTED: stop @ {} rejected: {}",
                symbol,
                side,
                format_decimal(stop_price),
                e
            );
            return Err(e.context(format!("Protective stop failed for {}", symbol)));
        }
        Ok(())
    }

    async fn market_order<E: Exchange + ?Sized>(
        &self,
        exchange: &E,
        symbol: &str,
        side: Side,
        quantity: f64,
    ) -> anyhow::Result<OrderReceipt> {
        let order_side = side.entry_order_side();
        if self.dry_run {
            tracing::info!(
                "[DRY_RUN] MARKET {} {} {}",
                order_side.as_str(),
                format_decimal(quantity),
                symbol
            );
            return Ok(dry_run_receipt(symbol));
        }

        Ok(exchange
            .place_market_order(symbol, order_side, quantity, false)
            .await?)
    }

    async fn stop_order<E: Exchange + ?Sized>(
        &self,
        exchange: &E,
        symbol: &str,
        side: Side,
        stop_price: f64,
    ) -> anyhow::Result<OrderReceipt> {
        if self.dry_run {
            tracing::info!(
                "[DRY_RUN] STOP_MARKET {} closePosition {} @ {}",
                side.exit_order_side().as_str(),
                symbol,
                format_decimal(stop_price)
            );
            return Ok(dry_run_receipt(symbol));
        }

        Ok(exchange
            .place_stop_market_close(symbol, side, stop_price)
            .await?)
    }

    /// Best-effort: a failed cancel is logged and ignored
    async fn cancel_orders<E: Exchange + ?Sized>(&self, exchange: &E, symbol: &str) {
        if self.dry_run {
            tracing::info!("[DRY_RUN] cancel all open orders {}", symbol);
            return;
        }

        if let Err(e) = exchange.cancel_all_open_orders(symbol).await {
            tracing::warn!("[{}] cancel open orders failed: {}", symbol, e);
        }
    }
}

fn dry_run_receipt(symbol: &str) -> OrderReceipt {
    OrderReceipt {
        order_id: format!("DRY-{}", uuid::Uuid::new_v4().simple()),
        symbol: symbol.to_string(),
        status: "DRY_RUN".to_string(),
    }
}
