use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::execution::Quantizer;
use crate::indicators::IndicatorFrame;
use crate::models::Side;
use crate::risk::PositionSizer;
use crate::strategy::{
    improves_trail, initial_stop, should_pyramid, stop_crossed, trail_stop, SignalInfo,
};

/// Per-symbol position record; the unit of persisted truth
///
/// `side == None` is the FLAT state. Quantity, prices and trail are stored
/// already quantized for the symbol.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PositionState {
    pub side: Option<Side>,
    pub qty: f64,
    pub entry_price: f64,
    pub trail: Option<f64>,
    pub adds_done: u32,
    pub last_add_price: f64,
}

impl PositionState {
    pub fn is_open(&self) -> bool {
        self.side.is_some()
    }

    /// Apply a planned transition
    ///
    /// Rejects transitions that would break an invariant: opening on top of
    /// an open position, acting on a flat or opposite-side position, or
    /// loosening the trail.
    pub fn apply(&mut self, action: &PositionAction) -> anyhow::Result<()> {
        match action {
            PositionAction::Open {
                side,
                quantity,
                entry_price,
                stop_price,
                ..
            } => {
                if let Some(current) = self.side {
                    anyhow::bail!("Already have open {} position", current);
                }
                *self = PositionState {
                    side: Some(*side),
                    qty: *quantity,
                    entry_price: *entry_price,
                    trail: Some(*stop_price),
                    adds_done: 0,
                    last_add_price: *entry_price,
                };
            }
            PositionAction::UpdateTrail { side, stop_price } => {
                self.expect_side(*side)?;
                if !improves_trail(*side, *stop_price, self.trail) {
                    anyhow::bail!(
                        "Trail {} does not tighten current stop {:?}",
                        stop_price,
                        self.trail
                    );
                }
                self.trail = Some(*stop_price);
            }
            PositionAction::Pyramid {
                side,
                add_quantity,
                price,
            } => {
                self.expect_side(*side)?;
                self.qty += add_quantity;
                self.adds_done += 1;
                self.last_add_price = *price;
            }
            PositionAction::ReplaceStop { side, .. } => {
                self.expect_side(*side)?;
            }
            PositionAction::Exit { side, .. } => {
                self.expect_side(*side)?;
                *self = PositionState::default();
            }
        }
        Ok(())
    }

    fn expect_side(&self, side: Side) -> anyhow::Result<()> {
        match self.side {
            Some(current) if current == side => Ok(()),
            Some(current) => anyhow::bail!("Position is {}, not {}", current, side),
            None => anyhow::bail!("No open position"),
        }
    }
}

/// Mapping symbol -> position, persisted after every sweep
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StateSnapshot {
    pub positions: BTreeMap<String, PositionState>,
}

impl StateSnapshot {
    /// Position for a symbol (flat if never seen)
    pub fn position(&self, symbol: &str) -> PositionState {
        self.positions.get(symbol).cloned().unwrap_or_default()
    }

    pub fn position_mut(&mut self, symbol: &str) -> &mut PositionState {
        self.positions.entry(symbol.to_string()).or_default()
    }

    pub fn open_positions(&self) -> impl Iterator<Item = (&String, &PositionState)> {
        self.positions.iter().filter(|(_, p)| p.is_open())
    }
}

/// A single state transition together with the orders it requires
#[derive(Debug, Clone, PartialEq)]
pub enum PositionAction {
    /// FLAT -> OPEN: market entry plus protective stop
    Open {
        side: Side,
        quantity: f64,
        entry_price: f64,
        stop_price: f64,
        reason: String,
    },
    /// Replace the protective stop at a tighter price
    UpdateTrail { side: Side, stop_price: f64 },
    /// Scale into a winning position
    Pyramid {
        side: Side,
        add_quantity: f64,
        price: f64,
    },
    /// Re-place the protective stop at the unchanged trail after a size change
    ReplaceStop { side: Side, stop_price: f64 },
    /// OPEN -> FLAT: close crossed the trail (assumes the stop filled)
    Exit { side: Side, price: f64, trail: f64 },
}

/// Trailing and pyramiding parameters
#[derive(Debug, Clone)]
pub struct PositionConfig {
    pub atr_mult_sl: f64,
    pub atr_mult_trail: f64,
    pub trail_lookback: usize,
    pub max_adds: u32,
    pub pyramid_step_atr: f64,
    pub add_fraction: f64,
}

impl Default for PositionConfig {
    fn default() -> Self {
        Self {
            atr_mult_sl: 1.5,
            atr_mult_trail: 2.0,
            trail_lookback: 100,
            max_adds: 4,
            pyramid_step_atr: 1.0,
            add_fraction: 0.5,
        }
    }
}

/// Decides transitions for one symbol per cycle
///
/// Planning is pure: it reads the current state and returns the ordered
/// list of actions. The caller submits each action's orders and then
/// applies it, so a failed order leaves later actions unapplied.
pub struct PositionManager {
    config: PositionConfig,
    sizer: PositionSizer,
}

impl PositionManager {
    pub fn new(config: PositionConfig, sizer: PositionSizer) -> Self {
        Self { config, sizer }
    }

    pub fn config(&self) -> &PositionConfig {
        &self.config
    }

    pub fn plan(
        &self,
        symbol: &str,
        state: &PositionState,
        frame: &IndicatorFrame,
        info: &SignalInfo,
        equity: f64,
        quantizer: &Quantizer,
    ) -> Vec<PositionAction> {
        if !info.has_valid_atr() || !info.entry_price.is_finite() {
            return Vec::new();
        }

        match state.side {
            None => self
                .plan_entry(symbol, info, equity, quantizer)
                .into_iter()
                .collect(),
            Some(side) => self.plan_open(symbol, side, state, frame, info, quantizer),
        }
    }

    fn plan_entry(
        &self,
        symbol: &str,
        info: &SignalInfo,
        equity: f64,
        quantizer: &Quantizer,
    ) -> Option<PositionAction> {
        let side = info.signal.side()?;

        let quantity =
            self.sizer
                .compute_quantity(equity, info.atr, info.entry_price, side, symbol, quantizer);
        if quantity <= 0.0 {
            tracing::info!("[{}] {} signal but quantity too small, skip", symbol, side);
            return None;
        }

        let entry_price = quantizer.round_price(symbol, info.entry_price);
        let stop_price = quantizer.round_price(
            symbol,
            initial_stop(entry_price, info.atr, side, self.config.atr_mult_sl),
        );

        Some(PositionAction::Open {
            side,
            quantity,
            entry_price,
            stop_price,
            reason: info.reason.clone().unwrap_or_default(),
        })
    }

    fn plan_open(
        &self,
        symbol: &str,
        side: Side,
        state: &PositionState,
        frame: &IndicatorFrame,
        info: &SignalInfo,
        quantizer: &Quantizer,
    ) -> Vec<PositionAction> {
        let mut working = state.clone();
        let mut actions = Vec::new();
        let price = info.entry_price;
        let atr = info.atr;

        // a. trail refresh from the rolling extreme
        if let (Some(highest), Some(lowest)) = (
            frame.highest_high(self.config.trail_lookback),
            frame.lowest_low(self.config.trail_lookback),
        ) {
            let candidate = quantizer.round_price(
                symbol,
                trail_stop(highest, lowest, atr, side, self.config.atr_mult_trail),
            );
            if improves_trail(side, candidate, working.trail) {
                push_applied(
                    &mut working,
                    &mut actions,
                    PositionAction::UpdateTrail {
                        side,
                        stop_price: candidate,
                    },
                );
            }
        }

        // b. pyramid add
        if should_pyramid(
            side,
            price,
            working.last_add_price,
            atr,
            self.config.pyramid_step_atr,
            self.config.max_adds,
            working.adds_done,
        ) {
            let add_quantity = quantizer.round_qty(symbol, working.qty * self.config.add_fraction);
            if add_quantity > 0.0 {
                push_applied(
                    &mut working,
                    &mut actions,
                    PositionAction::Pyramid {
                        side,
                        add_quantity,
                        price,
                    },
                );
                // Stop replacement is its own step, applied after the add
                if let Some(stop_price) = working.trail {
                    push_applied(
                        &mut working,
                        &mut actions,
                        PositionAction::ReplaceStop { side, stop_price },
                    );
                }
            }
        }

        // exit detection against the (possibly refreshed) trail
        if let Some(trail) = working.trail {
            if stop_crossed(side, price, trail) {
                actions.push(PositionAction::Exit { side, price, trail });
            }
        }

        actions
    }
}

fn push_applied(working: &mut PositionState, actions: &mut Vec<PositionAction>, action: PositionAction) {
    if let Err(e) = working.apply(&action) {
        tracing::debug!("Dropping planned action {:?}: {}", action, e);
        return;
    }
    actions.push(action);
}
