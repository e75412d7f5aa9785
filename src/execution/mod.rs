// Order execution and position tracking module
pub mod executor;
pub mod position_manager;
pub mod quantizer;

pub use executor::OrderExecutor;
pub use position_manager::{
    PositionAction, PositionConfig, PositionManager, PositionState, StateSnapshot,
};
pub use quantizer::{format_decimal, QuantizeError, Quantizer};
