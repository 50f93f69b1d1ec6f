// Order execution and market data collection
pub mod executor;
pub mod liquidation;
pub mod price_feed;

use std::any::Any;

pub use executor::{ExecutionOutcome, Executor, ExecutorSettings};
pub use liquidation::{close_positions, LiquidationReport};
pub use price_feed::fetch_snapshots;

/// Best-effort text of a caught panic payload
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
