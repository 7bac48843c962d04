//! Execution primitives used by the broker: trigger checks, evaluation
//! priority and friction costs.
//!
//! Per bar the broker runs three matching phases in a fixed order:
//! market orders at the open, then stop and stop-limit triggers, then limit
//! orders (including triggered stop-limits). Contingent stop-losses are stops
//! and take-profits are limits, so a bar that crosses both resolves the
//! stop-loss first.

pub mod cost_model;
pub mod priority;
pub mod trigger;

pub use cost_model::CostModel;
pub use priority::{evaluation_cmp, phase_of, MatchPhase};
pub use trigger::{check_trigger, TriggerResult};

use serde::{Deserialize, Serialize};

/// Fill price for a stop the bar opens beyond.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GapPolicy {
    /// Fill at the open.
    FillAtOpen,
    /// Fill at the stop price, ignoring the gap.
    FillAtTrigger,
    /// Fill at the worse of open and stop for the order's side.
    #[default]
    FillAtWorst,
}
