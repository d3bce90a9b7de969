//! EV exposure math and the action ladder.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::error::RiskError;

/// Risk verdict for one market, least to most severe.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE")]
pub enum Action {
    /// Quote normally.
    #[default]
    None,
    /// Quote further from fair value.
    Widen,
    /// Stop quoting. Only set by operators.
    Pause,
    /// Stop quoting and de-risk.
    Flatten,
}

impl Action {
    /// Whether the quoting cycle should skip the market.
    pub fn blocks_quoting(&self) -> bool {
        matches!(self, Action::Pause | Action::Flatten)
    }
}

/// EV of a binary position: `yes * p + no * (1 - p)`.
///
/// Both positions must be known; an unknown position is never treated as
/// flat.
pub fn compute_market_ev(
    position_yes: Option<Decimal>,
    position_no: Option<Decimal>,
    price_yes: Decimal,
) -> Result<Decimal, RiskError> {
    if price_yes < Decimal::ZERO || price_yes > Decimal::ONE {
        return Err(RiskError::Validation(format!(
            "price_yes {} must be within [0, 1]",
            price_yes
        )));
    }
    let (Some(yes), Some(no)) = (position_yes, position_no) else {
        return Err(RiskError::Validation("positions must be provided".to_string()));
    };
    Ok(yes * price_yes + no * (Decimal::ONE - price_yes))
}

/// Sum of absolute per-market EVs.
pub fn sum_global_ev(market_evs: &[Decimal]) -> Decimal {
    market_evs.iter().map(|ev| ev.abs()).sum()
}

/// Map exposure against caps to an action.
///
/// Priority: FLATTEN on a per-market or global breach (both inclusive), then
/// WIDEN when the adverse move reaches the threshold (inclusive), else NONE.
pub fn decide_action(
    ev_abs: Decimal,
    per_market_cap: Decimal,
    global_ev_abs: Decimal,
    global_cap: Decimal,
    adverse_move: Decimal,
    adverse_threshold: Decimal,
) -> Result<Action, RiskError> {
    if per_market_cap <= Decimal::ZERO || global_cap <= Decimal::ZERO {
        return Err(RiskError::Validation("limits must be positive".to_string()));
    }
    if ev_abs < Decimal::ZERO || global_ev_abs < Decimal::ZERO {
        return Err(RiskError::Validation("absolute EV cannot be negative".to_string()));
    }

    if ev_abs >= per_market_cap || global_ev_abs >= global_cap {
        return Ok(Action::Flatten);
    }
    if adverse_move >= adverse_threshold {
        return Ok(Action::Widen);
    }
    Ok(Action::None)
}

/// Escalate every market to FLATTEN when the aggregate breaches the cap.
/// Returns whether escalation happened.
pub fn escalate_global(
    actions: &mut BTreeMap<String, Action>,
    global_ev_abs: Decimal,
    global_cap: Decimal,
) -> bool {
    if global_ev_abs < global_cap {
        return false;
    }
    for action in actions.values_mut() {
        *action = Action::Flatten;
    }
    true
}
