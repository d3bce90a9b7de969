//! Market records and boundary parsing of raw market JSON.

use std::str::FromStr;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::MarketError;

/// A market as seen by one tick. Immutable once parsed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Market {
    /// Market identifier.
    pub id: String,
    /// Question text.
    #[serde(default)]
    pub question: Option<String>,
    /// CLOB token ids; the first is the YES token.
    pub token_ids: Vec<String>,
    /// Embedded fair value in [0, 1], if any.
    #[serde(default)]
    pub fair_value: Option<Decimal>,
    /// Liquidity metric.
    #[serde(default)]
    pub volume: Decimal,
    /// Quoted spread in cents, if known.
    #[serde(default)]
    pub spread_cents: Option<Decimal>,
}

impl Market {
    /// Token quoted by the strategy.
    pub fn yes_token(&self) -> Option<&str> {
        self.token_ids.first().map(String::as_str)
    }

    /// Parse a raw market object (Gamma-style keys or a routed selection).
    ///
    /// - `id` is required (string or number).
    /// - Token ids come from `clobTokenIds` / `clob_token_ids`, either a list
    ///   or a JSON-encoded list.
    /// - Fair value comes from `mid` when present, else from `outcomePrices`.
    pub fn from_value(raw: &Value) -> Result<Self, MarketError> {
        let obj = raw
            .as_object()
            .ok_or_else(|| MarketError::ParseError("market is not an object".to_string()))?;

        let id = match obj.get("id") {
            Some(Value::String(s)) if !s.is_empty() => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            _ => return Err(MarketError::ParseError("market has no id".to_string())),
        };

        let fair_value = match obj.get("mid").filter(|v| !v.is_null()) {
            Some(v) => {
                let mid = decimal_of(v)
                    .ok_or_else(|| MarketError::ParseError(format!("market {} has non-numeric mid", id)))?;
                if mid < Decimal::ZERO || mid > Decimal::ONE {
                    return Err(MarketError::FairValueOutOfRange {
                        market_id: id,
                        value: mid,
                    });
                }
                Some(mid)
            }
            None => compute_mid_price(raw),
        };

        Ok(Self {
            question: obj.get("question").and_then(Value::as_str).map(str::to_string),
            token_ids: parse_token_ids(raw),
            fair_value,
            volume: volume_of(raw),
            spread_cents: obj.get("spread").and_then(decimal_of).map(normalize_spread_cents),
            id,
        })
    }
}

/// Numeric value from a JSON number or numeric string.
pub(crate) fn decimal_of(value: &Value) -> Option<Decimal> {
    let text = match value {
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.trim().to_string(),
        _ => return None,
    };
    Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .ok()
}

/// Decode a list that may arrive as a JSON array or a string holding one.
fn list_of(value: &Value) -> Vec<Value> {
    match value {
        Value::Array(items) => items.clone(),
        Value::String(s) => serde_json::from_str::<Vec<Value>>(s)
            .or_else(|_| serde_json::from_str::<Vec<Value>>(&s.replace('\'', "\"")))
            .unwrap_or_default(),
        _ => Vec::new(),
    }
}

/// Token ids from `clobTokenIds` (or `clob_token_ids`).
pub fn parse_token_ids(raw: &Value) -> Vec<String> {
    let field = raw
        .get("clobTokenIds")
        .filter(|v| !v.is_null())
        .or_else(|| raw.get("clob_token_ids"));
    let Some(field) = field else {
        return Vec::new();
    };

    list_of(field)
        .into_iter()
        .filter_map(|v| match v {
            Value::String(s) if !s.is_empty() => Some(s),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
        .collect()
}

/// Fair value implied by `outcomePrices`.
///
/// With two or more prices the first (YES) price is used when it lies in
/// [0, 1], otherwise their average. The result must lie in [0, 1].
pub fn compute_mid_price(raw: &Value) -> Option<Decimal> {
    let prices: Vec<Decimal> = raw
        .get("outcomePrices")
        .map(list_of)
        .unwrap_or_default()
        .iter()
        .filter_map(decimal_of)
        .collect();

    let in_unit = |p: Decimal| p >= Decimal::ZERO && p <= Decimal::ONE;

    match prices.as_slice() {
        [] => None,
        [only] => Some(*only).filter(|p| in_unit(*p)),
        [first, ..] if in_unit(*first) => Some(*first),
        all => Some(all.iter().sum::<Decimal>() / Decimal::from(all.len())).filter(|p| in_unit(*p)),
    }
}

/// First parseable of the known volume keys, else zero.
pub fn volume_of(raw: &Value) -> Decimal {
    ["volume24hr", "volumeClob", "volume24hrClob", "volume"]
        .iter()
        .filter_map(|key| raw.get(*key))
        .find_map(decimal_of)
        .unwrap_or_default()
}

/// Spreads arrive as whole cents (`1`) or as a fraction (`0.02`).
fn normalize_spread_cents(value: Decimal) -> Decimal {
    if value.fract().is_zero() && value <= Decimal::TEN {
        value
    } else if value <= Decimal::ONE {
        value * Decimal::ONE_HUNDRED
    } else {
        value
    }
}
