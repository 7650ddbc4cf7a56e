//! Data consumed from the market-data and decision collaborators.
//!
//! Numeric fields that a source may fail to supply are `Option`s; a missing value
//! is never substituted with a sentinel.

use crate::enums::{Sentiment, TradeAction};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A real-time quote for a single symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub symbol: String,
    #[serde(default)]
    pub name: String,
    pub price: Decimal,
    #[serde(default)]
    pub change_pct: f64,
    #[serde(default)]
    pub volume: f64,
    #[serde(default)]
    pub amount: f64,
}

/// One historical bar, optionally carrying precomputed indicators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    #[serde(default)]
    pub volume: f64,
    #[serde(default)]
    pub ma5: Option<f64>,
    #[serde(default)]
    pub ma10: Option<f64>,
    #[serde(default)]
    pub ma20: Option<f64>,
    #[serde(default)]
    pub rsi: Option<f64>,
    #[serde(default)]
    pub macd: Option<f64>,
}

/// Technical indicators attached to a candidate. Each value is absent when the
/// source did not have enough history to compute it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Indicators {
    pub ma5: Option<f64>,
    pub ma20: Option<f64>,
    pub rsi: Option<f64>,
    pub macd: Option<f64>,
}

impl Indicators {
    pub fn from_bar(bar: &Bar) -> Self {
        Self {
            ma5: finite(bar.ma5),
            ma20: finite(bar.ma20),
            rsi: finite(bar.rsi),
            macd: finite(bar.macd),
        }
    }
}

fn finite(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite())
}

/// A symbol offered to the decision collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub symbol: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub price: Option<Decimal>,
    #[serde(default)]
    pub change_pct: Option<f64>,
    #[serde(default)]
    pub amount: Option<f64>,
    #[serde(default)]
    pub turnover_rate: Option<f64>,
    #[serde(default)]
    pub pe_ratio: Option<f64>,
    #[serde(default)]
    pub market_cap: Option<f64>,
    /// `None` when enrichment was skipped or failed.
    #[serde(default)]
    pub indicators: Option<Indicators>,
}

/// Snapshot of a benchmark index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexSnapshot {
    #[serde(default)]
    pub name: String,
    pub price: f64,
    pub change_pct: f64,
}

/// Market backdrop passed to the decision collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketContext {
    pub index_level: Option<f64>,
    pub index_change_pct: Option<f64>,
    pub sentiment: Sentiment,
}

impl MarketContext {
    /// The context used when no index data could be obtained.
    pub fn unavailable() -> Self {
        Self {
            index_level: None,
            index_change_pct: None,
            sentiment: Sentiment::Unknown,
        }
    }

    pub fn from_index(level: f64, change_pct: f64) -> Self {
        Self {
            index_level: Some(level),
            index_change_pct: Some((change_pct * 100.0).round() / 100.0),
            sentiment: Sentiment::from_change_pct(change_pct),
        }
    }
}

/// One proposal returned by the decision collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub symbol: String,
    #[serde(default)]
    pub name: String,
    pub action: TradeAction,
    #[serde(default)]
    pub quantity: i64,
    #[serde(default)]
    pub reason: String,
    #[serde(default = "default_confidence")]
    pub confidence: f64,
    #[serde(default)]
    pub target_price: Option<Decimal>,
    #[serde(default)]
    pub stop_loss: Option<Decimal>,
}

fn default_confidence() -> f64 {
    0.5
}

/// The full answer of the decision collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    #[serde(default)]
    pub sentiment: Sentiment,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub risk_note: String,
    #[serde(default)]
    pub decisions: Vec<Decision>,
}

impl AnalysisResult {
    /// The neutral, decision-free result reported when generation fails.
    pub fn neutral(reason: impl Into<String>) -> Self {
        Self {
            sentiment: Sentiment::Neutral,
            summary: reason.into(),
            risk_note: String::new(),
            decisions: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nan_indicators_are_treated_as_absent() {
        let bar = Bar {
            date: NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(),
            open: 10.0,
            high: 10.5,
            low: 9.8,
            close: 10.2,
            volume: 1_000.0,
            ma5: Some(f64::NAN),
            ma10: None,
            ma20: Some(10.1),
            rsi: Some(0.0),
            macd: None,
        };
        let ind = Indicators::from_bar(&bar);
        assert_eq!(ind.ma5, None);
        assert_eq!(ind.ma20, Some(10.1));
        // zero is a value, not an absence
        assert_eq!(ind.rsi, Some(0.0));
    }

    #[test]
    fn decision_defaults_apply_to_sparse_payloads() {
        let raw = r#"{"symbol":"600036","action":"buy","quantity":200}"#;
        let decision: Decision = serde_json::from_str(raw).unwrap();
        assert_eq!(decision.action, TradeAction::Buy);
        assert_eq!(decision.confidence, 0.5);
        assert!(decision.target_price.is_none());
    }

    #[test]
    fn index_context_rounds_change_and_classifies() {
        let ctx = MarketContext::from_index(3050.12, 0.734);
        assert_eq!(ctx.index_change_pct, Some(0.73));
        assert_eq!(ctx.sentiment, Sentiment::Bullish);
    }
}
