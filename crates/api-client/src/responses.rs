//! Wire formats of the collaborator services.
//!
//! Upstream data sources occasionally put placeholder strings or nulls in
//! numeric fields. Those are decoded as absent rather than failing the row.

use chrono::NaiveDate;
use core_types::{Bar, Candidate, IndexSnapshot, MarketContext, PortfolioSnapshot, Quote};
use rust_decimal::Decimal;
use rust_decimal::prelude::FromPrimitive;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Decodes a number, numeric string, null or placeholder into `Option<f64>`.
fn lenient_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    let number = match value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    Ok(number.filter(|v| v.is_finite()))
}

pub(crate) fn price_from_f64(value: f64) -> Option<Decimal> {
    Decimal::from_f64(value).map(|d| d.round_dp(4))
}

/// One row of `GET /market/quotes`.
#[derive(Debug, Clone, Deserialize)]
pub struct QuoteRow {
    pub symbol: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub price: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub change_pct: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub volume: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub amount: Option<f64>,
}

impl QuoteRow {
    /// `None` when the row carries no usable price.
    pub fn into_quote(self) -> Option<Quote> {
        let price = self.price.filter(|p| *p > 0.0).and_then(price_from_f64)?;
        Some(Quote {
            symbol: self.symbol,
            name: self.name,
            price,
            change_pct: self.change_pct.unwrap_or(0.0),
            volume: self.volume.unwrap_or(0.0),
            amount: self.amount.unwrap_or(0.0),
        })
    }
}

/// One row of `GET /market/history/{symbol}` and `GET /market/index/{code}/daily`.
#[derive(Debug, Clone, Deserialize)]
pub struct BarRow {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub volume: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub ma5: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub ma10: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub ma20: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub rsi: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub macd: Option<f64>,
}

impl From<BarRow> for Bar {
    fn from(row: BarRow) -> Self {
        Bar {
            date: row.date,
            open: row.open,
            high: row.high,
            low: row.low,
            close: row.close,
            volume: row.volume.unwrap_or(0.0),
            ma5: row.ma5,
            ma10: row.ma10,
            ma20: row.ma20,
            rsi: row.rsi,
            macd: row.macd,
        }
    }
}

/// One row of `GET /market/hot`.
#[derive(Debug, Clone, Deserialize)]
pub struct HotStockRow {
    pub symbol: String,
    #[serde(default)]
    pub name: String,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub price: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub change_pct: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub amount: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub turnover_rate: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub pe_ratio: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub market_cap: Option<f64>,
}

impl From<HotStockRow> for Candidate {
    fn from(row: HotStockRow) -> Self {
        Candidate {
            symbol: row.symbol,
            name: row.name,
            price: row.price.and_then(price_from_f64),
            change_pct: row.change_pct,
            amount: row.amount,
            turnover_rate: row.turnover_rate,
            pe_ratio: row.pe_ratio,
            market_cap: row.market_cap,
            indicators: None,
        }
    }
}

/// One entry of `GET /market/indices`, keyed by index code.
#[derive(Debug, Clone, Deserialize)]
pub struct IndexRow {
    #[serde(default)]
    pub name: String,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub price: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub change_pct: Option<f64>,
}

impl IndexRow {
    pub fn into_snapshot(self) -> Option<IndexSnapshot> {
        Some(IndexSnapshot {
            name: self.name,
            price: self.price?,
            change_pct: self.change_pct?,
        })
    }
}

/// Body of `POST /decisions`.
#[derive(Debug, Serialize)]
pub struct DecisionRequest<'a> {
    pub market: &'a MarketContext,
    pub portfolio: &'a PortfolioSnapshot,
    pub candidates: &'a [Candidate],
}
