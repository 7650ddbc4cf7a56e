use crate::error::EventsError;
use chrono::{DateTime, Utc};
use core_types::{Order, PortfolioSnapshot, Sentiment, TriggerKind};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Enum representing the severity of a log message for structured logging.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogMessage {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub message: String,
}

/// Outcome of one coordination cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisSummary {
    pub run_id: Uuid,
    pub trigger: TriggerKind,
    pub sentiment: Sentiment,
    pub summary: String,
    pub decision_count: usize,
    pub filled: usize,
    pub failed: usize,
    pub skipped: usize,
    pub latency_ms: u64,
    pub finished_at: DateTime<Utc>,
}

/// The top-level message enum.
///
/// Serialized adjacently tagged, e.g.
/// `{"type": "OrderRecorded", "payload": {"id": 7, "symbol": "600036", ...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum DeskEvent {
    Log(LogMessage),
    /// The portfolio after a reprice, close summary or manual analysis.
    PortfolioState(PortfolioSnapshot),
    /// An order was persisted, filled or failed.
    OrderRecorded(Order),
    AnalysisCompleted(AnalysisSummary),
}

impl DeskEvent {
    pub fn log(level: LogLevel, message: impl Into<String>) -> Self {
        DeskEvent::Log(LogMessage {
            timestamp: Utc::now(),
            level,
            message: message.into(),
        })
    }

    pub fn to_json(&self) -> Result<String, EventsError> {
        Ok(serde_json::to_string(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_types::{OrderSide, OrderStatus};
    use rust_decimal_macros::dec;

    #[test]
    fn events_are_adjacently_tagged() {
        let order = Order {
            id: 7,
            portfolio_id: 1,
            symbol: "600036".to_string(),
            name: "China Merchants Bank".to_string(),
            side: OrderSide::Buy,
            quantity: 200,
            price: dec!(35.20),
            filled_price: Some(dec!(35.20)),
            filled_quantity: 200,
            fee: dec!(5),
            realized_pnl: None,
            status: OrderStatus::Filled,
            reason: "breakout".to_string(),
            created_at: Utc::now(),
        };
        let json: serde_json::Value =
            serde_json::from_str(&DeskEvent::OrderRecorded(order).to_json().unwrap()).unwrap();
        assert_eq!(json["type"], "OrderRecorded");
        assert_eq!(json["payload"]["status"], "filled");
        assert_eq!(json["payload"]["quantity"], 200);
    }

    #[test]
    fn log_helper_stamps_level() {
        match DeskEvent::log(LogLevel::Warn, "quote feed slow") {
            DeskEvent::Log(msg) => {
                assert_eq!(msg.level, LogLevel::Warn);
                assert_eq!(msg.message, "quote feed slow");
            }
            other => panic!("unexpected event {other:?}"),
        }
    }
}
