use crate::enums::{OrderSide, OrderStatus, Sentiment, TradeAction, TriggerKind};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Board lot for exchange-listed equities. Buy quantities must be a multiple of it.
pub const LOT_SIZE: i64 = 100;

/// One logical trading account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Portfolio {
    pub id: i64,
    pub name: String,
    /// Fixed at creation; the baseline for cumulative P&L.
    pub initial_capital: Decimal,
    /// Current cash balance. Never negative after a committed order.
    pub cash: Decimal,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

/// An open holding of one symbol within a portfolio.
///
/// Market value and unrealized P&L are derived from `current_price` on demand so
/// that they can never disagree with the stored quantity and cost basis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub portfolio_id: i64,
    pub symbol: String,
    pub name: String,
    /// Share count, always > 0 while the row exists.
    pub quantity: i64,
    /// Weighted-average cost per share across all buys.
    pub avg_cost: Decimal,
    /// Last known price.
    pub current_price: Decimal,
    /// Exchange-local date of the most recent buy, used for T+1 settlement.
    pub last_buy_date: Option<NaiveDate>,
    pub updated_at: DateTime<Utc>,
}

impl Position {
    pub fn market_value(&self) -> Decimal {
        self.current_price * Decimal::from(self.quantity)
    }

    pub fn unrealized_pnl(&self) -> Decimal {
        (self.current_price - self.avg_cost) * Decimal::from(self.quantity)
    }

    /// Unrealized P&L as a plain ratio of the average cost (0.05 means +5%).
    pub fn unrealized_pnl_ratio(&self) -> f64 {
        if self.avg_cost.is_zero() {
            return 0.0;
        }
        ((self.current_price - self.avg_cost) / self.avg_cost)
            .to_f64()
            .unwrap_or(0.0)
    }

    /// T+1 settlement: shares bought today cannot be sold until the next calendar day.
    ///
    /// `today` must be the exchange-local date.
    pub fn is_sellable(&self, today: NaiveDate) -> bool {
        match self.last_buy_date {
            None => true,
            Some(bought) => bought < today,
        }
    }
}

/// A trade proposal handed to the execution coordinator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeProposal {
    pub symbol: String,
    pub name: String,
    pub action: TradeAction,
    pub quantity: i64,
    pub price: Decimal,
    pub reason: String,
}

/// A non-hold proposal, ready to be validated and filled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub symbol: String,
    pub name: String,
    pub side: OrderSide,
    pub quantity: i64,
    pub price: Decimal,
    pub reason: String,
}

impl TradeProposal {
    /// Converts the proposal into an order request. Returns `None` for `Hold`.
    pub fn to_order_request(&self) -> Option<OrderRequest> {
        let side = self.action.side()?;
        Some(OrderRequest {
            symbol: self.symbol.clone(),
            name: self.name.clone(),
            side,
            quantity: self.quantity,
            price: self.price,
            reason: self.reason.clone(),
        })
    }
}

/// An immutable audit record of one attempted trade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: i64,
    pub portfolio_id: i64,
    pub symbol: String,
    pub name: String,
    pub side: OrderSide,
    pub quantity: i64,
    pub price: Decimal,
    pub filled_price: Option<Decimal>,
    pub filled_quantity: i64,
    /// Commission plus stamp duty charged on the fill. Zero for failed orders.
    pub fee: Decimal,
    /// Net realized P&L of a filled sell.
    pub realized_pnl: Option<Decimal>,
    pub status: OrderStatus,
    /// The originating rationale, followed by the failure cause for failed orders.
    pub reason: String,
    pub created_at: DateTime<Utc>,
}

impl Order {
    pub fn is_filled(&self) -> bool {
        self.status == OrderStatus::Filled
    }
}

/// An immutable close-of-session performance snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PnLRecord {
    pub id: i64,
    pub portfolio_id: i64,
    pub timestamp: DateTime<Utc>,
    pub total_value: Decimal,
    pub cash: Decimal,
    pub market_value: Decimal,
    /// Change in total value since the previous snapshot (or since inception).
    pub daily_pnl: Decimal,
    /// Total value minus initial capital.
    pub total_pnl: Decimal,
    pub total_pnl_ratio: f64,
}

/// Presentation view of a position, with the derived figures materialised.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionView {
    pub symbol: String,
    pub name: String,
    pub quantity: i64,
    pub avg_cost: Decimal,
    pub current_price: Decimal,
    pub market_value: Decimal,
    pub unrealized_pnl: Decimal,
    pub unrealized_pnl_ratio: f64,
    pub last_buy_date: Option<NaiveDate>,
    pub sellable: bool,
}

impl PositionView {
    pub fn from_position(position: &Position, today: NaiveDate) -> Self {
        Self {
            symbol: position.symbol.clone(),
            name: position.name.clone(),
            quantity: position.quantity,
            avg_cost: position.avg_cost,
            current_price: position.current_price,
            market_value: position.market_value(),
            unrealized_pnl: position.unrealized_pnl(),
            unrealized_pnl_ratio: position.unrealized_pnl_ratio(),
            last_buy_date: position.last_buy_date,
            sellable: position.is_sellable(today),
        }
    }
}

/// The portfolio status view consumed by the decision collaborator and the transport layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioSnapshot {
    pub portfolio_id: i64,
    pub name: String,
    pub initial_capital: Decimal,
    pub cash: Decimal,
    pub market_value: Decimal,
    pub total_value: Decimal,
    pub total_pnl: Decimal,
    pub total_pnl_ratio: f64,
    /// Daily P&L of the most recent close-of-session record, zero if none exists.
    pub daily_pnl: Decimal,
    pub positions: Vec<PositionView>,
    pub as_of: DateTime<Utc>,
}

/// Audit record of one coordination cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisRun {
    pub id: Uuid,
    pub portfolio_id: i64,
    pub trigger: TriggerKind,
    pub sentiment: Sentiment,
    pub summary: String,
    pub risk_note: String,
    pub decision_count: i64,
    pub filled: i64,
    pub failed: i64,
    pub skipped: i64,
    pub latency_ms: i64,
    /// The decisions as returned by the collaborator, serialized as JSON.
    pub decisions_json: String,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn position(quantity: i64, avg_cost: Decimal, current_price: Decimal) -> Position {
        Position {
            portfolio_id: 1,
            symbol: "600519".to_string(),
            name: "Kweichow Moutai".to_string(),
            quantity,
            avg_cost,
            current_price,
            last_buy_date: None,
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn derived_figures_follow_current_price() {
        let pos = position(200, dec!(10.00), dec!(11.00));
        assert_eq!(pos.market_value(), dec!(2200.00));
        assert_eq!(pos.unrealized_pnl(), dec!(200.00));
        assert!((pos.unrealized_pnl_ratio() - 0.1).abs() < 1e-12);
    }

    #[test]
    fn settlement_lock_is_strict_date_comparison() {
        let today = NaiveDate::from_ymd_opt(2024, 3, 15).unwrap();
        let mut pos = position(100, dec!(10), dec!(10));
        assert!(pos.is_sellable(today));

        pos.last_buy_date = Some(today);
        assert!(!pos.is_sellable(today));

        pos.last_buy_date = today.pred_opt();
        assert!(pos.is_sellable(today));
    }

    #[test]
    fn hold_proposals_do_not_become_orders() {
        let proposal = TradeProposal {
            symbol: "000001".to_string(),
            name: String::new(),
            action: TradeAction::Hold,
            quantity: 100,
            price: dec!(12.5),
            reason: "wait".to_string(),
        };
        assert!(proposal.to_order_request().is_none());
    }
}
