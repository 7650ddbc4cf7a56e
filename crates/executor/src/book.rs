use crate::error::ExecutorError;
use crate::exchange::Execution;
use chrono::{DateTime, NaiveDate, Utc};
use core_types::{OrderSide, Position};
use rust_decimal::Decimal;
use std::collections::HashMap;

/// How a fill changed the holding of its symbol.
#[derive(Debug, Clone, PartialEq)]
pub enum PositionChange {
    /// The position exists after the fill with this state.
    Upserted(Position),
    /// The fill sold the last share; the position must be removed.
    Closed(String),
}

/// The result of applying one fill to a [`Book`].
#[derive(Debug, Clone, PartialEq)]
pub struct AppliedFill {
    pub change: PositionChange,
    /// Net realized P&L; only sells realize gains.
    pub realized_pnl: Option<Decimal>,
    pub cash_after: Decimal,
}

/// In-memory state of one portfolio: cash plus open positions keyed by symbol.
///
/// This is the accounting state machine. It is loaded from the ledger, mutated
/// by fills, and the resulting changes are written back by the caller.
#[derive(Debug, Clone)]
pub struct Book {
    pub portfolio_id: i64,
    pub cash: Decimal,
    pub positions: HashMap<String, Position>,
}

impl Book {
    pub fn new(portfolio_id: i64, cash: Decimal) -> Self {
        Self {
            portfolio_id,
            cash,
            positions: HashMap::new(),
        }
    }

    pub fn with_positions(
        portfolio_id: i64,
        cash: Decimal,
        positions: impl IntoIterator<Item = Position>,
    ) -> Self {
        Self {
            portfolio_id,
            cash,
            positions: positions
                .into_iter()
                .map(|p| (p.symbol.clone(), p))
                .collect(),
        }
    }

    pub fn position(&self, symbol: &str) -> Option<&Position> {
        self.positions.get(symbol)
    }

    pub fn market_value(&self) -> Decimal {
        self.positions.values().map(Position::market_value).sum()
    }

    /// Cash plus the market value of every open position at its last known price.
    pub fn total_value(&self) -> Decimal {
        self.cash + self.market_value()
    }

    /// Applies a fill. On error the book is left untouched.
    ///
    /// Buys merge into the existing position with a weighted-average cost and
    /// stamp `today` as the last-buy date. Sells keep the average cost of the
    /// remaining shares and remove the position when it reaches zero.
    pub fn apply(
        &mut self,
        execution: &Execution,
        name: &str,
        today: NaiveDate,
    ) -> Result<AppliedFill, ExecutorError> {
        match execution.side {
            OrderSide::Buy => self.apply_buy(execution, name, today),
            OrderSide::Sell => self.apply_sell(execution),
        }
    }

    fn apply_buy(
        &mut self,
        execution: &Execution,
        name: &str,
        today: NaiveDate,
    ) -> Result<AppliedFill, ExecutorError> {
        let debit = -execution.cash_delta();
        if debit > self.cash {
            return Err(ExecutorError::InsufficientCash {
                required: debit,
                available: self.cash,
            });
        }

        let portfolio_id = self.portfolio_id;
        let position = self
            .positions
            .entry(execution.symbol.clone())
            .or_insert_with(|| Position {
                portfolio_id,
                symbol: execution.symbol.clone(),
                name: name.to_string(),
                quantity: 0,
                avg_cost: Decimal::ZERO,
                current_price: execution.price,
                last_buy_date: None,
                updated_at: execution.timestamp,
            });

        let held_cost = position.avg_cost * Decimal::from(position.quantity);
        let new_quantity = position.quantity + execution.quantity;
        position.avg_cost = (held_cost + execution.notional()) / Decimal::from(new_quantity);
        position.quantity = new_quantity;
        position.current_price = execution.price;
        position.last_buy_date = Some(today);
        position.updated_at = execution.timestamp;
        if position.name.is_empty() {
            position.name = name.to_string();
        }

        let change = PositionChange::Upserted(position.clone());
        self.cash -= debit;

        Ok(AppliedFill {
            change,
            realized_pnl: None,
            cash_after: self.cash,
        })
    }

    fn apply_sell(&mut self, execution: &Execution) -> Result<AppliedFill, ExecutorError> {
        let symbol = &execution.symbol;
        let available = self.positions.get(symbol).map_or(0, |p| p.quantity);
        if available < execution.quantity {
            return Err(ExecutorError::InsufficientHoldings {
                symbol: symbol.clone(),
                requested: execution.quantity,
                available,
            });
        }

        let Some(position) = self.positions.get_mut(symbol) else {
            return Err(ExecutorError::InvalidFill(format!("no position for {symbol}")));
        };

        let realized = (execution.price - position.avg_cost) * Decimal::from(execution.quantity)
            - execution.fees.total();
        position.quantity -= execution.quantity;
        position.current_price = execution.price;
        position.updated_at = execution.timestamp;

        let change = if position.quantity == 0 {
            self.positions.remove(symbol);
            PositionChange::Closed(symbol.clone())
        } else {
            PositionChange::Upserted(position.clone())
        };
        self.cash += execution.cash_delta();

        Ok(AppliedFill {
            change,
            realized_pnl: Some(realized),
            cash_after: self.cash,
        })
    }

    /// Marks positions to the supplied prices. Symbols without a positive price
    /// keep their last known price. Returns the positions that changed.
    pub fn reprice(
        &mut self,
        prices: &HashMap<String, Decimal>,
        now: DateTime<Utc>,
    ) -> Vec<Position> {
        let mut changed = Vec::new();
        for position in self.positions.values_mut() {
            match prices.get(&position.symbol) {
                Some(price) if *price > Decimal::ZERO => {
                    position.current_price = *price;
                    position.updated_at = now;
                    changed.push(position.clone());
                }
                _ => {}
            }
        }
        changed
    }
}
