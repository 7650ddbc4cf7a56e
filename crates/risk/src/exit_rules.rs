use chrono::NaiveDate;
use configuration::TradingConfig;
use core_types::{LOT_SIZE, Position, TradeAction, TradeProposal};
use rust_decimal::Decimal;
use std::collections::HashSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitKind {
    StopLoss,
    TakeProfit,
}

/// Stop-loss and take-profit rules applied to open positions.
#[derive(Debug, Clone)]
pub struct ExitRules {
    stop_loss_ratio: Decimal,
    take_profit_ratio: Decimal,
}

impl ExitRules {
    pub fn new(stop_loss_ratio: Decimal, take_profit_ratio: Decimal) -> Self {
        Self {
            stop_loss_ratio,
            take_profit_ratio,
        }
    }

    pub fn from_config(config: &TradingConfig) -> Self {
        Self::new(config.stop_loss_ratio, config.take_profit_ratio)
    }

    /// Returns the exit to take for `position`, if any, with the share count to sell.
    ///
    /// A stop-loss exits the whole position. A take-profit sells half, rounded
    /// down to a whole lot, or everything when half is less than one lot.
    pub fn evaluate(&self, position: &Position) -> Option<(ExitKind, i64)> {
        if position.avg_cost <= Decimal::ZERO || position.quantity <= 0 {
            return None;
        }
        let change = (position.current_price - position.avg_cost) / position.avg_cost;

        if change <= -self.stop_loss_ratio {
            return Some((ExitKind::StopLoss, position.quantity));
        }
        if change >= self.take_profit_ratio {
            let half = position.quantity / 2 / LOT_SIZE * LOT_SIZE;
            let quantity = if half == 0 { position.quantity } else { half };
            return Some((ExitKind::TakeProfit, quantity));
        }
        None
    }

    /// Sell proposals for every sellable position that triggers an exit.
    ///
    /// Symbols in `already_selling` are skipped so an exit never duplicates a
    /// sell the decision service already proposed.
    pub fn proposals<'a>(
        &self,
        positions: impl IntoIterator<Item = &'a Position>,
        today: NaiveDate,
        already_selling: &HashSet<String>,
    ) -> Vec<TradeProposal> {
        positions
            .into_iter()
            .filter(|p| p.is_sellable(today) && !already_selling.contains(&p.symbol))
            .filter_map(|p| {
                let (kind, quantity) = self.evaluate(p)?;
                let pct = p.unrealized_pnl_ratio() * 100.0;
                let reason = match kind {
                    ExitKind::StopLoss => format!("stop-loss triggered at {pct:.2}%"),
                    ExitKind::TakeProfit => format!("take-profit triggered at {pct:.2}%"),
                };
                tracing::info!(symbol = %p.symbol, ?kind, quantity, "Protective exit proposed");
                Some(TradeProposal {
                    symbol: p.symbol.clone(),
                    name: p.name.clone(),
                    action: TradeAction::Sell,
                    quantity,
                    price: p.current_price,
                    reason,
                })
            })
            .collect()
    }
}
