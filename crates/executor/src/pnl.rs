use chrono::{DateTime, NaiveDate, Utc};
use core_types::{PnLRecord, Portfolio, PortfolioSnapshot, Position, PositionView};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

/// `value / base` as a plain ratio. Zero when the base is zero.
pub fn ratio(value: Decimal, base: Decimal) -> f64 {
    if base.is_zero() {
        return 0.0;
    }
    (value / base).to_f64().unwrap_or(0.0)
}

/// Derives the close-of-session record for a portfolio.
///
/// Daily P&L is measured against the previous record's total value, or against
/// the initial capital when no record exists yet. The returned record has
/// `id == 0` until the ledger assigns one.
pub fn derive_pnl_record(
    portfolio: &Portfolio,
    positions: &[Position],
    previous_total: Option<Decimal>,
    timestamp: DateTime<Utc>,
) -> PnLRecord {
    let market_value: Decimal = positions.iter().map(Position::market_value).sum();
    let total_value = portfolio.cash + market_value;
    let baseline = previous_total.unwrap_or(portfolio.initial_capital);
    let total_pnl = total_value - portfolio.initial_capital;

    PnLRecord {
        id: 0,
        portfolio_id: portfolio.id,
        timestamp,
        total_value,
        cash: portfolio.cash,
        market_value,
        daily_pnl: total_value - baseline,
        total_pnl,
        total_pnl_ratio: ratio(total_pnl, portfolio.initial_capital),
    }
}

/// Builds the status view of a portfolio.
///
/// `latest_daily_pnl` comes from the most recent P&L record, if any. Positions
/// are listed by descending market value.
pub fn build_snapshot(
    portfolio: &Portfolio,
    positions: &[Position],
    latest_daily_pnl: Option<Decimal>,
    today: NaiveDate,
    as_of: DateTime<Utc>,
) -> PortfolioSnapshot {
    let mut views: Vec<PositionView> = positions
        .iter()
        .map(|p| PositionView::from_position(p, today))
        .collect();
    views.sort_by(|a, b| b.market_value.cmp(&a.market_value));

    let market_value: Decimal = views.iter().map(|v| v.market_value).sum();
    let total_value = portfolio.cash + market_value;
    let total_pnl = total_value - portfolio.initial_capital;

    PortfolioSnapshot {
        portfolio_id: portfolio.id,
        name: portfolio.name.clone(),
        initial_capital: portfolio.initial_capital,
        cash: portfolio.cash,
        market_value,
        total_value,
        total_pnl,
        total_pnl_ratio: ratio(total_pnl, portfolio.initial_capital),
        daily_pnl: latest_daily_pnl.unwrap_or(Decimal::ZERO),
        positions: views,
        as_of,
    }
}
