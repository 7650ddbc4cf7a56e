use crate::clock::ExchangeClock;
use crate::error::EngineError;
use chrono::{DateTime, Utc};
use core_types::{Order, OrderRequest, OrderStatus, PnLRecord, PortfolioSnapshot, TradeProposal};
use database::LedgerRepository;
use executor::{
    AppliedFill, Book, Execution, Executor, PositionChange, build_snapshot, derive_pnl_record,
};
use risk::OrderGuard;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, info, warn};

/// Validates proposals, applies fills to the account and persists the outcome.
///
/// Every non-hold proposal produces exactly one persisted `Order`, filled or
/// failed. The order row, the position change and the cash update for one
/// proposal commit in a single ledger transaction.
pub struct OrderCoordinator {
    ledger: LedgerRepository,
    executor: Arc<dyn Executor>,
    guard: OrderGuard,
    clock: ExchangeClock,
}

impl OrderCoordinator {
    pub fn new(
        ledger: LedgerRepository,
        executor: Arc<dyn Executor>,
        guard: OrderGuard,
        clock: ExchangeClock,
    ) -> Self {
        Self {
            ledger,
            executor,
            guard,
            clock,
        }
    }

    pub fn ledger(&self) -> &LedgerRepository {
        &self.ledger
    }

    /// Executes one proposal against the portfolio.
    ///
    /// Returns `Ok(None)` for a hold. Validation and fill failures are recorded
    /// as a failed order and returned as `Ok(Some(order))`. Only a missing
    /// portfolio or a ledger failure is an `Err`, and in both cases nothing is
    /// written.
    pub async fn execute(
        &self,
        portfolio_id: i64,
        proposal: &TradeProposal,
    ) -> Result<Option<Order>, EngineError> {
        let Some(request) = proposal.to_order_request() else {
            return Ok(None);
        };
        let now = self.clock.now();
        let today = self.clock.today();

        let mut tx = self.ledger.begin().await?;
        let Some(portfolio) = tx.portfolio(portfolio_id).await? else {
            error!(portfolio_id, symbol = %request.symbol, "Order for unknown portfolio");
            return Err(EngineError::PortfolioNotFound(portfolio_id));
        };
        let positions = tx.positions(portfolio_id).await?;
        let mut book = Book::with_positions(portfolio_id, portfolio.cash, positions);
        let filled_today = tx
            .count_filled_since(portfolio_id, self.clock.day_start_utc(today))
            .await?;

        let outcome = match self.guard.validate(&request, &book, filled_today, today) {
            Ok(()) => self.fill(&request, &mut book, now).await,
            Err(rejection) => Err(rejection.to_string()),
        };

        let order = match outcome {
            Ok((execution, applied)) => {
                match &applied.change {
                    PositionChange::Upserted(position) => tx.upsert_position(position).await?,
                    PositionChange::Closed(symbol) => {
                        tx.delete_position(portfolio_id, symbol).await?
                    }
                }
                tx.set_cash(portfolio_id, applied.cash_after).await?;
                tx.insert_order(&filled_order(portfolio_id, &request, &execution, &applied))
                    .await?
            }
            Err(cause) => {
                tx.insert_order(&failed_order(portfolio_id, &request, &cause, now))
                    .await?
            }
        };
        tx.commit().await?;

        if order.is_filled() {
            info!(
                order_id = order.id,
                symbol = %order.symbol,
                side = %order.side,
                quantity = order.filled_quantity,
                price = %order.price,
                fee = %order.fee,
                "Order filled"
            );
        } else {
            warn!(
                order_id = order.id,
                symbol = %order.symbol,
                reason = %order.reason,
                "Order failed"
            );
        }
        Ok(Some(order))
    }

    async fn fill(
        &self,
        request: &OrderRequest,
        book: &mut Book,
        now: DateTime<Utc>,
    ) -> Result<(Execution, AppliedFill), String> {
        let execution = self
            .executor
            .execute(request, now)
            .await
            .map_err(|e| e.to_string())?;
        let applied = book
            .apply(&execution, &request.name, self.clock.today())
            .map_err(|e| e.to_string())?;
        Ok((execution, applied))
    }

    /// Marks every held symbol found in `prices` to its new price.
    /// Returns the number of positions updated.
    pub async fn reprice(
        &self,
        portfolio_id: i64,
        prices: &HashMap<String, Decimal>,
    ) -> Result<usize, EngineError> {
        let now = self.clock.now();
        let mut tx = self.ledger.begin().await?;
        let Some(portfolio) = tx.portfolio(portfolio_id).await? else {
            return Err(EngineError::PortfolioNotFound(portfolio_id));
        };
        let positions = tx.positions(portfolio_id).await?;
        let mut book = Book::with_positions(portfolio_id, portfolio.cash, positions);
        let changed = book.reprice(prices, now);
        for position in &changed {
            tx.reprice_position(portfolio_id, &position.symbol, position.current_price, now)
                .await?;
        }
        tx.commit().await?;
        Ok(changed.len())
    }

    /// Appends the close-of-session P&L record.
    pub async fn record_pnl(&self, portfolio_id: i64) -> Result<PnLRecord, EngineError> {
        let now = self.clock.now();
        let mut tx = self.ledger.begin().await?;
        let Some(portfolio) = tx.portfolio(portfolio_id).await? else {
            return Err(EngineError::PortfolioNotFound(portfolio_id));
        };
        let positions = tx.positions(portfolio_id).await?;
        let previous = tx.latest_pnl(portfolio_id).await?;
        let record = derive_pnl_record(
            &portfolio,
            &positions,
            previous.map(|p| p.total_value),
            now,
        );
        let stored = tx.append_pnl(&record).await?;
        tx.commit().await?;
        Ok(stored)
    }

    /// The current status view, read outside the writer lock.
    pub async fn snapshot(&self, portfolio_id: i64) -> Result<PortfolioSnapshot, EngineError> {
        let portfolio = self
            .ledger
            .portfolio(portfolio_id)
            .await?
            .ok_or(EngineError::PortfolioNotFound(portfolio_id))?;
        let positions = self.ledger.positions(portfolio_id).await?;
        let latest = self.ledger.latest_pnl(portfolio_id).await?;
        Ok(build_snapshot(
            &portfolio,
            &positions,
            latest.map(|p| p.daily_pnl),
            self.clock.today(),
            self.clock.now(),
        ))
    }
}

fn filled_order(
    portfolio_id: i64,
    request: &OrderRequest,
    execution: &Execution,
    applied: &AppliedFill,
) -> Order {
    Order {
        id: 0,
        portfolio_id,
        symbol: request.symbol.clone(),
        name: request.name.clone(),
        side: request.side,
        quantity: request.quantity,
        price: request.price,
        filled_price: Some(execution.price),
        filled_quantity: execution.quantity,
        fee: execution.fees.total(),
        realized_pnl: applied.realized_pnl,
        status: OrderStatus::Filled,
        reason: request.reason.clone(),
        created_at: execution.timestamp,
    }
}

fn failed_order(
    portfolio_id: i64,
    request: &OrderRequest,
    cause: &str,
    now: DateTime<Utc>,
) -> Order {
    let reason = if request.reason.is_empty() {
        format!("failed: {cause}")
    } else {
        format!("{} | failed: {cause}", request.reason)
    };
    Order {
        id: 0,
        portfolio_id,
        symbol: request.symbol.clone(),
        name: request.name.clone(),
        side: request.side,
        quantity: request.quantity,
        price: request.price,
        filled_price: None,
        filled_quantity: 0,
        fee: Decimal::ZERO,
        realized_pnl: None,
        status: OrderStatus::Failed,
        reason,
        created_at: now,
    }
}
