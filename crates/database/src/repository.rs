use crate::DbError;
use chrono::{DateTime, NaiveDate, Utc};
use core_types::{
    AnalysisRun, Order, OrderSide, OrderStatus, PnLRecord, Portfolio, Position, Sentiment,
    TriggerKind,
};
use rust_decimal::Decimal;
use sqlx::sqlite::{SqliteConnection, SqlitePool, SqliteRow};
use sqlx::{Row, Sqlite, Transaction};
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

/// The `LedgerRepository` is the durable store of portfolios, positions, orders,
/// P&L records and analysis runs.
///
/// Reads go straight to the pool and may run concurrently with a writer. All
/// mutations go through a [`LedgerTx`], which holds the single-writer lock for
/// its lifetime, so two writers never interleave.
#[derive(Debug, Clone)]
pub struct LedgerRepository {
    pool: SqlitePool,
    writer: Arc<Mutex<()>>,
}

/// An open write transaction plus the writer lock.
///
/// Dropping it without `commit` rolls everything back.
pub struct LedgerTx {
    tx: Transaction<'static, Sqlite>,
    _writer: OwnedMutexGuard<()>,
}

impl LedgerRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            writer: Arc::new(Mutex::new(())),
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Waits for the writer lock and opens a transaction.
    pub async fn begin(&self) -> Result<LedgerTx, DbError> {
        let guard = Arc::clone(&self.writer).lock_owned().await;
        let tx = self.pool.begin().await?;
        Ok(LedgerTx {
            tx,
            _writer: guard,
        })
    }

    /// Returns the portfolio called `name`, creating it with `initial_capital`
    /// as both capital and cash when it does not exist.
    pub async fn get_or_create_portfolio(
        &self,
        name: &str,
        initial_capital: Decimal,
        now: DateTime<Utc>,
    ) -> Result<Portfolio, DbError> {
        let mut tx = self.begin().await?;
        let portfolio = match fetch_portfolio_by_name(tx.conn(), name).await? {
            Some(existing) => existing,
            None => {
                let created = insert_portfolio(tx.conn(), name, initial_capital, now).await?;
                tracing::info!(portfolio = %name, capital = %initial_capital, "Created portfolio");
                created
            }
        };
        tx.commit().await?;
        Ok(portfolio)
    }

    pub async fn portfolio(&self, id: i64) -> Result<Option<Portfolio>, DbError> {
        fetch_portfolio(&self.pool, id).await
    }

    pub async fn positions(&self, portfolio_id: i64) -> Result<Vec<Position>, DbError> {
        fetch_positions(&self.pool, portfolio_id).await
    }

    /// Orders newest first. `page` is zero-based.
    pub async fn orders(
        &self,
        portfolio_id: i64,
        limit: u32,
        page: u32,
    ) -> Result<Vec<Order>, DbError> {
        let offset = i64::from(limit) * i64::from(page);
        let rows = sqlx::query(
            "SELECT * FROM orders WHERE portfolio_id = ? ORDER BY created_at DESC, id DESC LIMIT ? OFFSET ?",
        )
        .bind(portfolio_id)
        .bind(i64::from(limit))
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(order_from_row).collect()
    }

    pub async fn latest_pnl(&self, portfolio_id: i64) -> Result<Option<PnLRecord>, DbError> {
        fetch_latest_pnl(&self.pool, portfolio_id).await
    }

    /// P&L records at or after `since`, oldest first.
    pub async fn pnl_since(
        &self,
        portfolio_id: i64,
        since: DateTime<Utc>,
    ) -> Result<Vec<PnLRecord>, DbError> {
        let rows = sqlx::query(
            "SELECT * FROM pnl_records WHERE portfolio_id = ? AND timestamp >= ? ORDER BY timestamp ASC, id ASC",
        )
        .bind(portfolio_id)
        .bind(since)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(pnl_from_row).collect()
    }

    pub async fn record_analysis_run(&self, run: &AnalysisRun) -> Result<(), DbError> {
        sqlx::query(
            r#"
            INSERT INTO analysis_runs
                (id, portfolio_id, trigger_kind, sentiment, summary, risk_note, decision_count,
                 filled, failed, skipped, latency_ms, decisions_json, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(run.id.to_string())
        .bind(run.portfolio_id)
        .bind(run.trigger.as_str())
        .bind(run.sentiment.as_str())
        .bind(&run.summary)
        .bind(&run.risk_note)
        .bind(run.decision_count)
        .bind(run.filled)
        .bind(run.failed)
        .bind(run.skipped)
        .bind(run.latency_ms)
        .bind(&run.decisions_json)
        .bind(run.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Analysis runs newest first.
    pub async fn analysis_runs(
        &self,
        portfolio_id: i64,
        limit: u32,
    ) -> Result<Vec<AnalysisRun>, DbError> {
        let rows = sqlx::query(
            "SELECT * FROM analysis_runs WHERE portfolio_id = ? ORDER BY created_at DESC LIMIT ?",
        )
        .bind(portfolio_id)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(analysis_run_from_row).collect()
    }

    /// Deletes the portfolio called `name` with everything it owns and
    /// recreates it with fresh capital.
    pub async fn reset_portfolio(
        &self,
        name: &str,
        initial_capital: Decimal,
        now: DateTime<Utc>,
    ) -> Result<Portfolio, DbError> {
        let mut tx = self.begin().await?;
        if let Some(existing) = fetch_portfolio_by_name(tx.conn(), name).await? {
            for table in ["analysis_runs", "pnl_records", "orders", "positions"] {
                sqlx::query(&format!("DELETE FROM {table} WHERE portfolio_id = ?"))
                    .bind(existing.id)
                    .execute(tx.conn())
                    .await?;
            }
            sqlx::query("DELETE FROM portfolios WHERE id = ?")
                .bind(existing.id)
                .execute(tx.conn())
                .await?;
        }
        let fresh = insert_portfolio(tx.conn(), name, initial_capital, now).await?;
        tx.commit().await?;
        tracing::warn!(portfolio = %name, id = fresh.id, "Portfolio reset");
        Ok(fresh)
    }
}

impl LedgerTx {
    pub fn conn(&mut self) -> &mut SqliteConnection {
        &mut *self.tx
    }

    pub async fn commit(self) -> Result<(), DbError> {
        self.tx.commit().await?;
        Ok(())
    }

    pub async fn portfolio(&mut self, id: i64) -> Result<Option<Portfolio>, DbError> {
        fetch_portfolio(self.conn(), id).await
    }

    pub async fn positions(&mut self, portfolio_id: i64) -> Result<Vec<Position>, DbError> {
        fetch_positions(self.conn(), portfolio_id).await
    }

    pub async fn set_cash(&mut self, portfolio_id: i64, cash: Decimal) -> Result<(), DbError> {
        let result = sqlx::query("UPDATE portfolios SET cash = ? WHERE id = ?")
            .bind(cash.to_string())
            .bind(portfolio_id)
            .execute(self.conn())
            .await?;
        if result.rows_affected() == 0 {
            return Err(DbError::NotFound);
        }
        Ok(())
    }

    /// Inserts or replaces the single row for `(portfolio_id, symbol)`.
    pub async fn upsert_position(&mut self, position: &Position) -> Result<(), DbError> {
        sqlx::query(
            r#"
            INSERT INTO positions
                (portfolio_id, symbol, name, quantity, avg_cost, current_price, last_buy_date, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (portfolio_id, symbol) DO UPDATE SET
                name = excluded.name,
                quantity = excluded.quantity,
                avg_cost = excluded.avg_cost,
                current_price = excluded.current_price,
                last_buy_date = excluded.last_buy_date,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(position.portfolio_id)
        .bind(&position.symbol)
        .bind(&position.name)
        .bind(position.quantity)
        .bind(position.avg_cost.to_string())
        .bind(position.current_price.to_string())
        .bind(position.last_buy_date)
        .bind(position.updated_at)
        .execute(self.conn())
        .await?;
        Ok(())
    }

    pub async fn delete_position(
        &mut self,
        portfolio_id: i64,
        symbol: &str,
    ) -> Result<(), DbError> {
        sqlx::query("DELETE FROM positions WHERE portfolio_id = ? AND symbol = ?")
            .bind(portfolio_id)
            .bind(symbol)
            .execute(self.conn())
            .await?;
        Ok(())
    }

    /// Updates only the mark price of a position.
    pub async fn reprice_position(
        &mut self,
        portfolio_id: i64,
        symbol: &str,
        price: Decimal,
        now: DateTime<Utc>,
    ) -> Result<(), DbError> {
        sqlx::query(
            "UPDATE positions SET current_price = ?, updated_at = ? WHERE portfolio_id = ? AND symbol = ?",
        )
        .bind(price.to_string())
        .bind(now)
        .bind(portfolio_id)
        .bind(symbol)
        .execute(self.conn())
        .await?;
        Ok(())
    }

    /// Persists an order and returns it with its assigned id. The incoming `id` is ignored.
    pub async fn insert_order(&mut self, order: &Order) -> Result<Order, DbError> {
        let result = sqlx::query(
            r#"
            INSERT INTO orders
                (portfolio_id, symbol, name, side, quantity, price, filled_price, filled_quantity,
                 fee, realized_pnl, status, reason, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(order.portfolio_id)
        .bind(&order.symbol)
        .bind(&order.name)
        .bind(order.side.as_str())
        .bind(order.quantity)
        .bind(order.price.to_string())
        .bind(order.filled_price.map(|p| p.to_string()))
        .bind(order.filled_quantity)
        .bind(order.fee.to_string())
        .bind(order.realized_pnl.map(|p| p.to_string()))
        .bind(order.status.as_str())
        .bind(&order.reason)
        .bind(order.created_at)
        .execute(self.conn())
        .await?;

        Ok(Order {
            id: result.last_insert_rowid(),
            ..order.clone()
        })
    }

    /// Number of filled orders created at or after `since`.
    pub async fn count_filled_since(
        &mut self,
        portfolio_id: i64,
        since: DateTime<Utc>,
    ) -> Result<u32, DbError> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM orders WHERE portfolio_id = ? AND status = 'filled' AND created_at >= ?",
        )
        .bind(portfolio_id)
        .bind(since)
        .fetch_one(self.conn())
        .await?;
        Ok(u32::try_from(count).unwrap_or(u32::MAX))
    }

    pub async fn latest_pnl(&mut self, portfolio_id: i64) -> Result<Option<PnLRecord>, DbError> {
        fetch_latest_pnl(self.conn(), portfolio_id).await
    }

    /// Appends a P&L record and returns it with its assigned id.
    pub async fn append_pnl(&mut self, record: &PnLRecord) -> Result<PnLRecord, DbError> {
        let result = sqlx::query(
            r#"
            INSERT INTO pnl_records
                (portfolio_id, timestamp, total_value, cash, market_value, daily_pnl, total_pnl, total_pnl_ratio)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(record.portfolio_id)
        .bind(record.timestamp)
        .bind(record.total_value.to_string())
        .bind(record.cash.to_string())
        .bind(record.market_value.to_string())
        .bind(record.daily_pnl.to_string())
        .bind(record.total_pnl.to_string())
        .bind(record.total_pnl_ratio)
        .execute(self.conn())
        .await?;

        Ok(PnLRecord {
            id: result.last_insert_rowid(),
            ..record.clone()
        })
    }
}

// ==============================================================================
// Shared queries (usable on the pool or inside a transaction)
// ==============================================================================

async fn fetch_portfolio<'e, E>(executor: E, id: i64) -> Result<Option<Portfolio>, DbError>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let row = sqlx::query("SELECT * FROM portfolios WHERE id = ?")
        .bind(id)
        .fetch_optional(executor)
        .await?;
    row.as_ref().map(portfolio_from_row).transpose()
}

async fn fetch_portfolio_by_name<'e, E>(
    executor: E,
    name: &str,
) -> Result<Option<Portfolio>, DbError>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let row = sqlx::query("SELECT * FROM portfolios WHERE name = ?")
        .bind(name)
        .fetch_optional(executor)
        .await?;
    row.as_ref().map(portfolio_from_row).transpose()
}

async fn insert_portfolio(
    conn: &mut SqliteConnection,
    name: &str,
    initial_capital: Decimal,
    now: DateTime<Utc>,
) -> Result<Portfolio, DbError> {
    let result = sqlx::query(
        "INSERT INTO portfolios (name, initial_capital, cash, is_active, created_at) VALUES (?, ?, ?, 1, ?)",
    )
    .bind(name)
    .bind(initial_capital.to_string())
    .bind(initial_capital.to_string())
    .bind(now)
    .execute(&mut *conn)
    .await?;

    Ok(Portfolio {
        id: result.last_insert_rowid(),
        name: name.to_string(),
        initial_capital,
        cash: initial_capital,
        is_active: true,
        created_at: now,
    })
}

async fn fetch_positions<'e, E>(executor: E, portfolio_id: i64) -> Result<Vec<Position>, DbError>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let rows = sqlx::query("SELECT * FROM positions WHERE portfolio_id = ? ORDER BY symbol")
        .bind(portfolio_id)
        .fetch_all(executor)
        .await?;
    rows.iter().map(position_from_row).collect()
}

async fn fetch_latest_pnl<'e, E>(
    executor: E,
    portfolio_id: i64,
) -> Result<Option<PnLRecord>, DbError>
where
    E: sqlx::Executor<'e, Database = Sqlite>,
{
    let row = sqlx::query(
        "SELECT * FROM pnl_records WHERE portfolio_id = ? ORDER BY timestamp DESC, id DESC LIMIT 1",
    )
    .bind(portfolio_id)
    .fetch_optional(executor)
    .await?;
    row.as_ref().map(pnl_from_row).transpose()
}

// ==============================================================================
// Row mapping
// ==============================================================================

fn decimal(row: &SqliteRow, column: &'static str) -> Result<Decimal, DbError> {
    let raw: String = row.try_get(column)?;
    Decimal::from_str(&raw).map_err(|e| DbError::Decode {
        column,
        message: e.to_string(),
    })
}

fn optional_decimal(row: &SqliteRow, column: &'static str) -> Result<Option<Decimal>, DbError> {
    let raw: Option<String> = row.try_get(column)?;
    raw.map(|s| {
        Decimal::from_str(&s).map_err(|e| DbError::Decode {
            column,
            message: e.to_string(),
        })
    })
    .transpose()
}

fn parsed<T>(row: &SqliteRow, column: &'static str) -> Result<T, DbError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let raw: String = row.try_get(column)?;
    raw.parse::<T>().map_err(|e| DbError::Decode {
        column,
        message: e.to_string(),
    })
}

fn portfolio_from_row(row: &SqliteRow) -> Result<Portfolio, DbError> {
    Ok(Portfolio {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        initial_capital: decimal(row, "initial_capital")?,
        cash: decimal(row, "cash")?,
        is_active: row.try_get("is_active")?,
        created_at: row.try_get("created_at")?,
    })
}

fn position_from_row(row: &SqliteRow) -> Result<Position, DbError> {
    let last_buy_date: Option<NaiveDate> = row.try_get("last_buy_date")?;
    Ok(Position {
        portfolio_id: row.try_get("portfolio_id")?,
        symbol: row.try_get("symbol")?,
        name: row.try_get("name")?,
        quantity: row.try_get("quantity")?,
        avg_cost: decimal(row, "avg_cost")?,
        current_price: decimal(row, "current_price")?,
        last_buy_date,
        updated_at: row.try_get("updated_at")?,
    })
}

fn order_from_row(row: &SqliteRow) -> Result<Order, DbError> {
    Ok(Order {
        id: row.try_get("id")?,
        portfolio_id: row.try_get("portfolio_id")?,
        symbol: row.try_get("symbol")?,
        name: row.try_get("name")?,
        side: parsed::<OrderSide>(row, "side")?,
        quantity: row.try_get("quantity")?,
        price: decimal(row, "price")?,
        filled_price: optional_decimal(row, "filled_price")?,
        filled_quantity: row.try_get("filled_quantity")?,
        fee: decimal(row, "fee")?,
        realized_pnl: optional_decimal(row, "realized_pnl")?,
        status: parsed::<OrderStatus>(row, "status")?,
        reason: row.try_get("reason")?,
        created_at: row.try_get("created_at")?,
    })
}

fn pnl_from_row(row: &SqliteRow) -> Result<PnLRecord, DbError> {
    Ok(PnLRecord {
        id: row.try_get("id")?,
        portfolio_id: row.try_get("portfolio_id")?,
        timestamp: row.try_get("timestamp")?,
        total_value: decimal(row, "total_value")?,
        cash: decimal(row, "cash")?,
        market_value: decimal(row, "market_value")?,
        daily_pnl: decimal(row, "daily_pnl")?,
        total_pnl: decimal(row, "total_pnl")?,
        total_pnl_ratio: row.try_get("total_pnl_ratio")?,
    })
}

fn analysis_run_from_row(row: &SqliteRow) -> Result<AnalysisRun, DbError> {
    Ok(AnalysisRun {
        id: parsed::<Uuid>(row, "id")?,
        portfolio_id: row.try_get("portfolio_id")?,
        trigger: parsed::<TriggerKind>(row, "trigger_kind")?,
        sentiment: parsed::<Sentiment>(row, "sentiment")?,
        summary: row.try_get("summary")?,
        risk_note: row.try_get("risk_note")?,
        decision_count: row.try_get("decision_count")?,
        filled: row.try_get("filled")?,
        failed: row.try_get("failed")?,
        skipped: row.try_get("skipped")?,
        latency_ms: row.try_get("latency_ms")?,
        decisions_json: row.try_get("decisions_json")?,
        created_at: row.try_get("created_at")?,
    })
}
