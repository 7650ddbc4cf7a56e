use crate::clock::{Clock, ExchangeClock};
use crate::coordinator::OrderCoordinator;
use crate::error::EngineError;
use crate::market::{MarketIntel, with_timeout};
use api_client::{DecisionGenerator, MarketDataSource};
use chrono::{DateTime, Utc};
use configuration::Config;
use core_types::{
    AnalysisResult, AnalysisRun, Order, OrderStatus, PnLRecord, Portfolio, PortfolioSnapshot,
    Sentiment, TradeAction, TradeProposal, TriggerKind,
};
use database::LedgerRepository;
use events::{AnalysisSummary, DeskEvent, LogLevel};
use executor::SimulatedExecutor;
use risk::{ExitRules, OrderGuard};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock, broadcast};
use tracing::{Instrument, error, info, info_span, warn};
use uuid::Uuid;

const EVENT_CAPACITY: usize = 256;

/// Outcome of one coordination cycle.
#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub run_id: Uuid,
    pub trigger: TriggerKind,
    pub sentiment: Sentiment,
    pub summary: String,
    pub risk_note: String,
    pub decision_count: usize,
    pub filled: usize,
    pub failed: usize,
    pub skipped: usize,
    pub latency_ms: u64,
    /// Set when the decision service failed and the cycle ran without decisions.
    pub decision_error: Option<String>,
    /// Set when the ledger refused an order write; execution stopped there.
    pub execution_error: Option<String>,
    pub orders: Vec<Order>,
    pub started_at: DateTime<Utc>,
}

/// The result of a manual analysis: the cycle outcome plus the resulting portfolio.
#[derive(Debug, Clone)]
pub struct AnalysisOutcome {
    pub report: CycleReport,
    pub snapshot: PortfolioSnapshot,
}

#[derive(Default)]
struct Tally {
    filled: usize,
    failed: usize,
    skipped: usize,
    orders: Vec<Order>,
}

impl Tally {
    fn record(&mut self, order: Order) {
        match order.status {
            OrderStatus::Filled => self.filled += 1,
            _ => self.failed += 1,
        }
        self.orders.push(order);
    }
}

/// The trading desk: one portfolio, its collaborators and every operation the
/// scheduler and the transport layer can invoke.
pub struct TradingDesk {
    portfolio_name: String,
    initial_capital: Decimal,
    portfolio_id: AtomicI64,
    coordinator: OrderCoordinator,
    market: MarketIntel,
    decisions: Arc<dyn DecisionGenerator>,
    decision_timeout: Duration,
    exits: Option<ExitRules>,
    clock: ExchangeClock,
    cycle_lock: Mutex<()>,
    last_report: RwLock<Option<CycleReport>>,
    events: broadcast::Sender<DeskEvent>,
}

impl TradingDesk {
    /// Wires the desk and makes sure the configured portfolio exists.
    pub async fn open(
        config: &Config,
        ledger: LedgerRepository,
        market_data: Arc<dyn MarketDataSource>,
        decisions: Arc<dyn DecisionGenerator>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, EngineError> {
        let clock = ExchangeClock::new(clock, config.schedule.tz()?);
        let trading = &config.trading;

        let portfolio = ledger
            .get_or_create_portfolio(&trading.portfolio_name, trading.initial_capital, clock.now())
            .await?;

        let guard = OrderGuard::new(trading.clone(), config.fees.clone())?;
        let executor = Arc::new(SimulatedExecutor::new(config.fees.clone()));
        let coordinator = OrderCoordinator::new(ledger, executor, guard, clock.clone());
        let market = MarketIntel::new(
            market_data,
            Duration::from_secs(config.schedule.collaborator_timeout_secs),
            config.schedule.candidate_limit,
            config.schedule.enrich_candidates,
        );
        let exits = trading
            .protective_exits
            .then(|| ExitRules::from_config(trading));
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        info!(
            portfolio = %portfolio.name,
            id = portfolio.id,
            cash = %portfolio.cash,
            "Trading desk ready"
        );

        Ok(Self {
            portfolio_name: trading.portfolio_name.clone(),
            initial_capital: trading.initial_capital,
            portfolio_id: AtomicI64::new(portfolio.id),
            coordinator,
            market,
            decisions,
            decision_timeout: Duration::from_secs(config.schedule.decision_timeout_secs),
            exits,
            clock,
            cycle_lock: Mutex::new(()),
            last_report: RwLock::new(None),
            events,
        })
    }

    pub fn portfolio_id(&self) -> i64 {
        self.portfolio_id.load(Ordering::SeqCst)
    }

    pub fn clock(&self) -> &ExchangeClock {
        &self.clock
    }

    pub fn coordinator(&self) -> &OrderCoordinator {
        &self.coordinator
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DeskEvent> {
        self.events.subscribe()
    }

    fn publish(&self, event: DeskEvent) {
        // No subscribers is not an error.
        let _ = self.events.send(event);
    }

    pub async fn last_report(&self) -> Option<CycleReport> {
        self.last_report.read().await.clone()
    }

    /// Executes a single proposal through the coordinator and publishes the order.
    pub async fn execute(&self, proposal: &TradeProposal) -> Result<Option<Order>, EngineError> {
        let order = self
            .coordinator
            .execute(self.portfolio_id(), proposal)
            .await?;
        if let Some(order) = &order {
            self.publish(DeskEvent::OrderRecorded(order.clone()));
        }
        Ok(order)
    }

    /// Runs one full coordination cycle. Cycles never overlap: a second caller
    /// waits for the running one to finish.
    pub async fn run_cycle(&self, trigger: TriggerKind) -> Result<CycleReport, EngineError> {
        let _cycle = self.cycle_lock.lock().await;
        let run_id = Uuid::new_v4();
        let span = info_span!("cycle", id = %run_id, trigger = ?trigger);
        self.cycle(run_id, trigger).instrument(span).await
    }

    async fn cycle(&self, run_id: Uuid, trigger: TriggerKind) -> Result<CycleReport, EngineError> {
        let started = Instant::now();
        let started_at = self.clock.now();
        info!("Coordination cycle started");

        let snapshot = self.snapshot().await?;
        let market = self.market.market_context().await;
        let candidates = self.market.candidates().await;

        let (analysis, decision_error) = match with_timeout(
            "decision service",
            self.decision_timeout,
            self.decisions
                .generate_decisions(&market, &snapshot, &candidates),
        )
        .await
        {
            Ok(result) => (result, None),
            Err(e) => {
                warn!(error = %e, "Decision generation failed, continuing without decisions");
                let message = e.to_string();
                self.publish(DeskEvent::log(
                    LogLevel::Warn,
                    format!("decision generation failed: {message}"),
                ));
                (
                    AnalysisResult::neutral(format!("decision generation failed: {message}")),
                    Some(message),
                )
            }
        };

        let mut tally = Tally::default();
        let mut selling = HashSet::new();
        let mut execution_error = None;
        for decision in &analysis.decisions {
            if decision.action == TradeAction::Hold {
                continue;
            }
            let quote = match self.market.quote(&decision.symbol).await {
                Ok(quote) => quote,
                Err(e) => {
                    warn!(symbol = %decision.symbol, error = %e, "No quote, decision skipped");
                    tally.skipped += 1;
                    continue;
                }
            };
            if decision.action == TradeAction::Sell {
                selling.insert(decision.symbol.clone());
            }
            let proposal = TradeProposal {
                symbol: decision.symbol.clone(),
                name: if decision.name.is_empty() {
                    quote.name.clone()
                } else {
                    decision.name.clone()
                },
                action: decision.action,
                quantity: decision.quantity,
                price: quote.price,
                reason: decision.reason.clone(),
            };
            match self.execute(&proposal).await {
                Ok(Some(order)) => tally.record(order),
                Ok(None) => {}
                Err(e) => {
                    execution_error = Some(e);
                    break;
                }
            }
        }

        // A failed decision call or ledger write ends the cycle here.
        if let (Some(rules), None, None) = (&self.exits, &decision_error, &execution_error) {
            if let Err(e) = self.run_protective_exits(rules, &selling, &mut tally).await {
                execution_error = Some(e);
            }
        }

        let latency_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        let report = CycleReport {
            run_id,
            trigger,
            sentiment: analysis.sentiment,
            summary: analysis.summary.clone(),
            risk_note: analysis.risk_note.clone(),
            decision_count: analysis.decisions.len(),
            filled: tally.filled,
            failed: tally.failed,
            skipped: tally.skipped,
            latency_ms,
            decision_error,
            execution_error: execution_error.as_ref().map(ToString::to_string),
            orders: tally.orders,
            started_at,
        };

        self.record_run(&report, &analysis).await;
        if let Some(e) = execution_error {
            error!(
                error = %e,
                filled = report.filled,
                failed = report.failed,
                "Coordination cycle aborted"
            );
            self.publish(DeskEvent::log(
                LogLevel::Error,
                format!("cycle {run_id} aborted: {e}"),
            ));
            *self.last_report.write().await = Some(report);
            return Err(e);
        }

        info!(
            decisions = report.decision_count,
            filled = report.filled,
            failed = report.failed,
            skipped = report.skipped,
            latency_ms,
            sentiment = report.sentiment.as_str(),
            "Coordination cycle finished"
        );

        self.publish(DeskEvent::AnalysisCompleted(AnalysisSummary {
            run_id,
            trigger,
            sentiment: report.sentiment,
            summary: report.summary.clone(),
            decision_count: report.decision_count,
            filled: report.filled,
            failed: report.failed,
            skipped: report.skipped,
            latency_ms,
            finished_at: self.clock.now(),
        }));
        *self.last_report.write().await = Some(report.clone());
        Ok(report)
    }

    /// Marks positions to fresh quotes, then sells whatever breached its exit thresholds.
    async fn run_protective_exits(
        &self,
        rules: &ExitRules,
        selling: &HashSet<String>,
        tally: &mut Tally,
    ) -> Result<(), EngineError> {
        if let Err(e) = self.refresh_prices().await {
            match e {
                EngineError::Collaborator(e) => {
                    warn!(error = %e, "Quotes unavailable, exits use last known prices")
                }
                other => return Err(other),
            }
        }
        let positions = self
            .coordinator
            .ledger()
            .positions(self.portfolio_id())
            .await?;
        for proposal in rules.proposals(&positions, self.clock.today(), selling) {
            if let Some(order) = self.execute(&proposal).await? {
                tally.record(order);
            }
        }
        Ok(())
    }

    async fn record_run(&self, report: &CycleReport, analysis: &AnalysisResult) {
        let decisions_json = match serde_json::to_string(&analysis.decisions) {
            Ok(json) => json,
            Err(e) => {
                warn!(error = %e, "Decisions could not be serialized");
                "[]".to_string()
            }
        };
        let run = AnalysisRun {
            id: report.run_id,
            portfolio_id: self.portfolio_id(),
            trigger: report.trigger,
            sentiment: report.sentiment,
            summary: report.summary.clone(),
            risk_note: report.risk_note.clone(),
            decision_count: report.decision_count as i64,
            filled: report.filled as i64,
            failed: report.failed as i64,
            skipped: report.skipped as i64,
            latency_ms: i64::try_from(report.latency_ms).unwrap_or(i64::MAX),
            decisions_json,
            created_at: report.started_at,
        };
        if let Err(e) = self.coordinator.ledger().record_analysis_run(&run).await {
            error!(error = %e, "Failed to record analysis run");
        }
    }

    /// Manual trigger: a full cycle, then the resulting portfolio.
    pub async fn manual_analysis(&self) -> Result<AnalysisOutcome, EngineError> {
        let report = self.run_cycle(TriggerKind::Manual).await?;
        let snapshot = self.snapshot().await?;
        self.publish(DeskEvent::PortfolioState(snapshot.clone()));
        Ok(AnalysisOutcome { report, snapshot })
    }

    /// Refreshes the price of every open position and publishes the result.
    /// Creates no orders.
    pub async fn reprice(&self) -> Result<usize, EngineError> {
        let updated = self.refresh_prices().await?;
        if updated > 0 {
            let snapshot = self.snapshot().await?;
            self.publish(DeskEvent::PortfolioState(snapshot));
        }
        Ok(updated)
    }

    async fn refresh_prices(&self) -> Result<usize, EngineError> {
        let portfolio_id = self.portfolio_id();
        let symbols: Vec<String> = self
            .coordinator
            .ledger()
            .positions(portfolio_id)
            .await?
            .into_iter()
            .map(|p| p.symbol)
            .collect();
        if symbols.is_empty() {
            return Ok(0);
        }
        let prices = self.market.prices(&symbols).await?;
        let updated = self.coordinator.reprice(portfolio_id, &prices).await?;
        tracing::debug!(updated, held = symbols.len(), "Positions repriced");
        Ok(updated)
    }

    /// Close summary: reprice (best effort), then append one P&L record.
    pub async fn close_session(&self) -> Result<PnLRecord, EngineError> {
        if let Err(e) = self.refresh_prices().await {
            warn!(error = %e, "Closing reprice failed, recording with last known prices");
        }
        let record = self.coordinator.record_pnl(self.portfolio_id()).await?;
        info!(
            total_value = %record.total_value,
            daily_pnl = %record.daily_pnl,
            total_pnl_pct = %format!("{:.2}", record.total_pnl_ratio * 100.0),
            "Session closed"
        );
        if let Ok(snapshot) = self.snapshot().await {
            self.publish(DeskEvent::PortfolioState(snapshot));
        }
        Ok(record)
    }

    pub async fn snapshot(&self) -> Result<PortfolioSnapshot, EngineError> {
        self.coordinator.snapshot(self.portfolio_id()).await
    }

    /// Orders newest first; `page` is zero-based.
    pub async fn orders(&self, limit: u32, page: u32) -> Result<Vec<Order>, EngineError> {
        Ok(self
            .coordinator
            .ledger()
            .orders(self.portfolio_id(), limit, page)
            .await?)
    }

    /// P&L records of the last `days` exchange days, oldest first.
    pub async fn pnl_history(&self, days: u32) -> Result<Vec<PnLRecord>, EngineError> {
        let since = self.clock.days_ago_start(days);
        Ok(self
            .coordinator
            .ledger()
            .pnl_since(self.portfolio_id(), since)
            .await?)
    }

    pub async fn analysis_runs(&self, limit: u32) -> Result<Vec<AnalysisRun>, EngineError> {
        Ok(self
            .coordinator
            .ledger()
            .analysis_runs(self.portfolio_id(), limit)
            .await?)
    }

    /// Wipes the portfolio and everything it owns, then recreates it with the
    /// configured capital. Waits for any running cycle first.
    pub async fn reset(&self) -> Result<Portfolio, EngineError> {
        let _cycle = self.cycle_lock.lock().await;
        let fresh = self
            .coordinator
            .ledger()
            .reset_portfolio(&self.portfolio_name, self.initial_capital, self.clock.now())
            .await?;
        self.portfolio_id.store(fresh.id, Ordering::SeqCst);
        *self.last_report.write().await = None;
        if let Ok(snapshot) = self.snapshot().await {
            self.publish(DeskEvent::PortfolioState(snapshot));
        }
        Ok(fresh)
    }
}
