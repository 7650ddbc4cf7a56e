//! In-process collaborators, an in-memory ledger and a fixed clock for driving
//! the desk end to end.

#![allow(dead_code)]

use api_client::error::ApiError;
use api_client::{DecisionGenerator, MarketDataSource, SHANGHAI_COMPOSITE};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use configuration::Config;
use core_types::{
    AnalysisResult, Bar, Candidate, Decision, IndexSnapshot, MarketContext, PortfolioSnapshot,
    Quote, Sentiment, TradeAction, TradeProposal,
};
use database::{LedgerRepository, connect, run_migrations};
use engine::{FixedClock, TradingDesk};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Tuesday 2024-03-12, 10:00 in Shanghai.
pub fn session_open() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 12, 2, 0, 0).unwrap()
}

pub fn trading_day() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 3, 12).unwrap()
}

pub fn test_config() -> Config {
    let mut config = Config::default();
    config.database.url = "sqlite::memory:".to_string();
    config.logging.directory = String::new();
    config.schedule.collaborator_timeout_secs = 2;
    config.schedule.decision_timeout_secs = 2;
    config
}

pub async fn ledger() -> LedgerRepository {
    let pool = connect("sqlite::memory:", 1).await.unwrap();
    run_migrations(&pool).await.unwrap();
    LedgerRepository::new(pool)
}

#[derive(Default)]
pub struct FakeMarket {
    pub quotes: Mutex<HashMap<String, Decimal>>,
    pub index: Mutex<Option<IndexSnapshot>>,
    pub hot: Mutex<Vec<Candidate>>,
}

impl FakeMarket {
    pub fn set_price(&self, symbol: &str, price: Decimal) {
        self.quotes.lock().unwrap().insert(symbol.to_string(), price);
    }

    pub fn remove_price(&self, symbol: &str) {
        self.quotes.lock().unwrap().remove(symbol);
    }

    pub fn set_index(&self, price: f64, change_pct: f64) {
        *self.index.lock().unwrap() = Some(IndexSnapshot {
            name: "SSE Composite".to_string(),
            price,
            change_pct,
        });
    }
}

#[async_trait]
impl MarketDataSource for FakeMarket {
    async fn get_realtime_quotes(&self, symbols: &[String]) -> Result<Vec<Quote>, ApiError> {
        let quotes = self.quotes.lock().unwrap();
        Ok(symbols
            .iter()
            .filter_map(|s| {
                quotes.get(s).map(|price| Quote {
                    symbol: s.clone(),
                    name: format!("{s} Co"),
                    price: *price,
                    change_pct: 0.0,
                    volume: 0.0,
                    amount: 0.0,
                })
            })
            .collect())
    }

    async fn get_historical_data(
        &self,
        _symbol: &str,
        _start: Option<NaiveDate>,
        _end: Option<NaiveDate>,
        _period: &str,
    ) -> Result<Vec<Bar>, ApiError> {
        Err(ApiError::InvalidData("no history in tests".to_string()))
    }

    async fn get_hot_stocks(&self, limit: usize) -> Result<Vec<Candidate>, ApiError> {
        Ok(self.hot.lock().unwrap().iter().take(limit).cloned().collect())
    }

    async fn get_index_quotes(&self) -> Result<HashMap<String, IndexSnapshot>, ApiError> {
        match self.index.lock().unwrap().clone() {
            Some(index) => Ok(HashMap::from([(SHANGHAI_COMPOSITE.to_string(), index)])),
            None => Err(ApiError::Status {
                status: 503,
                body: "index feed down".to_string(),
            }),
        }
    }

    async fn get_index_daily(&self, _code: &str) -> Result<Vec<Bar>, ApiError> {
        Err(ApiError::Timeout("index daily bars".to_string()))
    }
}

/// Returns a scripted answer and remembers what it was asked.
#[derive(Default)]
pub struct FakeDecisions {
    pub decisions: Mutex<Vec<Decision>>,
    pub fail: Mutex<bool>,
    pub delay: Mutex<Option<Duration>>,
    pub seen_market: Mutex<Option<MarketContext>>,
    pub seen_candidates: Mutex<usize>,
}

impl FakeDecisions {
    pub fn script(&self, decisions: Vec<Decision>) {
        *self.decisions.lock().unwrap() = decisions;
    }

    pub fn fail_next(&self) {
        *self.fail.lock().unwrap() = true;
    }
}

#[async_trait]
impl DecisionGenerator for FakeDecisions {
    async fn generate_decisions(
        &self,
        market: &MarketContext,
        _portfolio: &PortfolioSnapshot,
        candidates: &[Candidate],
    ) -> Result<AnalysisResult, ApiError> {
        *self.seen_market.lock().unwrap() = Some(market.clone());
        *self.seen_candidates.lock().unwrap() = candidates.len();
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if std::mem::take(&mut *self.fail.lock().unwrap()) {
            return Err(ApiError::Status {
                status: 500,
                body: "model overloaded".to_string(),
            });
        }
        Ok(AnalysisResult {
            sentiment: Sentiment::Bullish,
            summary: "momentum in consumer staples".to_string(),
            risk_note: "watch turnover".to_string(),
            decisions: self.decisions.lock().unwrap().clone(),
        })
    }
}

pub fn decision(symbol: &str, action: TradeAction, quantity: i64) -> Decision {
    Decision {
        symbol: symbol.to_string(),
        name: String::new(),
        action,
        quantity,
        reason: format!("{action:?} {symbol}").to_lowercase(),
        confidence: 0.7,
        target_price: None,
        stop_loss: None,
    }
}

pub fn proposal(symbol: &str, action: TradeAction, quantity: i64, price: Decimal) -> TradeProposal {
    TradeProposal {
        symbol: symbol.to_string(),
        name: format!("{symbol} Co"),
        action,
        quantity,
        price,
        reason: "test".to_string(),
    }
}

pub struct Harness {
    pub desk: Arc<TradingDesk>,
    pub market: Arc<FakeMarket>,
    pub decisions: Arc<FakeDecisions>,
    pub clock: Arc<FixedClock>,
}

/// Routes desk logs to the test output when `RUST_LOG` is set.
pub fn init_logs() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub async fn harness_with(config: Config) -> Harness {
    init_logs();
    let market = Arc::new(FakeMarket::default());
    let decisions = Arc::new(FakeDecisions::default());
    let clock = Arc::new(FixedClock::new(session_open()));
    let desk = TradingDesk::open(
        &config,
        ledger().await,
        market.clone(),
        decisions.clone(),
        clock.clone(),
    )
    .await
    .unwrap();
    Harness {
        desk: Arc::new(desk),
        market,
        decisions,
        clock,
    }
}

pub async fn harness() -> Harness {
    harness_with(test_config()).await
}
