//! # API Client
//!
//! Contracts for the two external collaborators of the desk and their HTTP
//! adapters:
//!
//! - `MarketDataSource`: quotes, historical bars, hot-stock candidates and
//!   index snapshots.
//! - `DecisionGenerator`: turns market context, portfolio and candidates into
//!   trade decisions.
//!
//! The engine only depends on the traits, so tests drive it with in-process fakes.

use crate::error::ApiError;
use crate::responses::{BarRow, DecisionRequest, HotStockRow, IndexRow, QuoteRow};
use async_trait::async_trait;
use chrono::NaiveDate;
use core_types::{
    AnalysisResult, Bar, Candidate, IndexSnapshot, MarketContext, PortfolioSnapshot, Quote,
};
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::time::Duration;

pub mod error;
pub mod responses;

/// Code of the Shanghai Composite in the real-time index feed.
pub const SHANGHAI_COMPOSITE: &str = "s_sh000001";
/// Code of the Shanghai Composite in the daily index history.
pub const SHANGHAI_COMPOSITE_DAILY: &str = "000001";

#[async_trait]
pub trait MarketDataSource: Send + Sync {
    /// Real-time quotes. Symbols without a usable price are omitted.
    async fn get_realtime_quotes(&self, symbols: &[String]) -> Result<Vec<Quote>, ApiError>;

    /// Historical bars, oldest first. `period` is e.g. `"daily"`.
    async fn get_historical_data(
        &self,
        symbol: &str,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
        period: &str,
    ) -> Result<Vec<Bar>, ApiError>;

    /// The most active symbols, at most `limit` of them.
    async fn get_hot_stocks(&self, limit: usize) -> Result<Vec<Candidate>, ApiError>;

    /// Real-time index snapshots keyed by index code.
    async fn get_index_quotes(&self) -> Result<HashMap<String, IndexSnapshot>, ApiError>;

    /// Daily bars of an index, oldest first.
    async fn get_index_daily(&self, code: &str) -> Result<Vec<Bar>, ApiError>;
}

#[async_trait]
pub trait DecisionGenerator: Send + Sync {
    async fn generate_decisions(
        &self,
        market: &MarketContext,
        portfolio: &PortfolioSnapshot,
        candidates: &[Candidate],
    ) -> Result<AnalysisResult, ApiError>;
}

fn build_client(timeout: Duration) -> Result<reqwest::Client, ApiError> {
    Ok(reqwest::Client::builder().timeout(timeout).build()?)
}

async fn read_json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, ApiError> {
    let status = response.status();
    let text = response.text().await?;
    if !status.is_success() {
        return Err(ApiError::Status {
            status: status.as_u16(),
            body: text,
        });
    }
    serde_json::from_str::<T>(&text).map_err(|e| ApiError::Deserialization(e.to_string()))
}

/// `MarketDataSource` backed by the market-data HTTP service.
#[derive(Clone)]
pub struct HttpMarketData {
    client: reqwest::Client,
    base_url: String,
}

impl HttpMarketData {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ApiError> {
        Ok(Self {
            client: build_client(timeout)?,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, ApiError> {
        let url = format!("{}{}", self.base_url, path);
        tracing::debug!(%url, "GET");
        let response = self.client.get(&url).query(query).send().await?;
        read_json(response).await
    }
}

#[async_trait]
impl MarketDataSource for HttpMarketData {
    async fn get_realtime_quotes(&self, symbols: &[String]) -> Result<Vec<Quote>, ApiError> {
        if symbols.is_empty() {
            return Ok(Vec::new());
        }
        let rows: Vec<QuoteRow> = self
            .get("/market/quotes", &[("symbols", symbols.join(","))])
            .await?;
        Ok(rows.into_iter().filter_map(QuoteRow::into_quote).collect())
    }

    async fn get_historical_data(
        &self,
        symbol: &str,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
        period: &str,
    ) -> Result<Vec<Bar>, ApiError> {
        let mut query = vec![("period", period.to_string())];
        if let Some(start) = start {
            query.push(("start_date", start.to_string()));
        }
        if let Some(end) = end {
            query.push(("end_date", end.to_string()));
        }
        let rows: Vec<BarRow> = self
            .get(&format!("/market/history/{symbol}"), &query)
            .await?;
        Ok(rows.into_iter().map(Bar::from).collect())
    }

    async fn get_hot_stocks(&self, limit: usize) -> Result<Vec<Candidate>, ApiError> {
        let rows: Vec<HotStockRow> = self
            .get("/market/hot", &[("limit", limit.to_string())])
            .await?;
        Ok(rows.into_iter().take(limit).map(Candidate::from).collect())
    }

    async fn get_index_quotes(&self) -> Result<HashMap<String, IndexSnapshot>, ApiError> {
        let rows: HashMap<String, IndexRow> = self.get("/market/indices", &[]).await?;
        Ok(rows
            .into_iter()
            .filter_map(|(code, row)| row.into_snapshot().map(|snap| (code, snap)))
            .collect())
    }

    async fn get_index_daily(&self, code: &str) -> Result<Vec<Bar>, ApiError> {
        let rows: Vec<BarRow> = self
            .get(&format!("/market/index/{code}/daily"), &[])
            .await?;
        Ok(rows.into_iter().map(Bar::from).collect())
    }
}

/// `DecisionGenerator` backed by the decision HTTP service.
#[derive(Clone)]
pub struct HttpDecisionService {
    client: reqwest::Client,
    base_url: String,
}

impl HttpDecisionService {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ApiError> {
        Ok(Self {
            client: build_client(timeout)?,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl DecisionGenerator for HttpDecisionService {
    async fn generate_decisions(
        &self,
        market: &MarketContext,
        portfolio: &PortfolioSnapshot,
        candidates: &[Candidate],
    ) -> Result<AnalysisResult, ApiError> {
        let body = DecisionRequest {
            market,
            portfolio,
            candidates,
        };
        let response = self
            .client
            .post(format!("{}/decisions", self.base_url))
            .json(&body)
            .send()
            .await?;
        read_json(response).await
    }
}
