use api_client::error::ApiError;
use api_client::{MarketDataSource, SHANGHAI_COMPOSITE, SHANGHAI_COMPOSITE_DAILY};
use core_types::{Bar, Candidate, Indicators, MarketContext, Quote};
use futures::future::join_all;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Runs `fut` under a deadline, turning an elapsed timer into `ApiError::Timeout`.
pub(crate) async fn with_timeout<T, F>(label: &str, limit: Duration, fut: F) -> Result<T, ApiError>
where
    F: Future<Output = Result<T, ApiError>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(ApiError::Timeout(label.to_string())),
    }
}

/// Market data as the coordination cycle consumes it: every call is bounded by
/// a timeout and degrades instead of failing the cycle where possible.
#[derive(Clone)]
pub struct MarketIntel {
    source: Arc<dyn MarketDataSource>,
    timeout: Duration,
    candidate_limit: usize,
    enrich: bool,
}

impl MarketIntel {
    pub fn new(
        source: Arc<dyn MarketDataSource>,
        timeout: Duration,
        candidate_limit: usize,
        enrich: bool,
    ) -> Self {
        Self {
            source,
            timeout,
            candidate_limit,
            enrich,
        }
    }

    /// Derives the market backdrop from the Shanghai Composite.
    ///
    /// The real-time index feed is tried first, then the change between the last
    /// two daily index bars. If both fail the context is marked unavailable.
    pub async fn market_context(&self) -> MarketContext {
        match with_timeout("index quotes", self.timeout, self.source.get_index_quotes()).await {
            Ok(indices) => {
                if let Some(index) = indices.get(SHANGHAI_COMPOSITE) {
                    return MarketContext::from_index(index.price, index.change_pct);
                }
                warn!(code = SHANGHAI_COMPOSITE, "Index missing from real-time feed");
            }
            Err(e) => warn!(error = %e, "Real-time index quote failed"),
        }

        let daily = with_timeout(
            "index daily bars",
            self.timeout,
            self.source.get_index_daily(SHANGHAI_COMPOSITE_DAILY),
        )
        .await;
        match daily {
            Ok(bars) => match context_from_bars(&bars) {
                Some(ctx) => return ctx,
                None => warn!("Daily index bars unusable"),
            },
            Err(e) => warn!(error = %e, "Daily index bars failed"),
        }

        MarketContext::unavailable()
    }

    /// Hot symbols, each enriched with the indicators of its latest daily bar.
    /// Enrichment failures leave `indicators` empty; a failed list yields no candidates.
    pub async fn candidates(&self) -> Vec<Candidate> {
        let candidates = match with_timeout(
            "hot stocks",
            self.timeout,
            self.source.get_hot_stocks(self.candidate_limit),
        )
        .await
        {
            Ok(list) => list,
            Err(e) => {
                warn!(error = %e, "Candidate list unavailable");
                return Vec::new();
            }
        };

        if !self.enrich {
            return candidates;
        }

        let enriched = candidates.into_iter().map(|mut candidate| async move {
            let history = with_timeout(
                "historical data",
                self.timeout,
                self.source
                    .get_historical_data(&candidate.symbol, None, None, "daily"),
            )
            .await;
            match history {
                Ok(bars) => candidate.indicators = bars.last().map(Indicators::from_bar),
                Err(e) => debug!(symbol = %candidate.symbol, error = %e, "Indicators unavailable"),
            }
            candidate
        });
        join_all(enriched).await
    }

    /// A fresh quote for one symbol.
    pub async fn quote(&self, symbol: &str) -> Result<Quote, ApiError> {
        let symbols = [symbol.to_string()];
        let quotes = with_timeout(
            "realtime quote",
            self.timeout,
            self.source.get_realtime_quotes(&symbols),
        )
        .await?;
        quotes
            .into_iter()
            .find(|q| q.symbol == symbol && q.price > Decimal::ZERO)
            .ok_or_else(|| ApiError::InvalidData(format!("no tradable quote for {symbol}")))
    }

    /// Latest prices for `symbols`. Symbols without a quote are absent from the map.
    pub async fn prices(&self, symbols: &[String]) -> Result<HashMap<String, Decimal>, ApiError> {
        if symbols.is_empty() {
            return Ok(HashMap::new());
        }
        let quotes = with_timeout(
            "realtime quotes",
            self.timeout,
            self.source.get_realtime_quotes(symbols),
        )
        .await?;
        Ok(quotes
            .into_iter()
            .filter(|q| q.price > Decimal::ZERO)
            .map(|q| (q.symbol, q.price))
            .collect())
    }
}

/// Change between the last two closes, in percent. A single bar counts as flat.
fn context_from_bars(bars: &[Bar]) -> Option<MarketContext> {
    let latest = bars.last()?;
    let previous = if bars.len() > 1 { &bars[bars.len() - 2] } else { latest };
    if previous.close <= 0.0 || !latest.close.is_finite() {
        return None;
    }
    let change = (latest.close - previous.close) / previous.close * 100.0;
    Some(MarketContext::from_index(latest.close, change))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use core_types::Sentiment;

    fn bar(day: u32, close: f64) -> Bar {
        Bar {
            date: NaiveDate::from_ymd_opt(2024, 6, day).unwrap(),
            open: close,
            high: close,
            low: close,
            close,
            volume: 0.0,
            ma5: None,
            ma10: None,
            ma20: None,
            rsi: None,
            macd: None,
        }
    }

    #[test]
    fn daily_fallback_uses_last_two_closes() {
        let ctx = context_from_bars(&[bar(1, 2900.0), bar(2, 3000.0), bar(3, 2970.0)]).unwrap();
        assert_eq!(ctx.index_level, Some(2970.0));
        assert_eq!(ctx.index_change_pct, Some(-1.0));
        assert_eq!(ctx.sentiment, Sentiment::Bearish);
    }

    #[test]
    fn single_bar_is_flat_and_empty_is_unusable() {
        let ctx = context_from_bars(&[bar(3, 3000.0)]).unwrap();
        assert_eq!(ctx.sentiment, Sentiment::Neutral);
        assert!(context_from_bars(&[]).is_none());
    }
}
