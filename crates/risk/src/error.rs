use chrono::NaiveDate;
use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RiskError {
    #[error("Risk parameters from configuration are invalid: {0}")]
    InvalidParameters(String),
}

/// Why a trade was refused. Every variant is an expected, recoverable outcome:
/// the coordinator records it on a failed order and the cycle continues.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TradeRejection {
    #[error("insufficient funds: need {required}, have {available}")]
    InsufficientFunds { required: Decimal, available: Decimal },

    #[error("position limit exceeded: notional {notional} above limit {limit}")]
    PositionLimitExceeded { notional: Decimal, limit: Decimal },

    #[error("holdings limit exceeded: already holding {held} of {max} symbols")]
    HoldingsLimitExceeded { held: usize, max: usize },

    #[error("insufficient holdings in {symbol}: requested {requested}, held {available}")]
    InsufficientHoldings {
        symbol: String,
        requested: i64,
        available: i64,
    },

    #[error("settlement lock: {symbol} bought on {bought} is not sellable until the next day")]
    SettlementLocked { symbol: String, bought: NaiveDate },

    #[error("daily trade limit reached: {count} of {limit} trades filled today")]
    DailyTradeLimitExceeded { count: u32, limit: u32 },

    #[error("invalid quantity: {0}")]
    InvalidQuantity(String),

    #[error("invalid price: {0}")]
    InvalidPrice(Decimal),
}
