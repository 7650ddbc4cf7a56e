use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExecutorError {
    #[error("Not enough cash to settle the fill. Required: {required}, Available: {available}")]
    InsufficientCash { required: Decimal, available: Decimal },

    #[error("Cannot sell {requested} of {symbol}: only {available} held")]
    InsufficientHoldings {
        symbol: String,
        requested: i64,
        available: i64,
    },

    #[error("Invalid fill: {0}")]
    InvalidFill(String),
}
