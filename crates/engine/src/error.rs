use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Portfolio {0} not found")]
    PortfolioNotFound(i64),

    #[error("Ledger persistence failed: {0}")]
    Persistence(#[from] database::DbError),

    #[error("Collaborator unavailable: {0}")]
    Collaborator(#[from] api_client::error::ApiError),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Risk management error: {0}")]
    Risk(#[from] risk::RiskError),
}

impl From<configuration::error::ConfigError> for EngineError {
    fn from(err: configuration::error::ConfigError) -> Self {
        EngineError::Configuration(err.to_string())
    }
}
