use crate::error::ConfigError;
use chrono_tz::Tz;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;

/// The root configuration structure for the entire application.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub trading: TradingConfig,
    pub fees: FeeSchedule,
    pub schedule: ScheduleConfig,
    pub database: DatabaseConfig,
    pub collaborators: CollaboratorConfig,
    pub logging: LoggingConfig,
}

/// Account-level trading constraints.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TradingConfig {
    /// Name of the portfolio the desk trades; it is created on first start.
    pub portfolio_name: String,
    /// Starting cash for a newly created (or reset) portfolio.
    pub initial_capital: Decimal,
    /// Largest single-buy notional as a fraction of total portfolio value (0.2 = 20%).
    pub max_position_ratio: Decimal,
    /// Maximum number of distinct symbols held at once.
    pub max_holdings: usize,
    /// Unrealized loss ratio at which a protective full exit is proposed.
    pub stop_loss_ratio: Decimal,
    /// Unrealized gain ratio at which half of the position is taken off.
    pub take_profit_ratio: Decimal,
    /// Maximum filled orders per exchange day.
    pub max_daily_trades: u32,
    /// Reject sells of shares bought on the current exchange day.
    pub enforce_settlement_lock: bool,
    /// Generate stop-loss / take-profit sells during coordination cycles.
    pub protective_exits: bool,
}

impl Default for TradingConfig {
    fn default() -> Self {
        Self {
            portfolio_name: "default".to_string(),
            initial_capital: dec!(1000000),
            max_position_ratio: dec!(0.2),
            max_holdings: 10,
            stop_loss_ratio: dec!(0.08),
            take_profit_ratio: dec!(0.20),
            max_daily_trades: 10,
            enforce_settlement_lock: true,
            protective_exits: true,
        }
    }
}

/// Flat-rate fee model.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct FeeSchedule {
    /// Charged on both sides. 0.0003 corresponds to 0.03%.
    pub commission_rate: Decimal,
    /// Charged on sells only.
    pub stamp_duty_rate: Decimal,
    /// Floor applied to the commission of every fill.
    pub min_commission: Decimal,
}

impl Default for FeeSchedule {
    fn default() -> Self {
        Self {
            commission_rate: dec!(0.0003),
            stamp_duty_rate: dec!(0.001),
            min_commission: dec!(5.0),
        }
    }
}

/// Session scheduling and collaborator call budgets.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// IANA name of the exchange time zone.
    pub timezone: String,
    /// Number of hot symbols offered to the decision collaborator per cycle.
    pub candidate_limit: usize,
    /// Fetch history-derived indicators for each candidate.
    pub enrich_candidates: bool,
    /// Timeout for each market-data call.
    pub collaborator_timeout_secs: u64,
    /// Timeout for the decision collaborator.
    pub decision_timeout_secs: u64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            timezone: "Asia/Shanghai".to_string(),
            candidate_limit: 20,
            enrich_candidates: true,
            collaborator_timeout_secs: 10,
            decision_timeout_secs: 60,
        }
    }
}

impl ScheduleConfig {
    /// Parses the configured exchange time zone.
    pub fn tz(&self) -> Result<Tz, ConfigError> {
        self.timezone.parse::<Tz>().map_err(|_| {
            ConfigError::ValidationError(format!("unknown time zone '{}'", self.timezone))
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// SQLite URL, e.g. `sqlite://data/tradedesk.db` or `sqlite::memory:`.
    pub url: String,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://data/tradedesk.db".to_string(),
            max_connections: 5,
        }
    }
}

/// Base URLs of the external services.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CollaboratorConfig {
    pub market_data_url: String,
    pub decision_url: String,
}

impl Default for CollaboratorConfig {
    fn default() -> Self {
        Self {
            market_data_url: "http://127.0.0.1:8100".to_string(),
            decision_url: "http://127.0.0.1:8200".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive; `RUST_LOG` takes precedence when set.
    pub level: String,
    /// Directory for the daily rolling log file. Empty disables file output.
    pub directory: String,
    pub file_prefix: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            directory: "logs".to_string(),
            file_prefix: "tradedesk.log".to_string(),
        }
    }
}

impl Config {
    /// Rejects settings the desk cannot operate with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let t = &self.trading;
        if t.initial_capital <= Decimal::ZERO {
            return Err(ConfigError::ValidationError(
                "initial_capital must be greater than 0".to_string(),
            ));
        }
        for (name, ratio) in [
            ("max_position_ratio", t.max_position_ratio),
            ("stop_loss_ratio", t.stop_loss_ratio),
            ("take_profit_ratio", t.take_profit_ratio),
        ] {
            if ratio <= Decimal::ZERO || ratio > Decimal::ONE {
                return Err(ConfigError::ValidationError(format!(
                    "{name} must be in (0, 1], got {ratio}"
                )));
            }
        }
        if t.max_holdings == 0 {
            return Err(ConfigError::ValidationError(
                "max_holdings must be at least 1".to_string(),
            ));
        }
        let f = &self.fees;
        if f.commission_rate.is_sign_negative()
            || f.stamp_duty_rate.is_sign_negative()
            || f.min_commission.is_sign_negative()
        {
            return Err(ConfigError::ValidationError(
                "fee rates must not be negative".to_string(),
            ));
        }
        self.schedule.tz()?;
        Ok(())
    }
}
