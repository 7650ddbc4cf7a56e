//! # Configuration
//!
//! Strongly-typed settings for the trading desk, loaded from a TOML file and
//! overridable through `TRADEDESK__SECTION__KEY` environment variables.
//!
//! Every field has a default, so a missing file yields a usable (paper) setup.
//! [`load_config`] validates the result before handing it out.

use crate::error::ConfigError;
use std::path::Path;

pub mod error;
pub mod logging;
pub mod settings;

pub use logging::init_tracing;
pub use settings::{
    CollaboratorConfig, Config, DatabaseConfig, FeeSchedule, LoggingConfig, ScheduleConfig,
    TradingConfig,
};

/// Loads and validates the application configuration.
///
/// The file is optional; environment overrides are applied on top of it.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let builder = config::Config::builder()
        .add_source(config::File::from(path).required(false))
        .add_source(
            config::Environment::with_prefix("TRADEDESK")
                .prefix_separator("__")
                .separator("__"),
        )
        .build()?;

    let config = builder.try_deserialize::<Config>()?;
    config.validate()?;
    Ok(config)
}
