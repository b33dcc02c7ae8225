//! Application settings loaded from a TOML file.
//!
//! The file seeds the investment levels on startup, tunes the accrual scheduler,
//! and optionally enables the signup bonus paid up the new member's chain.

use crate::errors::{Error, Result};
use serde::Deserialize;
use std::path::Path;

const DEFAULT_CONFIG_PATH: &str = "config.toml";
const DEFAULT_CHECK_INTERVAL_SECS: u64 = 3600;

/// Configuration structure representing the entire config file
#[derive(Debug, Deserialize)]
pub struct AppConfig {
    /// Levels to seed when missing from the database
    #[serde(default)]
    pub levels: Vec<LevelConfig>,
    /// Accrual scheduler settings
    #[serde(default)]
    pub accrual: AccrualSettings,
    /// Bonus distributed up the chain when a referred user signs up
    pub signup_bonus: Option<SignupBonusConfig>,
}

/// Configuration for a single investment level
#[derive(Debug, Deserialize, Clone)]
pub struct LevelConfig {
    pub level_number: i32,
    pub investment_amount: f64,
    pub daily_income: f64,
    /// Percent paid to the direct referrer
    pub a_level_commission_rate: f64,
    pub b_level_commission_rate: f64,
    pub c_level_commission_rate: f64,
    #[serde(default = "default_true")]
    pub is_active: bool,
    #[serde(default)]
    pub order: i32,
}

/// Accrual scheduler settings
#[derive(Debug, Deserialize, Clone, Copy)]
pub struct AccrualSettings {
    /// How often the scheduler checks whether today's accrual has run
    #[serde(default = "default_check_interval")]
    pub check_interval_secs: u64,
}

impl Default for AccrualSettings {
    fn default() -> Self {
        Self {
            check_interval_secs: DEFAULT_CHECK_INTERVAL_SECS,
        }
    }
}

/// Signup bonus: `base_amount` is paid up the chain at the rates of `level_number`
#[derive(Debug, Deserialize, Clone, Copy)]
pub struct SignupBonusConfig {
    pub base_amount: f64,
    pub level_number: i32,
}

const fn default_true() -> bool {
    true
}

const fn default_check_interval() -> u64 {
    DEFAULT_CHECK_INTERVAL_SECS
}

/// Parses settings from TOML text.
pub fn parse_config(contents: &str) -> Result<AppConfig> {
    let config: AppConfig = toml::from_str(contents).map_err(|e| Error::Config {
        message: format!("Failed to parse config: {e}"),
    })?;

    if config.accrual.check_interval_secs == 0 {
        return Err(Error::Config {
            message: "accrual.check_interval_secs must be greater than zero".to_string(),
        });
    }

    Ok(config)
}

/// Loads settings from a TOML file
///
/// # Errors
/// Returns an error if:
/// - The file cannot be read
/// - The TOML syntax is invalid
/// - Required fields are missing
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<AppConfig> {
    let contents = std::fs::read_to_string(path.as_ref()).map_err(|e| Error::Config {
        message: format!("Failed to read config file {:?}: {e}", path.as_ref()),
    })?;
    parse_config(&contents)
}

/// Loads settings from `LEDGER_CONFIG`, falling back to `./config.toml`
pub fn load_default_config() -> Result<AppConfig> {
    let path = std::env::var("LEDGER_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
    load_config(path)
}
