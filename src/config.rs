use std::env;
use std::str::FromStr;

use bigdecimal::BigDecimal;
use thiserror::Error;

use crate::domain::pricing::PriceMarkup;

const DEFAULT_HOST: &str = "0.0.0.0";
const DEFAULT_PORT: u16 = 8080;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{key} has an invalid value '{value}': {reason}")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    /// Percentage added on top of gross prices for members.
    pub markup: PriceMarkup,
}

impl AppConfig {
    /// Reads the configuration from the process environment.
    ///
    /// Call `dotenvy::dotenv()` first to pick up a `.env` file.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let database_url = lookup("DATABASE_URL")
            .filter(|s| !s.trim().is_empty())
            .ok_or(ConfigError::Missing("DATABASE_URL"))?;
        let host = lookup("HOST").unwrap_or_else(|| DEFAULT_HOST.to_string());
        let port = match lookup("PORT") {
            Some(value) => value.parse::<u16>().map_err(|e| ConfigError::Invalid {
                key: "PORT",
                reason: e.to_string(),
                value,
            })?,
            None => DEFAULT_PORT,
        };
        let markup = match lookup("PRICE_MARKUP") {
            Some(value) => parse_markup(value)?,
            None => PriceMarkup::default(),
        };
        Ok(Self {
            database_url,
            host,
            port,
            markup,
        })
    }
}

fn parse_markup(value: String) -> Result<PriceMarkup, ConfigError> {
    let percent = BigDecimal::from_str(value.trim()).map_err(|e| ConfigError::Invalid {
        key: "PRICE_MARKUP",
        reason: e.to_string(),
        value: value.clone(),
    })?;
    PriceMarkup::new(percent).ok_or_else(|| ConfigError::Invalid {
        key: "PRICE_MARKUP",
        reason: "must not be negative".to_string(),
        value,
    })
}
