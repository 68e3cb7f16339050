//! Configuration module
//!
//! Loads configuration from environment variables.

use rust_decimal::Decimal;
use std::env;
use std::str::FromStr;

use crate::aggregate::order::COMMISSION_RATE_SCALE;
use crate::aggregate::{DuplicateGuard, PriorityFeeSchedule};

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Database connection URL
    pub database_url: String,

    /// Maximum database connections in pool
    pub database_max_connections: u32,

    /// Environment (development, production)
    pub environment: String,

    pub policy: MarketPolicy,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let database_url = env::var("DATABASE_URL")
            .map_err(|_| ConfigError::MissingEnv("DATABASE_URL"))?;

        let database_max_connections = env::var("DATABASE_MAX_CONNECTIONS")
            .unwrap_or_else(|_| "10".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidValue("DATABASE_MAX_CONNECTIONS"))?;

        let environment = env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string());

        Ok(Self {
            database_url,
            database_max_connections,
            environment,
            policy: MarketPolicy::from_env()?,
        })
    }

    /// Check if running in production
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}

/// Tunable business policy
#[derive(Debug, Clone, PartialEq)]
pub struct MarketPolicy {
    pub fee_schedule: PriorityFeeSchedule,
    pub duplicate_guard: DuplicateGuard,
    pub default_max_revisions: i32,
    /// Share of the order price kept by the platform on completion
    pub commission_rate: Decimal,
    /// Attempts at generating an unused promo code
    pub promo_code_attempts: u32,
    /// Buffer of the ledger notification channel
    pub ledger_event_capacity: usize,
}

impl Default for MarketPolicy {
    fn default() -> Self {
        Self {
            fee_schedule: PriorityFeeSchedule::default(),
            duplicate_guard: DuplicateGuard::default(),
            default_max_revisions: 3,
            commission_rate: Decimal::new(10, 2),
            promo_code_attempts: 10,
            ledger_event_capacity: 256,
        }
    }
}

impl MarketPolicy {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key lookup; absent keys keep their defaults
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let fees = defaults.fee_schedule;

        let fee_schedule = PriorityFeeSchedule {
            normal: parse_or(&lookup, "PRIORITY_FEE_NORMAL", fees.normal)?,
            high: parse_or(&lookup, "PRIORITY_FEE_HIGH", fees.high)?,
            urgent: parse_or(&lookup, "PRIORITY_FEE_URGENT", fees.urgent)?,
        };

        let prefix_chars = parse_or(
            &lookup,
            "DUPLICATE_TITLE_PREFIX",
            defaults.duplicate_guard.prefix_chars,
        )?;

        let default_max_revisions: i32 =
            parse_or(&lookup, "DEFAULT_MAX_REVISIONS", defaults.default_max_revisions)?;
        if default_max_revisions < 0 {
            return Err(ConfigError::InvalidValue("DEFAULT_MAX_REVISIONS"));
        }

        let commission_rate: Decimal =
            parse_or(&lookup, "COMMISSION_RATE", defaults.commission_rate)?;
        if commission_rate < Decimal::ZERO
            || commission_rate > Decimal::ONE
            || commission_rate.normalize().scale() > COMMISSION_RATE_SCALE
        {
            return Err(ConfigError::InvalidValue("COMMISSION_RATE"));
        }

        let promo_code_attempts: u32 =
            parse_or(&lookup, "PROMO_CODE_ATTEMPTS", defaults.promo_code_attempts)?;
        if promo_code_attempts == 0 {
            return Err(ConfigError::InvalidValue("PROMO_CODE_ATTEMPTS"));
        }

        let ledger_event_capacity: usize =
            parse_or(&lookup, "LEDGER_EVENT_CAPACITY", defaults.ledger_event_capacity)?;
        if ledger_event_capacity == 0 {
            return Err(ConfigError::InvalidValue("LEDGER_EVENT_CAPACITY"));
        }

        Ok(Self {
            fee_schedule,
            duplicate_guard: DuplicateGuard::new(prefix_chars),
            default_max_revisions,
            commission_rate,
            promo_code_attempts,
            ledger_event_capacity,
        })
    }
}

fn parse_or<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::InvalidValue(key)),
        None => Ok(default),
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnv(&'static str),

    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(&'static str),
}
