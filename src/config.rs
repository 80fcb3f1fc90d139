//! Application configuration management.
//!
//! This module handles loading configuration from environment variables.
//! It uses the `envy` crate to deserialize environment variables into a type-safe struct,
//! then derives the billing settings (currency, phone region, date order) that the
//! fee, payment and import services consume.

use serde::Deserialize;

/// Application configuration loaded from environment variables.
///
/// # Environment Variables
///
/// - `DATABASE_URL` (required): PostgreSQL connection string
/// - `SERVER_PORT` (optional): HTTP server port, defaults to 3000
/// - `DATABASE_MAX_CONNECTIONS` (optional): pool size, defaults to 5
/// - `PORTAL_JWT_SECRET` (required): HS256 secret for portal tokens
/// - `PORTAL_TOKEN_TTL_HOURS` (optional): default portal token lifetime, defaults to 720
/// - `BILLING_CURRENCY` (optional): ISO 4217 code, defaults to "ZAR"
/// - `FEE_DUE_DAY` (optional): day of month generated fees fall due, defaults to 7
/// - `PHONE_REGION` (optional): `za` or `international`, defaults to `za`
/// - `DATE_ORDER` (optional): `day_first` or `month_first`, defaults to `day_first`
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database_url: String,

    #[serde(default = "default_port")]
    pub server_port: u16,

    #[serde(default = "default_max_connections")]
    pub database_max_connections: u32,

    pub portal_jwt_secret: String,

    #[serde(default = "default_portal_ttl")]
    pub portal_token_ttl_hours: i64,

    #[serde(default = "default_currency")]
    pub billing_currency: String,

    #[serde(default = "default_due_day")]
    pub fee_due_day: u32,

    #[serde(default)]
    pub phone_region: PhoneRegion,

    #[serde(default)]
    pub date_order: DateOrder,
}

/// Default port if SERVER_PORT environment variable is not set.
fn default_port() -> u16 {
    3000
}

fn default_max_connections() -> u32 {
    5
}

fn default_portal_ttl() -> i64 {
    24 * 30
}

fn default_currency() -> String {
    "ZAR".to_string()
}

fn default_due_day() -> u32 {
    7
}

/// Which phone number pattern imported rows are validated against.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhoneRegion {
    /// South African numbers: `+27`, `27` or `0` followed by nine digits.
    #[default]
    Za,
    /// Any E.164-looking number.
    International,
}

/// How `NN/NN/YYYY` and `NN-NN-YYYY` dates are read.
///
/// The two orders cannot be told apart from the text alone (`05/06/2010`),
/// so the import always applies the configured order and never guesses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DateOrder {
    #[default]
    DayFirst,
    MonthFirst,
}

/// Validated billing settings shared by the services.
#[derive(Debug, Clone)]
pub struct BillingSettings {
    pub currency: String,
    pub fee_due_day: u32,
    pub phone_region: PhoneRegion,
    pub date_order: DateOrder,
}

impl Default for BillingSettings {
    fn default() -> Self {
        Self {
            currency: default_currency(),
            fee_due_day: default_due_day(),
            phone_region: PhoneRegion::default(),
            date_order: DateOrder::default(),
        }
    }
}

/// Configuration values that parse but make no sense.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error(transparent)]
    Env(#[from] envy::Error),

    #[error("FEE_DUE_DAY must be between 1 and 28, got {0}")]
    DueDay(u32),

    #[error("BILLING_CURRENCY must be a 3 letter ISO 4217 code, got {0:?}")]
    Currency(String),

    #[error("PORTAL_TOKEN_TTL_HOURS must be positive, got {0}")]
    PortalTtl(i64),
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// This method first attempts to load a `.env` file (which is optional),
    /// then reads environment variables and deserializes them into a Config struct.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Required environment variables are missing (e.g., DATABASE_URL)
    /// - Environment variable values cannot be parsed into expected types
    /// - Billing settings are out of range (see [`Config::billing_settings`])
    pub fn from_env() -> Result<Self, ConfigError> {
        // Try to load .env file if it exists (does nothing if not found)
        dotenvy::dotenv().ok();

        let config = envy::from_env::<Config>()?;
        config.billing_settings()?;
        if config.portal_token_ttl_hours <= 0 {
            return Err(ConfigError::PortalTtl(config.portal_token_ttl_hours));
        }
        Ok(config)
    }

    /// Derive the billing settings, rejecting values the services cannot honor.
    ///
    /// The due day is capped at 28 so every month has it.
    pub fn billing_settings(&self) -> Result<BillingSettings, ConfigError> {
        if !(1..=28).contains(&self.fee_due_day) {
            return Err(ConfigError::DueDay(self.fee_due_day));
        }

        let currency = self.billing_currency.trim().to_ascii_uppercase();
        if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(ConfigError::Currency(self.billing_currency.clone()));
        }

        Ok(BillingSettings {
            currency,
            fee_due_day: self.fee_due_day,
            phone_region: self.phone_region,
            date_order: self.date_order,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn from_pairs(pairs: &[(&str, &str)]) -> Config {
        let vars = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()));
        envy::from_iter::<_, Config>(vars).unwrap()
    }

    #[test]
    fn defaults_apply_when_optional_vars_are_missing() {
        let config = from_pairs(&[
            ("DATABASE_URL", "postgres://localhost/billing"),
            ("PORTAL_JWT_SECRET", "secret"),
        ]);

        assert_eq!(config.server_port, 3000);
        assert_eq!(config.database_max_connections, 5);
        assert_eq!(config.portal_token_ttl_hours, 720);

        let settings = config.billing_settings().unwrap();
        assert_eq!(settings.currency, "ZAR");
        assert_eq!(settings.fee_due_day, 7);
        assert_eq!(settings.phone_region, PhoneRegion::Za);
        assert_eq!(settings.date_order, DateOrder::DayFirst);
    }

    #[test]
    fn reads_region_and_date_order() {
        let config = from_pairs(&[
            ("DATABASE_URL", "postgres://localhost/billing"),
            ("PORTAL_JWT_SECRET", "secret"),
            ("PHONE_REGION", "international"),
            ("DATE_ORDER", "month_first"),
            ("BILLING_CURRENCY", "usd"),
        ]);

        let settings = config.billing_settings().unwrap();
        assert_eq!(settings.phone_region, PhoneRegion::International);
        assert_eq!(settings.date_order, DateOrder::MonthFirst);
        assert_eq!(settings.currency, "USD");
    }

    #[test]
    fn rejects_due_day_outside_every_month() {
        let config = from_pairs(&[
            ("DATABASE_URL", "postgres://localhost/billing"),
            ("PORTAL_JWT_SECRET", "secret"),
            ("FEE_DUE_DAY", "31"),
        ]);

        assert!(matches!(
            config.billing_settings(),
            Err(ConfigError::DueDay(31))
        ));
    }

    #[test]
    fn rejects_malformed_currency() {
        let config = from_pairs(&[
            ("DATABASE_URL", "postgres://localhost/billing"),
            ("PORTAL_JWT_SECRET", "secret"),
            ("BILLING_CURRENCY", "RAND"),
        ]);

        assert!(matches!(
            config.billing_settings(),
            Err(ConfigError::Currency(_))
        ));
    }
}
