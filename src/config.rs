use secrecy::Secret;
use serde::Deserialize;

use crate::services::reservation_coordinator::DEFAULT_DAILY_LIMIT;
use crate::services::Calendar;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub database_url: Secret<String>,
    pub host: String,
    pub port: u16,

    // Business calendar used for month and day boundaries
    pub utc_offset_minutes: i32,

    // Reservation rules
    pub daily_reservation_limit: i64,

    // Periodic reconciliation sweep, disabled when unset
    pub reconcile_cron: Option<String>,
    pub reconcile_batch_size: i64,

    // Sessions
    pub secure_cookies: bool,
}

impl Config {
    pub fn from_env() -> Result<Self, config::ConfigError> {
        // Load .env file if it exists (for local development)
        let _ = dotenvy::dotenv();

        let config = config::Config::builder()
            .add_source(config::Environment::default().separator("__"))
            .build()?;

        Self::from_source(&config)
    }

    fn from_source(config: &config::Config) -> Result<Self, config::ConfigError> {
        let settings = Self {
            database_url: Secret::new(config.get("database_url")?),
            host: config.get("host").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: config.get("port")?,

            utc_offset_minutes: config.get("utc_offset_minutes").unwrap_or(0),

            daily_reservation_limit: config
                .get("daily_reservation_limit")
                .unwrap_or(DEFAULT_DAILY_LIMIT),

            reconcile_cron: config.get("reconcile_cron").ok(),
            reconcile_batch_size: config.get("reconcile_batch_size").unwrap_or(100),

            secure_cookies: config.get("secure_cookies").unwrap_or(true),
        };

        if settings.daily_reservation_limit < 1 {
            return Err(config::ConfigError::Message(
                "daily_reservation_limit must be at least 1".to_string(),
            ));
        }

        if settings.reconcile_batch_size < 1 {
            return Err(config::ConfigError::Message(
                "reconcile_batch_size must be at least 1".to_string(),
            ));
        }

        settings.calendar()?;

        Ok(settings)
    }

    pub fn calendar(&self) -> Result<Calendar, config::ConfigError> {
        Calendar::with_offset_minutes(self.utc_offset_minutes).ok_or_else(|| {
            config::ConfigError::Message(format!(
                "utc_offset_minutes out of range: {}",
                self.utc_offset_minutes
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source(pairs: &[(&str, &str)]) -> config::Config {
        let mut builder = config::Config::builder();
        for (key, value) in pairs {
            builder = builder.set_override(*key, *value).unwrap();
        }
        builder.build().unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_source(&source(&[
            ("database_url", "postgres://localhost/gym"),
            ("port", "8080"),
        ]))
        .unwrap();

        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.daily_reservation_limit, 2);
        assert_eq!(config.reconcile_batch_size, 100);
        assert!(config.reconcile_cron.is_none());
        assert!(config.secure_cookies);
        assert_eq!(config.calendar().unwrap(), Calendar::utc());
    }

    #[test]
    fn test_missing_database_url() {
        assert!(Config::from_source(&source(&[("port", "8080")])).is_err());
    }

    #[test]
    fn test_rejects_zero_daily_limit() {
        let result = Config::from_source(&source(&[
            ("database_url", "postgres://localhost/gym"),
            ("port", "8080"),
            ("daily_reservation_limit", "0"),
        ]));
        assert!(result.is_err());
    }

    #[test]
    fn test_rejects_out_of_range_offset() {
        let result = Config::from_source(&source(&[
            ("database_url", "postgres://localhost/gym"),
            ("port", "8080"),
            ("utc_offset_minutes", "-1500"),
        ]));
        assert!(result.is_err());
    }
}
