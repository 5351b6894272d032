use std::env;
use std::time::Duration as StdDuration;

use chrono::{Duration, FixedOffset, Local, Offset, Utc};

use crate::error::AppError;

#[derive(Debug, Clone)]
pub struct Config {
    pub http_port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub event_buffer_size: usize,
    pub dispatch: DispatchSettings,
    pub routing: RoutingConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Compact,
    Json,
}

/// Timing and threshold knobs of the assignment engine.
#[derive(Debug, Clone)]
pub struct DispatchSettings {
    pub sweep_interval: StdDuration,
    pub batch_timeout: Duration,
    pub order_timeout: Duration,
    pub consolidation_radius_km: f64,
    pub max_orders_per_driver: u32,
    pub driver_candidate_limit: usize,
    /// Offset used to turn "now" into a weekday and `HH:MM` for volunteer
    /// availability windows.
    pub availability_offset: FixedOffset,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            sweep_interval: StdDuration::from_secs(15),
            batch_timeout: Duration::minutes(15),
            order_timeout: Duration::minutes(2),
            consolidation_radius_km: 2.0,
            max_orders_per_driver: 2,
            driver_candidate_limit: 3,
            availability_offset: Utc.fix(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RoutingConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub profile: String,
    pub max_retries: u32,
    pub backoff: StdDuration,
    pub request_timeout: StdDuration,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openrouteservice.org".to_string(),
            api_key: None,
            profile: "driving-car".to_string(),
            max_retries: 3,
            backoff: StdDuration::from_millis(200),
            request_timeout: StdDuration::from_millis(5000),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        let _ = dotenvy::dotenv();

        let log_format = match env::var("LOG_FORMAT").as_deref() {
            Ok("json") => LogFormat::Json,
            _ => LogFormat::Compact,
        };

        let local_offset_minutes = Local::now().offset().fix().local_minus_utc() / 60;
        let offset_minutes: i32 =
            parse_or_default("AVAILABILITY_UTC_OFFSET_MINUTES", local_offset_minutes)?;
        let availability_offset = FixedOffset::east_opt(offset_minutes * 60).ok_or_else(|| {
            AppError::Internal(format!(
                "invalid AVAILABILITY_UTC_OFFSET_MINUTES: {offset_minutes}"
            ))
        })?;

        let dispatch = DispatchSettings {
            sweep_interval: StdDuration::from_secs(parse_or_default("SWEEP_INTERVAL_SECS", 15)?),
            batch_timeout: Duration::seconds(parse_or_default("BATCH_TIMEOUT_SECS", 900)?),
            order_timeout: Duration::seconds(parse_or_default("ORDER_TIMEOUT_SECS", 120)?),
            consolidation_radius_km: parse_or_default("CONSOLIDATION_RADIUS_KM", 2.0)?,
            max_orders_per_driver: parse_or_default("MAX_ORDERS_PER_DRIVER", 2)?,
            driver_candidate_limit: parse_or_default("DRIVER_CANDIDATE_LIMIT", 3)?,
            availability_offset,
        };

        let routing = RoutingConfig {
            base_url: env::var("ROUTING_BASE_URL")
                .unwrap_or_else(|_| "https://api.openrouteservice.org".to_string()),
            api_key: env::var("ROUTING_API_KEY").ok().filter(|key| !key.trim().is_empty()),
            profile: env::var("ROUTING_PROFILE").unwrap_or_else(|_| "driving-car".to_string()),
            max_retries: parse_or_default("ROUTING_MAX_RETRIES", 3)?,
            backoff: StdDuration::from_millis(parse_or_default("ROUTING_BACKOFF_MS", 200)?),
            request_timeout: StdDuration::from_millis(parse_or_default("ROUTING_TIMEOUT_MS", 5000)?),
        };

        let config = Self {
            http_port: parse_or_default("HTTP_PORT", 3000)?,
            log_level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            log_format,
            event_buffer_size: parse_or_default("EVENT_BUFFER_SIZE", 1024)?,
            dispatch,
            routing,
        };
        config.validate()?;
        Ok(config)
    }

    /// Rejects values the runtime cannot start with: a zero sweep interval
    /// or event buffer, and limits that would make every dispatch fail.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.dispatch.sweep_interval.is_zero() {
            return Err(AppError::Internal("SWEEP_INTERVAL_SECS must be > 0".to_string()));
        }
        if self.event_buffer_size == 0 {
            return Err(AppError::Internal("EVENT_BUFFER_SIZE must be > 0".to_string()));
        }
        if self.dispatch.batch_timeout <= Duration::zero() {
            return Err(AppError::Internal("BATCH_TIMEOUT_SECS must be > 0".to_string()));
        }
        if self.dispatch.order_timeout <= Duration::zero() {
            return Err(AppError::Internal("ORDER_TIMEOUT_SECS must be > 0".to_string()));
        }
        if self.dispatch.max_orders_per_driver == 0 {
            return Err(AppError::Internal("MAX_ORDERS_PER_DRIVER must be > 0".to_string()));
        }
        if self.dispatch.driver_candidate_limit == 0 {
            return Err(AppError::Internal("DRIVER_CANDIDATE_LIMIT must be > 0".to_string()));
        }
        Ok(())
    }
}

fn parse_or_default<T>(key: &str, default: T) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|err| AppError::Internal(format!("invalid {key}: {err}"))),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration as StdDuration;

    use chrono::Duration;

    use super::{Config, DispatchSettings, LogFormat, RoutingConfig};
    use crate::error::AppError;

    fn base_config() -> Config {
        Config {
            http_port: 3000,
            log_level: "info".to_string(),
            log_format: LogFormat::Compact,
            event_buffer_size: 1024,
            dispatch: DispatchSettings::default(),
            routing: RoutingConfig::default(),
        }
    }

    #[test]
    fn defaults_are_valid() {
        assert!(base_config().validate().is_ok());
    }

    #[test]
    fn zero_sweep_interval_is_rejected() {
        let mut config = base_config();
        config.dispatch.sweep_interval = StdDuration::ZERO;

        let err = config.validate().unwrap_err();
        assert!(matches!(err, AppError::Internal(message) if message.contains("SWEEP_INTERVAL_SECS")));
    }

    #[test]
    fn zero_event_buffer_is_rejected() {
        let mut config = base_config();
        config.event_buffer_size = 0;

        let err = config.validate().unwrap_err();
        assert!(matches!(err, AppError::Internal(message) if message.contains("EVENT_BUFFER_SIZE")));
    }

    #[test]
    fn zero_timeouts_and_limits_are_rejected() {
        let mut config = base_config();
        config.dispatch.order_timeout = Duration::zero();
        assert!(config.validate().is_err());

        let mut config = base_config();
        config.dispatch.driver_candidate_limit = 0;
        assert!(config.validate().is_err());
    }
}
