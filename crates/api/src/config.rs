//! Application configuration loaded from environment variables.

use std::time::Duration;

use cart::ChargeEnvironment;

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST` — bind address (default: `"0.0.0.0"`)
/// - `PORT` — listen port (default: `3000`)
/// - `RUST_LOG` — tracing filter directive (default: `"info"`)
/// - `CHARGE_ENV` — `production` or `sandbox` (default: `sandbox`)
/// - `RATE_WINDOW_SECS` — dedup window (default: `3600`)
/// - `ABANDON_DELAY_SECS` — upsell abandonment delay (default: `600`)
/// - `SWEEP_INTERVAL_SECS` — abandonment sweep period (default: `300`)
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub environment: ChargeEnvironment,
    pub rate_window: Duration,
    pub abandon_delay: Duration,
    pub sweep_interval: Duration,
}

impl Config {
    /// Loads configuration from environment variables, falling back to
    /// defaults. The charge environment defaults to sandbox so production
    /// charging is opt-in, never accidental.
    pub fn from_env() -> Self {
        let environment = match std::env::var("CHARGE_ENV").as_deref() {
            Ok("production") => ChargeEnvironment::Production,
            _ => ChargeEnvironment::Sandbox,
        };

        Self {
            host: std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: std::env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(3000),
            log_level: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
            environment,
            rate_window: env_secs("RATE_WINDOW_SECS", 3600),
            abandon_delay: env_secs("ABANDON_DELAY_SECS", 600),
            sweep_interval: env_secs("SWEEP_INTERVAL_SECS", 300),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn env_secs(name: &str, default: u64) -> Duration {
    Duration::from_secs(
        std::env::var(name)
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(default),
    )
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            environment: ChargeEnvironment::Sandbox,
            rate_window: Duration::from_secs(3600),
            abandon_delay: Duration::from_secs(600),
            sweep_interval: Duration::from_secs(300),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let config = Config::default();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 3000);
        assert_eq!(config.environment, ChargeEnvironment::Sandbox);
        assert_eq!(config.rate_window, Duration::from_secs(3600));
    }

    #[test]
    fn test_addr_formatting() {
        let config = Config {
            host: "127.0.0.1".to_string(),
            port: 8080,
            ..Default::default()
        };
        assert_eq!(config.addr(), "127.0.0.1:8080");
    }
}
