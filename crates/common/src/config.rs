use serde::Deserialize;

use crate::error::{Error, Result};
use crate::types::TimeInForce;

/// API credentials for the venue.
///
/// Secrets never appear in `Debug` output or logs.
#[derive(Clone)]
pub struct Credentials {
    pub api_key: String,
    pub api_secret: String,
}

impl Credentials {
    /// Resolve credentials from explicit values (CLI flags) with fallback to
    /// the `BINANCE_API_KEY` / `BINANCE_API_SECRET` environment variables.
    /// Loads `.env` if present.
    pub fn resolve(api_key: Option<String>, api_secret: Option<String>) -> Result<Self> {
        let _ = dotenvy::dotenv(); // ignore error if .env not present

        let api_key = api_key
            .or_else(|| std::env::var("BINANCE_API_KEY").ok())
            .ok_or_else(|| {
                Error::Config(
                    "API key missing: pass --api-key or set BINANCE_API_KEY".into(),
                )
            })?;
        let api_secret = api_secret
            .or_else(|| std::env::var("BINANCE_API_SECRET").ok())
            .ok_or_else(|| {
                Error::Config(
                    "API secret missing: pass --api-secret or set BINANCE_API_SECRET".into(),
                )
            })?;

        Ok(Self { api_key, api_secret })
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &"***")
            .field("api_secret", &"***")
            .finish()
    }
}

/// Bot settings loaded from an optional TOML file.
///
/// Example `config/talonbot.toml`:
/// ```toml
/// testnet = true
/// recv_window = 5000
/// time_in_force = "GTC"
/// log_level = "info"
/// log_dir = "logs"
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    /// Route orders to the futures testnet instead of mainnet.
    pub testnet: bool,
    /// `recvWindow` in milliseconds for signed requests.
    pub recv_window: u64,
    /// Default time-in-force for resting orders.
    pub time_in_force: TimeInForce,
    /// Default log level when `RUST_LOG` is not set.
    pub log_level: String,
    /// Directory for rotating JSON log files. No file output when unset.
    pub log_dir: Option<String>,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            testnet: false,
            recv_window: 5000,
            time_in_force: TimeInForce::Gtc,
            log_level: "info".to_string(),
            log_dir: None,
        }
    }
}

impl BotConfig {
    /// Load from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read config at '{path}': {e}")))?;
        toml::from_str(&content)
            .map_err(|e| Error::Config(format!("failed to parse config at '{path}': {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bot_config_defaults() {
        let cfg = BotConfig::default();
        assert!(!cfg.testnet);
        assert_eq!(cfg.recv_window, 5000);
        assert_eq!(cfg.time_in_force, TimeInForce::Gtc);
    }

    #[test]
    fn bot_config_parses_partial_toml() {
        let cfg: BotConfig = toml::from_str("testnet = true\nrecv_window = 10000\n").unwrap();
        assert!(cfg.testnet);
        assert_eq!(cfg.recv_window, 10000);
        assert_eq!(cfg.log_level, "info");
    }

    #[test]
    fn credentials_debug_redacts_secrets() {
        let creds = Credentials {
            api_key: "key".into(),
            api_secret: "secret".into(),
        };
        let printed = format!("{creds:?}");
        assert!(!printed.contains("secret"));
    }
}
