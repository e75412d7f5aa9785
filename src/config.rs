use config::{Config, ConfigError, Environment};
use serde::Deserialize;

use crate::execution::PositionConfig;
use crate::risk::RiskConfig;
use crate::strategy::SignalConfig;

/// Runtime settings, read from process environment variables
///
/// Keys are the upper-case field names (`RISK_PCT`, `EMA_SLOW`, ...).
/// Anything unset falls back to the defaults below.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct BotConfig {
    pub binance_api_key: String,
    pub binance_api_secret: String,
    pub testnet: bool,
    pub dry_run: bool,

    // Risk
    pub base_equity: f64,
    pub risk_pct: f64,
    pub min_risk_usd: f64,
    pub leverage: u32,

    // Universe
    pub timeframe: String,
    pub symbols: String,
    pub max_parallel_symbols: usize,

    // Indicators
    pub atr_len: usize,
    pub atr_mult_sl: f64,
    pub atr_mult_trail: f64,
    pub donchian_len: usize,
    pub ema_fast: usize,
    pub ema_slow: usize,
    pub trail_lookback: usize,

    // Pyramiding
    pub max_adds: u32,
    pub pyramid_step_atr: f64,
    pub pyramid_add_fraction: f64,

    pub loop_sleep_secs: u64,
    pub state_file: String,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            binance_api_key: String::new(),
            binance_api_secret: String::new(),
            testnet: true,
            dry_run: true,
            base_equity: 20.0,
            risk_pct: 0.02,
            min_risk_usd: 0.5,
            leverage: 30,
            timeframe: "5m".to_string(),
            symbols: String::new(),
            max_parallel_symbols: 6,
            atr_len: 14,
            atr_mult_sl: 1.5,
            atr_mult_trail: 2.0,
            donchian_len: 20,
            ema_fast: 50,
            ema_slow: 200,
            trail_lookback: 100,
            max_adds: 4,
            pyramid_step_atr: 1.0,
            pyramid_add_fraction: 0.5,
            loop_sleep_secs: 30,
            state_file: "state.json".to_string(),
        }
    }
}

impl BotConfig {
    /// Load from the process environment (call `dotenvy::dotenv()` first
    /// to pick up a `.env` file)
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_env(Environment::default())
    }

    pub fn from_env(env: Environment) -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(env.try_parsing(true))
            .build()?
            .try_deserialize()
    }

    /// Credentials are required even in dry-run: bars, balance and
    /// filters all come from the exchange
    pub fn validate_credentials(&self) -> anyhow::Result<()> {
        if self.binance_api_key.trim().is_empty() || self.binance_api_secret.trim().is_empty() {
            anyhow::bail!("BINANCE_API_KEY and BINANCE_API_SECRET must be set");
        }
        Ok(())
    }

    /// Explicit `SYMBOLS` list, trimmed and upper-cased; empty if unset
    pub fn explicit_symbols(&self) -> Vec<String> {
        self.symbols
            .split(',')
            .map(|s| s.trim().to_uppercase())
            .filter(|s| !s.is_empty())
            .collect()
    }

    pub fn signal_config(&self) -> SignalConfig {
        SignalConfig {
            ema_fast_period: self.ema_fast,
            ema_slow_period: self.ema_slow,
            donchian_period: self.donchian_len,
            atr_period: self.atr_len,
            atr_mult_sl: self.atr_mult_sl,
            atr_mult_trail: self.atr_mult_trail,
            trail_lookback: self.trail_lookback,
        }
    }

    pub fn risk_config(&self) -> RiskConfig {
        RiskConfig {
            risk_pct: self.risk_pct,
            min_risk_usd: self.min_risk_usd,
            leverage: self.leverage,
            atr_mult_sl: self.atr_mult_sl,
            ..Default::default()
        }
    }

    pub fn position_config(&self) -> PositionConfig {
        PositionConfig {
            atr_mult_sl: self.atr_mult_sl,
            atr_mult_trail: self.atr_mult_trail,
            trail_lookback: self.trail_lookback,
            max_adds: self.max_adds,
            pyramid_step_atr: self.pyramid_step_atr,
            add_fraction: self.pyramid_add_fraction,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(vars: &[(&str, &str)]) -> Environment {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Environment::default().source(Some(map))
    }

    #[test]
    fn test_defaults_when_unset() {
        let config = BotConfig::from_env(env(&[])).unwrap();

        assert!(config.testnet);
        assert!(config.dry_run);
        assert_eq!(config.base_equity, 20.0);
        assert_eq!(config.leverage, 30);
        assert_eq!(config.timeframe, "5m");
        assert_eq!(config.max_parallel_symbols, 6);
        assert_eq!(config.state_file, "state.json");
        assert_eq!(config.signal_config().samples_needed(), 205);
    }

    #[test]
    fn test_reads_environment() {
        let config = BotConfig::from_env(env(&[
            ("BINANCE_API_KEY", "key"),
            ("BINANCE_API_SECRET", "secret"),
            ("DRY_RUN", "false"),
            ("RISK_PCT", "0.01"),
            ("LEVERAGE", "10"),
            ("EMA_SLOW", "100"),
            ("TIMEFRAME", "15m"),
        ]))
        .unwrap();

        assert!(!config.dry_run);
        assert_eq!(config.risk_pct, 0.01);
        assert_eq!(config.leverage, 10);
        assert_eq!(config.ema_slow, 100);
        assert_eq!(config.timeframe, "15m");
        assert!(config.validate_credentials().is_ok());
    }

    #[test]
    fn test_missing_credentials_rejected() {
        let config = BotConfig::from_env(env(&[("BINANCE_API_KEY", "key")])).unwrap();
        assert!(config.validate_credentials().is_err());
    }

    #[test]
    fn test_explicit_symbols_normalized() {
        let config = BotConfig {
            symbols: " btcusdt, ETHUSDT ,,solusdt ".to_string(),
            ..Default::default()
        };
        assert_eq!(config.explicit_symbols(), vec!["BTCUSDT", "ETHUSDT", "SOLUSDT"]);

        assert!(BotConfig::default().explicit_symbols().is_empty());
    }

    #[test]
    fn test_derived_configs_share_multipliers() {
        let config = BotConfig {
            atr_mult_sl: 2.0,
            max_adds: 2,
            ..Default::default()
        };

        assert_eq!(config.risk_config().atr_mult_sl, 2.0);
        assert_eq!(config.signal_config().atr_mult_sl, 2.0);
        assert_eq!(config.position_config().max_adds, 2);
        assert_eq!(config.risk_config().margin_safety, 0.95);
    }
}
