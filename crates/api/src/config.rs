//! Process configuration from environment variables, with dev defaults.

use std::time::Duration;

pub const DEFAULT_ADDR: &str = "0.0.0.0:8080";
pub const DEFAULT_TAX_RATE_BPS: u32 = 0;
pub const DEFAULT_SERVICE_FEE_CENTS: u64 = 0;
pub const DEFAULT_CURRENCY: &str = "MAD";
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 60;

#[derive(Debug, Clone)]
pub struct Config {
    /// Listen address (`LASTBASKET_ADDR`).
    pub addr: String,
    /// Tax rate in basis points applied to order subtotals (`TAX_RATE_BPS`).
    pub tax_rate_bps: u32,
    /// Flat per-order service fee in cents (`SERVICE_FEE_CENTS`).
    pub service_fee_cents: u64,
    /// Currency code stamped on order pricing (`CURRENCY`).
    pub currency: String,
    /// Basket expiry sweep period (`EXPIRY_SWEEP_INTERVAL_SECS`).
    pub expiry_sweep_interval: Duration,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            addr: env_or("LASTBASKET_ADDR", DEFAULT_ADDR),
            tax_rate_bps: env_parsed("TAX_RATE_BPS", DEFAULT_TAX_RATE_BPS),
            service_fee_cents: env_parsed("SERVICE_FEE_CENTS", DEFAULT_SERVICE_FEE_CENTS),
            currency: env_or("CURRENCY", DEFAULT_CURRENCY),
            expiry_sweep_interval: Duration::from_secs(env_parsed(
                "EXPIRY_SWEEP_INTERVAL_SECS",
                DEFAULT_SWEEP_INTERVAL_SECS,
            )),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            addr: DEFAULT_ADDR.to_string(),
            tax_rate_bps: DEFAULT_TAX_RATE_BPS,
            service_fee_cents: DEFAULT_SERVICE_FEE_CENTS,
            currency: DEFAULT_CURRENCY.to_string(),
            expiry_sweep_interval: Duration::from_secs(DEFAULT_SWEEP_INTERVAL_SECS),
        }
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parsed<T: core::str::FromStr>(key: &str, default: T) -> T {
    match std::env::var(key) {
        Ok(raw) => match raw.parse() {
            Ok(value) => value,
            Err(_) => {
                tracing::warn!(key, raw, "unparseable config value, using default");
                default
            }
        },
        Err(_) => default,
    }
}
