use serde::Deserialize;
use std::env;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub engine: EngineRules,
}

/// Business tunables for the reservation engine. Fees are whole currency
/// units; the tax rate is in basis points.
#[derive(Debug, Deserialize, Clone)]
pub struct EngineRules {
    #[serde(default = "default_reservation_fee")]
    pub reservation_fee: i64,
    #[serde(default = "default_service_tax_bps")]
    pub service_tax_bps: i64,
    #[serde(default = "default_max_group_size")]
    pub max_group_size: u32,
    /// RAC slots opened per class unless the schedule says otherwise.
    #[serde(default = "default_rac_capacity")]
    pub default_rac_capacity: u32,
    /// Waitlisted-passenger cap per class.
    #[serde(default = "default_waitlist_cap")]
    pub default_waitlist_cap: u32,
    /// PNR regeneration attempts before giving up on a collision streak.
    #[serde(default = "default_pnr_max_attempts")]
    pub pnr_max_attempts: u32,
    /// Pending bookings older than this are swept back into inventory.
    #[serde(default = "default_payment_window")]
    pub payment_window_seconds: u64,
}

fn default_reservation_fee() -> i64 {
    15
}
fn default_service_tax_bps() -> i64 {
    500
}
fn default_max_group_size() -> u32 {
    6
}
fn default_rac_capacity() -> u32 {
    20
}
fn default_waitlist_cap() -> u32 {
    45
}
fn default_pnr_max_attempts() -> u32 {
    8
}
fn default_payment_window() -> u64 {
    900
}

impl Default for EngineRules {
    fn default() -> Self {
        Self {
            reservation_fee: default_reservation_fee(),
            service_tax_bps: default_service_tax_bps(),
            max_group_size: default_max_group_size(),
            default_rac_capacity: default_rac_capacity(),
            default_waitlist_cap: default_waitlist_cap(),
            pnr_max_attempts: default_pnr_max_attempts(),
            payment_window_seconds: default_payment_window(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            engine: EngineRules::default(),
        }
    }
}

impl Config {
    /// Layered load: `config/default`, then `config/{RUN_MODE}`, then
    /// `config/local`, then `RAILBOOK__*` environment variables. Every file
    /// is optional; defaults cover anything unset.
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(config::Environment::with_prefix("RAILBOOK").separator("__"))
            .build()?;

        s.try_deserialize()
    }
}
