//! Application-level configuration loading, covering economy tuning, rate
//! limits, input-analysis thresholds, and duel settlement parameters.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use tracing::{info, warn};

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "TAP_RUSH_BACK_CONFIG_PATH";

#[derive(Debug, Clone)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    /// Reward and cooldown tuning.
    pub economy: EconomyConfig,
    /// Per-action rate limits.
    pub limits: RateLimitConfig,
    /// Input-analysis thresholds.
    pub analyzer: AnalyzerConfig,
    /// Duel stake and settlement parameters.
    pub duel: DuelConfig,
}

#[derive(Debug, Clone)]
/// Tuning for the tap economy.
pub struct EconomyConfig {
    /// Currency granted per accepted tap before multipliers.
    pub base_reward: u64,
    /// Enforced pause between reward-bearing taps.
    pub tap_cooldown: Duration,
    /// Multiplier gained per consecutive streak day.
    pub streak_step: f64,
    /// Ceiling on the streak multiplier.
    pub max_streak_multiplier: f64,
    /// Idle income per hour away.
    pub offline_rate_per_hour: f64,
    /// Idle income stops accruing beyond this duration.
    pub offline_cap: Duration,
    /// Purchasable power-ups.
    pub boosts: Vec<BoostDefinition>,
}

impl EconomyConfig {
    /// Streak multiplier for a player currently on `streak_days`.
    pub fn streak_multiplier(&self, streak_days: u32) -> f64 {
        (1.0 + self.streak_step * f64::from(streak_days)).min(self.max_streak_multiplier)
    }

    /// Look up a boost definition from the catalog.
    pub fn boost(&self, id: &str) -> Option<&BoostDefinition> {
        self.boosts.iter().find(|boost| boost.id == id)
    }
}

#[derive(Debug, Clone, Deserialize)]
/// A purchasable power-up definition.
pub struct BoostDefinition {
    /// Catalog identifier.
    pub id: String,
    /// Purchase price.
    pub cost: u64,
    /// Reward multiplier while active.
    pub magnitude: f64,
    /// Active lifetime in seconds.
    pub duration_secs: u64,
}

#[derive(Debug, Clone)]
/// Per-action rate limits enforced against the cache tier.
pub struct RateLimitConfig {
    /// Accepted taps per window.
    pub taps_per_window: u32,
    /// Tap window length.
    pub tap_window: Duration,
    /// Duel queue joins per window.
    pub queue_joins_per_window: u32,
    /// Queue join window length.
    pub queue_join_window: Duration,
}

#[derive(Debug, Clone)]
/// Thresholds for the in-session input analyzer.
pub struct AnalyzerConfig {
    /// Any consecutive pair of taps closer than this is flagged.
    pub min_interval_ms: u64,
    /// Taps in the trailing second above this count are flagged.
    pub max_taps_per_second: u32,
    /// Number of trailing intervals used by the regularity check.
    pub regularity_window: usize,
    /// Coefficient of variation below this marks scripted timing.
    pub min_interval_cv: f64,
    /// Distinct-position ratio below this marks scripted pointer input.
    pub min_distinct_position_ratio: f64,
    /// Number of trailing samples used by the position check.
    pub position_window: usize,
    /// Ring capacity for retained samples.
    pub sample_capacity: usize,
    /// At most one analysis report is emitted per this interval.
    pub report_interval_ms: u64,
    /// Cumulative warnings beyond this invalidate a duel result.
    pub invalidation_warnings: u32,
}

#[derive(Debug, Clone)]
/// Duel stake, payout, and timing parameters.
pub struct DuelConfig {
    /// Stake escrowed per participant.
    pub stake: u64,
    /// Fraction of the combined stake paid to the winner.
    pub payout_fraction: f64,
    /// Contest length once started.
    pub duration: Duration,
    /// Matchmaking queue entries older than this are evicted.
    pub queue_entry_ttl: Duration,
}

impl DuelConfig {
    /// Winner's payout for this configuration.
    pub fn payout(&self) -> u64 {
        ((self.stake * 2) as f64 * self.payout_fraction).floor() as u64
    }
}

impl AppConfig {
    /// Load the application configuration from disk, falling back to the
    /// baked-in defaults when the file is absent or malformed.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<RawConfig>(&contents) {
                Ok(raw) => {
                    let config: Self = raw.into();
                    info!(path = %path.display(), "loaded configuration from file");
                    config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            economy: EconomyConfig {
                base_reward: 100,
                tap_cooldown: Duration::from_millis(1_000),
                streak_step: 0.1,
                max_streak_multiplier: 3.0,
                offline_rate_per_hour: 120.0,
                offline_cap: Duration::from_secs(8 * 3_600),
                boosts: default_boosts(),
            },
            limits: RateLimitConfig {
                taps_per_window: 30,
                tap_window: Duration::from_secs(10),
                queue_joins_per_window: 5,
                queue_join_window: Duration::from_secs(60),
            },
            analyzer: AnalyzerConfig {
                min_interval_ms: 40,
                max_taps_per_second: 12,
                regularity_window: 10,
                min_interval_cv: 0.05,
                min_distinct_position_ratio: 0.2,
                position_window: 30,
                sample_capacity: 64,
                report_interval_ms: 5_000,
                invalidation_warnings: 5,
            },
            duel: DuelConfig {
                stake: 250,
                payout_fraction: 0.9,
                duration: Duration::from_secs(90),
                queue_entry_ttl: Duration::from_secs(120),
            },
        }
    }
}

#[derive(Debug, Deserialize)]
/// JSON representation of the configuration file. Every field is optional;
/// absent fields keep their built-in default.
struct RawConfig {
    base_reward: Option<u64>,
    tap_cooldown_ms: Option<u64>,
    streak_step: Option<f64>,
    max_streak_multiplier: Option<f64>,
    offline_rate_per_hour: Option<f64>,
    offline_cap_secs: Option<u64>,
    boosts: Option<Vec<BoostDefinition>>,
    taps_per_window: Option<u32>,
    tap_window_secs: Option<u64>,
    queue_joins_per_window: Option<u32>,
    queue_join_window_secs: Option<u64>,
    min_interval_ms: Option<u64>,
    max_taps_per_second: Option<u32>,
    regularity_window: Option<usize>,
    min_interval_cv: Option<f64>,
    min_distinct_position_ratio: Option<f64>,
    invalidation_warnings: Option<u32>,
    duel_stake: Option<u64>,
    duel_payout_fraction: Option<f64>,
    duel_duration_secs: Option<u64>,
    duel_queue_entry_ttl_secs: Option<u64>,
}

impl From<RawConfig> for AppConfig {
    fn from(raw: RawConfig) -> Self {
        let mut config = AppConfig::default();

        let economy = &mut config.economy;
        if let Some(value) = raw.base_reward {
            economy.base_reward = value;
        }
        if let Some(value) = raw.tap_cooldown_ms {
            economy.tap_cooldown = Duration::from_millis(value);
        }
        if let Some(value) = raw.streak_step {
            economy.streak_step = value;
        }
        if let Some(value) = raw.max_streak_multiplier {
            economy.max_streak_multiplier = value;
        }
        if let Some(value) = raw.offline_rate_per_hour {
            economy.offline_rate_per_hour = value;
        }
        if let Some(value) = raw.offline_cap_secs {
            economy.offline_cap = Duration::from_secs(value);
        }
        if let Some(value) = raw.boosts {
            economy.boosts = value;
        }

        let limits = &mut config.limits;
        if let Some(value) = raw.taps_per_window {
            limits.taps_per_window = value;
        }
        if let Some(value) = raw.tap_window_secs {
            limits.tap_window = Duration::from_secs(value);
        }
        if let Some(value) = raw.queue_joins_per_window {
            limits.queue_joins_per_window = value;
        }
        if let Some(value) = raw.queue_join_window_secs {
            limits.queue_join_window = Duration::from_secs(value);
        }

        let analyzer = &mut config.analyzer;
        if let Some(value) = raw.min_interval_ms {
            analyzer.min_interval_ms = value;
        }
        if let Some(value) = raw.max_taps_per_second {
            analyzer.max_taps_per_second = value;
        }
        if let Some(value) = raw.regularity_window {
            analyzer.regularity_window = value;
        }
        if let Some(value) = raw.min_interval_cv {
            analyzer.min_interval_cv = value;
        }
        if let Some(value) = raw.min_distinct_position_ratio {
            analyzer.min_distinct_position_ratio = value;
        }
        if let Some(value) = raw.invalidation_warnings {
            analyzer.invalidation_warnings = value;
        }

        let duel = &mut config.duel;
        if let Some(value) = raw.duel_stake {
            duel.stake = value;
        }
        if let Some(value) = raw.duel_payout_fraction {
            duel.payout_fraction = value;
        }
        if let Some(value) = raw.duel_duration_secs {
            duel.duration = Duration::from_secs(value);
        }
        if let Some(value) = raw.duel_queue_entry_ttl_secs {
            duel.queue_entry_ttl = Duration::from_secs(value);
        }

        config
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

/// Built-in boost catalog shipped with the binary.
fn default_boosts() -> Vec<BoostDefinition> {
    vec![
        BoostDefinition {
            id: "double_tap".into(),
            cost: 500,
            magnitude: 2.0,
            duration_secs: 30 * 60,
        },
        BoostDefinition {
            id: "frenzy".into(),
            cost: 2_000,
            magnitude: 3.0,
            duration_secs: 10 * 60,
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn streak_multiplier_scales_and_caps() {
        let config = AppConfig::default();
        assert_eq!(config.economy.streak_multiplier(0), 1.0);
        assert_eq!(config.economy.streak_multiplier(5), 1.5);
        assert_eq!(
            config.economy.streak_multiplier(1_000),
            config.economy.max_streak_multiplier
        );
    }

    #[test]
    fn payout_is_fraction_of_combined_stake() {
        let config = AppConfig::default();
        assert_eq!(config.duel.payout(), 450);
    }

    #[test]
    fn raw_overrides_merge_into_defaults() {
        let raw: RawConfig =
            serde_json::from_str(r#"{"base_reward": 250, "duel_stake": 10}"#).unwrap();
        let config: AppConfig = raw.into();
        assert_eq!(config.economy.base_reward, 250);
        assert_eq!(config.duel.stake, 10);
        // Untouched values keep their defaults.
        assert_eq!(config.limits.taps_per_window, 30);
    }
}
