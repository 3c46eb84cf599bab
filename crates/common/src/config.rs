//! Application configuration.

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

/// Application configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Database configuration.
    pub database: DatabaseConfig,
    /// Warning escalation policy.
    #[serde(default)]
    pub warnings: WarningPolicy,
    /// Background sweep intervals.
    #[serde(default)]
    pub scheduler: SchedulerSettings,
    /// Unit suffixes used when parsing and formatting durations.
    #[serde(default)]
    pub time_units: TimeUnitsConfig,
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Database connection configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Connection URL (`postgres://…` or `sqlite://…`).
    pub url: String,
    /// Maximum number of connections in the pool.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Minimum number of connections in the pool.
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,
}

/// What happens to a subject's current warning when a new one is issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExpirationMode {
    /// The previous warning is superseded for good.
    #[default]
    Unique,
    /// The previous warning is paused and resumes once the newer one is removed.
    Incremental,
}

impl ExpirationMode {
    /// Whether removed warnings should hand over to a paused predecessor.
    #[must_use]
    pub const fn resumes_paused(self) -> bool {
        matches!(self, Self::Incremental)
    }
}

/// Configuration of a single warning level.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct WarnLevelConfig {
    /// Expiration spec (`"1d"`, `"2h 30m"`, `"permanent"`).
    #[serde(default = "default_expiration")]
    pub expiration: String,
    /// Actions handed to the hook executor when the level is reached.
    #[serde(default)]
    pub on_warn: Vec<String>,
    /// Actions handed to the hook executor when the level expires.
    #[serde(default)]
    pub on_expire: Vec<String>,
}

impl Default for WarnLevelConfig {
    fn default() -> Self {
        Self {
            expiration: default_expiration(),
            on_warn: Vec::new(),
            on_expire: Vec::new(),
        }
    }
}

/// Warning escalation policy.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WarningPolicy {
    /// Expiration mode applied to the previous warning on escalation.
    #[serde(default)]
    pub expiration_mode: ExpirationMode,
    /// Level configuration keyed by level number.
    #[serde(default)]
    pub levels: BTreeMap<String, WarnLevelConfig>,
}

impl WarningPolicy {
    /// Create a policy from a mode and an ordered list of levels, starting at level 1.
    #[must_use]
    pub fn new(expiration_mode: ExpirationMode, levels: Vec<WarnLevelConfig>) -> Self {
        let levels = levels
            .into_iter()
            .enumerate()
            .map(|(i, level)| ((i + 1).to_string(), level))
            .collect();
        Self {
            expiration_mode,
            levels,
        }
    }

    /// Look up the configuration of a level.
    #[must_use]
    pub fn level(&self, level: u32) -> Option<&WarnLevelConfig> {
        self.levels.get(&level.to_string())
    }
}

/// Background sweep intervals.
#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerSettings {
    /// Interval of the expired-warning sweep.
    #[serde(default = "default_warning_sweep")]
    pub warning_sweep_interval_secs: u64,
    /// Interval of the mute/softban table sweep.
    #[serde(default = "default_live_sweep")]
    pub live_sweep_interval_secs: u64,
    /// Interval of the ban/kick/freeze reconciliation sweep.
    #[serde(default = "default_reconcile")]
    pub reconcile_interval_secs: u64,
}

impl SchedulerSettings {
    /// Warning sweep interval as a [`Duration`].
    #[must_use]
    pub const fn warning_sweep_interval(&self) -> Duration {
        Duration::from_secs(non_zero_secs(self.warning_sweep_interval_secs))
    }

    /// Live-table sweep interval as a [`Duration`].
    #[must_use]
    pub const fn live_sweep_interval(&self) -> Duration {
        Duration::from_secs(non_zero_secs(self.live_sweep_interval_secs))
    }

    /// Reconciliation sweep interval as a [`Duration`].
    #[must_use]
    pub const fn reconcile_interval(&self) -> Duration {
        Duration::from_secs(non_zero_secs(self.reconcile_interval_secs))
    }
}

/// Zero is not a usable period; it is treated as one second.
const fn non_zero_secs(secs: u64) -> u64 {
    if secs == 0 { 1 } else { secs }
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            warning_sweep_interval_secs: default_warning_sweep(),
            live_sweep_interval_secs: default_live_sweep(),
            reconcile_interval_secs: default_reconcile(),
        }
    }
}

/// Unit suffixes for durations.
#[derive(Debug, Clone, Deserialize)]
pub struct TimeUnitsConfig {
    #[serde(default = "default_years")]
    pub years: String,
    #[serde(default = "default_months")]
    pub months: String,
    #[serde(default = "default_days")]
    pub days: String,
    #[serde(default = "default_hours")]
    pub hours: String,
    #[serde(default = "default_minutes")]
    pub minutes: String,
    #[serde(default = "default_seconds")]
    pub seconds: String,
    /// Display text for durations that never end.
    #[serde(default = "default_permanent")]
    pub permanent: String,
}

impl Default for TimeUnitsConfig {
    fn default() -> Self {
        Self {
            years: default_years(),
            months: default_months(),
            days: default_days(),
            hours: default_hours(),
            minutes: default_minutes(),
            seconds: default_seconds(),
            permanent: default_permanent(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoggingConfig {
    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

const fn default_max_connections() -> u32 {
    10
}

const fn default_min_connections() -> u32 {
    1
}

fn default_expiration() -> String {
    "permanent".to_string()
}

const fn default_warning_sweep() -> u64 {
    30
}

const fn default_live_sweep() -> u64 {
    300
}

const fn default_reconcile() -> u64 {
    600
}

fn default_years() -> String {
    "y".to_string()
}

fn default_months() -> String {
    "mo".to_string()
}

fn default_days() -> String {
    "d".to_string()
}

fn default_hours() -> String {
    "h".to_string()
}

fn default_minutes() -> String {
    "m".to_string()
}

fn default_seconds() -> String {
    "s".to_string()
}

fn default_permanent() -> String {
    "Permanent".to_string()
}

impl Config {
    /// Load configuration from files and environment variables.
    ///
    /// Configuration is loaded in the following order:
    /// 1. `config/default.toml`
    /// 2. `config/{environment}.toml` (based on `SANCTION_ENV`)
    /// 3. Environment variables with `SANCTION_` prefix
    pub fn load() -> Result<Self, config::ConfigError> {
        let env = std::env::var("SANCTION_ENV").unwrap_or_else(|_| "development".to_string());

        let config = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(config::File::with_name(&format!("config/{env}")).required(false))
            .add_source(
                config::Environment::with_prefix("SANCTION")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Load configuration from a specific file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, config::ConfigError> {
        let config = config::Config::builder()
            .add_source(config::File::from(path.as_ref()))
            .add_source(
                config::Environment::with_prefix("SANCTION")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"
[database]
url = "sqlite::memory:"

[warnings]
expiration_mode = "incremental"

[warnings.levels.1]
expiration = "1d"
on_warn = ["message {target} first warning"]

[warnings.levels.2]
expiration = "3d"
on_warn = ["mute {target} 1h {reason}"]
on_expire = ["message {target} level 2 expired"]

[scheduler]
warning_sweep_interval_secs = 15
"#;

    #[test]
    fn test_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let config = Config::from_file(file.path()).unwrap();

        assert_eq!(config.database.url, "sqlite::memory:");
        assert_eq!(config.database.max_connections, 10);
        assert_eq!(config.warnings.expiration_mode, ExpirationMode::Incremental);
        assert_eq!(config.warnings.level(2).unwrap().expiration, "3d");
        assert_eq!(config.warnings.level(2).unwrap().on_expire.len(), 1);
        assert!(config.warnings.level(3).is_none());
        assert_eq!(config.scheduler.warning_sweep_interval(), Duration::from_secs(15));
        assert_eq!(config.scheduler.live_sweep_interval_secs, 300);
        assert_eq!(config.time_units.days, "d");
        assert!(!config.logging.json);
    }

    #[test]
    fn test_policy_new_numbers_levels_from_one() {
        let policy = WarningPolicy::new(
            ExpirationMode::Unique,
            vec![
                WarnLevelConfig {
                    expiration: "1h".into(),
                    ..Default::default()
                },
                WarnLevelConfig::default(),
            ],
        );
        assert_eq!(policy.level(1).unwrap().expiration, "1h");
        assert_eq!(policy.level(2).unwrap().expiration, "permanent");
        assert!(policy.level(0).is_none());
        assert!(!policy.expiration_mode.resumes_paused());
    }

    #[test]
    fn test_scheduler_defaults() {
        let settings = SchedulerSettings::default();
        assert_eq!(settings.warning_sweep_interval(), Duration::from_secs(30));
        assert_eq!(settings.reconcile_interval(), Duration::from_secs(600));
    }

    #[test]
    fn test_scheduler_zero_interval_becomes_one_second() {
        let settings = SchedulerSettings {
            warning_sweep_interval_secs: 0,
            live_sweep_interval_secs: 0,
            reconcile_interval_secs: 45,
        };
        assert_eq!(settings.warning_sweep_interval(), Duration::from_secs(1));
        assert_eq!(settings.live_sweep_interval(), Duration::from_secs(1));
        assert_eq!(settings.reconcile_interval(), Duration::from_secs(45));
    }
}
