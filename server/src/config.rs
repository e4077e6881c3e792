use std::path::PathBuf;

use chrono::Duration;

/// Server configuration sourced from the environment (plus whatever the
/// dotenv file provides). `DATABASE_URL` is read separately in `main` since
/// only the production store needs it.
#[derive(Debug, Clone)]
pub(crate) struct AppConfig {
    pub(crate) bind_addr: String,
    /// How long after round end submissions are still admitted before
    /// scoring is forced.
    pub(crate) grace_period: Duration,
    /// Lead time between a round being announced and play starting.
    pub(crate) countdown: Duration,
    pub(crate) default_round_minutes: i32,
    pub(crate) stats_enabled: bool,
    pub(crate) dice_dir: PathBuf,
    pub(crate) dictionary_dir: PathBuf,
}

impl AppConfig {
    pub(crate) fn from_env() -> Self {
        Self {
            bind_addr: var_or("BIND_ADDR", "0.0.0.0:3000"),
            grace_period: Duration::seconds(parsed_var("GRACE_PERIOD_SECONDS", 10)),
            countdown: Duration::seconds(parsed_var("DEFAULT_COUNTDOWN_SECONDS", 15)),
            default_round_minutes: parsed_var("ROUND_DURATION_MINUTES", 3),
            stats_enabled: parsed_var("STATS_ENABLED", false),
            dice_dir: PathBuf::from(var_or("DICE_DIR", "dice")),
            dictionary_dir: PathBuf::from(var_or("DICTIONARY_DIR", "dictionaries")),
        }
    }
}

fn var_or(name: &str, default: &str) -> String {
    dotenvy::var(name).unwrap_or_else(|_| default.to_owned())
}

fn parsed_var<T: std::str::FromStr>(name: &str, default: T) -> T {
    match dotenvy::var(name) {
        Ok(raw) => raw.parse().unwrap_or_else(|_| {
            tracing::warn!(var = name, value = %raw, "unparseable setting, using default");
            default
        }),
        Err(_) => default,
    }
}
