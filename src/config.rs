//! Application-level configuration loading, including the activity catalog and engine tunables.

use std::{env, fs, io::ErrorKind, path::PathBuf, sync::Arc, time::Duration};

use serde::Deserialize;
use serde_with::{DurationMilliSeconds, serde_as};
use tracing::{info, warn};

use crate::state::{
    catalog::{Activity, ActivityCatalog, WinnerMetric},
    sync_engine::{DEFAULT_DEBOUNCE, DEFAULT_MAX_PLAYERS, EngineSettings},
};

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "SCOREBOARD_SYNC_CONFIG_PATH";

#[derive(Debug, Clone)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    catalog: ActivityCatalog,
    max_players: usize,
    debounce: Duration,
}

impl AppConfig {
    /// Load the application configuration from disk, falling back to the built-in catalog.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match Self::from_json(&contents) {
                Ok(app_config) => {
                    info!(
                        path = %path.display(),
                        activities = app_config.catalog.activities().len(),
                        max_players = app_config.max_players,
                        "loaded activity catalog from config"
                    );
                    app_config
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

    fn from_json(contents: &str) -> serde_json::Result<Self> {
        serde_json::from_str::<RawConfig>(contents).map(Into::into)
    }

    /// Tunables handed to the sync engine.
    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            catalog: Arc::new(self.catalog.clone()),
            max_players: self.max_players,
            debounce: self.debounce,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            catalog: ActivityCatalog::default(),
            max_players: DEFAULT_MAX_PLAYERS,
            debounce: DEFAULT_DEBOUNCE,
        }
    }
}

#[serde_as]
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
/// JSON representation of the configuration file located at [`DEFAULT_CONFIG_PATH`].
///
/// Every section is optional; missing sections keep the built-in value.
struct RawConfig {
    activities: Option<Vec<Activity>>,
    winner_metrics: Option<Vec<WinnerMetric>>,
    max_players: Option<usize>,
    #[serde_as(as = "Option<DurationMilliSeconds<u64>>")]
    debounce_ms: Option<Duration>,
}

impl From<RawConfig> for AppConfig {
    fn from(value: RawConfig) -> Self {
        let defaults = ActivityCatalog::default();
        let activities = value
            .activities
            .filter(|activities| !activities.is_empty())
            .unwrap_or_else(|| defaults.activities().to_vec());
        let winner_metrics = value
            .winner_metrics
            .unwrap_or_else(|| defaults.winner_metrics().to_vec());

        Self {
            catalog: ActivityCatalog::new(activities, winner_metrics),
            max_players: value
                .max_players
                .filter(|max| *max > 0)
                .unwrap_or(DEFAULT_MAX_PLAYERS),
            debounce: value.debounce_ms.unwrap_or(DEFAULT_DEBOUNCE),
        }
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_config_keeps_defaults_for_missing_sections() {
        let config = AppConfig::from_json(r#"{ "max_players": 4, "debounce_ms": 50 }"#).unwrap();
        let settings = config.engine_settings();

        assert_eq!(settings.max_players, 4);
        assert_eq!(settings.debounce, Duration::from_millis(50));
        assert_eq!(*settings.catalog, ActivityCatalog::default());
    }

    #[test]
    fn custom_activities_replace_the_catalog() {
        let config = AppConfig::from_json(
            r#"{
                "activities": [
                    { "id": "yoga", "label": "YOGA", "unit": "min",
                      "daily_target": 30, "week_target": 150, "max": 300 }
                ],
                "max_players": 0
            }"#,
        )
        .unwrap();

        assert_eq!(config.catalog.activities().len(), 1);
        assert_eq!(config.catalog.bound("yoga"), 300.0);
        assert_eq!(config.max_players, DEFAULT_MAX_PLAYERS);
    }

    #[test]
    fn malformed_json_is_an_error() {
        assert!(AppConfig::from_json("{ not json").is_err());
    }
}
