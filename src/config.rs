//! Application-level configuration loading for game tunables.

use std::{env, fs, io::ErrorKind, ops::RangeInclusive, path::PathBuf};

use serde::Deserialize;
use tracing::{info, warn};

/// Default location on disk where the server looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/app.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "PARTY_MISSIONS_BACK_CONFIG_PATH";

const DEFAULT_BONUS_MIN: i32 = 5;
const DEFAULT_BONUS_MAX: i32 = 20;
const DEFAULT_ROOM_EVENT_COUNT: u32 = 2;

#[derive(Debug, Clone)]
/// Immutable runtime configuration shared across the application.
pub struct AppConfig {
    bonus_points_min: i32,
    bonus_points_max: i32,
    room_event_count: u32,
}

impl AppConfig {
    /// Load the application configuration from disk, falling back to the
    /// baked-in defaults.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<RawConfig>(&contents) {
                Ok(raw) => {
                    let app_config: Self = raw.into();
                    info!(path = %path.display(), "loaded game tunables from config");
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

    /// Inclusive range the victory bonus is drawn from.
    pub fn bonus_range(&self) -> RangeInclusive<i32> {
        self.bonus_points_min..=self.bonus_points_max
    }

    /// How many events the phase coordinator schedules per room.
    pub fn room_event_count(&self) -> u32 {
        self.room_event_count
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bonus_points_min: DEFAULT_BONUS_MIN,
            bonus_points_max: DEFAULT_BONUS_MAX,
            room_event_count: DEFAULT_ROOM_EVENT_COUNT,
        }
    }
}

#[derive(Debug, Deserialize)]
/// JSON representation of the configuration file located at
/// [`DEFAULT_CONFIG_PATH`].
struct RawConfig {
    bonus_points_min: Option<i32>,
    bonus_points_max: Option<i32>,
    room_event_count: Option<u32>,
}

impl From<RawConfig> for AppConfig {
    fn from(value: RawConfig) -> Self {
        let defaults = AppConfig::default();
        let mut min = value.bonus_points_min.unwrap_or(defaults.bonus_points_min);
        let mut max = value.bonus_points_max.unwrap_or(defaults.bonus_points_max);
        if min > max {
            warn!(min, max, "bonus range is inverted; swapping bounds");
            std::mem::swap(&mut min, &mut max);
        }

        Self {
            bonus_points_min: min,
            bonus_points_max: max,
            room_event_count: value
                .room_event_count
                .unwrap_or(defaults.room_event_count),
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
    fn inverted_bonus_range_is_repaired() {
        let raw = RawConfig {
            bonus_points_min: Some(30),
            bonus_points_max: Some(10),
            room_event_count: None,
        };
        let config: AppConfig = raw.into();
        assert_eq!(config.bonus_range(), 10..=30);
        assert_eq!(config.room_event_count(), DEFAULT_ROOM_EVENT_COUNT);
    }
}
