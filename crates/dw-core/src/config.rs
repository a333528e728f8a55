//! Scoring configuration and the provider seam it is read through.

use chrono::{NaiveTime, Timelike};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::wellness::WellnessLevel;

/// Invalid scoring configuration. Never clamped silently.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("daily time limit must be positive")]
    ZeroDailyLimit,

    #[error("time limit zero-point multiple must be finite and greater than 1.0, got {value}")]
    InvalidZeroMultiple { value: f64 },

    #[error("{field} must be positive")]
    ZeroThreshold { field: &'static str },

    #[error("sleep window must be between 1 and 1440 minutes, got {minutes}")]
    InvalidSleepWindow { minutes: u32 },

    #[error(
        "level boundaries must satisfy 0 < explorer < balanced < master <= 100, \
         got explorer={explorer} balanced={balanced} master={master}"
    )]
    InvalidLevelBoundaries {
        explorer: u32,
        balanced: u32,
        master: u32,
    },
}

/// Daily screen-time limit and the point where the time-limit score reaches zero.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DailyTimeLimit {
    pub limit_minutes: u32,
    /// Usage at `limit × zero_multiple` or above scores 0.
    pub zero_multiple: f64,
}

impl Default for DailyTimeLimit {
    fn default() -> Self {
        Self {
            limit_minutes: 180,
            zero_multiple: 2.0,
        }
    }
}

impl DailyTimeLimit {
    #[must_use]
    pub fn limit_ms(&self) -> i64 {
        i64::from(self.limit_minutes) * 60_000
    }
}

/// What counts as a focus session and how many earn full marks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FocusThresholds {
    pub min_session_minutes: u32,
    pub session_cap: u32,
}

impl Default for FocusThresholds {
    fn default() -> Self {
        Self {
            min_session_minutes: 25,
            session_cap: 4,
        }
    }
}

impl FocusThresholds {
    #[must_use]
    pub fn min_session_ms(&self) -> i64 {
        i64::from(self.min_session_minutes) * 60_000
    }
}

/// What counts as a break between sessions and how many earn full marks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BreakThresholds {
    pub min_break_minutes: u32,
    pub break_cap: u32,
}

impl Default for BreakThresholds {
    fn default() -> Self {
        Self {
            min_break_minutes: 10,
            break_cap: 6,
        }
    }
}

impl BreakThresholds {
    #[must_use]
    pub fn min_break_ms(&self) -> i64 {
        i64::from(self.min_break_minutes) * 60_000
    }
}

/// The pre-sleep window in which usage is penalized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SleepWindow {
    #[serde(with = "hhmm")]
    pub bedtime: NaiveTime,
    pub window_minutes: u32,
    /// Usage in the window at which the score reaches zero; defaults to the window length.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zero_after_minutes: Option<u32>,
}

impl Default for SleepWindow {
    fn default() -> Self {
        Self {
            bedtime: NaiveTime::from_hms_opt(23, 0, 0).unwrap_or(NaiveTime::MIN),
            window_minutes: 120,
            zero_after_minutes: None,
        }
    }
}

impl SleepWindow {
    #[must_use]
    pub fn window_ms(&self) -> i64 {
        i64::from(self.window_minutes) * 60_000
    }

    #[must_use]
    pub fn zero_after_ms(&self) -> i64 {
        i64::from(self.zero_after_minutes.unwrap_or(self.window_minutes)) * 60_000
    }

    /// Bedtimes before noon fall on the morning after the evening they end.
    #[must_use]
    pub fn bedtime_after_midnight(&self) -> bool {
        self.bedtime.hour() < 12
    }
}

/// Lower bounds of the explorer, balanced and master bands.
///
/// Sprout covers `[0, explorer)`, master covers `[master, 100]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LevelBoundaries {
    pub explorer: u32,
    pub balanced: u32,
    pub master: u32,
}

impl Default for LevelBoundaries {
    fn default() -> Self {
        Self {
            explorer: 40,
            balanced: 60,
            master: 80,
        }
    }
}

impl LevelBoundaries {
    /// Checks that the bands partition `[0, 100]`.
    pub const fn validate(&self) -> Result<(), ConfigError> {
        if self.explorer == 0
            || self.explorer >= self.balanced
            || self.balanced >= self.master
            || self.master > 100
        {
            return Err(ConfigError::InvalidLevelBoundaries {
                explorer: self.explorer,
                balanced: self.balanced,
                master: self.master,
            });
        }
        Ok(())
    }

    /// Maps a total score to its band.
    #[must_use]
    pub const fn level_for(&self, total: u32) -> WellnessLevel {
        if total >= self.master {
            WellnessLevel::Master
        } else if total >= self.balanced {
            WellnessLevel::Balanced
        } else if total >= self.explorer {
            WellnessLevel::Explorer
        } else {
            WellnessLevel::Sprout
        }
    }
}

/// Everything the wellness scorer needs, validated.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringConfig {
    pub time_limit: DailyTimeLimit,
    pub focus: FocusThresholds,
    pub breaks: BreakThresholds,
    pub sleep: SleepWindow,
    pub levels: LevelBoundaries,
}

impl ScoringConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.time_limit.limit_minutes == 0 {
            return Err(ConfigError::ZeroDailyLimit);
        }
        let multiple = self.time_limit.zero_multiple;
        if !multiple.is_finite() || multiple <= 1.0 {
            return Err(ConfigError::InvalidZeroMultiple { value: multiple });
        }
        if self.focus.min_session_minutes == 0 {
            return Err(ConfigError::ZeroThreshold {
                field: "focus.min_session_minutes",
            });
        }
        if self.focus.session_cap == 0 {
            return Err(ConfigError::ZeroThreshold {
                field: "focus.session_cap",
            });
        }
        if self.breaks.min_break_minutes == 0 {
            return Err(ConfigError::ZeroThreshold {
                field: "breaks.min_break_minutes",
            });
        }
        if self.breaks.break_cap == 0 {
            return Err(ConfigError::ZeroThreshold {
                field: "breaks.break_cap",
            });
        }
        if !(1..=1440).contains(&self.sleep.window_minutes) {
            return Err(ConfigError::InvalidSleepWindow {
                minutes: self.sleep.window_minutes,
            });
        }
        if self.sleep.zero_after_minutes == Some(0) {
            return Err(ConfigError::ZeroThreshold {
                field: "sleep.zero_after_minutes",
            });
        }
        self.levels.validate()
    }
}

/// Read-only access to the current scoring configuration.
///
/// Values may change between runs; the orchestrator re-reads them for every date.
pub trait ConfigProvider: Send + Sync {
    fn daily_time_limit(&self) -> DailyTimeLimit;

    fn focus_thresholds(&self) -> FocusThresholds;

    fn break_thresholds(&self) -> BreakThresholds;

    fn sleep_window(&self) -> SleepWindow;

    fn score_level_boundaries(&self) -> LevelBoundaries;

    /// Snapshots every value and validates the combination.
    fn scoring_config(&self) -> Result<ScoringConfig, ConfigError> {
        let config = ScoringConfig {
            time_limit: self.daily_time_limit(),
            focus: self.focus_thresholds(),
            breaks: self.break_thresholds(),
            sleep: self.sleep_window(),
            levels: self.score_level_boundaries(),
        };
        config.validate()?;
        Ok(config)
    }
}

impl ConfigProvider for ScoringConfig {
    fn daily_time_limit(&self) -> DailyTimeLimit {
        self.time_limit
    }

    fn focus_thresholds(&self) -> FocusThresholds {
        self.focus
    }

    fn break_thresholds(&self) -> BreakThresholds {
        self.breaks
    }

    fn sleep_window(&self) -> SleepWindow {
        self.sleep
    }

    fn score_level_boundaries(&self) -> LevelBoundaries {
        self.levels
    }
}

/// `"HH:MM"` (de)serialization for wall-clock times.
mod hhmm {
    use chrono::NaiveTime;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(time: &NaiveTime, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&time.format("%H:%M").to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<NaiveTime, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        NaiveTime::parse_from_str(&s, "%H:%M")
            .or_else(|_| NaiveTime::parse_from_str(&s, "%H:%M:%S"))
            .map_err(|e| serde::de::Error::custom(format!("invalid time {s:?}: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert_eq!(ScoringConfig::default().validate(), Ok(()));
    }

    #[test]
    fn overlapping_level_bands_are_rejected() {
        let mut config = ScoringConfig::default();
        config.levels = LevelBoundaries {
            explorer: 60,
            balanced: 60,
            master: 80,
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidLevelBoundaries { .. })
        ));
    }

    #[test]
    fn level_bands_must_fit_in_range() {
        let over = LevelBoundaries {
            explorer: 40,
            balanced: 60,
            master: 101,
        };
        assert!(over.validate().is_err());
        let zero = LevelBoundaries {
            explorer: 0,
            balanced: 60,
            master: 80,
        };
        assert!(zero.validate().is_err());
    }

    #[test]
    fn level_for_covers_boundaries() {
        let levels = LevelBoundaries::default();
        assert_eq!(levels.level_for(0), WellnessLevel::Sprout);
        assert_eq!(levels.level_for(39), WellnessLevel::Sprout);
        assert_eq!(levels.level_for(40), WellnessLevel::Explorer);
        assert_eq!(levels.level_for(59), WellnessLevel::Explorer);
        assert_eq!(levels.level_for(60), WellnessLevel::Balanced);
        assert_eq!(levels.level_for(79), WellnessLevel::Balanced);
        assert_eq!(levels.level_for(80), WellnessLevel::Master);
        assert_eq!(levels.level_for(100), WellnessLevel::Master);
    }

    #[test]
    fn zero_multiple_must_exceed_one() {
        let mut config = ScoringConfig::default();
        config.time_limit.zero_multiple = 1.0;
        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidZeroMultiple { value: 1.0 })
        );
        config.time_limit.zero_multiple = f64::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_caps_are_rejected() {
        let mut config = ScoringConfig::default();
        config.focus.session_cap = 0;
        assert_eq!(
            config.validate(),
            Err(ConfigError::ZeroThreshold {
                field: "focus.session_cap"
            })
        );
    }

    #[test]
    fn bedtime_parses_hour_minute() {
        let json = r#"{"bedtime":"22:30","window_minutes":90}"#;
        let window: SleepWindow = serde_json::from_str(json).unwrap();
        assert_eq!(window.bedtime, NaiveTime::from_hms_opt(22, 30, 0).unwrap());
        assert_eq!(window.zero_after_ms(), 90 * 60_000);
        assert_eq!(
            serde_json::to_value(window).unwrap()["bedtime"],
            serde_json::json!("22:30")
        );
    }

    #[test]
    fn provider_snapshot_validates() {
        let mut config = ScoringConfig::default();
        config.time_limit.limit_minutes = 0;
        assert_eq!(config.scoring_config(), Err(ConfigError::ZeroDailyLimit));
    }
}
