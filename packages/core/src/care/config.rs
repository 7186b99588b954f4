//! Cadence policy for postpartum monitoring

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::care::error::CareError;

pub const DEFAULT_IMMEDIATE_INTERVAL_MINUTES: i64 = 15;
pub const DEFAULT_IMMEDIATE_WINDOW_MINUTES: i64 = 120;
pub const DEFAULT_IMMEDIATE_OBSERVATION_TARGET: u32 = 8;
pub const DEFAULT_SHIFT_FREQUENCY_MINUTES: i64 = 240;
pub const MIN_SHIFT_FREQUENCY_MINUTES: i64 = 60;
pub const MAX_SHIFT_FREQUENCY_MINUTES: i64 = 480;

/// Timing constants that drive the schedule phase engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitoringPolicy {
    /// Minutes between checks while in the immediate phase.
    pub immediate_interval_minutes: i64,
    /// Length of the immediate window measured from delivery.
    pub immediate_window_minutes: i64,
    /// Checks required to complete the immediate phase.
    pub immediate_observation_target: u32,
    pub default_shift_frequency_minutes: i64,
    pub min_shift_frequency_minutes: i64,
    pub max_shift_frequency_minutes: i64,
}

impl Default for MonitoringPolicy {
    fn default() -> Self {
        Self {
            immediate_interval_minutes: DEFAULT_IMMEDIATE_INTERVAL_MINUTES,
            immediate_window_minutes: DEFAULT_IMMEDIATE_WINDOW_MINUTES,
            immediate_observation_target: DEFAULT_IMMEDIATE_OBSERVATION_TARGET,
            default_shift_frequency_minutes: DEFAULT_SHIFT_FREQUENCY_MINUTES,
            min_shift_frequency_minutes: MIN_SHIFT_FREQUENCY_MINUTES,
            max_shift_frequency_minutes: MAX_SHIFT_FREQUENCY_MINUTES,
        }
    }
}

impl MonitoringPolicy {
    /// Reject policies the engine cannot honour.
    pub fn validate(&self) -> Result<(), CareError> {
        if self.immediate_interval_minutes < 1 {
            return Err(CareError::validation(
                "immediate interval must be at least one minute",
            ));
        }
        if self.immediate_window_minutes < 1 {
            return Err(CareError::validation(
                "immediate window must be at least one minute",
            ));
        }
        if self.immediate_observation_target < 1 {
            return Err(CareError::validation(
                "immediate observation target must be at least 1",
            ));
        }
        if self.min_shift_frequency_minutes < 1 {
            return Err(CareError::validation(
                "minimum shift frequency must be at least one minute",
            ));
        }
        if self.min_shift_frequency_minutes > self.max_shift_frequency_minutes {
            return Err(CareError::validation(format!(
                "minimum shift frequency {} exceeds maximum {}",
                self.min_shift_frequency_minutes, self.max_shift_frequency_minutes
            )));
        }
        if !(self.min_shift_frequency_minutes..=self.max_shift_frequency_minutes)
            .contains(&self.default_shift_frequency_minutes)
        {
            return Err(CareError::validation(format!(
                "default shift frequency {} is outside [{}, {}]",
                self.default_shift_frequency_minutes,
                self.min_shift_frequency_minutes,
                self.max_shift_frequency_minutes
            )));
        }
        Ok(())
    }

    pub fn clamp_frequency(&self, minutes: i64) -> i64 {
        minutes.clamp(
            self.min_shift_frequency_minutes,
            self.max_shift_frequency_minutes,
        )
    }

    /// Clamped baseline cadence for a request, falling back to the default.
    pub fn baseline_frequency(&self, requested: Option<i64>) -> i64 {
        self.clamp_frequency(requested.unwrap_or(self.default_shift_frequency_minutes))
    }

    /// Enhanced cadence: the requested value, else half the baseline, clamped.
    pub fn enhanced_frequency(&self, requested: Option<i64>, baseline: i64) -> i64 {
        match requested {
            Some(minutes) => self.clamp_frequency(minutes),
            None => self.clamp_frequency((baseline / 2).max(self.min_shift_frequency_minutes)),
        }
    }

    pub fn immediate_interval(&self) -> Duration {
        Duration::minutes(self.immediate_interval_minutes)
    }

    pub fn immediate_window(&self) -> Duration {
        Duration::minutes(self.immediate_window_minutes)
    }
}
