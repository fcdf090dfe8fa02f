//! Buffer health derivation.
//!
//! Health is a pure, total function of the unconsumed playable duration:
//! every nonnegative value maps to exactly one state, and each state binds a
//! production cooldown. Thresholds are configuration, not constants; the
//! partition stays exhaustive and non-overlapping for any boundary set that
//! passes validation.

use serde::{Deserialize, Serialize};

use crate::config::ConfigError;

const HOUR_SECS: u64 = 3600;

/// Named urgency level derived from unconsumed playable duration, least to
/// most urgent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HealthState {
    Healthy,
    Warning,
    Critical,
    Emergency,
    Depleted,
}

impl HealthState {
    /// Uppercase label used in logs and status output.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Healthy => "HEALTHY",
            Self::Warning => "WARNING",
            Self::Critical => "CRITICAL",
            Self::Emergency => "EMERGENCY",
            Self::Depleted => "DEPLETED",
        }
    }

    /// DEPLETED halts delivery; every other state streams normally.
    #[must_use]
    pub const fn halts_delivery(self) -> bool {
        matches!(self, Self::Depleted)
    }

    /// Whether production may proceed in this state.
    ///
    /// DEPLETED with content still queued means consumption is outrunning a
    /// stalled producer; producing more would be futile churn, so production
    /// halts too. DEPLETED with an empty buffer is the recovery case and
    /// production continues.
    #[must_use]
    pub const fn allows_production(self, unconsumed_records: usize) -> bool {
        match self {
            Self::Depleted => unconsumed_records == 0,
            _ => true,
        }
    }
}

impl std::fmt::Display for HealthState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A health evaluation: the state plus the production cooldown it dictates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthReading {
    pub state: HealthState,
    /// Pause between production attempts; 0 means proceed immediately.
    pub cooldown_secs: u64,
}

/// Lower bounds (inclusive) of each non-depleted state, with per-state
/// cooldowns. Anything below the emergency bound is DEPLETED.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthThresholds {
    pub healthy_secs: u64,
    pub warning_secs: u64,
    pub critical_secs: u64,
    pub emergency_secs: u64,
    pub healthy_cooldown_secs: u64,
    pub warning_cooldown_secs: u64,
    pub critical_cooldown_secs: u64,
    pub emergency_cooldown_secs: u64,
}

impl Default for HealthThresholds {
    fn default() -> Self {
        Self {
            healthy_secs: 24 * HOUR_SECS,
            warning_secs: 12 * HOUR_SECS,
            critical_secs: 6 * HOUR_SECS,
            emergency_secs: 2 * HOUR_SECS,
            healthy_cooldown_secs: 300,
            warning_cooldown_secs: 120,
            critical_cooldown_secs: 0,
            emergency_cooldown_secs: 0,
        }
    }
}

impl HealthThresholds {
    /// Map an unconsumed duration to its state and cooldown. Total over all
    /// inputs; each lower bound is inclusive.
    #[must_use]
    pub const fn evaluate(&self, unconsumed_secs: u64) -> HealthReading {
        let (state, cooldown_secs) = if unconsumed_secs >= self.healthy_secs {
            (HealthState::Healthy, self.healthy_cooldown_secs)
        } else if unconsumed_secs >= self.warning_secs {
            (HealthState::Warning, self.warning_cooldown_secs)
        } else if unconsumed_secs >= self.critical_secs {
            (HealthState::Critical, self.critical_cooldown_secs)
        } else if unconsumed_secs >= self.emergency_secs {
            (HealthState::Emergency, self.emergency_cooldown_secs)
        } else {
            (HealthState::Depleted, 0)
        };
        HealthReading {
            state,
            cooldown_secs,
        }
    }

    /// Boundaries must be strictly descending and nonzero so the partition
    /// stays exhaustive and non-overlapping. Checked at startup.
    pub const fn validate(&self) -> Result<(), ConfigError> {
        if self.emergency_secs == 0
            || self.emergency_secs >= self.critical_secs
            || self.critical_secs >= self.warning_secs
            || self.warning_secs >= self.healthy_secs
        {
            return Err(ConfigError::NonMonotonicThresholds);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_ladder_boundary_cases() {
        let t = HealthThresholds::default();

        let r = t.evaluate(25 * HOUR_SECS);
        assert_eq!(r.state, HealthState::Healthy);
        assert_eq!(r.cooldown_secs, 300);

        // Lower bound is inclusive.
        let r = t.evaluate(12 * HOUR_SECS);
        assert_eq!(r.state, HealthState::Warning);
        assert_eq!(r.cooldown_secs, 120);

        let r = t.evaluate(6 * HOUR_SECS);
        assert_eq!(r.state, HealthState::Critical);
        assert_eq!(r.cooldown_secs, 0);

        let r = t.evaluate(2 * HOUR_SECS);
        assert_eq!(r.state, HealthState::Emergency);
        assert_eq!(r.cooldown_secs, 0);

        let r = t.evaluate(HOUR_SECS);
        assert_eq!(r.state, HealthState::Depleted);
        assert_eq!(r.cooldown_secs, 0);
    }

    #[test]
    fn evaluation_is_total() {
        let t = HealthThresholds::default();
        // Every nonnegative input lands in exactly one state, including the
        // extremes of the domain.
        let _ = t.evaluate(0);
        let _ = t.evaluate(u64::MAX);
        for secs in (0..30 * HOUR_SECS).step_by(937) {
            let _ = t.evaluate(secs);
        }
    }

    #[test]
    fn depleted_directives() {
        assert!(HealthState::Depleted.halts_delivery());
        assert!(!HealthState::Critical.halts_delivery());

        // Empty buffer: keep producing to recover.
        assert!(HealthState::Depleted.allows_production(0));
        // Content queued but depleted: stalled producer, stop churning.
        assert!(!HealthState::Depleted.allows_production(3));
        assert!(HealthState::Healthy.allows_production(100));
    }

    #[test]
    fn validation_rejects_overlapping_bounds() {
        let mut t = HealthThresholds::default();
        assert!(t.validate().is_ok());

        t.warning_secs = t.healthy_secs;
        assert!(t.validate().is_err());

        let mut t = HealthThresholds::default();
        t.emergency_secs = 0;
        assert!(t.validate().is_err());
    }
}
