//! Weekly session accounting for the content-library variant.
//!
//! A session is a bounded batch of production work applied toward a weekly
//! quota, typically fired by an external scheduler. The week a session
//! belongs to is fixed from the session's *start* time, so a session that
//! straddles a week boundary never splits its progress across weeks, and a
//! re-trigger after the quota is met is a safe no-op.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// ISO week identifier for an instant, e.g. `2026_W35`.
#[must_use]
pub fn week_id_for(at: DateTime<Utc>) -> String {
    at.format("%G_W%V").to_string()
}

/// Progress toward the weekly production quota.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionProgress {
    /// ISO week this progress applies to.
    pub week_id: String,
    /// Chunks produced so far this week.
    pub produced_this_week: u32,
    /// Weekly chunk target.
    pub weekly_target: u32,
}

impl SessionProgress {
    /// Fresh progress for a week.
    #[must_use]
    pub const fn new(week_id: String, weekly_target: u32) -> Self {
        Self {
            week_id,
            produced_this_week: 0,
            weekly_target,
        }
    }

    /// Whether the weekly target has been reached.
    #[must_use]
    pub const fn is_met(&self) -> bool {
        self.produced_this_week >= self.weekly_target
    }

    /// Chunks still owed this week.
    #[must_use]
    pub const fn remaining(&self) -> u32 {
        self.weekly_target.saturating_sub(self.produced_this_week)
    }
}

/// Result of a session run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    /// The weekly quota was already met; nothing was produced.
    QuotaMet { week_id: String },
    /// A batch was produced and applied to the week.
    Produced {
        week_id: String,
        produced: u32,
        remaining: u32,
    },
}

/// Weekly progress report for operators.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeeklyProgress {
    pub week_id: String,
    pub completed_chunks: u32,
    pub target_chunks: u32,
    pub remaining_chunks: u32,
    pub progress_percent: f64,
    pub sessions_completed: u32,
    pub sessions_remaining: u32,
}

impl WeeklyProgress {
    /// Derive a report from progress and the per-session batch size.
    #[must_use]
    pub fn from_progress(progress: &SessionProgress, session_size: u32) -> Self {
        let completed = progress.produced_this_week.min(progress.weekly_target);
        let remaining = progress.remaining();
        let percent = if progress.weekly_target == 0 {
            100.0
        } else {
            f64::from(completed) / f64::from(progress.weekly_target) * 100.0
        };
        let session_size = session_size.max(1);
        Self {
            week_id: progress.week_id.clone(),
            completed_chunks: completed,
            target_chunks: progress.weekly_target,
            remaining_chunks: remaining,
            progress_percent: percent,
            sessions_completed: completed / session_size,
            sessions_remaining: remaining.div_ceil(session_size),
        }
    }
}
