//! Certification progress math.
//!
//! Progress toward a template is the mean of two capped ratios:
//! completed sessions over required sessions, and completed quizzes over
//! required quizzes. A requirement of zero counts as already met.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::model::Certification;

/// Percentage clamped to `0.0..=100.0`.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Percentage(f64);

impl Percentage {
    pub const ZERO: Self = Self(0.0);
    pub const FULL: Self = Self(100.0);

    /// Clamp `value` into range. NaN maps to zero.
    #[must_use]
    pub fn new(value: f64) -> Self {
        if value.is_nan() {
            return Self::ZERO;
        }
        Self(value.clamp(0.0, 100.0))
    }

    #[must_use]
    pub fn value(self) -> f64 {
        self.0
    }

    #[must_use]
    pub fn is_full(self) -> bool {
        self.0 >= 100.0
    }
}

impl fmt::Display for Percentage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1}%", self.0)
    }
}

/// Per-user aggregate counters feeding every template.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressCounters {
    /// Completed sessions whose quiz passed the threshold.
    pub sessions_completed: u32,
    pub quizzes_completed: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub session: Percentage,
    pub quiz: Percentage,
    pub overall: Percentage,
}

fn ratio(done: u32, required: u32) -> Percentage {
    if required == 0 {
        return Percentage::FULL;
    }
    Percentage::new(100.0 * f64::from(done) / f64::from(required))
}

/// Computes progress of `counters` against one certification template.
#[must_use]
pub fn compute(certification: &Certification, counters: ProgressCounters) -> ProgressSnapshot {
    let session = ratio(counters.sessions_completed, certification.required_sessions());
    let quiz = ratio(counters.quizzes_completed, certification.required_quizzes());
    let overall = Percentage::new((session.value() + quiz.value()) / 2.0);
    ProgressSnapshot {
        session,
        quiz,
        overall,
    }
}

/// What a recomputation did to one user/certification row.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "change", rename_all = "snake_case")]
pub enum ProgressChange {
    /// First check created the row.
    Created { earned: bool },
    Advanced { from: Percentage, to: Percentage },
    Earned,
    Unchanged,
}

impl ProgressChange {
    #[must_use]
    pub fn is_write(self) -> bool {
        !matches!(self, Self::Unchanged)
    }

    #[must_use]
    pub fn earned(self) -> bool {
        matches!(self, Self::Earned | Self::Created { earned: true })
    }
}
