use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::model::ids::{CertificationId, UserCertificationId, UserId};
use crate::progress::{Percentage, ProgressChange, ProgressSnapshot};
use crate::quiz::QuizScore;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum CertificationError {
    #[error("certification name cannot be empty")]
    EmptyName,

    #[error("certification must require at least one session or quiz")]
    NoRequirements,

    #[error("certification is {0}, not completed")]
    NotCompleted(CertificationStatus),

    #[error("certification was already approved")]
    AlreadyApproved,

    #[error("certification was already rejected")]
    AlreadyRejected,

    #[error("inconsistent persisted certification: {0}")]
    InvalidPersistedState(String),
}

//
// ─── TEMPLATE ──────────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificationDraft {
    pub name: String,
    pub description: Option<String>,
    pub required_sessions: u32,
    pub required_quizzes: u32,
    pub minimum_score: QuizScore,
}

impl CertificationDraft {
    /// # Errors
    ///
    /// Returns `CertificationError` for blank names or templates with no
    /// requirement at all.
    pub fn validate(self, now: DateTime<Utc>) -> Result<NewCertification, CertificationError> {
        let name = self.name.trim().to_owned();
        if name.is_empty() {
            return Err(CertificationError::EmptyName);
        }
        if self.required_sessions == 0 && self.required_quizzes == 0 {
            return Err(CertificationError::NoRequirements);
        }
        let description = self
            .description
            .map(|d| d.trim().to_owned())
            .filter(|d| !d.is_empty());

        Ok(NewCertification {
            name,
            description,
            required_sessions: self.required_sessions,
            required_quizzes: self.required_quizzes,
            minimum_score: self.minimum_score,
            created_at: now,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewCertification {
    pub name: String,
    pub description: Option<String>,
    pub required_sessions: u32,
    pub required_quizzes: u32,
    pub minimum_score: QuizScore,
    pub created_at: DateTime<Utc>,
}

impl NewCertification {
    #[must_use]
    pub fn assign_id(self, id: CertificationId) -> Certification {
        Certification {
            id,
            name: self.name,
            description: self.description,
            required_sessions: self.required_sessions,
            required_quizzes: self.required_quizzes,
            minimum_score: self.minimum_score,
            created_at: self.created_at,
        }
    }
}

/// Static certification template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Certification {
    id: CertificationId,
    name: String,
    description: Option<String>,
    required_sessions: u32,
    required_quizzes: u32,
    minimum_score: QuizScore,
    created_at: DateTime<Utc>,
}

impl Certification {
    #[must_use]
    pub fn id(&self) -> CertificationId {
        self.id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    #[must_use]
    pub fn required_sessions(&self) -> u32 {
        self.required_sessions
    }

    #[must_use]
    pub fn required_quizzes(&self) -> u32 {
        self.required_quizzes
    }

    /// Reference score shown with the template. Session counting uses the
    /// platform passing threshold.
    #[must_use]
    pub fn minimum_score(&self) -> QuizScore {
        self.minimum_score
    }

    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

//
// ─── USER PROGRESS ─────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CertificationStatus {
    /// No progress row exists yet. Never persisted.
    Locked,
    InProgress,
    Completed,
    Approved,
    Rejected,
}

impl CertificationStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Locked => "locked",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }
}

impl fmt::Display for CertificationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CertificationStatus {
    type Err = CertificationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "locked" => Ok(Self::Locked),
            "in_progress" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            other => Err(CertificationError::InvalidPersistedState(format!(
                "unknown status: {other}"
            ))),
        }
    }
}

/// An admin decision on an earned certification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminReview {
    pub by: UserId,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CertificationState {
    InProgress,
    Completed {
        earned_at: DateTime<Utc>,
    },
    Approved {
        earned_at: DateTime<Utc>,
        approval: AdminReview,
    },
    Rejected {
        earned_at: DateTime<Utc>,
        rejection: AdminReview,
        reason: Option<String>,
    },
}

impl CertificationState {
    #[must_use]
    pub fn status(&self) -> CertificationStatus {
        match self {
            Self::InProgress => CertificationStatus::InProgress,
            Self::Completed { .. } => CertificationStatus::Completed,
            Self::Approved { .. } => CertificationStatus::Approved,
            Self::Rejected { .. } => CertificationStatus::Rejected,
        }
    }

    #[must_use]
    pub fn earned_at(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::InProgress => None,
            Self::Completed { earned_at }
            | Self::Approved { earned_at, .. }
            | Self::Rejected { earned_at, .. } => Some(*earned_at),
        }
    }
}

/// Result of an approve/reject request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewOutcome {
    Applied,
    /// Same decision was already recorded; nothing changed.
    AlreadyRecorded,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewUserCertification {
    pub user_id: UserId,
    pub certification_id: CertificationId,
    pub state: CertificationState,
    pub progress: Percentage,
    pub updated_at: DateTime<Utc>,
}

impl NewUserCertification {
    /// First progress row for a user. Completed iff the snapshot is full.
    #[must_use]
    pub fn from_snapshot(
        user_id: UserId,
        certification_id: CertificationId,
        snapshot: ProgressSnapshot,
        now: DateTime<Utc>,
    ) -> Self {
        let (state, progress) = if snapshot.overall.is_full() {
            (CertificationState::Completed { earned_at: now }, Percentage::FULL)
        } else {
            (CertificationState::InProgress, snapshot.overall)
        };
        Self {
            user_id,
            certification_id,
            state,
            progress,
            updated_at: now,
        }
    }

    #[must_use]
    pub fn assign_id(self, id: UserCertificationId) -> UserCertification {
        UserCertification {
            id,
            user_id: self.user_id,
            certification_id: self.certification_id,
            state: self.state,
            progress: self.progress,
            updated_at: self.updated_at,
        }
    }
}

/// A user's progress row against one certification template.
///
/// Progress never decreases while in progress; once earned it is pinned at
/// 100 and `earned_at` never changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserCertification {
    id: UserCertificationId,
    user_id: UserId,
    certification_id: CertificationId,
    state: CertificationState,
    progress: Percentage,
    updated_at: DateTime<Utc>,
}

impl UserCertification {
    /// # Errors
    ///
    /// Returns `CertificationError::InvalidPersistedState` when an earned row
    /// is not pinned at 100.
    pub fn from_persisted(
        id: UserCertificationId,
        user_id: UserId,
        certification_id: CertificationId,
        state: CertificationState,
        progress: Percentage,
        updated_at: DateTime<Utc>,
    ) -> Result<Self, CertificationError> {
        if state.earned_at().is_some() && !progress.is_full() {
            return Err(CertificationError::InvalidPersistedState(format!(
                "earned certification with progress {progress}"
            )));
        }
        Ok(Self {
            id,
            user_id,
            certification_id,
            state,
            progress,
            updated_at,
        })
    }

    #[must_use]
    pub fn id(&self) -> UserCertificationId {
        self.id
    }

    #[must_use]
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    #[must_use]
    pub fn certification_id(&self) -> CertificationId {
        self.certification_id
    }

    #[must_use]
    pub fn state(&self) -> &CertificationState {
        &self.state
    }

    #[must_use]
    pub fn status(&self) -> CertificationStatus {
        self.state.status()
    }

    #[must_use]
    pub fn progress(&self) -> Percentage {
        self.progress
    }

    #[must_use]
    pub fn earned_at(&self) -> Option<DateTime<Utc>> {
        self.state.earned_at()
    }

    #[must_use]
    pub fn is_approved(&self) -> bool {
        matches!(self.state, CertificationState::Approved { .. })
    }

    #[must_use]
    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Fold a fresh snapshot into this row.
    ///
    /// Rows that are already earned are left alone, and progress never moves
    /// backwards.
    pub fn apply_progress(
        &mut self,
        snapshot: ProgressSnapshot,
        now: DateTime<Utc>,
    ) -> ProgressChange {
        if self.state != CertificationState::InProgress {
            return ProgressChange::Unchanged;
        }
        if snapshot.overall.is_full() {
            self.state = CertificationState::Completed { earned_at: now };
            self.progress = Percentage::FULL;
            self.updated_at = now;
            return ProgressChange::Earned;
        }
        if snapshot.overall > self.progress {
            let from = self.progress;
            self.progress = snapshot.overall;
            self.updated_at = now;
            return ProgressChange::Advanced {
                from,
                to: snapshot.overall,
            };
        }
        ProgressChange::Unchanged
    }

    /// Admin approval of an earned certification. Approving twice is a no-op.
    ///
    /// # Errors
    ///
    /// Returns `CertificationError` if the row is not earned or was rejected.
    pub fn approve(
        &mut self,
        admin: UserId,
        now: DateTime<Utc>,
    ) -> Result<ReviewOutcome, CertificationError> {
        match &self.state {
            CertificationState::Completed { earned_at } => {
                let earned_at = *earned_at;
                self.state = CertificationState::Approved {
                    earned_at,
                    approval: AdminReview { by: admin, at: now },
                };
                self.updated_at = now;
                Ok(ReviewOutcome::Applied)
            }
            CertificationState::Approved { .. } => Ok(ReviewOutcome::AlreadyRecorded),
            CertificationState::Rejected { .. } => Err(CertificationError::AlreadyRejected),
            CertificationState::InProgress => Err(CertificationError::NotCompleted(self.status())),
        }
    }

    /// Admin rejection of an earned certification. Rejecting twice is a no-op.
    ///
    /// # Errors
    ///
    /// Returns `CertificationError` if the row is not earned or was approved.
    pub fn reject(
        &mut self,
        admin: UserId,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<ReviewOutcome, CertificationError> {
        match &self.state {
            CertificationState::Completed { earned_at } => {
                let earned_at = *earned_at;
                self.state = CertificationState::Rejected {
                    earned_at,
                    rejection: AdminReview { by: admin, at: now },
                    reason: reason.map(|r| r.trim().to_owned()).filter(|r| !r.is_empty()),
                };
                self.updated_at = now;
                Ok(ReviewOutcome::Applied)
            }
            CertificationState::Rejected { .. } => Ok(ReviewOutcome::AlreadyRecorded),
            CertificationState::Approved { .. } => Err(CertificationError::AlreadyApproved),
            CertificationState::InProgress => Err(CertificationError::NotCompleted(self.status())),
        }
    }
}
