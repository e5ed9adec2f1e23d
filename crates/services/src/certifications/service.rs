use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info};

use storage::repository::{
    CertificationRepository, ProgressWrite, QuizResultRepository, SessionRepository,
    StorageError, UserCertificationRepository,
};
use therapy_core::model::{
    Certification, CertificationDraft, CertificationId, CertificationStatus,
    NewUserCertification, ReviewOutcome, UserCertification, UserCertificationId, UserId,
};
use therapy_core::progress::{self, Percentage, ProgressChange, ProgressCounters};

use super::catalog::default_catalog;
use super::counters::counters_for_user;
use crate::Clock;
use crate::error::CertificationServiceError;
use crate::settings::ServiceSettings;

//
// ─── VIEWS ─────────────────────────────────────────────────────────────────────
//

/// One template as seen by a user, including templates not started yet.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CertificationView {
    pub certification: Certification,
    pub user_certification_id: Option<UserCertificationId>,
    pub status: CertificationStatus,
    pub progress: Percentage,
    pub earned_at: Option<DateTime<Utc>>,
}

impl CertificationView {
    fn locked(certification: Certification) -> Self {
        Self {
            certification,
            user_certification_id: None,
            status: CertificationStatus::Locked,
            progress: Percentage::ZERO,
            earned_at: None,
        }
    }

    fn from_row(certification: Certification, row: &UserCertification) -> Self {
        Self {
            certification,
            user_certification_id: Some(row.id()),
            status: row.status(),
            progress: row.progress(),
            earned_at: row.earned_at(),
        }
    }
}

/// Outcome of recomputing one template for a user.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressEntry {
    pub certification_id: CertificationId,
    pub change: ProgressChange,
    pub user_certification: UserCertification,
}

/// Everything one recomputation did.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressReport {
    pub user_id: UserId,
    pub counters: ProgressCounters,
    pub entries: Vec<ProgressEntry>,
}

impl ProgressReport {
    /// Templates earned by this recomputation.
    pub fn newly_earned(&self) -> impl Iterator<Item = &ProgressEntry> {
        self.entries.iter().filter(|e| e.change.earned())
    }

    #[must_use]
    pub fn entry(&self, certification_id: CertificationId) -> Option<&ProgressEntry> {
        self.entries
            .iter()
            .find(|e| e.certification_id == certification_id)
    }
}

//
// ─── SERVICE ───────────────────────────────────────────────────────────────────
//

/// Certification templates, per-user progress and admin review.
#[derive(Clone)]
pub struct CertificationService {
    clock: Clock,
    settings: ServiceSettings,
    certifications: Arc<dyn CertificationRepository>,
    user_certifications: Arc<dyn UserCertificationRepository>,
    sessions: Arc<dyn SessionRepository>,
    quiz_results: Arc<dyn QuizResultRepository>,
}

impl CertificationService {
    #[must_use]
    pub fn new(
        clock: Clock,
        settings: ServiceSettings,
        certifications: Arc<dyn CertificationRepository>,
        user_certifications: Arc<dyn UserCertificationRepository>,
        sessions: Arc<dyn SessionRepository>,
        quiz_results: Arc<dyn QuizResultRepository>,
    ) -> Self {
        Self {
            clock,
            settings,
            certifications,
            user_certifications,
            sessions,
            quiz_results,
        }
    }

    /// Validate and store a new template.
    ///
    /// # Errors
    ///
    /// Returns `CertificationServiceError::Certification` for invalid drafts and
    /// `CertificationServiceError::DuplicateName` if the name is taken.
    pub async fn define_certification(
        &self,
        draft: CertificationDraft,
    ) -> Result<Certification, CertificationServiceError> {
        let new = draft.validate(self.clock.now())?;
        let name = new.name.clone();
        match self.certifications.insert_new_certification(new).await {
            Ok(cert) => {
                info!(certification_id = %cert.id(), name = cert.name(), "certification defined");
                Ok(cert)
            }
            Err(StorageError::Conflict) => Err(CertificationServiceError::DuplicateName(name)),
            Err(e) => Err(e.into()),
        }
    }

    /// Insert the default templates that are not present yet. Returns how many
    /// were added.
    ///
    /// # Errors
    ///
    /// Returns `CertificationServiceError` if storage fails.
    pub async fn seed_default_catalog(&self) -> Result<usize, CertificationServiceError> {
        let mut added = 0;
        for draft in default_catalog() {
            match self.define_certification(draft).await {
                Ok(_) => added += 1,
                Err(CertificationServiceError::DuplicateName(name)) => {
                    debug!(name = %name, "certification already present");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(added)
    }

    /// # Errors
    ///
    /// Returns `CertificationServiceError::Storage` if repository access fails.
    pub async fn list_certifications(
        &self,
    ) -> Result<Vec<Certification>, CertificationServiceError> {
        Ok(self.certifications.list_certifications().await?)
    }

    /// Recompute the user's progress against every template and persist all
    /// changed rows in one atomic write.
    ///
    /// Earned rows are never touched again, and in-progress rows never lose
    /// progress, so running this twice in a row is a no-op the second time.
    ///
    /// # Errors
    ///
    /// Returns `CertificationServiceError::Storage` if reading or the atomic
    /// write fails; nothing is persisted in that case. A row changed by a
    /// concurrent request since it was read fails the write with a conflict.
    pub async fn recompute_for_user(
        &self,
        user_id: UserId,
    ) -> Result<ProgressReport, CertificationServiceError> {
        let now = self.clock.now();
        let templates = self.certifications.list_certifications().await?;
        let counters = counters_for_user(
            self.sessions.as_ref(),
            self.quiz_results.as_ref(),
            user_id,
            self.settings.passing_score(),
        )
        .await?;
        let mut existing: HashMap<CertificationId, UserCertification> = self
            .user_certifications
            .list_user_certifications_for_user(user_id)
            .await?
            .into_iter()
            .map(|uc| (uc.certification_id(), uc))
            .collect();

        enum Slot {
            Written(usize),
            Kept(UserCertification),
        }

        let mut writes = Vec::new();
        let mut plan = Vec::with_capacity(templates.len());
        for template in &templates {
            let snapshot = progress::compute(template, counters);
            let (change, slot) = match existing.remove(&template.id()) {
                Some(mut row) => {
                    let expected = row.status();
                    let change = row.apply_progress(snapshot, now);
                    if change.is_write() {
                        writes.push(ProgressWrite::Update { row, expected });
                        (change, Slot::Written(writes.len() - 1))
                    } else {
                        (change, Slot::Kept(row))
                    }
                }
                None => {
                    let new =
                        NewUserCertification::from_snapshot(user_id, template.id(), snapshot, now);
                    let change = ProgressChange::Created {
                        earned: new.state.earned_at().is_some(),
                    };
                    writes.push(ProgressWrite::Insert(new));
                    (change, Slot::Written(writes.len() - 1))
                }
            };
            plan.push((template.id(), change, slot));
        }

        let saved = if writes.is_empty() {
            Vec::new()
        } else {
            self.user_certifications.save_progress(writes).await?
        };
        let mut saved: Vec<Option<UserCertification>> = saved.into_iter().map(Some).collect();

        let mut entries = Vec::with_capacity(plan.len());
        for (certification_id, change, slot) in plan {
            let user_certification = match slot {
                Slot::Kept(row) => row,
                Slot::Written(i) => saved
                    .get_mut(i)
                    .and_then(Option::take)
                    .ok_or_else(|| {
                        StorageError::Serialization("progress write count mismatch".into())
                    })?,
            };
            if change.earned() {
                info!(
                    user_id = %user_id,
                    certification_id = %certification_id,
                    "certification earned"
                );
            }
            entries.push(ProgressEntry {
                certification_id,
                change,
                user_certification,
            });
        }

        debug!(
            user_id = %user_id,
            sessions = counters.sessions_completed,
            quizzes = counters.quizzes_completed,
            templates = entries.len(),
            "progress recomputed"
        );
        Ok(ProgressReport {
            user_id,
            counters,
            entries,
        })
    }

    /// Every template with the user's standing; templates without a row are
    /// reported as locked with zero progress.
    ///
    /// # Errors
    ///
    /// Returns `CertificationServiceError::Storage` if repository access fails.
    pub async fn certifications_for_user(
        &self,
        user_id: UserId,
    ) -> Result<Vec<CertificationView>, CertificationServiceError> {
        let templates = self.certifications.list_certifications().await?;
        let rows: HashMap<CertificationId, UserCertification> = self
            .user_certifications
            .list_user_certifications_for_user(user_id)
            .await?
            .into_iter()
            .map(|uc| (uc.certification_id(), uc))
            .collect();

        Ok(templates
            .into_iter()
            .map(|t| match rows.get(&t.id()) {
                Some(row) => CertificationView::from_row(t, row),
                None => CertificationView::locked(t),
            })
            .collect())
    }

    /// # Errors
    ///
    /// Returns `CertificationServiceError::NotFound` for unknown ids.
    pub async fn get_user_certification(
        &self,
        id: UserCertificationId,
    ) -> Result<UserCertification, CertificationServiceError> {
        self.user_certifications
            .get_user_certification(id)
            .await?
            .ok_or(CertificationServiceError::NotFound(id))
    }

    /// Earned certifications waiting for an admin decision.
    ///
    /// # Errors
    ///
    /// Returns `CertificationServiceError::Storage` if repository access fails.
    pub async fn awaiting_approval(
        &self,
    ) -> Result<Vec<UserCertification>, CertificationServiceError> {
        Ok(self
            .user_certifications
            .list_user_certifications(Some(CertificationStatus::Completed))
            .await?)
    }

    /// Approved certifications across all users.
    ///
    /// # Errors
    ///
    /// Returns `CertificationServiceError::Storage` if repository access fails.
    pub async fn issued(&self) -> Result<Vec<UserCertification>, CertificationServiceError> {
        Ok(self
            .user_certifications
            .list_user_certifications(Some(CertificationStatus::Approved))
            .await?)
    }

    /// Admin approval. Approving an approved row returns it unchanged.
    ///
    /// # Errors
    ///
    /// Returns `CertificationServiceError::Certification` if the row is not
    /// completed, `NotFound` for unknown ids, and a storage conflict if another
    /// review landed first.
    pub async fn approve(
        &self,
        id: UserCertificationId,
        admin: UserId,
    ) -> Result<(UserCertification, ReviewOutcome), CertificationServiceError> {
        let mut row = self.get_user_certification(id).await?;
        let expected = row.status();
        let outcome = row.approve(admin, self.clock.now())?;
        if outcome == ReviewOutcome::Applied {
            self.user_certifications
                .update_user_certification(&row, expected)
                .await?;
            info!(user_certification_id = %id, admin = %admin, "certification approved");
        }
        Ok((row, outcome))
    }

    /// Admin rejection. Rejecting a rejected row returns it unchanged.
    ///
    /// # Errors
    ///
    /// Returns `CertificationServiceError::Certification` if the row is not
    /// completed or was approved, and `NotFound` for unknown ids.
    pub async fn reject(
        &self,
        id: UserCertificationId,
        admin: UserId,
        reason: Option<String>,
    ) -> Result<(UserCertification, ReviewOutcome), CertificationServiceError> {
        let mut row = self.get_user_certification(id).await?;
        let expected = row.status();
        let outcome = row.reject(admin, reason, self.clock.now())?;
        if outcome == ReviewOutcome::Applied {
            self.user_certifications
                .update_user_certification(&row, expected)
                .await?;
            info!(user_certification_id = %id, admin = %admin, "certification rejected");
        }
        Ok((row, outcome))
    }
}
