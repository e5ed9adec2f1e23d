//! Read-only per-role summaries.
//!
//! Aggregation tolerates missing relations: sessions without a doctor, a quiz
//! or a payment simply do not contribute to the related figures.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;

use storage::repository::{PaymentRepository, QuizResultRepository, SessionRepository};
use therapy_core::model::{
    Payment, PaymentStatus, Session, SessionStatus, SessionType, UserCertification, UserId,
};

use crate::certifications::{CertificationService, CertificationView};
use crate::error::DashboardError;

/// Counts keyed by the lowercase status or type name.
pub type Counts = BTreeMap<&'static str, usize>;

/// Verified amounts in minor units, per currency.
pub type Totals = BTreeMap<String, u64>;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClientDashboard {
    pub user_id: UserId,
    pub total_sessions: usize,
    pub sessions_by_status: Counts,
    pub sessions_by_type: Counts,
    pub quizzes_taken: usize,
    /// Mean of the client's quiz scores; `None` before the first quiz.
    pub average_quiz_score: Option<f64>,
    pub certifications: Vec<CertificationView>,
    pub verified_payments: Totals,
    pub pending_payments: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DoctorDashboard {
    pub doctor_id: UserId,
    pub total_sessions: usize,
    pub sessions_by_status: Counts,
    /// Scheduled sessions, soonest first.
    pub upcoming: Vec<Session>,
    pub rated_sessions: usize,
    pub average_rating: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AdminDashboard {
    pub total_sessions: usize,
    pub sessions_by_status: Counts,
    pub sessions_by_type: Counts,
    /// Human requests still waiting for a doctor.
    pub pending_assignment: usize,
    /// Earned certifications waiting for a decision.
    pub awaiting_approval: Vec<UserCertification>,
    pub issued_certifications: usize,
    pub verified_revenue: Totals,
    pub pending_payments: usize,
}

fn count_by_status(sessions: &[Session]) -> Counts {
    let mut counts = Counts::new();
    for s in sessions {
        *counts.entry(s.status().as_str()).or_default() += 1;
    }
    counts
}

fn count_by_type(sessions: &[Session]) -> Counts {
    let mut counts = Counts::new();
    for s in sessions {
        *counts.entry(s.session_type().as_str()).or_default() += 1;
    }
    counts
}

fn verified_totals(payments: &[Payment]) -> Totals {
    let mut totals = Totals::new();
    for p in payments.iter().filter(|p| p.is_verified()) {
        let slot = totals.entry(p.currency.clone()).or_default();
        *slot = slot.saturating_add(p.amount_minor);
    }
    totals
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, n) = values.fold((0.0, 0_u32), |(sum, n), v| (sum + v, n + 1));
    (n > 0).then(|| sum / f64::from(n))
}

/// Builds the dashboards from repositories.
#[derive(Clone)]
pub struct DashboardService {
    sessions: Arc<dyn SessionRepository>,
    quiz_results: Arc<dyn QuizResultRepository>,
    payments: Arc<dyn PaymentRepository>,
    certifications: Arc<CertificationService>,
}

impl DashboardService {
    #[must_use]
    pub fn new(
        sessions: Arc<dyn SessionRepository>,
        quiz_results: Arc<dyn QuizResultRepository>,
        payments: Arc<dyn PaymentRepository>,
        certifications: Arc<CertificationService>,
    ) -> Self {
        Self {
            sessions,
            quiz_results,
            payments,
            certifications,
        }
    }

    /// # Errors
    ///
    /// Returns `DashboardError` if repository access fails.
    pub async fn client(&self, user_id: UserId) -> Result<ClientDashboard, DashboardError> {
        let sessions = self.sessions.list_sessions_for_client(user_id).await?;
        let quizzes = self.quiz_results.list_quiz_results_for_user(user_id).await?;
        let payments = self.payments.list_payments_for_user(user_id).await?;
        let certifications = self.certifications.certifications_for_user(user_id).await?;

        Ok(ClientDashboard {
            user_id,
            total_sessions: sessions.len(),
            sessions_by_status: count_by_status(&sessions),
            sessions_by_type: count_by_type(&sessions),
            quizzes_taken: quizzes.len(),
            average_quiz_score: mean(quizzes.iter().map(|q| f64::from(q.score().value()))),
            certifications,
            verified_payments: verified_totals(&payments),
            pending_payments: payments
                .iter()
                .filter(|p| p.status == PaymentStatus::Pending)
                .count(),
        })
    }

    /// # Errors
    ///
    /// Returns `DashboardError` if repository access fails.
    pub async fn doctor(&self, doctor_id: UserId) -> Result<DoctorDashboard, DashboardError> {
        let sessions = self.sessions.list_sessions_for_doctor(doctor_id).await?;

        let upcoming: Vec<Session> = sessions
            .iter()
            .filter(|s| s.status() == SessionStatus::Scheduled)
            .cloned()
            .collect();
        let ratings: Vec<f64> = sessions
            .iter()
            .filter_map(|s| s.feedback().and_then(|f| f.rating()))
            .map(|r| f64::from(r.value()))
            .collect();

        Ok(DoctorDashboard {
            doctor_id,
            total_sessions: sessions.len(),
            sessions_by_status: count_by_status(&sessions),
            upcoming,
            rated_sessions: ratings.len(),
            average_rating: mean(ratings.into_iter()),
        })
    }

    /// # Errors
    ///
    /// Returns `DashboardError` if repository access fails.
    pub async fn admin(&self) -> Result<AdminDashboard, DashboardError> {
        let sessions = self.sessions.list_sessions(None).await?;
        let payments = self.payments.list_payments(None).await?;
        let awaiting_approval = self.certifications.awaiting_approval().await?;
        let issued = self.certifications.issued().await?;

        Ok(AdminDashboard {
            total_sessions: sessions.len(),
            sessions_by_status: count_by_status(&sessions),
            sessions_by_type: count_by_type(&sessions),
            pending_assignment: sessions
                .iter()
                .filter(|s| {
                    s.status() == SessionStatus::Pending && s.session_type() == SessionType::Human
                })
                .count(),
            awaiting_approval,
            issued_certifications: issued.len(),
            verified_revenue: verified_totals(&payments),
            pending_payments: payments
                .iter()
                .filter(|p| p.status == PaymentStatus::Pending)
                .count(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mean_of_nothing_is_none() {
        assert_eq!(mean(std::iter::empty()), None);
        assert_eq!(mean([70.0, 80.0, 90.0].into_iter()), Some(80.0));
    }
}
