use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use therapy_core::model::{
    Certification, CertificationId, CertificationStatus, NewCertification, NewPayment,
    NewQuizResult, NewSession, NewUserCertification, Payment, PaymentId, PaymentStatus,
    QuizResult, QuizResultId, Session, SessionId, SessionStatus, UserCertification,
    UserCertificationId, UserId,
};
use thiserror::Error;

/// Errors surfaced by storage adapters.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum StorageError {
    #[error("not found")]
    NotFound,

    /// A unique key is already taken, or the row changed underneath the writer.
    #[error("conflict")]
    Conflict,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

//
// ─── CONTRACTS ─────────────────────────────────────────────────────────────────
//

#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// Persist a new booking and return it with its assigned id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the session cannot be stored.
    async fn insert_new_session(&self, session: NewSession) -> Result<Session, StorageError>;

    /// Fetch a session by ID.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on read or mapping failures.
    async fn get_session(&self, id: SessionId) -> Result<Option<Session>, StorageError>;

    /// Overwrite a session, provided its stored status is still `expected`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if missing and `StorageError::Conflict`
    /// if another writer moved the session first.
    async fn update_session(
        &self,
        session: &Session,
        expected: SessionStatus,
    ) -> Result<(), StorageError>;

    /// Sessions booked by a client, oldest schedule first.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on read or mapping failures.
    async fn list_sessions_for_client(&self, client_id: UserId)
    -> Result<Vec<Session>, StorageError>;

    /// Sessions assigned to a doctor, oldest schedule first.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on read or mapping failures.
    async fn list_sessions_for_doctor(&self, doctor_id: UserId)
    -> Result<Vec<Session>, StorageError>;

    /// All sessions, optionally filtered by status.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on read or mapping failures.
    async fn list_sessions(
        &self,
        status: Option<SessionStatus>,
    ) -> Result<Vec<Session>, StorageError>;
}

/// Atomic write of a completed session together with its quiz result.
#[async_trait]
pub trait CompletionPersistence: Send + Sync {
    /// Store the completed session and, if present, its quiz result in one unit.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` if the session left `expected` in the
    /// meantime or already has a quiz result; nothing is written in that case.
    async fn record_completion(
        &self,
        session: &Session,
        expected: SessionStatus,
        quiz: Option<NewQuizResult>,
    ) -> Result<Option<QuizResult>, StorageError>;
}

#[async_trait]
pub trait QuizResultRepository: Send + Sync {
    /// # Errors
    ///
    /// Returns `StorageError` on read or mapping failures.
    async fn get_quiz_result_for_session(
        &self,
        session_id: SessionId,
    ) -> Result<Option<QuizResult>, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` on read or mapping failures.
    async fn list_quiz_results_for_user(
        &self,
        user_id: UserId,
    ) -> Result<Vec<QuizResult>, StorageError>;
}

#[async_trait]
pub trait CertificationRepository: Send + Sync {
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` if a template with the same name exists.
    async fn insert_new_certification(
        &self,
        certification: NewCertification,
    ) -> Result<Certification, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` on read or mapping failures.
    async fn get_certification(
        &self,
        id: CertificationId,
    ) -> Result<Option<Certification>, StorageError>;

    /// All templates ordered by id.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on read or mapping failures.
    async fn list_certifications(&self) -> Result<Vec<Certification>, StorageError>;
}

/// One row write of a progress recomputation.
#[derive(Debug, Clone, PartialEq)]
pub enum ProgressWrite {
    Insert(NewUserCertification),
    /// `expected` is the status the row had when it was loaded.
    Update {
        row: UserCertification,
        expected: CertificationStatus,
    },
}

#[async_trait]
pub trait UserCertificationRepository: Send + Sync {
    /// # Errors
    ///
    /// Returns `StorageError` on read or mapping failures.
    async fn get_user_certification(
        &self,
        id: UserCertificationId,
    ) -> Result<Option<UserCertification>, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` on read or mapping failures.
    async fn find_user_certification(
        &self,
        user_id: UserId,
        certification_id: CertificationId,
    ) -> Result<Option<UserCertification>, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` on read or mapping failures.
    async fn list_user_certifications_for_user(
        &self,
        user_id: UserId,
    ) -> Result<Vec<UserCertification>, StorageError>;

    /// All rows across users, optionally filtered by status.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` on read or mapping failures.
    async fn list_user_certifications(
        &self,
        status: Option<CertificationStatus>,
    ) -> Result<Vec<UserCertification>, StorageError>;

    /// Apply every write of one recomputation atomically and return the
    /// resulting rows in input order.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Conflict` if an insert collides with an existing
    /// (user, certification) pair or an updated row no longer has its expected
    /// status; no write is kept in that case.
    async fn save_progress(
        &self,
        writes: Vec<ProgressWrite>,
    ) -> Result<Vec<UserCertification>, StorageError>;

    /// Overwrite a row that still has status `expected`.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the row does not exist and
    /// `StorageError::Conflict` if its stored status differs from `expected`.
    async fn update_user_certification(
        &self,
        certification: &UserCertification,
        expected: CertificationStatus,
    ) -> Result<(), StorageError>;
}

#[async_trait]
pub trait PaymentRepository: Send + Sync {
    /// # Errors
    ///
    /// Returns `StorageError` if the payment cannot be stored.
    async fn insert_new_payment(&self, payment: NewPayment) -> Result<Payment, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` on read or mapping failures.
    async fn get_payment(&self, id: PaymentId) -> Result<Option<Payment>, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError::NotFound` if the payment does not exist.
    async fn update_payment(&self, payment: &Payment) -> Result<(), StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` on read or mapping failures.
    async fn list_payments_for_user(&self, user_id: UserId)
    -> Result<Vec<Payment>, StorageError>;

    /// # Errors
    ///
    /// Returns `StorageError` on read or mapping failures.
    async fn list_payments(
        &self,
        status: Option<PaymentStatus>,
    ) -> Result<Vec<Payment>, StorageError>;
}

//
// ─── IN-MEMORY BACKEND ─────────────────────────────────────────────────────────
//

#[derive(Default)]
struct MemoryState {
    next_id: u64,
    sessions: BTreeMap<SessionId, Session>,
    quiz_results: BTreeMap<QuizResultId, QuizResult>,
    certifications: BTreeMap<CertificationId, Certification>,
    user_certifications: BTreeMap<UserCertificationId, UserCertification>,
    payments: BTreeMap<PaymentId, Payment>,
}

impl MemoryState {
    fn allocate(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

/// Simple in-memory repository implementation for testing and prototyping.
///
/// All entities share one lock, so multi-entity writes are atomic.
#[derive(Clone, Default)]
pub struct InMemoryRepository {
    state: Arc<Mutex<MemoryState>>,
}

impl InMemoryRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryState>, StorageError> {
        self.state
            .lock()
            .map_err(|e| StorageError::Connection(e.to_string()))
    }
}

fn by_schedule(mut sessions: Vec<Session>) -> Vec<Session> {
    sessions.sort_by_key(|s| (s.scheduled_at(), s.id()));
    sessions
}

#[async_trait]
impl SessionRepository for InMemoryRepository {
    async fn insert_new_session(&self, session: NewSession) -> Result<Session, StorageError> {
        let mut guard = self.lock()?;
        let id = SessionId::new(guard.allocate());
        let stored = session.assign_id(id);
        guard.sessions.insert(id, stored.clone());
        Ok(stored)
    }

    async fn get_session(&self, id: SessionId) -> Result<Option<Session>, StorageError> {
        Ok(self.lock()?.sessions.get(&id).cloned())
    }

    async fn update_session(
        &self,
        session: &Session,
        expected: SessionStatus,
    ) -> Result<(), StorageError> {
        let mut guard = self.lock()?;
        let slot = guard
            .sessions
            .get_mut(&session.id())
            .ok_or(StorageError::NotFound)?;
        if slot.status() != expected {
            return Err(StorageError::Conflict);
        }
        *slot = session.clone();
        Ok(())
    }

    async fn list_sessions_for_client(
        &self,
        client_id: UserId,
    ) -> Result<Vec<Session>, StorageError> {
        let guard = self.lock()?;
        Ok(by_schedule(
            guard
                .sessions
                .values()
                .filter(|s| s.client_id() == client_id)
                .cloned()
                .collect(),
        ))
    }

    async fn list_sessions_for_doctor(
        &self,
        doctor_id: UserId,
    ) -> Result<Vec<Session>, StorageError> {
        let guard = self.lock()?;
        Ok(by_schedule(
            guard
                .sessions
                .values()
                .filter(|s| s.doctor_id() == Some(doctor_id))
                .cloned()
                .collect(),
        ))
    }

    async fn list_sessions(
        &self,
        status: Option<SessionStatus>,
    ) -> Result<Vec<Session>, StorageError> {
        let guard = self.lock()?;
        Ok(by_schedule(
            guard
                .sessions
                .values()
                .filter(|s| status.is_none_or(|st| s.status() == st))
                .cloned()
                .collect(),
        ))
    }
}

#[async_trait]
impl CompletionPersistence for InMemoryRepository {
    async fn record_completion(
        &self,
        session: &Session,
        expected: SessionStatus,
        quiz: Option<NewQuizResult>,
    ) -> Result<Option<QuizResult>, StorageError> {
        let mut guard = self.lock()?;
        let current = guard
            .sessions
            .get(&session.id())
            .ok_or(StorageError::NotFound)?;
        if current.status() != expected {
            return Err(StorageError::Conflict);
        }
        if let Some(q) = quiz.as_ref() {
            if q.session_id != session.id()
                || guard
                    .quiz_results
                    .values()
                    .any(|r| r.session_id() == q.session_id)
            {
                return Err(StorageError::Conflict);
            }
        }

        let stored_quiz = quiz.map(|q| {
            let id = QuizResultId::new(guard.allocate());
            q.assign_id(id)
        });
        if let Some(q) = stored_quiz.as_ref() {
            guard.quiz_results.insert(q.id(), q.clone());
        }
        guard.sessions.insert(session.id(), session.clone());
        Ok(stored_quiz)
    }
}

#[async_trait]
impl QuizResultRepository for InMemoryRepository {
    async fn get_quiz_result_for_session(
        &self,
        session_id: SessionId,
    ) -> Result<Option<QuizResult>, StorageError> {
        let guard = self.lock()?;
        Ok(guard
            .quiz_results
            .values()
            .find(|r| r.session_id() == session_id)
            .cloned())
    }

    async fn list_quiz_results_for_user(
        &self,
        user_id: UserId,
    ) -> Result<Vec<QuizResult>, StorageError> {
        let guard = self.lock()?;
        Ok(guard
            .quiz_results
            .values()
            .filter(|r| r.user_id() == user_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl CertificationRepository for InMemoryRepository {
    async fn insert_new_certification(
        &self,
        certification: NewCertification,
    ) -> Result<Certification, StorageError> {
        let mut guard = self.lock()?;
        if guard
            .certifications
            .values()
            .any(|c| c.name() == certification.name)
        {
            return Err(StorageError::Conflict);
        }
        let id = CertificationId::new(guard.allocate());
        let stored = certification.assign_id(id);
        guard.certifications.insert(id, stored.clone());
        Ok(stored)
    }

    async fn get_certification(
        &self,
        id: CertificationId,
    ) -> Result<Option<Certification>, StorageError> {
        Ok(self.lock()?.certifications.get(&id).cloned())
    }

    async fn list_certifications(&self) -> Result<Vec<Certification>, StorageError> {
        Ok(self.lock()?.certifications.values().cloned().collect())
    }
}

#[async_trait]
impl UserCertificationRepository for InMemoryRepository {
    async fn get_user_certification(
        &self,
        id: UserCertificationId,
    ) -> Result<Option<UserCertification>, StorageError> {
        Ok(self.lock()?.user_certifications.get(&id).cloned())
    }

    async fn find_user_certification(
        &self,
        user_id: UserId,
        certification_id: CertificationId,
    ) -> Result<Option<UserCertification>, StorageError> {
        let guard = self.lock()?;
        Ok(guard
            .user_certifications
            .values()
            .find(|uc| uc.user_id() == user_id && uc.certification_id() == certification_id)
            .cloned())
    }

    async fn list_user_certifications_for_user(
        &self,
        user_id: UserId,
    ) -> Result<Vec<UserCertification>, StorageError> {
        let guard = self.lock()?;
        Ok(guard
            .user_certifications
            .values()
            .filter(|uc| uc.user_id() == user_id)
            .cloned()
            .collect())
    }

    async fn list_user_certifications(
        &self,
        status: Option<CertificationStatus>,
    ) -> Result<Vec<UserCertification>, StorageError> {
        let guard = self.lock()?;
        Ok(guard
            .user_certifications
            .values()
            .filter(|uc| status.is_none_or(|st| uc.status() == st))
            .cloned()
            .collect())
    }

    async fn save_progress(
        &self,
        writes: Vec<ProgressWrite>,
    ) -> Result<Vec<UserCertification>, StorageError> {
        let mut guard = self.lock()?;

        // Validate everything before touching the map so a failure leaves no partial state.
        let mut pending_pairs = Vec::new();
        for write in &writes {
            match write {
                ProgressWrite::Insert(new) => {
                    let pair = (new.user_id, new.certification_id);
                    let taken = guard
                        .user_certifications
                        .values()
                        .any(|uc| (uc.user_id(), uc.certification_id()) == pair);
                    if taken || pending_pairs.contains(&pair) {
                        return Err(StorageError::Conflict);
                    }
                    pending_pairs.push(pair);
                }
                ProgressWrite::Update { row, expected } => {
                    let stored = guard
                        .user_certifications
                        .get(&row.id())
                        .ok_or(StorageError::NotFound)?;
                    if stored.status() != *expected {
                        return Err(StorageError::Conflict);
                    }
                }
            }
        }

        let mut saved = Vec::with_capacity(writes.len());
        for write in writes {
            let row = match write {
                ProgressWrite::Insert(new) => {
                    let id = UserCertificationId::new(guard.allocate());
                    new.assign_id(id)
                }
                ProgressWrite::Update { row, .. } => row,
            };
            guard.user_certifications.insert(row.id(), row.clone());
            saved.push(row);
        }
        Ok(saved)
    }

    async fn update_user_certification(
        &self,
        certification: &UserCertification,
        expected: CertificationStatus,
    ) -> Result<(), StorageError> {
        let mut guard = self.lock()?;
        let slot = guard
            .user_certifications
            .get_mut(&certification.id())
            .ok_or(StorageError::NotFound)?;
        if slot.status() != expected {
            return Err(StorageError::Conflict);
        }
        *slot = certification.clone();
        Ok(())
    }
}

#[async_trait]
impl PaymentRepository for InMemoryRepository {
    async fn insert_new_payment(&self, payment: NewPayment) -> Result<Payment, StorageError> {
        let mut guard = self.lock()?;
        let id = PaymentId::new(guard.allocate());
        let stored = payment.assign_id(id);
        guard.payments.insert(id, stored.clone());
        Ok(stored)
    }

    async fn get_payment(&self, id: PaymentId) -> Result<Option<Payment>, StorageError> {
        Ok(self.lock()?.payments.get(&id).cloned())
    }

    async fn update_payment(&self, payment: &Payment) -> Result<(), StorageError> {
        let mut guard = self.lock()?;
        let slot = guard
            .payments
            .get_mut(&payment.id)
            .ok_or(StorageError::NotFound)?;
        *slot = payment.clone();
        Ok(())
    }

    async fn list_payments_for_user(
        &self,
        user_id: UserId,
    ) -> Result<Vec<Payment>, StorageError> {
        let guard = self.lock()?;
        Ok(guard
            .payments
            .values()
            .filter(|p| p.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn list_payments(
        &self,
        status: Option<PaymentStatus>,
    ) -> Result<Vec<Payment>, StorageError> {
        let guard = self.lock()?;
        Ok(guard
            .payments
            .values()
            .filter(|p| status.is_none_or(|st| p.status == st))
            .cloned()
            .collect())
    }
}

//
// ─── AGGREGATE ─────────────────────────────────────────────────────────────────
//

/// Aggregates repositories behind trait objects for easy backend swapping.
#[derive(Clone)]
pub struct Storage {
    pub sessions: Arc<dyn SessionRepository>,
    pub completions: Arc<dyn CompletionPersistence>,
    pub quiz_results: Arc<dyn QuizResultRepository>,
    pub certifications: Arc<dyn CertificationRepository>,
    pub user_certifications: Arc<dyn UserCertificationRepository>,
    pub payments: Arc<dyn PaymentRepository>,
}

impl Storage {
    #[must_use]
    pub fn in_memory() -> Self {
        Self::from_backend(InMemoryRepository::new())
    }

    pub(crate) fn from_backend<R>(repo: R) -> Self
    where
        R: SessionRepository
            + CompletionPersistence
            + QuizResultRepository
            + CertificationRepository
            + UserCertificationRepository
            + PaymentRepository
            + Clone
            + 'static,
    {
        Self {
            sessions: Arc::new(repo.clone()),
            completions: Arc::new(repo.clone()),
            quiz_results: Arc::new(repo.clone()),
            certifications: Arc::new(repo.clone()),
            user_certifications: Arc::new(repo.clone()),
            payments: Arc::new(repo),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use therapy_core::lifecycle::CompletedBy;
    use therapy_core::model::{SessionDraft, SessionFeedback};
    use therapy_core::progress::{Percentage, ProgressSnapshot};
    use therapy_core::quiz::{QuizItem, QuizSubmission, grade};
    use therapy_core::time::fixed_now;

    fn booking(client: u64) -> NewSession {
        SessionDraft::ai(UserId::new(client), "gpt-4o-mini", "Grounding", fixed_now())
            .validate(fixed_now())
            .unwrap()
    }

    fn quiz_for(session: &Session) -> NewQuizResult {
        let submission = QuizSubmission::new(vec![QuizItem::new(
            "q",
            vec!["a".into(), "b".into()],
            0,
            Some(0),
        )]);
        NewQuizResult::from_grade(
            session.id(),
            session.client_id(),
            grade(&submission).unwrap(),
            fixed_now(),
        )
    }

    #[tokio::test]
    async fn stale_update_is_a_conflict() {
        let repo = InMemoryRepository::new();
        let mut session = repo.insert_new_session(booking(1)).await.unwrap();
        session.start(fixed_now()).unwrap();
        repo.update_session(&session, SessionStatus::Scheduled)
            .await
            .unwrap();

        let err = repo
            .update_session(&session, SessionStatus::Scheduled)
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Conflict));
    }

    #[tokio::test]
    async fn completion_writes_session_and_quiz_once() {
        let repo = InMemoryRepository::new();
        let mut session = repo.insert_new_session(booking(1)).await.unwrap();
        session
            .complete(CompletedBy::Client, SessionFeedback::default(), fixed_now())
            .unwrap();

        let quiz = repo
            .record_completion(&session, SessionStatus::Scheduled, Some(quiz_for(&session)))
            .await
            .unwrap()
            .expect("quiz stored");
        assert_eq!(quiz.score().value(), 100);

        let again = repo
            .record_completion(&session, SessionStatus::Scheduled, Some(quiz_for(&session)))
            .await;
        assert!(matches!(again, Err(StorageError::Conflict)));
        assert_eq!(repo.list_quiz_results_for_user(UserId::new(1)).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn save_progress_is_all_or_nothing() {
        let repo = InMemoryRepository::new();
        let snapshot = ProgressSnapshot {
            session: Percentage::new(50.0),
            quiz: Percentage::new(50.0),
            overall: Percentage::new(50.0),
        };
        let new = |cert: u64| {
            NewUserCertification::from_snapshot(
                UserId::new(1),
                CertificationId::new(cert),
                snapshot,
                fixed_now(),
            )
        };

        repo.save_progress(vec![ProgressWrite::Insert(new(1))])
            .await
            .unwrap();

        let err = repo
            .save_progress(vec![
                ProgressWrite::Insert(new(2)),
                ProgressWrite::Insert(new(1)),
            ])
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Conflict));

        let rows = repo
            .list_user_certifications_for_user(UserId::new(1))
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[tokio::test]
    async fn stale_certification_writes_are_conflicts() {
        let repo = InMemoryRepository::new();
        let snapshot = |overall: f64| ProgressSnapshot {
            session: Percentage::new(overall),
            quiz: Percentage::new(overall),
            overall: Percentage::new(overall),
        };
        let stale = repo
            .save_progress(vec![ProgressWrite::Insert(NewUserCertification::from_snapshot(
                UserId::new(1),
                CertificationId::new(1),
                snapshot(50.0),
                fixed_now(),
            ))])
            .await
            .unwrap()
            .remove(0);

        let mut earned = stale.clone();
        earned.apply_progress(snapshot(100.0), fixed_now());
        repo.save_progress(vec![ProgressWrite::Update {
            row: earned.clone(),
            expected: CertificationStatus::InProgress,
        }])
        .await
        .unwrap();
        let mut approved = earned.clone();
        approved.approve(UserId::new(9), fixed_now()).unwrap();
        repo.update_user_certification(&approved, CertificationStatus::Completed)
            .await
            .unwrap();

        let mut late = stale;
        late.apply_progress(snapshot(100.0), fixed_now() + chrono::Duration::days(3));
        let err = repo
            .save_progress(vec![ProgressWrite::Update {
                row: late,
                expected: CertificationStatus::InProgress,
            }])
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Conflict));

        let mut rejected = earned;
        rejected.reject(UserId::new(8), None, fixed_now()).unwrap();
        let err = repo
            .update_user_certification(&rejected, CertificationStatus::Completed)
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Conflict));

        let stored = repo
            .get_user_certification(approved.id())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored, approved);
    }
}
