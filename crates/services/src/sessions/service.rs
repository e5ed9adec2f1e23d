use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use storage::repository::{CompletionPersistence, QuizResultRepository, SessionRepository};
use therapy_core::lifecycle::CompletedBy;
use therapy_core::model::{
    MeetingUrl, NewQuizResult, QuizResult, Session, SessionDraft, SessionId, SessionStatus,
    UserId,
};
use therapy_core::quiz;

use super::completion::{CompletionOutcome, CompletionRequest, CompletionWarning};
use crate::Clock;
use crate::certifications::CertificationService;
use crate::error::SessionServiceError;
use crate::settings::ServiceSettings;

/// Session lifecycle: booking, doctor assignment, start, completion and
/// cancellation.
///
/// Every write re-checks the stored status it started from, so two racing
/// transitions cannot both succeed.
#[derive(Clone)]
pub struct SessionService {
    clock: Clock,
    settings: ServiceSettings,
    sessions: Arc<dyn SessionRepository>,
    completions: Arc<dyn CompletionPersistence>,
    quiz_results: Arc<dyn QuizResultRepository>,
    certifications: Arc<CertificationService>,
}

impl SessionService {
    #[must_use]
    pub fn new(
        clock: Clock,
        settings: ServiceSettings,
        sessions: Arc<dyn SessionRepository>,
        completions: Arc<dyn CompletionPersistence>,
        quiz_results: Arc<dyn QuizResultRepository>,
        certifications: Arc<CertificationService>,
    ) -> Self {
        Self {
            clock,
            settings,
            sessions,
            completions,
            quiz_results,
            certifications,
        }
    }

    //
    // ─── BOOKING ───────────────────────────────────────────────────────────────
    //

    /// Book an AI-led session. It starts out `Scheduled`.
    ///
    /// # Errors
    ///
    /// Returns `SessionServiceError::Validation` for a blank model or topic.
    pub async fn book_ai_session(
        &self,
        client_id: UserId,
        model: &str,
        topic: &str,
        scheduled_at: DateTime<Utc>,
    ) -> Result<Session, SessionServiceError> {
        let new =
            SessionDraft::ai(client_id, model, topic, scheduled_at).validate(self.clock.now())?;
        let session = self.sessions.insert_new_session(new).await?;
        info!(session_id = %session.id(), client_id = %client_id, "ai session booked");
        Ok(session)
    }

    /// Book a human-led session. Without a doctor it waits as `Pending` for an
    /// admin assignment.
    ///
    /// # Errors
    ///
    /// Returns `SessionServiceError::Validation` for a blank topic, a malformed
    /// meeting URL, or a client booking themselves.
    pub async fn book_human_session(
        &self,
        client_id: UserId,
        doctor_id: Option<UserId>,
        topic: &str,
        scheduled_at: DateTime<Utc>,
        meeting_url: Option<&str>,
    ) -> Result<Session, SessionServiceError> {
        let meeting_url = meeting_url.map(MeetingUrl::parse).transpose()?;
        let new = SessionDraft::human(client_id, doctor_id, meeting_url, topic, scheduled_at)
            .validate(self.clock.now())?;
        let session = self.sessions.insert_new_session(new).await?;
        info!(
            session_id = %session.id(),
            client_id = %client_id,
            status = %session.status(),
            "human session booked"
        );
        Ok(session)
    }

    /// Admin assigns a doctor to a pending human request.
    ///
    /// When no meeting link is given and none was booked, one is generated
    /// under the configured meeting base URL.
    ///
    /// # Errors
    ///
    /// Returns `SessionServiceError::Transition` unless the session is pending,
    /// `Validation` for AI sessions or a malformed link.
    pub async fn assign_doctor(
        &self,
        session_id: SessionId,
        doctor_id: UserId,
        meeting_url: Option<&str>,
    ) -> Result<Session, SessionServiceError> {
        let mut session = self.load(session_id).await?;
        let expected = session.status();

        let meeting_url = match meeting_url {
            Some(raw) => Some(MeetingUrl::parse(raw)?),
            None if session.kind().meeting_url().is_none() => self.generated_meeting_url()?,
            None => None,
        };
        session.assign_doctor(doctor_id, meeting_url)?;
        self.sessions.update_session(&session, expected).await?;

        info!(session_id = %session_id, doctor_id = %doctor_id, "doctor assigned");
        Ok(session)
    }

    fn generated_meeting_url(&self) -> Result<Option<MeetingUrl>, SessionServiceError> {
        let Some(base) = self.settings.meeting_base_url() else {
            return Ok(None);
        };
        let room = uuid::Uuid::new_v4().simple().to_string();
        let Ok(url) = base.join(&room) else {
            warn!(base = %base, "could not build meeting url");
            return Ok(None);
        };
        Ok(Some(MeetingUrl::parse(url.as_str())?))
    }

    //
    // ─── TRANSITIONS ───────────────────────────────────────────────────────────
    //

    /// Doctor starts a scheduled session.
    ///
    /// # Errors
    ///
    /// Returns `SessionServiceError::Transition` unless the session is scheduled.
    pub async fn start_session(
        &self,
        session_id: SessionId,
    ) -> Result<Session, SessionServiceError> {
        let mut session = self.load(session_id).await?;
        let expected = session.status();
        session.start(self.clock.now())?;
        self.sessions.update_session(&session, expected).await?;
        info!(session_id = %session_id, "session started");
        Ok(session)
    }

    /// Client ends a session. Allowed from scheduled, pending and in progress.
    ///
    /// # Errors
    ///
    /// Returns `SessionServiceError::Transition` for completed or cancelled
    /// sessions and `Validation`/`Quiz` for a bad rating, feedback or quiz.
    pub async fn complete_by_client(
        &self,
        session_id: SessionId,
        request: CompletionRequest,
    ) -> Result<CompletionOutcome, SessionServiceError> {
        self.complete(session_id, CompletedBy::Client, request).await
    }

    /// Doctor ends a session they started. Only allowed from in progress.
    ///
    /// # Errors
    ///
    /// Returns `SessionServiceError::Transition` unless the session is in
    /// progress, and `Validation`/`Quiz` for bad input.
    pub async fn complete_by_doctor(
        &self,
        session_id: SessionId,
        request: CompletionRequest,
    ) -> Result<CompletionOutcome, SessionServiceError> {
        self.complete(session_id, CompletedBy::Doctor, request).await
    }

    async fn complete(
        &self,
        session_id: SessionId,
        actor: CompletedBy,
        request: CompletionRequest,
    ) -> Result<CompletionOutcome, SessionServiceError> {
        let now = self.clock.now();
        let mut session = self.load(session_id).await?;
        let expected = session.status();

        let feedback = request.session_feedback()?;
        session.complete(actor, feedback, now)?;

        let quiz = request
            .quiz
            .as_ref()
            .map(|submission| {
                quiz::grade(submission).map(|graded| {
                    NewQuizResult::from_grade(session.id(), session.client_id(), graded, now)
                })
            })
            .transpose()?;

        let quiz_result = self
            .completions
            .record_completion(&session, expected, quiz)
            .await?;
        info!(
            session_id = %session_id,
            actor = ?actor,
            score = quiz_result.as_ref().map(|q| q.score().value()),
            "session completed"
        );

        let (progress, warning) = match self
            .certifications
            .recompute_for_user(session.client_id())
            .await
        {
            Ok(report) => (Some(report), None),
            Err(e) => {
                warn!(
                    session_id = %session_id,
                    client_id = %session.client_id(),
                    error = %e,
                    "certification progress not updated"
                );
                let warning = CompletionWarning::ProgressNotUpdated {
                    kind: e.kind(),
                    message: e.public_message(),
                };
                (None, Some(warning))
            }
        };

        Ok(CompletionOutcome {
            session,
            quiz_result,
            progress,
            warning,
        })
    }

    /// Cancel a booking that has not started.
    ///
    /// # Errors
    ///
    /// Returns `SessionServiceError::Transition` once the session started or ended.
    pub async fn cancel_session(
        &self,
        session_id: SessionId,
        reason: Option<String>,
    ) -> Result<Session, SessionServiceError> {
        let mut session = self.load(session_id).await?;
        let expected = session.status();
        session.cancel(reason, self.clock.now())?;
        self.sessions.update_session(&session, expected).await?;
        info!(session_id = %session_id, from = %expected, "session cancelled");
        Ok(session)
    }

    //
    // ─── READS ─────────────────────────────────────────────────────────────────
    //

    async fn load(&self, session_id: SessionId) -> Result<Session, SessionServiceError> {
        self.sessions
            .get_session(session_id)
            .await?
            .ok_or(SessionServiceError::NotFound(session_id))
    }

    /// # Errors
    ///
    /// Returns `SessionServiceError::NotFound` for unknown ids.
    pub async fn get_session(
        &self,
        session_id: SessionId,
    ) -> Result<Session, SessionServiceError> {
        self.load(session_id).await
    }

    /// Quiz taken at the end of a session, if any.
    ///
    /// # Errors
    ///
    /// Returns `SessionServiceError::Storage` if repository access fails.
    pub async fn quiz_result(
        &self,
        session_id: SessionId,
    ) -> Result<Option<QuizResult>, SessionServiceError> {
        Ok(self.quiz_results.get_quiz_result_for_session(session_id).await?)
    }

    /// # Errors
    ///
    /// Returns `SessionServiceError::Storage` if repository access fails.
    pub async fn list_for_client(
        &self,
        client_id: UserId,
    ) -> Result<Vec<Session>, SessionServiceError> {
        Ok(self.sessions.list_sessions_for_client(client_id).await?)
    }

    /// # Errors
    ///
    /// Returns `SessionServiceError::Storage` if repository access fails.
    pub async fn list_for_doctor(
        &self,
        doctor_id: UserId,
    ) -> Result<Vec<Session>, SessionServiceError> {
        Ok(self.sessions.list_sessions_for_doctor(doctor_id).await?)
    }

    /// Human requests still waiting for a doctor.
    ///
    /// # Errors
    ///
    /// Returns `SessionServiceError::Storage` if repository access fails.
    pub async fn pending_requests(&self) -> Result<Vec<Session>, SessionServiceError> {
        Ok(self
            .sessions
            .list_sessions(Some(SessionStatus::Pending))
            .await?)
    }
}
