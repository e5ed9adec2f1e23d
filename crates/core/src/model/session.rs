use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use url::Url;

use crate::lifecycle::{self, CompletedBy, TransitionError};
use crate::model::ids::{SessionId, UserId};

const MAX_TOPIC_LEN: usize = 200;
const MAX_FEEDBACK_LEN: usize = 4_000;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SessionValidationError {
    #[error("session topic cannot be empty")]
    EmptyTopic,

    #[error("session topic is too long ({len} characters, max 200)")]
    TopicTooLong { len: usize },

    #[error("AI sessions require a model identifier")]
    EmptyModel,

    #[error("invalid meeting URL: {0}")]
    InvalidMeetingUrl(String),

    #[error("rating must be between 1 and 5, got {0}")]
    InvalidRating(u8),

    #[error("feedback is too long ({len} characters, max 4000)")]
    FeedbackTooLong { len: usize },

    #[error("session is not a human session")]
    NotHumanSession,

    #[error("client cannot be assigned as their own doctor")]
    SelfAssignment,

    #[error("inconsistent persisted session: {0}")]
    InvalidPersistedState(String),
}

//
// ─── STATUS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Scheduled,
    /// Human request waiting for an admin to assign a doctor.
    Pending,
    InProgress,
    Completed,
    Cancelled,
}

impl SessionStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Scheduled => "scheduled",
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionStatus {
    type Err = SessionValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "scheduled" => Ok(Self::Scheduled),
            "pending" => Ok(Self::Pending),
            "in_progress" => Ok(Self::InProgress),
            "completed" => Ok(Self::Completed),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(SessionValidationError::InvalidPersistedState(format!(
                "unknown status: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionType {
    Ai,
    Human,
}

impl SessionType {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ai => "ai",
            Self::Human => "human",
        }
    }
}

impl FromStr for SessionType {
    type Err = SessionValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ai" => Ok(Self::Ai),
            "human" => Ok(Self::Human),
            other => Err(SessionValidationError::InvalidPersistedState(format!(
                "unknown session type: {other}"
            ))),
        }
    }
}

//
// ─── VALUE TYPES ───────────────────────────────────────────────────────────────
//

/// Validated absolute http(s) meeting link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MeetingUrl(String);

impl MeetingUrl {
    /// # Errors
    ///
    /// Returns `SessionValidationError::InvalidMeetingUrl` for unparsable or
    /// non-http(s) URLs.
    pub fn parse(raw: &str) -> Result<Self, SessionValidationError> {
        let trimmed = raw.trim();
        let url = Url::parse(trimmed)
            .map_err(|_| SessionValidationError::InvalidMeetingUrl(trimmed.to_owned()))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(SessionValidationError::InvalidMeetingUrl(trimmed.to_owned()));
        }
        Ok(Self(url.to_string()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Star rating left by the client, `1..=5`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Rating(u8);

impl Rating {
    /// # Errors
    ///
    /// Returns `SessionValidationError::InvalidRating` outside `1..=5`.
    pub fn new(value: u8) -> Result<Self, SessionValidationError> {
        if (1..=5).contains(&value) {
            Ok(Self(value))
        } else {
            Err(SessionValidationError::InvalidRating(value))
        }
    }

    #[must_use]
    pub fn value(self) -> u8 {
        self.0
    }
}

/// What a client leaves behind when a session ends.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionFeedback {
    rating: Option<Rating>,
    comment: Option<String>,
}

impl SessionFeedback {
    /// # Errors
    ///
    /// Returns `SessionValidationError::FeedbackTooLong` for oversized comments.
    pub fn new(
        rating: Option<Rating>,
        comment: Option<String>,
    ) -> Result<Self, SessionValidationError> {
        let comment = comment
            .map(|c| c.trim().to_owned())
            .filter(|c| !c.is_empty());
        if let Some(len) = comment.as_ref().map(|c| c.chars().count()) {
            if len > MAX_FEEDBACK_LEN {
                return Err(SessionValidationError::FeedbackTooLong { len });
            }
        }
        Ok(Self { rating, comment })
    }

    #[must_use]
    pub fn rating(&self) -> Option<Rating> {
        self.rating
    }

    #[must_use]
    pub fn comment(&self) -> Option<&str> {
        self.comment.as_deref()
    }
}

//
// ─── KIND & STATE ──────────────────────────────────────────────────────────────
//

/// AI- or human-led session, with the data only that kind carries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionKind {
    Ai {
        /// Opaque model identifier recorded for the chat provider.
        model: String,
    },
    Human {
        doctor_id: Option<UserId>,
        meeting_url: Option<MeetingUrl>,
    },
}

impl SessionKind {
    #[must_use]
    pub fn session_type(&self) -> SessionType {
        match self {
            Self::Ai { .. } => SessionType::Ai,
            Self::Human { .. } => SessionType::Human,
        }
    }

    #[must_use]
    pub fn doctor_id(&self) -> Option<UserId> {
        match self {
            Self::Ai { .. } => None,
            Self::Human { doctor_id, .. } => *doctor_id,
        }
    }

    #[must_use]
    pub fn meeting_url(&self) -> Option<&MeetingUrl> {
        match self {
            Self::Ai { .. } => None,
            Self::Human { meeting_url, .. } => meeting_url.as_ref(),
        }
    }

    #[must_use]
    pub fn ai_model(&self) -> Option<&str> {
        match self {
            Self::Ai { model } => Some(model),
            Self::Human { .. } => None,
        }
    }
}

/// Lifecycle position of a session. Each variant owns its timestamps, so a
/// scheduled session cannot carry an end time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SessionState {
    Scheduled,
    Pending,
    InProgress {
        started_at: DateTime<Utc>,
    },
    Completed {
        /// `None` when the client completed without a doctor start.
        started_at: Option<DateTime<Utc>>,
        ended_at: DateTime<Utc>,
        feedback: SessionFeedback,
    },
    Cancelled {
        cancelled_at: DateTime<Utc>,
        reason: Option<String>,
    },
}

impl SessionState {
    #[must_use]
    pub fn status(&self) -> SessionStatus {
        match self {
            Self::Scheduled => SessionStatus::Scheduled,
            Self::Pending => SessionStatus::Pending,
            Self::InProgress { .. } => SessionStatus::InProgress,
            Self::Completed { .. } => SessionStatus::Completed,
            Self::Cancelled { .. } => SessionStatus::Cancelled,
        }
    }
}

//
// ─── DRAFT ─────────────────────────────────────────────────────────────────────
//

/// Booking request before validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionDraft {
    pub client_id: UserId,
    pub kind: SessionKind,
    pub topic: String,
    pub scheduled_at: DateTime<Utc>,
}

impl SessionDraft {
    #[must_use]
    pub fn ai(
        client_id: UserId,
        model: impl Into<String>,
        topic: impl Into<String>,
        scheduled_at: DateTime<Utc>,
    ) -> Self {
        Self {
            client_id,
            kind: SessionKind::Ai {
                model: model.into(),
            },
            topic: topic.into(),
            scheduled_at,
        }
    }

    #[must_use]
    pub fn human(
        client_id: UserId,
        doctor_id: Option<UserId>,
        meeting_url: Option<MeetingUrl>,
        topic: impl Into<String>,
        scheduled_at: DateTime<Utc>,
    ) -> Self {
        Self {
            client_id,
            kind: SessionKind::Human {
                doctor_id,
                meeting_url,
            },
            topic: topic.into(),
            scheduled_at,
        }
    }

    /// Validate the booking. Human sessions without a doctor start `Pending`.
    ///
    /// # Errors
    ///
    /// Returns `SessionValidationError` for blank topics/models or a client
    /// booked with themselves.
    pub fn validate(self, now: DateTime<Utc>) -> Result<NewSession, SessionValidationError> {
        let topic = validate_topic(&self.topic)?;

        let (kind, state) = match self.kind {
            SessionKind::Ai { model } => {
                let model = model.trim().to_owned();
                if model.is_empty() {
                    return Err(SessionValidationError::EmptyModel);
                }
                (SessionKind::Ai { model }, SessionState::Scheduled)
            }
            SessionKind::Human {
                doctor_id,
                meeting_url,
            } => {
                if doctor_id == Some(self.client_id) {
                    return Err(SessionValidationError::SelfAssignment);
                }
                let state = if doctor_id.is_some() {
                    SessionState::Scheduled
                } else {
                    SessionState::Pending
                };
                (
                    SessionKind::Human {
                        doctor_id,
                        meeting_url,
                    },
                    state,
                )
            }
        };

        Ok(NewSession {
            client_id: self.client_id,
            kind,
            topic,
            scheduled_at: self.scheduled_at,
            state,
            created_at: now,
        })
    }
}

fn validate_topic(raw: &str) -> Result<String, SessionValidationError> {
    let topic = raw.trim();
    if topic.is_empty() {
        return Err(SessionValidationError::EmptyTopic);
    }
    let len = topic.chars().count();
    if len > MAX_TOPIC_LEN {
        return Err(SessionValidationError::TopicTooLong { len });
    }
    Ok(topic.to_owned())
}

/// Validated booking waiting for a storage-assigned id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSession {
    pub client_id: UserId,
    pub kind: SessionKind,
    pub topic: String,
    pub scheduled_at: DateTime<Utc>,
    pub state: SessionState,
    pub created_at: DateTime<Utc>,
}

impl NewSession {
    #[must_use]
    pub fn assign_id(self, id: SessionId) -> Session {
        Session {
            id,
            client_id: self.client_id,
            kind: self.kind,
            topic: self.topic,
            scheduled_at: self.scheduled_at,
            state: self.state,
            created_at: self.created_at,
        }
    }
}

//
// ─── SESSION ───────────────────────────────────────────────────────────────────
//

/// A therapy session record. Sessions are never deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    id: SessionId,
    client_id: UserId,
    kind: SessionKind,
    topic: String,
    scheduled_at: DateTime<Utc>,
    state: SessionState,
    created_at: DateTime<Utc>,
}

impl Session {
    /// Rehydrate a session from storage.
    ///
    /// # Errors
    ///
    /// Returns `SessionValidationError::InvalidPersistedState` when the kind and
    /// state disagree (e.g. a pending AI session).
    pub fn from_persisted(
        id: SessionId,
        client_id: UserId,
        kind: SessionKind,
        topic: String,
        scheduled_at: DateTime<Utc>,
        state: SessionState,
        created_at: DateTime<Utc>,
    ) -> Result<Self, SessionValidationError> {
        match (&kind, &state) {
            (SessionKind::Ai { .. }, SessionState::Pending) => {
                return Err(SessionValidationError::InvalidPersistedState(
                    "AI session cannot be pending".into(),
                ));
            }
            (
                SessionKind::Human {
                    doctor_id: Some(_), ..
                },
                SessionState::Pending,
            ) => {
                return Err(SessionValidationError::InvalidPersistedState(
                    "pending session already has a doctor".into(),
                ));
            }
            _ => {}
        }
        if let SessionState::Completed {
            started_at: Some(started),
            ended_at,
            ..
        } = &state
        {
            if ended_at < started {
                return Err(SessionValidationError::InvalidPersistedState(
                    "ended_at is before started_at".into(),
                ));
            }
        }

        Ok(Self {
            id,
            client_id,
            kind,
            topic,
            scheduled_at,
            state,
            created_at,
        })
    }

    #[must_use]
    pub fn id(&self) -> SessionId {
        self.id
    }

    #[must_use]
    pub fn client_id(&self) -> UserId {
        self.client_id
    }

    #[must_use]
    pub fn kind(&self) -> &SessionKind {
        &self.kind
    }

    #[must_use]
    pub fn session_type(&self) -> SessionType {
        self.kind.session_type()
    }

    #[must_use]
    pub fn doctor_id(&self) -> Option<UserId> {
        self.kind.doctor_id()
    }

    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    #[must_use]
    pub fn scheduled_at(&self) -> DateTime<Utc> {
        self.scheduled_at
    }

    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    #[must_use]
    pub fn state(&self) -> &SessionState {
        &self.state
    }

    #[must_use]
    pub fn status(&self) -> SessionStatus {
        self.state.status()
    }

    #[must_use]
    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        match &self.state {
            SessionState::InProgress { started_at } => Some(*started_at),
            SessionState::Completed { started_at, .. } => *started_at,
            _ => None,
        }
    }

    #[must_use]
    pub fn ended_at(&self) -> Option<DateTime<Utc>> {
        match &self.state {
            SessionState::Completed { ended_at, .. } => Some(*ended_at),
            _ => None,
        }
    }

    #[must_use]
    pub fn feedback(&self) -> Option<&SessionFeedback> {
        match &self.state {
            SessionState::Completed { feedback, .. } => Some(feedback),
            _ => None,
        }
    }

    fn transition(&self, to: SessionStatus) -> Result<(), TransitionError> {
        lifecycle::validate_transition(self.status(), to).map(|_| ())
    }

    /// Admin assigns a doctor to a pending human request (`Pending → Scheduled`).
    ///
    /// # Errors
    ///
    /// Returns `SessionTransitionError` if the session is AI-led, is the client
    /// themselves, or is not pending.
    pub fn assign_doctor(
        &mut self,
        doctor_id: UserId,
        meeting_url: Option<MeetingUrl>,
    ) -> Result<(), SessionTransitionError> {
        if doctor_id == self.client_id {
            return Err(SessionValidationError::SelfAssignment.into());
        }
        let SessionKind::Human {
            doctor_id: slot,
            meeting_url: url_slot,
        } = &mut self.kind
        else {
            return Err(SessionValidationError::NotHumanSession.into());
        };
        lifecycle::validate_transition(self.state.status(), SessionStatus::Scheduled)?;

        *slot = Some(doctor_id);
        if meeting_url.is_some() {
            *url_slot = meeting_url;
        }
        self.state = SessionState::Scheduled;
        Ok(())
    }

    /// Doctor starts the session (`Scheduled → InProgress`).
    ///
    /// # Errors
    ///
    /// Returns `TransitionError` if the session is not scheduled.
    pub fn start(&mut self, now: DateTime<Utc>) -> Result<(), TransitionError> {
        self.transition(SessionStatus::InProgress)?;
        self.state = SessionState::InProgress { started_at: now };
        Ok(())
    }

    /// Complete the session and stamp `ended_at`.
    ///
    /// # Errors
    ///
    /// Returns `TransitionError` if `actor` may not complete from the current
    /// status; a second completion is always rejected.
    pub fn complete(
        &mut self,
        actor: CompletedBy,
        feedback: SessionFeedback,
        now: DateTime<Utc>,
    ) -> Result<(), TransitionError> {
        let from = self.status();
        if !lifecycle::can_complete(from, actor) {
            return Err(TransitionError {
                from,
                to: SessionStatus::Completed,
            });
        }
        let started_at = self.started_at();
        // Backdated clocks must not produce ended_at < started_at.
        let ended_at = started_at.map_or(now, |s| s.max(now));
        self.state = SessionState::Completed {
            started_at,
            ended_at,
            feedback,
        };
        Ok(())
    }

    /// Cancel an open booking (`Scheduled | Pending → Cancelled`).
    ///
    /// # Errors
    ///
    /// Returns `TransitionError` once the session started or ended.
    pub fn cancel(
        &mut self,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<(), TransitionError> {
        self.transition(SessionStatus::Cancelled)?;
        self.state = SessionState::Cancelled {
            cancelled_at: now,
            reason: reason.map(|r| r.trim().to_owned()).filter(|r| !r.is_empty()),
        };
        Ok(())
    }
}

/// Failure of an admin assignment: bad input or a bad edge.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionTransitionError {
    #[error(transparent)]
    Validation(#[from] SessionValidationError),
    #[error(transparent)]
    Transition(#[from] TransitionError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::fixed_now;
    use chrono::Duration;

    fn human_pending() -> Session {
        SessionDraft::human(UserId::new(1), None, None, "Anxiety check-in", fixed_now())
            .validate(fixed_now())
            .unwrap()
            .assign_id(SessionId::new(10))
    }

    fn ai_scheduled() -> Session {
        SessionDraft::ai(UserId::new(1), "gpt-4o-mini", "Sleep hygiene", fixed_now())
            .validate(fixed_now())
            .unwrap()
            .assign_id(SessionId::new(11))
    }

    #[test]
    fn booking_without_doctor_is_pending() {
        let session = human_pending();
        assert_eq!(session.status(), SessionStatus::Pending);
        assert_eq!(session.doctor_id(), None);
        assert_eq!(ai_scheduled().status(), SessionStatus::Scheduled);
    }

    #[test]
    fn booking_requires_topic_and_model() {
        let err = SessionDraft::ai(UserId::new(1), "gpt", "  ", fixed_now())
            .validate(fixed_now())
            .unwrap_err();
        assert_eq!(err, SessionValidationError::EmptyTopic);

        let err = SessionDraft::ai(UserId::new(1), " ", "Topic", fixed_now())
            .validate(fixed_now())
            .unwrap_err();
        assert_eq!(err, SessionValidationError::EmptyModel);
    }

    #[test]
    fn assign_doctor_moves_pending_to_scheduled() {
        let mut session = human_pending();
        session.assign_doctor(UserId::new(2), None).unwrap();
        assert_eq!(session.status(), SessionStatus::Scheduled);
        assert_eq!(session.doctor_id(), Some(UserId::new(2)));

        // A second assignment is not a pending → scheduled edge anymore.
        let err = session.assign_doctor(UserId::new(3), None).unwrap_err();
        assert!(matches!(err, SessionTransitionError::Transition(_)));
    }

    #[test]
    fn assign_doctor_rejects_ai_sessions() {
        let mut session = ai_scheduled();
        let err = session.assign_doctor(UserId::new(2), None).unwrap_err();
        assert_eq!(
            err,
            SessionTransitionError::Validation(SessionValidationError::NotHumanSession)
        );
    }

    #[test]
    fn start_requires_scheduled() {
        let mut session = human_pending();
        assert!(session.start(fixed_now()).is_err());

        session.assign_doctor(UserId::new(2), None).unwrap();
        session.start(fixed_now()).unwrap();
        assert_eq!(session.started_at(), Some(fixed_now()));

        let err = session.start(fixed_now()).unwrap_err();
        assert_eq!(err.from, SessionStatus::InProgress);
    }

    #[test]
    fn doctor_cannot_complete_scheduled_but_client_can() {
        let mut session = ai_scheduled();
        let err = session
            .complete(CompletedBy::Doctor, SessionFeedback::default(), fixed_now())
            .unwrap_err();
        assert_eq!(err.from, SessionStatus::Scheduled);

        session
            .complete(CompletedBy::Client, SessionFeedback::default(), fixed_now())
            .unwrap();
        assert_eq!(session.status(), SessionStatus::Completed);
        assert_eq!(session.started_at(), None);
        assert_eq!(session.ended_at(), Some(fixed_now()));
    }

    #[test]
    fn second_completion_is_rejected() {
        let mut session = ai_scheduled();
        let later = fixed_now() + Duration::minutes(50);
        session
            .complete(CompletedBy::Client, SessionFeedback::default(), later)
            .unwrap();
        let err = session
            .complete(CompletedBy::Client, SessionFeedback::default(), later)
            .unwrap_err();
        assert_eq!(err.from, SessionStatus::Completed);
        assert_eq!(session.ended_at(), Some(later));
    }

    #[test]
    fn cancel_only_before_start() {
        let mut session = ai_scheduled();
        session.cancel(Some(" travel ".into()), fixed_now()).unwrap();
        assert!(matches!(
            session.state(),
            SessionState::Cancelled { reason: Some(r), .. } if r == "travel"
        ));

        let mut started = ai_scheduled();
        started.start(fixed_now()).unwrap();
        assert!(started.cancel(None, fixed_now()).is_err());
    }

    #[test]
    fn feedback_validation() {
        assert!(Rating::new(0).is_err());
        assert!(Rating::new(6).is_err());
        let fb = SessionFeedback::new(Some(Rating::new(4).unwrap()), Some("   ".into())).unwrap();
        assert_eq!(fb.comment(), None);
        assert_eq!(fb.rating().map(Rating::value), Some(4));
    }

    #[test]
    fn meeting_url_requires_http() {
        assert!(MeetingUrl::parse("https://meet.example.org/room-1").is_ok());
        assert!(MeetingUrl::parse("ftp://meet.example.org").is_err());
        assert!(MeetingUrl::parse("not a url").is_err());
    }

    #[test]
    fn persisted_pending_ai_session_is_rejected() {
        let err = Session::from_persisted(
            SessionId::new(1),
            UserId::new(1),
            SessionKind::Ai {
                model: "m".into(),
            },
            "t".into(),
            fixed_now(),
            SessionState::Pending,
            fixed_now(),
        )
        .unwrap_err();
        assert!(matches!(err, SessionValidationError::InvalidPersistedState(_)));
    }
}
