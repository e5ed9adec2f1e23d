use serde::Serialize;

use therapy_core::model::{QuizResult, Rating, Session, SessionFeedback};
use therapy_core::quiz::QuizSubmission;

use crate::certifications::ProgressReport;
use crate::error::{ErrorKind, SessionServiceError};

/// What a client (or doctor) submits when ending a session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompletionRequest {
    pub quiz: Option<QuizSubmission>,
    /// 1..=5 when given.
    pub rating: Option<u8>,
    pub feedback: Option<String>,
}

impl CompletionRequest {
    #[must_use]
    pub fn with_quiz(mut self, quiz: QuizSubmission) -> Self {
        self.quiz = Some(quiz);
        self
    }

    #[must_use]
    pub fn with_rating(mut self, rating: u8) -> Self {
        self.rating = Some(rating);
        self
    }

    #[must_use]
    pub fn with_feedback(mut self, feedback: impl Into<String>) -> Self {
        self.feedback = Some(feedback.into());
        self
    }

    pub(crate) fn session_feedback(&self) -> Result<SessionFeedback, SessionServiceError> {
        let rating = self.rating.map(Rating::new).transpose()?;
        Ok(SessionFeedback::new(rating, self.feedback.clone())?)
    }
}

/// Non-fatal problem raised after the completion itself was stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "warning", rename_all = "snake_case")]
pub enum CompletionWarning {
    /// Certification progress could not be recomputed; the session and quiz
    /// are stored and the next recomputation will catch up.
    ProgressNotUpdated { kind: ErrorKind, message: String },
}

/// Result of completing a session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletionOutcome {
    pub session: Session,
    pub quiz_result: Option<QuizResult>,
    pub progress: Option<ProgressReport>,
    pub warning: Option<CompletionWarning>,
}
