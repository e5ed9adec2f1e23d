use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::ids::{QuizResultId, SessionId, UserId};
use crate::quiz::{GradedAnswer, QuizError, QuizGrade, QuizScore, score_for};

/// Graded quiz waiting for a storage-assigned id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewQuizResult {
    pub session_id: SessionId,
    pub user_id: UserId,
    pub answers: Vec<GradedAnswer>,
    pub score: QuizScore,
    pub total_questions: u32,
    pub created_at: DateTime<Utc>,
}

impl NewQuizResult {
    #[must_use]
    pub fn from_grade(
        session_id: SessionId,
        user_id: UserId,
        grade: QuizGrade,
        created_at: DateTime<Utc>,
    ) -> Self {
        let score = grade.score();
        let total_questions = grade.total();
        Self {
            session_id,
            user_id,
            answers: grade.into_answers(),
            score,
            total_questions,
            created_at,
        }
    }

    #[must_use]
    pub fn assign_id(self, id: QuizResultId) -> QuizResult {
        QuizResult {
            id,
            session_id: self.session_id,
            user_id: self.user_id,
            answers: self.answers,
            score: self.score,
            total_questions: self.total_questions,
            created_at: self.created_at,
        }
    }
}

/// Stored outcome of a post-session quiz. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizResult {
    id: QuizResultId,
    session_id: SessionId,
    user_id: UserId,
    answers: Vec<GradedAnswer>,
    score: QuizScore,
    total_questions: u32,
    created_at: DateTime<Utc>,
}

impl QuizResult {
    /// Rehydrate a quiz result, re-checking that the stored score matches the
    /// stored answers.
    ///
    /// # Errors
    ///
    /// Returns `QuizError::CountMismatch` if totals or score disagree with answers.
    pub fn from_persisted(
        id: QuizResultId,
        session_id: SessionId,
        user_id: UserId,
        answers: Vec<GradedAnswer>,
        score: QuizScore,
        total_questions: u32,
        created_at: DateTime<Utc>,
    ) -> Result<Self, QuizError> {
        let correct = answers.iter().filter(|a| a.is_correct).count();
        let correct = u32::try_from(correct).unwrap_or(u32::MAX);
        let len = u32::try_from(answers.len()).unwrap_or(u32::MAX);
        if len != total_questions || score_for(correct, total_questions)? != score {
            return Err(QuizError::CountMismatch {
                correct,
                total: total_questions,
            });
        }

        Ok(Self {
            id,
            session_id,
            user_id,
            answers,
            score,
            total_questions,
            created_at,
        })
    }

    #[must_use]
    pub fn id(&self) -> QuizResultId {
        self.id
    }

    #[must_use]
    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    #[must_use]
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    #[must_use]
    pub fn answers(&self) -> &[GradedAnswer] {
        &self.answers
    }

    #[must_use]
    pub fn score(&self) -> QuizScore {
        self.score
    }

    #[must_use]
    pub fn total_questions(&self) -> u32 {
        self.total_questions
    }

    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}
