use chrono::{DateTime, Utc};
use sqlx::Row;
use sqlx::sqlite::SqliteRow;
use therapy_core::model::{
    AdminReview, Certification, CertificationId, CertificationState, CertificationStatus,
    MeetingUrl, NewCertification, Payment, PaymentId, PaymentStatus, QuizResult, QuizResultId,
    Rating, Session, SessionFeedback, SessionId, SessionKind, SessionState, SessionStatus,
    SessionType, UserCertification, UserCertificationId, UserId,
};
use therapy_core::progress::Percentage;
use therapy_core::quiz::{GradedAnswer, QuizScore};

use crate::repository::StorageError;

pub(crate) fn ser<E: core::fmt::Display>(e: E) -> StorageError {
    StorageError::Serialization(e.to_string())
}

/// Maps driver errors, turning unique-key violations into `Conflict`.
pub(crate) fn db(e: sqlx::Error) -> StorageError {
    match e {
        sqlx::Error::Database(inner) if inner.is_unique_violation() => StorageError::Conflict,
        other => StorageError::Connection(other.to_string()),
    }
}

fn i64_to_u64(field: &'static str, v: i64) -> Result<u64, StorageError> {
    u64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} sign overflow")))
}

fn i64_to_u32(field: &'static str, v: i64) -> Result<u32, StorageError> {
    u32::try_from(v).map_err(|_| StorageError::Serialization(format!("invalid {field}: {v}")))
}

pub(crate) fn id_i64(field: &'static str, v: u64) -> Result<i64, StorageError> {
    i64::try_from(v).map_err(|_| StorageError::Serialization(format!("{field} overflow")))
}

fn user_id(row: &SqliteRow, column: &'static str) -> Result<UserId, StorageError> {
    Ok(UserId::new(i64_to_u64(
        column,
        row.try_get::<i64, _>(column).map_err(ser)?,
    )?))
}

fn opt_user_id(row: &SqliteRow, column: &'static str) -> Result<Option<UserId>, StorageError> {
    row.try_get::<Option<i64>, _>(column)
        .map_err(ser)?
        .map(|v| i64_to_u64(column, v).map(UserId::new))
        .transpose()
}

fn required_at(
    row: &SqliteRow,
    column: &'static str,
) -> Result<DateTime<Utc>, StorageError> {
    row.try_get::<Option<DateTime<Utc>>, _>(column)
        .map_err(ser)?
        .ok_or_else(|| StorageError::Serialization(format!("missing {column}")))
}

//
// ─── SESSIONS ──────────────────────────────────────────────────────────────────
//

/// Flattened column values of a session's kind and state.
pub(crate) struct SessionColumns<'a> {
    pub session_type: &'static str,
    pub ai_model: Option<&'a str>,
    pub doctor_id: Option<i64>,
    pub meeting_url: Option<&'a str>,
    pub status: &'static str,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub rating: Option<i64>,
    pub feedback: Option<&'a str>,
    pub cancelled_at: Option<DateTime<Utc>>,
    pub cancel_reason: Option<&'a str>,
}

pub(crate) fn session_columns<'a>(
    kind: &'a SessionKind,
    state: &'a SessionState,
) -> Result<SessionColumns<'a>, StorageError> {
    let doctor_id = kind
        .doctor_id()
        .map(|d| id_i64("doctor_id", d.value()))
        .transpose()?;
    let mut cols = SessionColumns {
        session_type: kind.session_type().as_str(),
        ai_model: kind.ai_model(),
        doctor_id,
        meeting_url: kind.meeting_url().map(MeetingUrl::as_str),
        status: state.status().as_str(),
        started_at: None,
        ended_at: None,
        rating: None,
        feedback: None,
        cancelled_at: None,
        cancel_reason: None,
    };
    match state {
        SessionState::Scheduled | SessionState::Pending => {}
        SessionState::InProgress { started_at } => cols.started_at = Some(*started_at),
        SessionState::Completed {
            started_at,
            ended_at,
            feedback,
        } => {
            cols.started_at = *started_at;
            cols.ended_at = Some(*ended_at);
            cols.rating = feedback.rating().map(|r| i64::from(r.value()));
            cols.feedback = feedback.comment();
        }
        SessionState::Cancelled {
            cancelled_at,
            reason,
        } => {
            cols.cancelled_at = Some(*cancelled_at);
            cols.cancel_reason = reason.as_deref();
        }
    }
    Ok(cols)
}

pub(crate) const SESSION_COLUMNS: &str = "id, client_id, session_type, ai_model, doctor_id, \
     meeting_url, topic, scheduled_at, status, started_at, ended_at, rating, feedback, \
     cancelled_at, cancel_reason, created_at";

pub(crate) fn map_session_row(row: &SqliteRow) -> Result<Session, StorageError> {
    let type_str: String = row.try_get("session_type").map_err(ser)?;
    let kind = match type_str.parse::<SessionType>().map_err(ser)? {
        SessionType::Ai => SessionKind::Ai {
            model: row
                .try_get::<Option<String>, _>("ai_model")
                .map_err(ser)?
                .ok_or_else(|| StorageError::Serialization("missing ai_model".into()))?,
        },
        SessionType::Human => SessionKind::Human {
            doctor_id: opt_user_id(row, "doctor_id")?,
            meeting_url: row
                .try_get::<Option<String>, _>("meeting_url")
                .map_err(ser)?
                .map(|u| MeetingUrl::parse(&u))
                .transpose()
                .map_err(ser)?,
        },
    };

    let status_str: String = row.try_get("status").map_err(ser)?;
    let state = match status_str.parse::<SessionStatus>().map_err(ser)? {
        SessionStatus::Scheduled => SessionState::Scheduled,
        SessionStatus::Pending => SessionState::Pending,
        SessionStatus::InProgress => SessionState::InProgress {
            started_at: required_at(row, "started_at")?,
        },
        SessionStatus::Completed => {
            let rating = row
                .try_get::<Option<i64>, _>("rating")
                .map_err(ser)?
                .map(|r| {
                    u8::try_from(r)
                        .map_err(|_| StorageError::Serialization(format!("invalid rating: {r}")))
                        .and_then(|r| Rating::new(r).map_err(ser))
                })
                .transpose()?;
            let comment: Option<String> = row.try_get("feedback").map_err(ser)?;
            SessionState::Completed {
                started_at: row.try_get("started_at").map_err(ser)?,
                ended_at: required_at(row, "ended_at")?,
                feedback: SessionFeedback::new(rating, comment).map_err(ser)?,
            }
        }
        SessionStatus::Cancelled => SessionState::Cancelled {
            cancelled_at: required_at(row, "cancelled_at")?,
            reason: row.try_get("cancel_reason").map_err(ser)?,
        },
    };

    Session::from_persisted(
        SessionId::new(i64_to_u64("id", row.try_get("id").map_err(ser)?)?),
        user_id(row, "client_id")?,
        kind,
        row.try_get("topic").map_err(ser)?,
        row.try_get("scheduled_at").map_err(ser)?,
        state,
        row.try_get("created_at").map_err(ser)?,
    )
    .map_err(ser)
}

//
// ─── QUIZ RESULTS ──────────────────────────────────────────────────────────────
//

pub(crate) fn map_quiz_row(row: &SqliteRow) -> Result<QuizResult, StorageError> {
    let answers_json: String = row.try_get("answers").map_err(ser)?;
    let answers: Vec<GradedAnswer> = serde_json::from_str(&answers_json).map_err(ser)?;
    let score = QuizScore::new(i64_to_u32("score", row.try_get("score").map_err(ser)?)?)
        .map_err(ser)?;

    QuizResult::from_persisted(
        QuizResultId::new(i64_to_u64("id", row.try_get("id").map_err(ser)?)?),
        SessionId::new(i64_to_u64(
            "session_id",
            row.try_get("session_id").map_err(ser)?,
        )?),
        user_id(row, "user_id")?,
        answers,
        score,
        i64_to_u32("total_questions", row.try_get("total_questions").map_err(ser)?)?,
        row.try_get("created_at").map_err(ser)?,
    )
    .map_err(ser)
}

//
// ─── CERTIFICATIONS ────────────────────────────────────────────────────────────
//

pub(crate) fn map_certification_row(row: &SqliteRow) -> Result<Certification, StorageError> {
    let minimum_score = QuizScore::new(i64_to_u32(
        "minimum_score",
        row.try_get("minimum_score").map_err(ser)?,
    )?)
    .map_err(ser)?;

    let new = NewCertification {
        name: row.try_get("name").map_err(ser)?,
        description: row.try_get("description").map_err(ser)?,
        required_sessions: i64_to_u32(
            "required_sessions",
            row.try_get("required_sessions").map_err(ser)?,
        )?,
        required_quizzes: i64_to_u32(
            "required_quizzes",
            row.try_get("required_quizzes").map_err(ser)?,
        )?,
        minimum_score,
        created_at: row.try_get("created_at").map_err(ser)?,
    };
    let id = CertificationId::new(i64_to_u64("id", row.try_get("id").map_err(ser)?)?);
    Ok(new.assign_id(id))
}

/// Flattened review columns of a user certification state.
pub(crate) struct ReviewColumns<'a> {
    pub earned_at: Option<DateTime<Utc>>,
    pub reviewed_by: Option<i64>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub rejection_reason: Option<&'a str>,
}

pub(crate) fn review_columns(
    state: &CertificationState,
) -> Result<ReviewColumns<'_>, StorageError> {
    let (review, reason) = match state {
        CertificationState::InProgress | CertificationState::Completed { .. } => (None, None),
        CertificationState::Approved { approval, .. } => (Some(approval), None),
        CertificationState::Rejected {
            rejection, reason, ..
        } => (Some(rejection), reason.as_deref()),
    };
    Ok(ReviewColumns {
        earned_at: state.earned_at(),
        reviewed_by: review
            .map(|r| id_i64("reviewed_by", r.by.value()))
            .transpose()?,
        reviewed_at: review.map(|r| r.at),
        rejection_reason: reason,
    })
}

pub(crate) const USER_CERTIFICATION_COLUMNS: &str = "id, user_id, certification_id, status, \
     progress, earned_at, reviewed_by, reviewed_at, rejection_reason, updated_at";

pub(crate) fn map_user_certification_row(
    row: &SqliteRow,
) -> Result<UserCertification, StorageError> {
    let review = |row: &SqliteRow| -> Result<AdminReview, StorageError> {
        Ok(AdminReview {
            by: opt_user_id(row, "reviewed_by")?
                .ok_or_else(|| StorageError::Serialization("missing reviewed_by".into()))?,
            at: required_at(row, "reviewed_at")?,
        })
    };

    let status_str: String = row.try_get("status").map_err(ser)?;
    let state = match status_str.parse::<CertificationStatus>().map_err(ser)? {
        CertificationStatus::InProgress => CertificationState::InProgress,
        CertificationStatus::Completed => CertificationState::Completed {
            earned_at: required_at(row, "earned_at")?,
        },
        CertificationStatus::Approved => CertificationState::Approved {
            earned_at: required_at(row, "earned_at")?,
            approval: review(row)?,
        },
        CertificationStatus::Rejected => CertificationState::Rejected {
            earned_at: required_at(row, "earned_at")?,
            rejection: review(row)?,
            reason: row.try_get("rejection_reason").map_err(ser)?,
        },
        CertificationStatus::Locked => {
            return Err(StorageError::Serialization(
                "locked certifications are never stored".into(),
            ));
        }
    };

    UserCertification::from_persisted(
        UserCertificationId::new(i64_to_u64("id", row.try_get("id").map_err(ser)?)?),
        user_id(row, "user_id")?,
        CertificationId::new(i64_to_u64(
            "certification_id",
            row.try_get("certification_id").map_err(ser)?,
        )?),
        state,
        Percentage::new(row.try_get("progress").map_err(ser)?),
        row.try_get("updated_at").map_err(ser)?,
    )
    .map_err(ser)
}

//
// ─── PAYMENTS ──────────────────────────────────────────────────────────────────
//

pub(crate) fn map_payment_row(row: &SqliteRow) -> Result<Payment, StorageError> {
    let status_str: String = row.try_get("status").map_err(ser)?;
    let amount: i64 = row.try_get("amount_minor").map_err(ser)?;

    Ok(Payment {
        id: PaymentId::new(i64_to_u64("id", row.try_get("id").map_err(ser)?)?),
        user_id: user_id(row, "user_id")?,
        session_id: row
            .try_get::<Option<i64>, _>("session_id")
            .map_err(ser)?
            .map(|v| i64_to_u64("session_id", v).map(SessionId::new))
            .transpose()?,
        amount_minor: i64_to_u64("amount_minor", amount)?,
        currency: row.try_get("currency").map_err(ser)?,
        status: status_str.parse::<PaymentStatus>().map_err(ser)?,
        created_at: row.try_get("created_at").map_err(ser)?,
        settled_at: row.try_get("settled_at").map_err(ser)?,
    })
}
