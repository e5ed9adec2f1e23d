//! Shared error types for the services crate.
//!
//! Every service error reports an [`ErrorKind`] so a handler boundary can map
//! it to a status and a safe message without matching on internals.

use serde::Serialize;
use thiserror::Error;

use storage::repository::StorageError;
use storage::sqlite::SqliteInitError;
use therapy_core::lifecycle::TransitionError;
use therapy_core::model::{
    CertificationError, PaymentError, PaymentId, SessionId, SessionTransitionError,
    SessionValidationError, UserCertificationId,
};
use therapy_core::quiz::QuizError;

/// Coarse error category exposed at the boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    InvalidTransition,
    Validation,
    Conflict,
    Internal,
}

impl ErrorKind {
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::NotFound => "not_found",
            Self::InvalidTransition => "invalid_transition",
            Self::Validation => "validation",
            Self::Conflict => "conflict",
            Self::Internal => "internal_error",
        }
    }

    /// HTTP-style status a handler would answer with.
    #[must_use]
    pub const fn status_code(self) -> u16 {
        match self {
            Self::NotFound => 404,
            Self::InvalidTransition | Self::Conflict => 409,
            Self::Validation => 422,
            Self::Internal => 500,
        }
    }
}

fn storage_kind(err: &StorageError) -> ErrorKind {
    match err {
        StorageError::NotFound => ErrorKind::NotFound,
        StorageError::Conflict => ErrorKind::Conflict,
        _ => ErrorKind::Internal,
    }
}

/// Message safe to hand to a caller. Internal failures are logged here and
/// replaced with a generic text.
fn public_message<E: std::error::Error>(kind: ErrorKind, err: &E) -> String {
    if kind == ErrorKind::Internal {
        tracing::error!(error = %err, "internal error");
        return "internal error".to_owned();
    }
    err.to_string()
}

/// Errors emitted by the session lifecycle service.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SessionServiceError {
    #[error("session {0} not found")]
    NotFound(SessionId),
    #[error(transparent)]
    Validation(#[from] SessionValidationError),
    #[error(transparent)]
    Transition(#[from] TransitionError),
    #[error(transparent)]
    Quiz(#[from] QuizError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl From<SessionTransitionError> for SessionServiceError {
    fn from(err: SessionTransitionError) -> Self {
        match err {
            SessionTransitionError::Validation(e) => Self::Validation(e),
            SessionTransitionError::Transition(e) => Self::Transition(e),
        }
    }
}

impl SessionServiceError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Validation(_) | Self::Quiz(_) => ErrorKind::Validation,
            Self::Transition(_) => ErrorKind::InvalidTransition,
            Self::Storage(e) => storage_kind(e),
        }
    }

    #[must_use]
    pub fn public_message(&self) -> String {
        public_message(self.kind(), self)
    }
}

/// Errors emitted by the certification service.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum CertificationServiceError {
    #[error("user certification {0} not found")]
    NotFound(UserCertificationId),
    #[error("a certification named {0:?} already exists")]
    DuplicateName(String),
    #[error(transparent)]
    Certification(#[from] CertificationError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl CertificationServiceError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::DuplicateName(_) => ErrorKind::Conflict,
            Self::Certification(
                CertificationError::NotCompleted(_)
                | CertificationError::AlreadyApproved
                | CertificationError::AlreadyRejected,
            ) => ErrorKind::InvalidTransition,
            Self::Certification(CertificationError::InvalidPersistedState(_)) => {
                ErrorKind::Internal
            }
            Self::Certification(_) => ErrorKind::Validation,
            Self::Storage(e) => storage_kind(e),
        }
    }

    #[must_use]
    pub fn public_message(&self) -> String {
        public_message(self.kind(), self)
    }
}

/// Errors emitted by the payment ledger service.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PaymentServiceError {
    #[error("payment {0} not found")]
    NotFound(PaymentId),
    #[error(transparent)]
    Payment(#[from] PaymentError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl PaymentServiceError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Payment(PaymentError::AlreadySettled(_)) => ErrorKind::InvalidTransition,
            Self::Payment(_) => ErrorKind::Validation,
            Self::Storage(e) => storage_kind(e),
        }
    }

    #[must_use]
    pub fn public_message(&self) -> String {
        public_message(self.kind(), self)
    }
}

/// Errors emitted while building dashboards.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum DashboardError {
    #[error(transparent)]
    Certification(#[from] CertificationServiceError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl DashboardError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Certification(e) => e.kind(),
            Self::Storage(e) => storage_kind(e),
        }
    }

    #[must_use]
    pub fn public_message(&self) -> String {
        public_message(self.kind(), self)
    }
}

/// Errors emitted while bootstrapping app services.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AppServicesError {
    #[error(transparent)]
    Sqlite(#[from] SqliteInitError),
    #[error("invalid meeting base url: {0}")]
    MeetingBaseUrl(#[from] url::ParseError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use therapy_core::model::{CertificationStatus, SessionStatus};

    #[test]
    fn kinds_follow_the_taxonomy() {
        let err = SessionServiceError::from(TransitionError {
            from: SessionStatus::Completed,
            to: SessionStatus::Completed,
        });
        assert_eq!(err.kind(), ErrorKind::InvalidTransition);
        assert_eq!(
            SessionServiceError::from(StorageError::Conflict).kind(),
            ErrorKind::Conflict
        );
        assert_eq!(
            CertificationServiceError::from(CertificationError::NotCompleted(
                CertificationStatus::InProgress
            ))
            .kind(),
            ErrorKind::InvalidTransition
        );
        assert_eq!(
            CertificationServiceError::from(CertificationError::EmptyName).kind(),
            ErrorKind::Validation
        );
        assert_eq!(
            CertificationServiceError::from(StorageError::Conflict).kind(),
            ErrorKind::Conflict
        );
    }

    #[test]
    fn internal_details_stay_private() {
        let err = SessionServiceError::from(StorageError::Connection("socket reset".into()));
        assert_eq!(err.kind(), ErrorKind::Internal);
        assert_eq!(err.public_message(), "internal error");

        let err = SessionServiceError::NotFound(SessionId::new(7));
        assert_eq!(err.public_message(), "session 7 not found");
    }
}
