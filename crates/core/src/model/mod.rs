mod certification;
mod ids;
mod payment;
mod quiz_result;
mod session;

pub use ids::{
    CertificationId, ParseIdError, PaymentId, QuizResultId, SessionId, UserCertificationId,
    UserId,
};

pub use certification::{
    AdminReview, Certification, CertificationDraft, CertificationError, CertificationState,
    CertificationStatus, NewCertification, NewUserCertification, ReviewOutcome,
    UserCertification,
};
pub use payment::{NewPayment, Payment, PaymentError, PaymentStatus};
pub use quiz_result::{NewQuizResult, QuizResult};
pub use session::{
    MeetingUrl, NewSession, Rating, Session, SessionDraft, SessionFeedback, SessionKind,
    SessionState, SessionStatus, SessionTransitionError, SessionType, SessionValidationError,
};
