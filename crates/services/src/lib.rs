#![forbid(unsafe_code)]

pub mod app_services;
pub mod certifications;
pub mod dashboard;
pub mod error;
pub mod payments;
pub mod sessions;
pub mod settings;

pub use therapy_core::Clock;

pub use app_services::AppServices;
pub use certifications::{CertificationService, CertificationView, ProgressEntry, ProgressReport};
pub use dashboard::{AdminDashboard, ClientDashboard, DashboardService, DoctorDashboard};
pub use error::{
    AppServicesError, CertificationServiceError, DashboardError, ErrorKind, PaymentServiceError,
    SessionServiceError,
};
pub use payments::PaymentService;
pub use sessions::{CompletionOutcome, CompletionRequest, CompletionWarning, SessionService};
pub use settings::ServiceSettings;
