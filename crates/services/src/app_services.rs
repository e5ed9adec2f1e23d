use std::sync::Arc;

use storage::repository::Storage;

use crate::Clock;
use crate::certifications::CertificationService;
use crate::dashboard::DashboardService;
use crate::error::AppServicesError;
use crate::payments::PaymentService;
use crate::sessions::SessionService;
use crate::settings::ServiceSettings;

/// Assembles app-facing services over one storage backend.
#[derive(Clone)]
pub struct AppServices {
    settings: ServiceSettings,
    sessions: Arc<SessionService>,
    certifications: Arc<CertificationService>,
    payments: Arc<PaymentService>,
    dashboards: Arc<DashboardService>,
}

impl AppServices {
    /// Build services backed by `SQLite` storage.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError` if storage initialization fails.
    pub async fn new_sqlite(
        db_url: &str,
        clock: Clock,
        settings: ServiceSettings,
    ) -> Result<Self, AppServicesError> {
        let storage = Storage::sqlite(db_url).await?;
        Ok(Self::from_storage(&storage, clock, settings))
    }

    /// Build services over the in-memory backend.
    #[must_use]
    pub fn in_memory(clock: Clock, settings: ServiceSettings) -> Self {
        Self::from_storage(&Storage::in_memory(), clock, settings)
    }

    #[must_use]
    pub fn from_storage(storage: &Storage, clock: Clock, settings: ServiceSettings) -> Self {
        let certifications = Arc::new(CertificationService::new(
            clock,
            settings.clone(),
            Arc::clone(&storage.certifications),
            Arc::clone(&storage.user_certifications),
            Arc::clone(&storage.sessions),
            Arc::clone(&storage.quiz_results),
        ));
        let sessions = Arc::new(SessionService::new(
            clock,
            settings.clone(),
            Arc::clone(&storage.sessions),
            Arc::clone(&storage.completions),
            Arc::clone(&storage.quiz_results),
            Arc::clone(&certifications),
        ));
        let payments = Arc::new(PaymentService::new(clock, Arc::clone(&storage.payments)));
        let dashboards = Arc::new(DashboardService::new(
            Arc::clone(&storage.sessions),
            Arc::clone(&storage.quiz_results),
            Arc::clone(&storage.payments),
            Arc::clone(&certifications),
        ));

        Self {
            settings,
            sessions,
            certifications,
            payments,
            dashboards,
        }
    }

    #[must_use]
    pub fn settings(&self) -> &ServiceSettings {
        &self.settings
    }

    #[must_use]
    pub fn sessions(&self) -> Arc<SessionService> {
        Arc::clone(&self.sessions)
    }

    #[must_use]
    pub fn certifications(&self) -> Arc<CertificationService> {
        Arc::clone(&self.certifications)
    }

    #[must_use]
    pub fn payments(&self) -> Arc<PaymentService> {
        Arc::clone(&self.payments)
    }

    #[must_use]
    pub fn dashboards(&self) -> Arc<DashboardService> {
        Arc::clone(&self.dashboards)
    }
}
