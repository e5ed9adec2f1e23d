use std::sync::Arc;

use tracing::info;

use storage::repository::PaymentRepository;
use therapy_core::model::{NewPayment, Payment, PaymentId, PaymentStatus, SessionId, UserId};

use crate::Clock;
use crate::error::PaymentServiceError;

/// Records payments and their verification outcome for dashboards.
///
/// How a payment gets verified is decided elsewhere; this only stores the
/// decision.
#[derive(Clone)]
pub struct PaymentService {
    clock: Clock,
    payments: Arc<dyn PaymentRepository>,
}

impl PaymentService {
    #[must_use]
    pub fn new(clock: Clock, payments: Arc<dyn PaymentRepository>) -> Self {
        Self { clock, payments }
    }

    /// Record a pending payment.
    ///
    /// # Errors
    ///
    /// Returns `PaymentServiceError::Payment` for a zero amount or a malformed
    /// currency code.
    pub async fn record_payment(
        &self,
        user_id: UserId,
        session_id: Option<SessionId>,
        amount_minor: u64,
        currency: &str,
    ) -> Result<Payment, PaymentServiceError> {
        let new = NewPayment::new(user_id, session_id, amount_minor, currency, self.clock.now())?;
        let payment = self.payments.insert_new_payment(new).await?;
        info!(
            payment_id = %payment.id,
            user_id = %user_id,
            amount_minor,
            currency = payment.currency.as_str(),
            "payment recorded"
        );
        Ok(payment)
    }

    /// # Errors
    ///
    /// Returns `PaymentServiceError::Payment` if the payment was already settled.
    pub async fn verify(&self, id: PaymentId) -> Result<Payment, PaymentServiceError> {
        self.settle(id, PaymentStatus::Verified).await
    }

    /// # Errors
    ///
    /// Returns `PaymentServiceError::Payment` if the payment was already settled.
    pub async fn reject(&self, id: PaymentId) -> Result<Payment, PaymentServiceError> {
        self.settle(id, PaymentStatus::Rejected).await
    }

    async fn settle(
        &self,
        id: PaymentId,
        status: PaymentStatus,
    ) -> Result<Payment, PaymentServiceError> {
        let mut payment = self
            .payments
            .get_payment(id)
            .await?
            .ok_or(PaymentServiceError::NotFound(id))?;
        payment.settle(status, self.clock.now())?;
        self.payments.update_payment(&payment).await?;
        info!(payment_id = %id, status = %status, "payment settled");
        Ok(payment)
    }

    /// # Errors
    ///
    /// Returns `PaymentServiceError::Storage` if repository access fails.
    pub async fn list_for_user(
        &self,
        user_id: UserId,
    ) -> Result<Vec<Payment>, PaymentServiceError> {
        Ok(self.payments.list_payments_for_user(user_id).await?)
    }
}
