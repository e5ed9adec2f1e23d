use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

use crate::model::ids::{PaymentId, SessionId, UserId};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum PaymentError {
    #[error("payment amount must be > 0")]
    ZeroAmount,

    #[error("invalid currency code: {0}")]
    InvalidCurrency(String),

    #[error("payment is already {0}")]
    AlreadySettled(PaymentStatus),

    #[error("a payment cannot be settled as {0}")]
    NotASettlement(PaymentStatus),

    #[error("unknown payment status: {0}")]
    UnknownStatus(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    Pending,
    Verified,
    Rejected,
}

impl PaymentStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Verified => "verified",
            Self::Rejected => "rejected",
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentStatus {
    type Err = PaymentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "verified" => Ok(Self::Verified),
            "rejected" => Ok(Self::Rejected),
            other => Err(PaymentError::UnknownStatus(other.to_owned())),
        }
    }
}

/// Payment as recorded for dashboards. Verification happens elsewhere; this
/// only tracks the outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payment {
    pub id: PaymentId,
    pub user_id: UserId,
    pub session_id: Option<SessionId>,
    /// Amount in minor units (cents).
    pub amount_minor: u64,
    pub currency: String,
    pub status: PaymentStatus,
    pub created_at: DateTime<Utc>,
    pub settled_at: Option<DateTime<Utc>>,
}

impl Payment {
    /// # Errors
    ///
    /// Returns `PaymentError::NotASettlement` when `status` is pending and
    /// `PaymentError::AlreadySettled` unless the payment is pending.
    pub fn settle(
        &mut self,
        status: PaymentStatus,
        now: DateTime<Utc>,
    ) -> Result<(), PaymentError> {
        if status == PaymentStatus::Pending {
            return Err(PaymentError::NotASettlement(status));
        }
        if self.status != PaymentStatus::Pending {
            return Err(PaymentError::AlreadySettled(self.status));
        }
        self.status = status;
        self.settled_at = Some(now);
        Ok(())
    }

    #[must_use]
    pub fn is_verified(&self) -> bool {
        self.status == PaymentStatus::Verified
    }
}

/// Validated payment waiting for a storage-assigned id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewPayment {
    pub user_id: UserId,
    pub session_id: Option<SessionId>,
    pub amount_minor: u64,
    pub currency: String,
    pub created_at: DateTime<Utc>,
}

impl NewPayment {
    /// # Errors
    ///
    /// Returns `PaymentError` for zero amounts or non ISO-4217-shaped currencies.
    pub fn new(
        user_id: UserId,
        session_id: Option<SessionId>,
        amount_minor: u64,
        currency: &str,
        created_at: DateTime<Utc>,
    ) -> Result<Self, PaymentError> {
        if amount_minor == 0 {
            return Err(PaymentError::ZeroAmount);
        }
        let currency = currency.trim().to_ascii_uppercase();
        if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(PaymentError::InvalidCurrency(currency));
        }
        Ok(Self {
            user_id,
            session_id,
            amount_minor,
            currency,
            created_at,
        })
    }

    #[must_use]
    pub fn assign_id(self, id: PaymentId) -> Payment {
        Payment {
            id,
            user_id: self.user_id,
            session_id: self.session_id,
            amount_minor: self.amount_minor,
            currency: self.currency,
            status: PaymentStatus::Pending,
            created_at: self.created_at,
            settled_at: None,
        }
    }
}
