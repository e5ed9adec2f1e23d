use therapy_core::model::{NewPayment, Payment, PaymentId, PaymentStatus, UserId};

use super::SqliteRepository;
use super::mapping::{db, id_i64, map_payment_row};
use crate::repository::{PaymentRepository, StorageError};

const PAYMENT_SELECT: &str = "SELECT id, user_id, session_id, amount_minor, currency, status, \
     created_at, settled_at FROM payments";

#[async_trait::async_trait]
impl PaymentRepository for SqliteRepository {
    async fn insert_new_payment(&self, payment: NewPayment) -> Result<Payment, StorageError> {
        let session_id = payment
            .session_id
            .map(|s| id_i64("session_id", s.value()))
            .transpose()?;
        let res = sqlx::query(
            r"
                INSERT INTO payments (
                    user_id, session_id, amount_minor, currency, status, created_at
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ",
        )
        .bind(id_i64("user_id", payment.user_id.value())?)
        .bind(session_id)
        .bind(id_i64("amount_minor", payment.amount_minor)?)
        .bind(payment.currency.as_str())
        .bind(PaymentStatus::Pending.as_str())
        .bind(payment.created_at)
        .execute(&self.pool)
        .await
        .map_err(db)?;

        let id = u64::try_from(res.last_insert_rowid())
            .map_err(|_| StorageError::Serialization("payment_id sign overflow".into()))?;
        Ok(payment.assign_id(PaymentId::new(id)))
    }

    async fn get_payment(&self, id: PaymentId) -> Result<Option<Payment>, StorageError> {
        let sql = format!("{PAYMENT_SELECT} WHERE id = ?1");
        let row = sqlx::query(&sql)
            .bind(id_i64("payment_id", id.value())?)
            .fetch_optional(&self.pool)
            .await
            .map_err(db)?;

        row.as_ref().map(map_payment_row).transpose()
    }

    async fn update_payment(&self, payment: &Payment) -> Result<(), StorageError> {
        let res = sqlx::query("UPDATE payments SET status = ?1, settled_at = ?2 WHERE id = ?3")
            .bind(payment.status.as_str())
            .bind(payment.settled_at)
            .bind(id_i64("payment_id", payment.id.value())?)
            .execute(&self.pool)
            .await
            .map_err(db)?;

        if res.rows_affected() == 0 {
            return Err(StorageError::NotFound);
        }
        Ok(())
    }

    async fn list_payments_for_user(
        &self,
        user_id: UserId,
    ) -> Result<Vec<Payment>, StorageError> {
        let sql = format!("{PAYMENT_SELECT} WHERE user_id = ?1 ORDER BY created_at ASC, id ASC");
        let rows = sqlx::query(&sql)
            .bind(id_i64("user_id", user_id.value())?)
            .fetch_all(&self.pool)
            .await
            .map_err(db)?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(map_payment_row(&row)?);
        }
        Ok(out)
    }

    async fn list_payments(
        &self,
        status: Option<PaymentStatus>,
    ) -> Result<Vec<Payment>, StorageError> {
        let sql = format!(
            "{PAYMENT_SELECT} WHERE (?1 IS NULL OR status = ?1) ORDER BY created_at ASC, id ASC"
        );
        let rows = sqlx::query(&sql)
            .bind(status.map(PaymentStatus::as_str))
            .fetch_all(&self.pool)
            .await
            .map_err(db)?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(map_payment_row(&row)?);
        }
        Ok(out)
    }
}
