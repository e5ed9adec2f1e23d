use sqlx::{Sqlite, Transaction};
use therapy_core::model::{
    CertificationId, CertificationStatus, NewUserCertification, UserCertification,
    UserCertificationId, UserId,
};

use super::SqliteRepository;
use super::mapping::{
    USER_CERTIFICATION_COLUMNS, db, id_i64, map_user_certification_row, review_columns,
};
use crate::repository::{ProgressWrite, StorageError, UserCertificationRepository};

async fn insert_row(
    tx: &mut Transaction<'_, Sqlite>,
    certification: &NewUserCertification,
) -> Result<UserCertificationId, StorageError> {
    let review = review_columns(&certification.state)?;
    let res = sqlx::query(
        r"
            INSERT INTO user_certifications (
                user_id, certification_id, status, progress, earned_at,
                reviewed_by, reviewed_at, rejection_reason, updated_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
        ",
    )
    .bind(id_i64("user_id", certification.user_id.value())?)
    .bind(id_i64("certification_id", certification.certification_id.value())?)
    .bind(certification.state.status().as_str())
    .bind(certification.progress.value())
    .bind(review.earned_at)
    .bind(review.reviewed_by)
    .bind(review.reviewed_at)
    .bind(review.rejection_reason)
    .bind(certification.updated_at)
    .execute(&mut **tx)
    .await
    .map_err(db)?;

    let id = u64::try_from(res.last_insert_rowid())
        .map_err(|_| StorageError::Serialization("user_certification_id sign overflow".into()))?;
    Ok(UserCertificationId::new(id))
}

async fn update_row(
    tx: &mut Transaction<'_, Sqlite>,
    certification: &UserCertification,
    expected: CertificationStatus,
) -> Result<(), StorageError> {
    let id = id_i64("user_certification_id", certification.id().value())?;
    let review = review_columns(certification.state())?;
    let res = sqlx::query(
        r"
            UPDATE user_certifications SET
                status = ?1,
                progress = ?2,
                earned_at = ?3,
                reviewed_by = ?4,
                reviewed_at = ?5,
                rejection_reason = ?6,
                updated_at = ?7
            WHERE id = ?8 AND status = ?9
        ",
    )
    .bind(certification.status().as_str())
    .bind(certification.progress().value())
    .bind(review.earned_at)
    .bind(review.reviewed_by)
    .bind(review.reviewed_at)
    .bind(review.rejection_reason)
    .bind(certification.updated_at())
    .bind(id)
    .bind(expected.as_str())
    .execute(&mut **tx)
    .await
    .map_err(db)?;

    if res.rows_affected() == 1 {
        return Ok(());
    }
    let exists = sqlx::query("SELECT 1 FROM user_certifications WHERE id = ?1")
        .bind(id)
        .fetch_optional(&mut **tx)
        .await
        .map_err(db)?;
    Err(if exists.is_some() {
        StorageError::Conflict
    } else {
        StorageError::NotFound
    })
}

#[async_trait::async_trait]
impl UserCertificationRepository for SqliteRepository {
    async fn get_user_certification(
        &self,
        id: UserCertificationId,
    ) -> Result<Option<UserCertification>, StorageError> {
        let sql =
            format!("SELECT {USER_CERTIFICATION_COLUMNS} FROM user_certifications WHERE id = ?1");
        let row = sqlx::query(&sql)
            .bind(id_i64("user_certification_id", id.value())?)
            .fetch_optional(&self.pool)
            .await
            .map_err(db)?;

        row.as_ref().map(map_user_certification_row).transpose()
    }

    async fn find_user_certification(
        &self,
        user_id: UserId,
        certification_id: CertificationId,
    ) -> Result<Option<UserCertification>, StorageError> {
        let sql = format!(
            "SELECT {USER_CERTIFICATION_COLUMNS} FROM user_certifications \
             WHERE user_id = ?1 AND certification_id = ?2"
        );
        let row = sqlx::query(&sql)
            .bind(id_i64("user_id", user_id.value())?)
            .bind(id_i64("certification_id", certification_id.value())?)
            .fetch_optional(&self.pool)
            .await
            .map_err(db)?;

        row.as_ref().map(map_user_certification_row).transpose()
    }

    async fn list_user_certifications_for_user(
        &self,
        user_id: UserId,
    ) -> Result<Vec<UserCertification>, StorageError> {
        let sql = format!(
            "SELECT {USER_CERTIFICATION_COLUMNS} FROM user_certifications \
             WHERE user_id = ?1 ORDER BY id ASC"
        );
        let rows = sqlx::query(&sql)
            .bind(id_i64("user_id", user_id.value())?)
            .fetch_all(&self.pool)
            .await
            .map_err(db)?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(map_user_certification_row(&row)?);
        }
        Ok(out)
    }

    async fn list_user_certifications(
        &self,
        status: Option<CertificationStatus>,
    ) -> Result<Vec<UserCertification>, StorageError> {
        let sql = format!(
            "SELECT {USER_CERTIFICATION_COLUMNS} FROM user_certifications \
             WHERE (?1 IS NULL OR status = ?1) ORDER BY id ASC"
        );
        let rows = sqlx::query(&sql)
            .bind(status.map(CertificationStatus::as_str))
            .fetch_all(&self.pool)
            .await
            .map_err(db)?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(map_user_certification_row(&row)?);
        }
        Ok(out)
    }

    async fn save_progress(
        &self,
        writes: Vec<ProgressWrite>,
    ) -> Result<Vec<UserCertification>, StorageError> {
        let mut tx = self.pool.begin().await.map_err(db)?;

        let mut saved = Vec::with_capacity(writes.len());
        for write in writes {
            let row = match write {
                ProgressWrite::Insert(new) => {
                    let id = insert_row(&mut tx, &new).await?;
                    new.assign_id(id)
                }
                ProgressWrite::Update { row, expected } => {
                    update_row(&mut tx, &row, expected).await?;
                    row
                }
            };
            saved.push(row);
        }

        tx.commit().await.map_err(db)?;
        Ok(saved)
    }

    async fn update_user_certification(
        &self,
        certification: &UserCertification,
        expected: CertificationStatus,
    ) -> Result<(), StorageError> {
        let mut tx = self.pool.begin().await.map_err(db)?;
        update_row(&mut tx, certification, expected).await?;
        tx.commit().await.map_err(db)
    }
}
