use therapy_core::model::{Certification, CertificationId, NewCertification};

use super::SqliteRepository;
use super::mapping::{db, id_i64, map_certification_row};
use crate::repository::{CertificationRepository, StorageError};

#[async_trait::async_trait]
impl CertificationRepository for SqliteRepository {
    async fn insert_new_certification(
        &self,
        certification: NewCertification,
    ) -> Result<Certification, StorageError> {
        let res = sqlx::query(
            r"
                INSERT INTO certifications (
                    name, description, required_sessions, required_quizzes,
                    minimum_score, created_at
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ",
        )
        .bind(certification.name.as_str())
        .bind(certification.description.as_deref())
        .bind(i64::from(certification.required_sessions))
        .bind(i64::from(certification.required_quizzes))
        .bind(i64::from(certification.minimum_score.value()))
        .bind(certification.created_at)
        .execute(&self.pool)
        .await
        .map_err(db)?;

        let id = u64::try_from(res.last_insert_rowid())
            .map_err(|_| StorageError::Serialization("certification_id sign overflow".into()))?;
        Ok(certification.assign_id(CertificationId::new(id)))
    }

    async fn get_certification(
        &self,
        id: CertificationId,
    ) -> Result<Option<Certification>, StorageError> {
        let row = sqlx::query(
            r"
                SELECT id, name, description, required_sessions, required_quizzes,
                       minimum_score, created_at
                FROM certifications
                WHERE id = ?1
            ",
        )
        .bind(id_i64("certification_id", id.value())?)
        .fetch_optional(&self.pool)
        .await
        .map_err(db)?;

        row.as_ref().map(map_certification_row).transpose()
    }

    async fn list_certifications(&self) -> Result<Vec<Certification>, StorageError> {
        let rows = sqlx::query(
            r"
                SELECT id, name, description, required_sessions, required_quizzes,
                       minimum_score, created_at
                FROM certifications
                ORDER BY id ASC
            ",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db)?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(map_certification_row(&row)?);
        }
        Ok(out)
    }
}
