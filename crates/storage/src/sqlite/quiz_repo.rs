use therapy_core::model::{QuizResult, SessionId, UserId};

use super::SqliteRepository;
use super::mapping::{db, id_i64, map_quiz_row};
use crate::repository::{QuizResultRepository, StorageError};

#[async_trait::async_trait]
impl QuizResultRepository for SqliteRepository {
    async fn get_quiz_result_for_session(
        &self,
        session_id: SessionId,
    ) -> Result<Option<QuizResult>, StorageError> {
        let row = sqlx::query(
            r"
                SELECT id, session_id, user_id, answers, score, total_questions, created_at
                FROM quiz_results
                WHERE session_id = ?1
            ",
        )
        .bind(id_i64("session_id", session_id.value())?)
        .fetch_optional(&self.pool)
        .await
        .map_err(db)?;

        row.as_ref().map(map_quiz_row).transpose()
    }

    async fn list_quiz_results_for_user(
        &self,
        user_id: UserId,
    ) -> Result<Vec<QuizResult>, StorageError> {
        let rows = sqlx::query(
            r"
                SELECT id, session_id, user_id, answers, score, total_questions, created_at
                FROM quiz_results
                WHERE user_id = ?1
                ORDER BY created_at ASC, id ASC
            ",
        )
        .bind(id_i64("user_id", user_id.value())?)
        .fetch_all(&self.pool)
        .await
        .map_err(db)?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(map_quiz_row(&row)?);
        }
        Ok(out)
    }
}
