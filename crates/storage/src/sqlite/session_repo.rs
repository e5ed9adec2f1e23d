use sqlx::{Sqlite, Transaction};
use therapy_core::model::{
    NewQuizResult, NewSession, QuizResult, QuizResultId, Session, SessionId, SessionStatus,
    UserId,
};

use super::SqliteRepository;
use super::mapping::{SESSION_COLUMNS, db, id_i64, map_session_row, ser, session_columns};
use crate::repository::{CompletionPersistence, SessionRepository, StorageError};

/// Writes every mutable session column, guarded on the expected stored status.
async fn write_session(
    tx: &mut Transaction<'_, Sqlite>,
    session: &Session,
    expected: SessionStatus,
) -> Result<(), StorageError> {
    let cols = session_columns(session.kind(), session.state())?;
    let res = sqlx::query(
        r"
            UPDATE sessions SET
                doctor_id = ?1,
                meeting_url = ?2,
                status = ?3,
                started_at = ?4,
                ended_at = ?5,
                rating = ?6,
                feedback = ?7,
                cancelled_at = ?8,
                cancel_reason = ?9
            WHERE id = ?10 AND status = ?11
        ",
    )
    .bind(cols.doctor_id)
    .bind(cols.meeting_url)
    .bind(cols.status)
    .bind(cols.started_at)
    .bind(cols.ended_at)
    .bind(cols.rating)
    .bind(cols.feedback)
    .bind(cols.cancelled_at)
    .bind(cols.cancel_reason)
    .bind(id_i64("session_id", session.id().value())?)
    .bind(expected.as_str())
    .execute(&mut **tx)
    .await
    .map_err(db)?;

    if res.rows_affected() == 1 {
        return Ok(());
    }
    let exists = sqlx::query("SELECT 1 FROM sessions WHERE id = ?1")
        .bind(id_i64("session_id", session.id().value())?)
        .fetch_optional(&mut **tx)
        .await
        .map_err(db)?;
    Err(if exists.is_some() {
        StorageError::Conflict
    } else {
        StorageError::NotFound
    })
}

impl SqliteRepository {
    async fn sessions_for_user(
        &self,
        column: &str,
        user: UserId,
    ) -> Result<Vec<Session>, StorageError> {
        let sql = format!(
            "SELECT {SESSION_COLUMNS} FROM sessions WHERE {column} = ?1 \
             ORDER BY scheduled_at ASC, id ASC"
        );
        let rows = sqlx::query(&sql)
            .bind(id_i64("user_id", user.value())?)
            .fetch_all(&self.pool)
            .await
            .map_err(db)?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(map_session_row(&row)?);
        }
        Ok(out)
    }
}

#[async_trait::async_trait]
impl SessionRepository for SqliteRepository {
    async fn insert_new_session(&self, session: NewSession) -> Result<Session, StorageError> {
        let cols = session_columns(&session.kind, &session.state)?;
        let res = sqlx::query(
            r"
                INSERT INTO sessions (
                    client_id, session_type, ai_model, doctor_id, meeting_url, topic,
                    scheduled_at, status, started_at, ended_at, rating, feedback,
                    cancelled_at, cancel_reason, created_at
                )
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
            ",
        )
        .bind(id_i64("client_id", session.client_id.value())?)
        .bind(cols.session_type)
        .bind(cols.ai_model)
        .bind(cols.doctor_id)
        .bind(cols.meeting_url)
        .bind(session.topic.as_str())
        .bind(session.scheduled_at)
        .bind(cols.status)
        .bind(cols.started_at)
        .bind(cols.ended_at)
        .bind(cols.rating)
        .bind(cols.feedback)
        .bind(cols.cancelled_at)
        .bind(cols.cancel_reason)
        .bind(session.created_at)
        .execute(&self.pool)
        .await
        .map_err(db)?;

        let id = u64::try_from(res.last_insert_rowid())
            .map_err(|_| StorageError::Serialization("session_id sign overflow".into()))?;
        Ok(session.assign_id(SessionId::new(id)))
    }

    async fn get_session(&self, id: SessionId) -> Result<Option<Session>, StorageError> {
        let sql = format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE id = ?1");
        let row = sqlx::query(&sql)
            .bind(id_i64("session_id", id.value())?)
            .fetch_optional(&self.pool)
            .await
            .map_err(db)?;

        row.as_ref().map(map_session_row).transpose()
    }

    async fn update_session(
        &self,
        session: &Session,
        expected: SessionStatus,
    ) -> Result<(), StorageError> {
        let mut tx = self.pool.begin().await.map_err(db)?;
        write_session(&mut tx, session, expected).await?;
        tx.commit().await.map_err(db)
    }

    async fn list_sessions_for_client(
        &self,
        client_id: UserId,
    ) -> Result<Vec<Session>, StorageError> {
        self.sessions_for_user("client_id", client_id).await
    }

    async fn list_sessions_for_doctor(
        &self,
        doctor_id: UserId,
    ) -> Result<Vec<Session>, StorageError> {
        self.sessions_for_user("doctor_id", doctor_id).await
    }

    async fn list_sessions(
        &self,
        status: Option<SessionStatus>,
    ) -> Result<Vec<Session>, StorageError> {
        let sql = format!(
            "SELECT {SESSION_COLUMNS} FROM sessions WHERE (?1 IS NULL OR status = ?1) \
             ORDER BY scheduled_at ASC, id ASC"
        );
        let rows = sqlx::query(&sql)
            .bind(status.map(SessionStatus::as_str))
            .fetch_all(&self.pool)
            .await
            .map_err(db)?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(map_session_row(&row)?);
        }
        Ok(out)
    }
}

#[async_trait::async_trait]
impl CompletionPersistence for SqliteRepository {
    async fn record_completion(
        &self,
        session: &Session,
        expected: SessionStatus,
        quiz: Option<NewQuizResult>,
    ) -> Result<Option<QuizResult>, StorageError> {
        if quiz.as_ref().is_some_and(|q| q.session_id != session.id()) {
            return Err(StorageError::Conflict);
        }

        let mut tx = self.pool.begin().await.map_err(db)?;
        write_session(&mut tx, session, expected).await?;

        let stored = match quiz {
            Some(quiz) => {
                let answers = serde_json::to_string(&quiz.answers).map_err(ser)?;
                let res = sqlx::query(
                    r"
                        INSERT INTO quiz_results (
                            session_id, user_id, answers, score, total_questions, created_at
                        )
                        VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                    ",
                )
                .bind(id_i64("session_id", quiz.session_id.value())?)
                .bind(id_i64("user_id", quiz.user_id.value())?)
                .bind(answers)
                .bind(i64::from(quiz.score.value()))
                .bind(i64::from(quiz.total_questions))
                .bind(quiz.created_at)
                .execute(&mut *tx)
                .await
                .map_err(db)?;

                let id = u64::try_from(res.last_insert_rowid())
                    .map_err(|_| StorageError::Serialization("quiz_id sign overflow".into()))?;
                Some(quiz.assign_id(QuizResultId::new(id)))
            }
            None => None,
        };

        tx.commit().await.map_err(db)?;
        Ok(stored)
    }
}
