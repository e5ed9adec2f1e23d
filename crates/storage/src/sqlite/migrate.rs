use chrono::Utc;
use sqlx::SqlitePool;

use super::SqliteInitError;

const SCHEMA_V1: &[&str] = &[
    r"
        CREATE TABLE IF NOT EXISTS sessions (
            id INTEGER PRIMARY KEY,
            client_id INTEGER NOT NULL,
            session_type TEXT NOT NULL CHECK (session_type IN ('ai', 'human')),
            ai_model TEXT,
            doctor_id INTEGER,
            meeting_url TEXT,
            topic TEXT NOT NULL,
            scheduled_at TEXT NOT NULL,
            status TEXT NOT NULL,
            started_at TEXT,
            ended_at TEXT,
            rating INTEGER CHECK (rating BETWEEN 1 AND 5),
            feedback TEXT,
            cancelled_at TEXT,
            cancel_reason TEXT,
            created_at TEXT NOT NULL
        );
    ",
    r"
        CREATE TABLE IF NOT EXISTS quiz_results (
            id INTEGER PRIMARY KEY,
            session_id INTEGER NOT NULL UNIQUE,
            user_id INTEGER NOT NULL,
            answers TEXT NOT NULL,
            score INTEGER NOT NULL CHECK (score BETWEEN 0 AND 100),
            total_questions INTEGER NOT NULL CHECK (total_questions > 0),
            created_at TEXT NOT NULL,
            FOREIGN KEY (session_id) REFERENCES sessions(id)
        );
    ",
    r"
        CREATE TABLE IF NOT EXISTS certifications (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL UNIQUE,
            description TEXT,
            required_sessions INTEGER NOT NULL CHECK (required_sessions >= 0),
            required_quizzes INTEGER NOT NULL CHECK (required_quizzes >= 0),
            minimum_score INTEGER NOT NULL CHECK (minimum_score BETWEEN 0 AND 100),
            created_at TEXT NOT NULL
        );
    ",
    r"
        CREATE TABLE IF NOT EXISTS user_certifications (
            id INTEGER PRIMARY KEY,
            user_id INTEGER NOT NULL,
            certification_id INTEGER NOT NULL,
            status TEXT NOT NULL,
            progress REAL NOT NULL CHECK (progress BETWEEN 0 AND 100),
            earned_at TEXT,
            reviewed_by INTEGER,
            reviewed_at TEXT,
            rejection_reason TEXT,
            updated_at TEXT NOT NULL,
            UNIQUE (user_id, certification_id),
            FOREIGN KEY (certification_id) REFERENCES certifications(id)
        );
    ",
    r"
        CREATE TABLE IF NOT EXISTS payments (
            id INTEGER PRIMARY KEY,
            user_id INTEGER NOT NULL,
            session_id INTEGER,
            amount_minor INTEGER NOT NULL CHECK (amount_minor > 0),
            currency TEXT NOT NULL,
            status TEXT NOT NULL,
            created_at TEXT NOT NULL,
            settled_at TEXT,
            FOREIGN KEY (session_id) REFERENCES sessions(id)
        );
    ",
    r"
        CREATE INDEX IF NOT EXISTS idx_sessions_client_scheduled
            ON sessions (client_id, scheduled_at);
    ",
    r"
        CREATE INDEX IF NOT EXISTS idx_sessions_doctor_scheduled
            ON sessions (doctor_id, scheduled_at);
    ",
    r"
        CREATE INDEX IF NOT EXISTS idx_sessions_status
            ON sessions (status);
    ",
    r"
        CREATE INDEX IF NOT EXISTS idx_quiz_results_user
            ON quiz_results (user_id);
    ",
    r"
        CREATE INDEX IF NOT EXISTS idx_user_certifications_status
            ON user_certifications (status);
    ",
    r"
        CREATE INDEX IF NOT EXISTS idx_payments_user
            ON payments (user_id, created_at);
    ",
];

/// Runs the versioned migrations for the current schema.
///
/// Creates sessions, quiz results, certification templates, per-user
/// certification progress and payments, plus their lookup indexes.
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), SqliteInitError> {
    async fn is_applied(pool: &SqlitePool, version: i64) -> Result<bool, sqlx::Error> {
        let row = sqlx::query("SELECT 1 FROM schema_migrations WHERE version = ?1")
            .bind(version)
            .fetch_optional(pool)
            .await?;
        Ok(row.is_some())
    }

    sqlx::query(
        r"
            CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            );
            ",
    )
    .execute(pool)
    .await?;

    // Version 1: full schema.
    if !is_applied(pool, 1).await? {
        let mut tx = pool.begin().await?;

        for statement in SCHEMA_V1 {
            sqlx::query(*statement).execute(&mut *tx).await?;
        }

        sqlx::query(
            r"
                INSERT INTO schema_migrations (version, applied_at)
                VALUES (?1, ?2)
                ON CONFLICT(version) DO NOTHING
            ",
        )
        .bind(1_i64)
        .bind(Utc::now())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
    }

    Ok(())
}
