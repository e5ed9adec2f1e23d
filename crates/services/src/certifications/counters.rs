use std::collections::HashSet;

use storage::repository::{QuizResultRepository, SessionRepository, StorageError};
use therapy_core::model::{SessionStatus, UserId};
use therapy_core::progress::ProgressCounters;
use therapy_core::quiz::QuizScore;

fn saturating_u32(n: usize) -> u32 {
    u32::try_from(n).unwrap_or(u32::MAX)
}

/// Derives a user's counters from stored sessions and quiz results.
///
/// A session counts once it is completed and its quiz passed `passing_score`.
/// Every stored quiz result counts as a completed quiz.
pub(crate) async fn counters_for_user(
    sessions: &dyn SessionRepository,
    quiz_results: &dyn QuizResultRepository,
    user_id: UserId,
    passing_score: QuizScore,
) -> Result<ProgressCounters, StorageError> {
    let completed: HashSet<_> = sessions
        .list_sessions_for_client(user_id)
        .await?
        .iter()
        .filter(|s| s.status() == SessionStatus::Completed)
        .map(|s| s.id())
        .collect();
    let results = quiz_results.list_quiz_results_for_user(user_id).await?;

    let passed = results
        .iter()
        .filter(|r| completed.contains(&r.session_id()) && r.score().passes(passing_score))
        .count();

    Ok(ProgressCounters {
        sessions_completed: saturating_u32(passed),
        quizzes_completed: saturating_u32(results.len()),
    })
}
