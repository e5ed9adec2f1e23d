use services::{AppServices, Clock, CompletionRequest, ServiceSettings};
use therapy_core::model::{SessionId, UserId};
use therapy_core::quiz::{QuizItem, QuizSubmission};
use therapy_core::time::fixed_now;

fn perfect_quiz() -> QuizSubmission {
    QuizSubmission::new(vec![QuizItem::new(
        "Breathe in for how long?",
        vec!["2s".into(), "4s".into()],
        1,
        Some(1),
    )])
}

#[tokio::test]
async fn dashboards_aggregate_across_roles() {
    let app = AppServices::in_memory(Clock::fixed(fixed_now()), ServiceSettings::default());
    let sessions = app.sessions();
    let payments = app.payments();
    let client = UserId::new(1);
    let doctor = UserId::new(2);

    let human = sessions
        .book_human_session(client, Some(doctor), "Stress", fixed_now(), None)
        .await
        .unwrap();
    sessions.start_session(human.id()).await.unwrap();
    sessions
        .complete_by_doctor(
            human.id(),
            CompletionRequest::default()
                .with_quiz(perfect_quiz())
                .with_rating(5),
        )
        .await
        .unwrap();
    sessions
        .book_human_session(client, Some(doctor), "Follow-up", fixed_now(), None)
        .await
        .unwrap();
    sessions
        .book_human_session(client, None, "Sleep", fixed_now(), None)
        .await
        .unwrap();
    sessions
        .book_ai_session(client, "gpt-4o-mini", "Journaling", fixed_now())
        .await
        .unwrap();

    let paid = payments
        .record_payment(client, Some(human.id()), 4_500, "usd")
        .await
        .unwrap();
    payments.verify(paid.id).await.unwrap();
    payments
        .record_payment(client, None, 1_000, "USD")
        .await
        .unwrap();

    let dashboards = app.dashboards();

    let mine = dashboards.client(client).await.unwrap();
    assert_eq!(mine.total_sessions, 4);
    assert_eq!(mine.sessions_by_status.get("completed"), Some(&1));
    assert_eq!(mine.sessions_by_status.get("scheduled"), Some(&2));
    assert_eq!(mine.sessions_by_status.get("pending"), Some(&1));
    assert_eq!(mine.sessions_by_type.get("ai"), Some(&1));
    assert_eq!(mine.quizzes_taken, 1);
    assert_eq!(mine.average_quiz_score, Some(100.0));
    assert_eq!(mine.verified_payments.get("USD"), Some(&4_500));
    assert_eq!(mine.pending_payments, 1);

    let theirs = dashboards.doctor(doctor).await.unwrap();
    assert_eq!(theirs.total_sessions, 2);
    assert_eq!(theirs.upcoming.len(), 1);
    assert_eq!(theirs.rated_sessions, 1);
    assert_eq!(theirs.average_rating, Some(5.0));

    let admin = dashboards.admin().await.unwrap();
    assert_eq!(admin.total_sessions, 4);
    assert_eq!(admin.pending_assignment, 1);
    assert!(admin.awaiting_approval.is_empty());
    assert_eq!(admin.verified_revenue.get("USD"), Some(&4_500));
    assert_eq!(admin.pending_payments, 1);
}

#[tokio::test]
async fn empty_dashboards_have_no_averages() {
    let app = AppServices::in_memory(Clock::fixed(fixed_now()), ServiceSettings::default());
    let dashboards = app.dashboards();

    let client = dashboards.client(UserId::new(5)).await.unwrap();
    assert_eq!(client.total_sessions, 0);
    assert_eq!(client.average_quiz_score, None);
    assert!(client.certifications.is_empty());

    let doctor = dashboards.doctor(UserId::new(6)).await.unwrap();
    assert_eq!(doctor.average_rating, None);

    let err = app.sessions().get_session(SessionId::new(1)).await;
    assert!(err.is_err());
}
