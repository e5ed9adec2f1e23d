use chrono::Duration;
use services::{
    AppServices, Clock, CompletionRequest, ErrorKind, ServiceSettings, SessionServiceError,
};
use therapy_core::model::{SessionId, SessionStatus, SessionType, UserId};
use therapy_core::quiz::{QuizItem, QuizSubmission};
use therapy_core::time::fixed_now;

fn client() -> UserId {
    UserId::new(1)
}

fn doctor() -> UserId {
    UserId::new(2)
}

fn services() -> AppServices {
    AppServices::in_memory(Clock::fixed(fixed_now()), ServiceSettings::default())
}

fn quiz(correct: usize, total: usize) -> QuizSubmission {
    QuizSubmission::new(
        (0..total)
            .map(|i| {
                QuizItem::new(
                    format!("Question {i}"),
                    vec!["a".into(), "b".into(), "c".into()],
                    2,
                    Some(if i < correct { 2 } else { 0 }),
                )
            })
            .collect(),
    )
}

#[tokio::test]
async fn human_request_flows_through_assignment_start_and_completion() {
    let app = services();
    let sessions = app.sessions();
    let when = fixed_now() + Duration::days(2);

    let booked = sessions
        .book_human_session(client(), None, "Panic attacks", when, None)
        .await
        .unwrap();
    assert_eq!(booked.status(), SessionStatus::Pending);
    assert_eq!(booked.session_type(), SessionType::Human);
    assert_eq!(sessions.pending_requests().await.unwrap().len(), 1);

    let assigned = sessions
        .assign_doctor(booked.id(), doctor(), Some("https://meet.example.com/room-1"))
        .await
        .unwrap();
    assert_eq!(assigned.status(), SessionStatus::Scheduled);
    assert_eq!(assigned.doctor_id(), Some(doctor()));

    let started = sessions.start_session(booked.id()).await.unwrap();
    assert_eq!(started.status(), SessionStatus::InProgress);
    assert_eq!(started.started_at(), Some(fixed_now()));

    let outcome = sessions
        .complete_by_doctor(
            booked.id(),
            CompletionRequest::default()
                .with_quiz(quiz(4, 5))
                .with_rating(4)
                .with_feedback("Very useful"),
        )
        .await
        .unwrap();
    assert_eq!(outcome.session.status(), SessionStatus::Completed);
    assert_eq!(outcome.session.ended_at(), Some(fixed_now()));
    assert_eq!(outcome.quiz_result.as_ref().unwrap().score().value(), 80);
    assert!(outcome.warning.is_none());

    let stored = sessions.quiz_result(booked.id()).await.unwrap().unwrap();
    assert_eq!(stored.total_questions(), 5);
    assert_eq!(sessions.list_for_doctor(doctor()).await.unwrap().len(), 1);
}

#[tokio::test]
async fn doctor_cannot_complete_scheduled_but_client_can() {
    let app = services();
    let sessions = app.sessions();

    let session = sessions
        .book_human_session(client(), Some(doctor()), "Grief", fixed_now(), None)
        .await
        .unwrap();
    assert_eq!(session.status(), SessionStatus::Scheduled);

    let err = sessions
        .complete_by_doctor(session.id(), CompletionRequest::default())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidTransition);

    let outcome = sessions
        .complete_by_client(session.id(), CompletionRequest::default())
        .await
        .unwrap();
    assert_eq!(outcome.session.status(), SessionStatus::Completed);
    assert_eq!(outcome.session.started_at(), None);
    assert!(outcome.quiz_result.is_none());
}

#[tokio::test]
async fn second_completion_is_rejected() {
    let app = services();
    let sessions = app.sessions();
    let session = sessions
        .book_ai_session(client(), "gpt-4o-mini", "Burnout", fixed_now())
        .await
        .unwrap();

    sessions
        .complete_by_client(session.id(), CompletionRequest::default().with_quiz(quiz(1, 1)))
        .await
        .unwrap();
    let err = sessions
        .complete_by_client(session.id(), CompletionRequest::default().with_quiz(quiz(1, 1)))
        .await
        .unwrap_err();
    assert!(matches!(err, SessionServiceError::Transition(_)));

    let certs = app.certifications();
    let report = certs.recompute_for_user(client()).await.unwrap();
    assert_eq!(report.counters.quizzes_completed, 1);
}

#[tokio::test]
async fn cancel_only_before_start() {
    let app = services();
    let sessions = app.sessions();

    let pending = sessions
        .book_human_session(client(), None, "Insomnia", fixed_now(), None)
        .await
        .unwrap();
    let cancelled = sessions
        .cancel_session(pending.id(), Some("  schedule clash ".into()))
        .await
        .unwrap();
    assert_eq!(cancelled.status(), SessionStatus::Cancelled);

    let err = sessions
        .complete_by_client(pending.id(), CompletionRequest::default())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidTransition);

    let running = sessions
        .book_human_session(client(), Some(doctor()), "Insomnia", fixed_now(), None)
        .await
        .unwrap();
    sessions.start_session(running.id()).await.unwrap();
    let err = sessions.cancel_session(running.id(), None).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidTransition);
}

#[tokio::test]
async fn ai_sessions_cannot_take_a_doctor() {
    let app = services();
    let sessions = app.sessions();
    let session = sessions
        .book_ai_session(client(), "gpt-4o-mini", "Focus", fixed_now())
        .await
        .unwrap();

    let err = sessions
        .assign_doctor(session.id(), doctor(), None)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    let started = sessions.start_session(session.id()).await.unwrap();
    assert_eq!(started.status(), SessionStatus::InProgress);
}

#[tokio::test]
async fn booking_input_is_validated() {
    let app = services();
    let sessions = app.sessions();

    let err = sessions
        .book_ai_session(client(), "  ", "Topic", fixed_now())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    let err = sessions
        .book_human_session(client(), None, "", fixed_now(), None)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    let err = sessions
        .book_human_session(client(), None, "Topic", fixed_now(), Some("ftp://files"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    let err = sessions.get_session(SessionId::new(404)).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(err.public_message(), "session 404 not found");
}

#[tokio::test]
async fn bad_completion_input_leaves_session_untouched() {
    let app = services();
    let sessions = app.sessions();
    let session = sessions
        .book_ai_session(client(), "gpt-4o-mini", "Anger", fixed_now())
        .await
        .unwrap();

    let err = sessions
        .complete_by_client(session.id(), CompletionRequest::default().with_rating(6))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    let err = sessions
        .complete_by_client(
            session.id(),
            CompletionRequest::default().with_quiz(QuizSubmission::default()),
        )
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Validation);

    let stored = sessions.get_session(session.id()).await.unwrap();
    assert_eq!(stored.status(), SessionStatus::Scheduled);
    assert!(sessions.quiz_result(session.id()).await.unwrap().is_none());
}

#[tokio::test]
async fn meeting_link_is_generated_on_assignment() {
    let settings = ServiceSettings::default()
        .with_meeting_base_url("https://meet.example.com/rooms")
        .unwrap();
    let app = AppServices::in_memory(Clock::fixed(fixed_now()), settings);
    let sessions = app.sessions();

    let booked = sessions
        .book_human_session(client(), None, "Relationships", fixed_now(), None)
        .await
        .unwrap();
    let assigned = sessions
        .assign_doctor(booked.id(), doctor(), None)
        .await
        .unwrap();

    let url = assigned.kind().meeting_url().expect("generated link");
    assert!(url.as_str().starts_with("https://meet.example.com/rooms/"));
    assert!(url.as_str().len() > "https://meet.example.com/rooms/".len());
}
