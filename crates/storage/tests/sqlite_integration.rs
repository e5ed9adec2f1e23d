use chrono::Duration;
use storage::repository::{
    CertificationRepository, CompletionPersistence, PaymentRepository, ProgressWrite,
    QuizResultRepository, SessionRepository, StorageError, UserCertificationRepository,
};
use storage::sqlite::SqliteRepository;
use therapy_core::lifecycle::CompletedBy;
use therapy_core::model::{
    CertificationDraft, CertificationId, CertificationStatus, MeetingUrl, NewPayment,
    NewQuizResult, NewUserCertification, PaymentStatus, Rating, Session, SessionDraft,
    SessionFeedback, SessionStatus, UserId,
};
use therapy_core::progress::{Percentage, ProgressSnapshot};
use therapy_core::quiz::{DEFAULT_PASSING_SCORE, QuizItem, QuizSubmission, grade};
use therapy_core::time::fixed_now;

async fn connect(name: &str) -> SqliteRepository {
    let url = format!("sqlite:file:{name}?mode=memory&cache=shared");
    let repo = SqliteRepository::connect(&url).await.expect("connect");
    repo.migrate().await.expect("migrate");
    repo
}

fn quiz_for(session: &Session, correct: usize, total: usize) -> NewQuizResult {
    let items = (0..total)
        .map(|i| {
            let selected = if i < correct { 0 } else { 1 };
            QuizItem::new(
                format!("q{i}"),
                vec!["yes".into(), "no".into()],
                0,
                Some(selected),
            )
        })
        .collect();
    let graded = grade(&QuizSubmission::new(items)).expect("grade");
    NewQuizResult::from_grade(session.id(), session.client_id(), graded, fixed_now())
}

fn snapshot(overall: f64) -> ProgressSnapshot {
    ProgressSnapshot {
        session: Percentage::new(overall),
        quiz: Percentage::new(overall),
        overall: Percentage::new(overall),
    }
}

#[tokio::test]
async fn sqlite_session_lifecycle_roundtrip() {
    let repo = connect("memdb_session_lifecycle").await;
    let client = UserId::new(10);
    let doctor = UserId::new(20);

    let booked = SessionDraft::human(client, None, None, "Sleep hygiene", fixed_now())
        .validate(fixed_now())
        .unwrap();
    let mut session = repo.insert_new_session(booked).await.unwrap();
    assert_eq!(session.status(), SessionStatus::Pending);

    let url = MeetingUrl::parse("https://meet.example.com/abc").unwrap();
    session.assign_doctor(doctor, Some(url.clone())).unwrap();
    repo.update_session(&session, SessionStatus::Pending)
        .await
        .unwrap();

    let start = fixed_now() + Duration::hours(1);
    session.start(start).unwrap();
    repo.update_session(&session, SessionStatus::Scheduled)
        .await
        .unwrap();

    let feedback = SessionFeedback::new(Some(Rating::new(5).unwrap()), Some("helpful".into()))
        .unwrap();
    session
        .complete(CompletedBy::Doctor, feedback, start + Duration::minutes(50))
        .unwrap();
    let quiz = repo
        .record_completion(
            &session,
            SessionStatus::InProgress,
            Some(quiz_for(&session, 3, 4)),
        )
        .await
        .unwrap()
        .expect("quiz stored");
    assert_eq!(quiz.score().value(), 75);

    let fetched = repo.get_session(session.id()).await.unwrap().unwrap();
    assert_eq!(fetched, session);
    assert_eq!(fetched.doctor_id(), Some(doctor));
    assert_eq!(fetched.kind().meeting_url(), Some(&url));
    assert_eq!(fetched.started_at(), Some(start));
    assert_eq!(fetched.feedback().and_then(SessionFeedback::comment), Some("helpful"));

    let stored_quiz = repo
        .get_quiz_result_for_session(session.id())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored_quiz, quiz);
    assert_eq!(stored_quiz.answers().len(), 4);

    assert_eq!(repo.list_sessions_for_doctor(doctor).await.unwrap().len(), 1);
    assert_eq!(
        repo.list_sessions(Some(SessionStatus::Completed))
            .await
            .unwrap()
            .len(),
        1
    );
    assert!(repo
        .list_sessions(Some(SessionStatus::Pending))
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn sqlite_stale_status_is_conflict_and_rolls_back() {
    let repo = connect("memdb_stale_status").await;
    let booked = SessionDraft::ai(UserId::new(1), "gpt-4o-mini", "Stress", fixed_now())
        .validate(fixed_now())
        .unwrap();
    let mut session = repo.insert_new_session(booked).await.unwrap();
    session
        .complete(CompletedBy::Client, SessionFeedback::default(), fixed_now())
        .unwrap();

    repo.record_completion(&session, SessionStatus::Scheduled, Some(quiz_for(&session, 1, 1)))
        .await
        .unwrap();

    let again = repo
        .record_completion(&session, SessionStatus::Scheduled, Some(quiz_for(&session, 0, 1)))
        .await;
    assert!(matches!(again, Err(StorageError::Conflict)));

    let results = repo
        .list_quiz_results_for_user(UserId::new(1))
        .await
        .unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].score().value(), 100);
}

#[tokio::test]
async fn sqlite_certification_names_are_unique() {
    let repo = connect("memdb_cert_names").await;
    let draft = || CertificationDraft {
        name: "CBT Basics".into(),
        description: Some("Intro track".into()),
        required_sessions: 3,
        required_quizzes: 3,
        minimum_score: DEFAULT_PASSING_SCORE,
    };

    let cert = repo
        .insert_new_certification(draft().validate(fixed_now()).unwrap())
        .await
        .unwrap();
    let dup = repo
        .insert_new_certification(draft().validate(fixed_now()).unwrap())
        .await;
    assert!(matches!(dup, Err(StorageError::Conflict)));

    let fetched = repo.get_certification(cert.id()).await.unwrap().unwrap();
    assert_eq!(fetched, cert);
    assert_eq!(repo.list_certifications().await.unwrap().len(), 1);
}

#[tokio::test]
async fn sqlite_progress_writes_are_atomic() {
    let repo = connect("memdb_progress_atomic").await;
    let mut ids = Vec::new();
    for name in ["A", "B"] {
        let cert = repo
            .insert_new_certification(
                CertificationDraft {
                    name: name.into(),
                    description: None,
                    required_sessions: 1,
                    required_quizzes: 1,
                    minimum_score: DEFAULT_PASSING_SCORE,
                }
                .validate(fixed_now())
                .unwrap(),
            )
            .await
            .unwrap();
        ids.push(cert.id());
    }
    let user = UserId::new(5);
    let new = |cert: CertificationId, overall: f64| {
        NewUserCertification::from_snapshot(user, cert, snapshot(overall), fixed_now())
    };

    let saved = repo
        .save_progress(vec![ProgressWrite::Insert(new(ids[0], 50.0))])
        .await
        .unwrap();
    assert_eq!(saved.len(), 1);

    let err = repo
        .save_progress(vec![
            ProgressWrite::Insert(new(ids[1], 100.0)),
            ProgressWrite::Insert(new(ids[0], 50.0)),
        ])
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::Conflict));
    assert!(repo
        .find_user_certification(user, ids[1])
        .await
        .unwrap()
        .is_none());

    let mut row = saved.into_iter().next().unwrap();
    row.apply_progress(snapshot(100.0), fixed_now() + Duration::days(1));
    row.approve(UserId::new(99), fixed_now() + Duration::days(2))
        .unwrap();
    repo.update_user_certification(&row, CertificationStatus::InProgress)
        .await
        .unwrap();

    let fetched = repo.get_user_certification(row.id()).await.unwrap().unwrap();
    assert_eq!(fetched, row);
    assert_eq!(fetched.status(), CertificationStatus::Approved);
    assert_eq!(
        repo.list_user_certifications(Some(CertificationStatus::Approved))
            .await
            .unwrap()
            .len(),
        1
    );
}

#[tokio::test]
async fn sqlite_stale_progress_cannot_undo_an_approval() {
    let repo = connect("memdb_stale_progress").await;
    let cert = repo
        .insert_new_certification(
            CertificationDraft {
                name: "Stale".into(),
                description: None,
                required_sessions: 2,
                required_quizzes: 2,
                minimum_score: DEFAULT_PASSING_SCORE,
            }
            .validate(fixed_now())
            .unwrap(),
        )
        .await
        .unwrap();
    let user = UserId::new(8);
    let stale = repo
        .save_progress(vec![ProgressWrite::Insert(NewUserCertification::from_snapshot(
            user,
            cert.id(),
            snapshot(50.0),
            fixed_now(),
        ))])
        .await
        .unwrap()
        .remove(0);

    let mut current = stale.clone();
    current.apply_progress(snapshot(100.0), fixed_now());
    repo.save_progress(vec![ProgressWrite::Update {
        row: current.clone(),
        expected: CertificationStatus::InProgress,
    }])
    .await
    .unwrap();
    let mut approved = current.clone();
    approved.approve(UserId::new(99), fixed_now()).unwrap();
    repo.update_user_certification(&approved, CertificationStatus::Completed)
        .await
        .unwrap();

    // A recomputation that read the row before it was earned.
    let mut late = stale;
    late.apply_progress(snapshot(100.0), fixed_now() + Duration::days(3));
    let err = repo
        .save_progress(vec![ProgressWrite::Update {
            row: late,
            expected: CertificationStatus::InProgress,
        }])
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::Conflict));

    // A reviewer that read the row before the approval landed.
    let mut rejected = current;
    rejected
        .reject(UserId::new(98), Some("late".into()), fixed_now())
        .unwrap();
    let err = repo
        .update_user_certification(&rejected, CertificationStatus::Completed)
        .await
        .unwrap_err();
    assert!(matches!(err, StorageError::Conflict));

    let fetched = repo.get_user_certification(approved.id()).await.unwrap().unwrap();
    assert_eq!(fetched.status(), CertificationStatus::Approved);
    assert_eq!(fetched.earned_at(), Some(fixed_now()));
}

#[tokio::test]
async fn sqlite_payments_settle() {
    let repo = connect("memdb_payments").await;
    let user = UserId::new(3);
    let mut payment = repo
        .insert_new_payment(NewPayment::new(user, None, 4_500, "usd", fixed_now()).unwrap())
        .await
        .unwrap();
    assert_eq!(payment.status, PaymentStatus::Pending);

    payment
        .settle(PaymentStatus::Verified, fixed_now() + Duration::hours(2))
        .unwrap();
    repo.update_payment(&payment).await.unwrap();

    let fetched = repo.get_payment(payment.id).await.unwrap().unwrap();
    assert_eq!(fetched, payment);
    assert_eq!(repo.list_payments_for_user(user).await.unwrap().len(), 1);
    assert!(repo
        .list_payments(Some(PaymentStatus::Pending))
        .await
        .unwrap()
        .is_empty());
}
