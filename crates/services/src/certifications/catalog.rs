use therapy_core::model::CertificationDraft;
use therapy_core::quiz::{DEFAULT_PASSING_SCORE, QuizScore};

struct Entry {
    name: &'static str,
    description: &'static str,
    required_sessions: u32,
    required_quizzes: u32,
    minimum_score: u8,
}

const DEFAULT_CATALOG: &[Entry] = &[
    Entry {
        name: "Mindfulness Foundations",
        description: "Complete introductory sessions on attention and breathing practice.",
        required_sessions: 3,
        required_quizzes: 3,
        minimum_score: 70,
    },
    Entry {
        name: "Anxiety Management",
        description: "Work through grounding and reframing techniques for anxious thoughts.",
        required_sessions: 5,
        required_quizzes: 5,
        minimum_score: 75,
    },
    Entry {
        name: "Stress Resilience",
        description: "Sustained practice of recovery routines over several weeks.",
        required_sessions: 8,
        required_quizzes: 6,
        minimum_score: 80,
    },
    Entry {
        name: "Sleep Hygiene",
        description: "Short track on evening routines and sleep habits.",
        required_sessions: 2,
        required_quizzes: 0,
        minimum_score: 70,
    },
];

/// Templates seeded into an empty installation.
pub(crate) fn default_catalog() -> Vec<CertificationDraft> {
    DEFAULT_CATALOG
        .iter()
        .map(|e| CertificationDraft {
            name: e.name.to_owned(),
            description: Some(e.description.to_owned()),
            required_sessions: e.required_sessions,
            required_quizzes: e.required_quizzes,
            minimum_score: QuizScore::new(u32::from(e.minimum_score))
                .unwrap_or(DEFAULT_PASSING_SCORE),
        })
        .collect()
}
