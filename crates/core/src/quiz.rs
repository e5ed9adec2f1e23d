//! Post-session quiz scoring.
//!
//! Every question is marked correct or incorrect on its own; there is no
//! partial credit. The score is `round(100 * correct / total)`, rounding
//! halves up.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

//
// ─── ERRORS ────────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum QuizError {
    #[error("quiz submission has no questions")]
    Empty,

    #[error("question {index} has no options")]
    NoOptions { index: usize },

    #[error("question {index}: option {option} is out of range (0..{len})")]
    OptionOutOfRange {
        index: usize,
        option: usize,
        len: usize,
    },

    #[error("question {index} has empty text")]
    EmptyQuestion { index: usize },

    #[error("score must be between 0 and 100, got {0}")]
    ScoreOutOfRange(u32),

    #[error("correct answers ({correct}) exceed total questions ({total})")]
    CountMismatch { correct: u32, total: u32 },
}

//
// ─── SCORE ─────────────────────────────────────────────────────────────────────
//

/// Percentage score in `0..=100`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct QuizScore(u8);

/// Score at or above which a completed session counts toward certifications.
pub const DEFAULT_PASSING_SCORE: QuizScore = QuizScore(70);

impl QuizScore {
    pub const ZERO: Self = Self(0);
    pub const PERFECT: Self = Self(100);

    /// # Errors
    ///
    /// Returns `QuizError::ScoreOutOfRange` if `value > 100`.
    pub fn new(value: u32) -> Result<Self, QuizError> {
        u8::try_from(value)
            .ok()
            .filter(|v| *v <= 100)
            .map(Self)
            .ok_or(QuizError::ScoreOutOfRange(value))
    }

    #[must_use]
    pub fn value(self) -> u8 {
        self.0
    }

    #[must_use]
    pub fn passes(self, threshold: QuizScore) -> bool {
        self >= threshold
    }
}

impl TryFrom<u32> for QuizScore {
    type Error = QuizError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<QuizScore> for u32 {
    fn from(score: QuizScore) -> Self {
        u32::from(score.0)
    }
}

impl fmt::Display for QuizScore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}%", self.0)
    }
}

/// Computes `round(100 * correct / total)`.
///
/// # Errors
///
/// Returns `QuizError::Empty` when `total == 0` and `QuizError::CountMismatch`
/// when `correct > total`.
pub fn score_for(correct: u32, total: u32) -> Result<QuizScore, QuizError> {
    if total == 0 {
        return Err(QuizError::Empty);
    }
    if correct > total {
        return Err(QuizError::CountMismatch { correct, total });
    }
    let (correct, total) = (u64::from(correct), u64::from(total));
    let rounded = (200 * correct + total) / (2 * total);
    // correct <= total keeps this in 0..=100
    QuizScore::new(u32::try_from(rounded).unwrap_or(u32::MAX))
}

//
// ─── SUBMISSION ────────────────────────────────────────────────────────────────
//

/// One question as the client submitted it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizItem {
    pub question: String,
    pub options: Vec<String>,
    pub correct_option: usize,
    /// `None` when the user skipped the question.
    pub selected_option: Option<usize>,
}

impl QuizItem {
    #[must_use]
    pub fn new(
        question: impl Into<String>,
        options: Vec<String>,
        correct_option: usize,
        selected_option: Option<usize>,
    ) -> Self {
        Self {
            question: question.into(),
            options,
            correct_option,
            selected_option,
        }
    }
}

/// Ordered list of answered questions submitted at session completion.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizSubmission {
    pub items: Vec<QuizItem>,
}

impl QuizSubmission {
    #[must_use]
    pub fn new(items: Vec<QuizItem>) -> Self {
        Self { items }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// A question after marking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GradedAnswer {
    pub question: String,
    pub options: Vec<String>,
    pub correct_option: usize,
    pub selected_option: Option<usize>,
    pub is_correct: bool,
}

/// Marked submission with its score.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuizGrade {
    answers: Vec<GradedAnswer>,
    correct: u32,
    total: u32,
    score: QuizScore,
}

impl QuizGrade {
    #[must_use]
    pub fn answers(&self) -> &[GradedAnswer] {
        &self.answers
    }

    #[must_use]
    pub fn into_answers(self) -> Vec<GradedAnswer> {
        self.answers
    }

    #[must_use]
    pub fn correct(&self) -> u32 {
        self.correct
    }

    #[must_use]
    pub fn total(&self) -> u32 {
        self.total
    }

    #[must_use]
    pub fn score(&self) -> QuizScore {
        self.score
    }
}

/// Marks every item of a submission and computes the score.
///
/// # Errors
///
/// Returns `QuizError` if the submission is empty or an item references an
/// option outside its option list.
pub fn grade(submission: &QuizSubmission) -> Result<QuizGrade, QuizError> {
    if submission.is_empty() {
        return Err(QuizError::Empty);
    }

    let mut answers = Vec::with_capacity(submission.items.len());
    let mut correct = 0_u32;

    for (index, item) in submission.items.iter().enumerate() {
        if item.question.trim().is_empty() {
            return Err(QuizError::EmptyQuestion { index });
        }
        let len = item.options.len();
        if len == 0 {
            return Err(QuizError::NoOptions { index });
        }
        if item.correct_option >= len {
            return Err(QuizError::OptionOutOfRange {
                index,
                option: item.correct_option,
                len,
            });
        }
        if let Some(selected) = item.selected_option.filter(|s| *s >= len) {
            return Err(QuizError::OptionOutOfRange {
                index,
                option: selected,
                len,
            });
        }

        let is_correct = item.selected_option == Some(item.correct_option);
        if is_correct {
            correct = correct.saturating_add(1);
        }
        answers.push(GradedAnswer {
            question: item.question.clone(),
            options: item.options.clone(),
            correct_option: item.correct_option,
            selected_option: item.selected_option,
            is_correct,
        });
    }

    let total = u32::try_from(answers.len()).unwrap_or(u32::MAX);
    let score = score_for(correct, total)?;

    Ok(QuizGrade {
        answers,
        correct,
        total,
        score,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(correct: usize, selected: Option<usize>) -> QuizItem {
        QuizItem::new(
            "How did the breathing exercise feel?",
            vec!["calm".into(), "tense".into(), "neutral".into()],
            correct,
            selected,
        )
    }

    #[test]
    fn score_rounds_half_up() {
        assert_eq!(score_for(1, 3).unwrap().value(), 33);
        assert_eq!(score_for(2, 3).unwrap().value(), 67);
        assert_eq!(score_for(1, 8).unwrap().value(), 13); // 12.5
        assert_eq!(score_for(0, 5).unwrap(), QuizScore::ZERO);
        assert_eq!(score_for(5, 5).unwrap(), QuizScore::PERFECT);
    }

    #[test]
    fn score_stays_in_range_for_all_small_quizzes() {
        for total in 1..=40_u32 {
            for correct in 0..=total {
                let score = score_for(correct, total).unwrap();
                let exact = 100.0 * f64::from(correct) / f64::from(total);
                assert!(score.value() <= 100);
                assert!((f64::from(score.value()) - exact).abs() <= 0.5);
            }
        }
    }

    #[test]
    fn score_rejects_bad_counts() {
        assert_eq!(score_for(0, 0), Err(QuizError::Empty));
        assert_eq!(
            score_for(4, 3),
            Err(QuizError::CountMismatch {
                correct: 4,
                total: 3
            })
        );
    }

    #[test]
    fn grade_marks_each_question_independently() {
        let submission = QuizSubmission::new(vec![
            item(0, Some(0)),
            item(1, Some(2)),
            item(2, None),
            item(2, Some(2)),
        ]);

        let graded = grade(&submission).unwrap();

        assert_eq!(graded.total(), 4);
        assert_eq!(graded.correct(), 2);
        assert_eq!(graded.score().value(), 50);
        let flags: Vec<bool> = graded.answers().iter().map(|a| a.is_correct).collect();
        assert_eq!(flags, vec![true, false, false, true]);
    }

    #[test]
    fn grade_rejects_empty_and_out_of_range() {
        assert_eq!(grade(&QuizSubmission::default()), Err(QuizError::Empty));

        let bad = QuizSubmission::new(vec![item(0, Some(3))]);
        assert_eq!(
            grade(&bad),
            Err(QuizError::OptionOutOfRange {
                index: 0,
                option: 3,
                len: 3
            })
        );
    }

    #[test]
    fn passing_threshold_is_inclusive() {
        assert!(QuizScore::new(70).unwrap().passes(DEFAULT_PASSING_SCORE));
        assert!(!QuizScore::new(69).unwrap().passes(DEFAULT_PASSING_SCORE));
        assert!(QuizScore::new(101).is_err());
    }
}
