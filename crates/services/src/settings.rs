use therapy_core::quiz::{DEFAULT_PASSING_SCORE, QuizScore};
use url::Url;

/// Typed knobs handed to services at construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceSettings {
    passing_score: QuizScore,
    meeting_base_url: Option<Url>,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            passing_score: DEFAULT_PASSING_SCORE,
            meeting_base_url: None,
        }
    }
}

impl ServiceSettings {
    #[must_use]
    pub fn with_passing_score(mut self, score: QuizScore) -> Self {
        self.passing_score = score;
        self
    }

    /// Base under which meeting links are generated when an admin assigns a
    /// doctor without giving a link.
    ///
    /// # Errors
    ///
    /// Returns `url::ParseError` if `base` is not an absolute URL.
    pub fn with_meeting_base_url(mut self, base: &str) -> Result<Self, url::ParseError> {
        let mut url = Url::parse(base)?;
        // Url::join drops the last segment unless the path ends with '/'.
        if !url.path().ends_with('/') {
            let path = format!("{}/", url.path());
            url.set_path(&path);
        }
        self.meeting_base_url = Some(url);
        Ok(self)
    }

    /// Minimum quiz score for a completed session to count toward certifications.
    #[must_use]
    pub fn passing_score(&self) -> QuizScore {
        self.passing_score
    }

    #[must_use]
    pub fn meeting_base_url(&self) -> Option<&Url> {
        self.meeting_base_url.as_ref()
    }
}
