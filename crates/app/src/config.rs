//! Runtime configuration for the binary.
//!
//! Layers, lowest first: built-in defaults, an optional `therapy.toml` in the
//! working directory, then `THERAPY_*` environment variables.

use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;

use services::{AppServicesError, ServiceSettings};
use therapy_core::quiz::{DEFAULT_PASSING_SCORE, QuizError, QuizScore};

#[derive(Debug, Error)]
pub enum AppConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
    #[error("invalid passing_score: {0}")]
    PassingScore(#[from] QuizError),
    #[error(transparent)]
    Services(#[from] AppServicesError),
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_database_url")]
    pub database_url: String,
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
    #[serde(default = "default_passing_score")]
    pub passing_score: u32,
    #[serde(default)]
    pub meeting_base_url: Option<String>,
    /// Insert the default certification templates on `seed`.
    #[serde(default = "default_seed_catalog")]
    pub seed_catalog: bool,
}

fn default_database_url() -> String {
    "sqlite://therapy.sqlite3".to_string()
}

fn default_log_filter() -> String {
    "info".to_string()
}

fn default_passing_score() -> u32 {
    u32::from(DEFAULT_PASSING_SCORE.value())
}

fn default_seed_catalog() -> bool {
    true
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_url: default_database_url(),
            log_filter: default_log_filter(),
            passing_score: default_passing_score(),
            meeting_base_url: None,
            seed_catalog: default_seed_catalog(),
        }
    }
}

impl AppConfig {
    /// Load `therapy.toml` (if present) and `THERAPY_*` overrides.
    ///
    /// # Errors
    ///
    /// Returns `AppConfigError::Load` for malformed files or values.
    pub fn load() -> Result<Self, AppConfigError> {
        Self::from_builder(Config::builder().add_source(File::with_name("therapy").required(false)))
    }

    fn from_builder(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
    ) -> Result<Self, AppConfigError> {
        let config = builder
            .add_source(Environment::with_prefix("THERAPY").try_parsing(true))
            .build()?;
        Ok(config.try_deserialize()?)
    }

    /// Typed settings handed to the services layer.
    ///
    /// # Errors
    ///
    /// Returns `AppConfigError` for an out-of-range passing score or a
    /// malformed meeting base URL.
    pub fn service_settings(&self) -> Result<ServiceSettings, AppConfigError> {
        let settings =
            ServiceSettings::default().with_passing_score(QuizScore::new(self.passing_score)?);
        match self.meeting_base_url.as_deref().map(str::trim) {
            Some(base) if !base.is_empty() => Ok(settings
                .with_meeting_base_url(base)
                .map_err(AppServicesError::from)?),
            _ => Ok(settings),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::FileFormat;

    fn from_toml(raw: &str) -> AppConfig {
        AppConfig::from_builder(
            Config::builder().add_source(File::from_str(raw, FileFormat::Toml)),
        )
        .unwrap()
    }

    #[test]
    fn missing_keys_fall_back_to_defaults() {
        let config = from_toml("");
        assert_eq!(config.passing_score, 70);
        assert!(config.seed_catalog);
        assert_eq!(config.log_filter, "info");
    }

    #[test]
    fn file_values_become_service_settings() {
        let config = from_toml(
            r#"
                passing_score = 80
                meeting_base_url = "https://meet.example.com/rooms"
            "#,
        );
        let settings = config.service_settings().unwrap();
        assert_eq!(settings.passing_score().value(), 80);
        assert_eq!(
            settings.meeting_base_url().map(|u| u.as_str()),
            Some("https://meet.example.com/rooms/")
        );
    }

    #[test]
    fn out_of_range_score_is_rejected() {
        let config = AppConfig {
            passing_score: 101,
            ..AppConfig::default()
        };
        assert!(matches!(
            config.service_settings(),
            Err(AppConfigError::PassingScore(_))
        ));

        let config = AppConfig {
            meeting_base_url: Some("not a url".into()),
            ..AppConfig::default()
        };
        assert!(matches!(
            config.service_settings(),
            Err(AppConfigError::Services(AppServicesError::MeetingBaseUrl(_)))
        ));
    }
}
