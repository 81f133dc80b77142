//! Configuration for extraction and calendar sync.
//!
//! Every knob lives in [`PlannerConfig`], built via its
//! [`PlannerConfigBuilder`]. The defaults reproduce a single-campus
//! deployment: Gemini for extraction, Google Calendar for storage, every
//! event pinned to `Asia/Kolkata`.
//!
//! # Design choice: builder over constructor
//! Most callers only change one or two fields (the model, the token path).
//! The builder lets them set only those and rely on documented defaults for
//! the rest.

use crate::error::Tt2CalError;
use chrono_tz::Tz;
use edgequake_llm::LLMProvider;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

pub const DEFAULT_PROVIDER: &str = "gemini";
pub const DEFAULT_MODEL: &str = "gemini-2.0-flash";
pub const DEFAULT_CALENDAR_API_BASE: &str = "https://www.googleapis.com/calendar/v3";
pub const DEFAULT_TOKEN_ENDPOINT: &str = "https://oauth2.googleapis.com/token";
pub const DEFAULT_STATIC_CALENDAR: &str = "Semester Static Calendar";
pub const DEFAULT_CLUB_CALENDAR: &str = "Club Temporary Events";
/// Upper bound for [`PlannerConfigBuilder::max_retries`].
pub const MAX_RETRIES: u32 = 10;

/// Configuration for a planner session.
///
/// # Example
/// ```rust
/// use timetable2cal::PlannerConfig;
///
/// let config = PlannerConfig::builder()
///     .model("gemini-2.5-pro")
///     .event_duration_minutes(90)
///     .build()
///     .unwrap();
/// assert_eq!(config.timezone, chrono_tz::Asia::Kolkata);
/// ```
#[derive(Clone)]
pub struct PlannerConfig {
    /// LLM model identifier. If None, uses [`DEFAULT_MODEL`].
    pub model: Option<String>,

    /// LLM provider name (e.g. "gemini", "openai"). If None, uses [`DEFAULT_PROVIDER`].
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature. Default: 0.1.
    ///
    /// Extraction is transcription, not writing; a near-zero temperature
    /// keeps the model faithful to the document.
    pub temperature: f32,

    /// Maximum tokens the model may generate. Default: 4096.
    ///
    /// A dense weekly grid (6 days × 8 slots) serialises to roughly 3 000
    /// tokens of JSON; a lower cap truncates the payload mid-array and the
    /// sanitizer then has nothing balanced to recover.
    pub max_tokens: usize,

    /// Extra model attempts after a failure. Default: 0.
    ///
    /// Extraction calls are quota-metered. The library never retries on its
    /// own; callers that want retries opt in here.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds, doubled per attempt. Default: 500.
    pub retry_backoff_ms: u64,

    /// Largest PDF accepted for extraction. Default: 5 MiB.
    pub max_document_bytes: usize,

    /// Custom extraction prompt. If None, uses the built-in prompt.
    pub extraction_prompt: Option<String>,

    /// Zone every event is created in. Default: `Asia/Kolkata`.
    pub timezone: Tz,

    /// Name of the calendar holding class timetables.
    pub static_calendar_name: String,

    /// Name of the calendar holding club events.
    pub club_calendar_name: String,

    /// Length of an organizer event. Default: 60.
    pub event_duration_minutes: u32,

    /// Google Calendar v3 base URL (overridable for tests).
    pub calendar_api_base: String,

    /// OAuth token endpoint (overridable for tests).
    pub token_endpoint: String,

    /// Where the OAuth token is persisted. Default: `token.json`.
    pub token_path: PathBuf,

    /// Installed-app OAuth client file. Default: `credentials.json`.
    pub credentials_path: PathBuf,

    /// Per-request HTTP timeout for calendar calls, in seconds. Default: 60.
    pub api_timeout_secs: u64,

    /// How many alternative slots to propose when a request is blocked. Default: 2.
    pub suggestion_count: usize,

    /// How many days (starting with the requested one) to search. Default: 8.
    pub suggestion_horizon_days: u32,

    /// Club events can be cancelled only this long after creation. Default: 48.
    pub cancellation_window_hours: i64,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            model: None,
            provider_name: None,
            provider: None,
            temperature: 0.1,
            max_tokens: 4096,
            max_retries: 0,
            retry_backoff_ms: 500,
            max_document_bytes: 5 * 1024 * 1024,
            extraction_prompt: None,
            timezone: chrono_tz::Asia::Kolkata,
            static_calendar_name: DEFAULT_STATIC_CALENDAR.to_string(),
            club_calendar_name: DEFAULT_CLUB_CALENDAR.to_string(),
            event_duration_minutes: 60,
            calendar_api_base: DEFAULT_CALENDAR_API_BASE.to_string(),
            token_endpoint: DEFAULT_TOKEN_ENDPOINT.to_string(),
            token_path: PathBuf::from("token.json"),
            credentials_path: PathBuf::from("credentials.json"),
            api_timeout_secs: 60,
            suggestion_count: 2,
            suggestion_horizon_days: 8,
            cancellation_window_hours: 48,
        }
    }
}

impl fmt::Debug for PlannerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PlannerConfig")
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("max_retries", &self.max_retries)
            .field("max_document_bytes", &self.max_document_bytes)
            .field("timezone", &self.timezone)
            .field("static_calendar_name", &self.static_calendar_name)
            .field("club_calendar_name", &self.club_calendar_name)
            .field("event_duration_minutes", &self.event_duration_minutes)
            .field("calendar_api_base", &self.calendar_api_base)
            .field("token_path", &self.token_path)
            .finish()
    }
}

impl PlannerConfig {
    /// Create a new builder for `PlannerConfig`.
    pub fn builder() -> PlannerConfigBuilder {
        PlannerConfigBuilder {
            config: Self::default(),
        }
    }

    /// The model to request, falling back to [`DEFAULT_MODEL`].
    pub fn model_or_default(&self) -> &str {
        self.model.as_deref().unwrap_or(DEFAULT_MODEL)
    }

    /// The provider to request, falling back to [`DEFAULT_PROVIDER`].
    pub fn provider_or_default(&self) -> &str {
        self.provider_name.as_deref().unwrap_or(DEFAULT_PROVIDER)
    }
}

/// Builder for [`PlannerConfig`].
#[derive(Debug)]
pub struct PlannerConfigBuilder {
    config: PlannerConfig,
}

impl PlannerConfigBuilder {
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n.min(MAX_RETRIES);
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn max_document_bytes(mut self, n: usize) -> Self {
        self.config.max_document_bytes = n;
        self
    }

    pub fn extraction_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.extraction_prompt = Some(prompt.into());
        self
    }

    pub fn timezone(mut self, tz: Tz) -> Self {
        self.config.timezone = tz;
        self
    }

    pub fn static_calendar_name(mut self, name: impl Into<String>) -> Self {
        self.config.static_calendar_name = name.into();
        self
    }

    pub fn club_calendar_name(mut self, name: impl Into<String>) -> Self {
        self.config.club_calendar_name = name.into();
        self
    }

    pub fn event_duration_minutes(mut self, minutes: u32) -> Self {
        self.config.event_duration_minutes = minutes.max(1);
        self
    }

    pub fn calendar_api_base(mut self, url: impl Into<String>) -> Self {
        self.config.calendar_api_base = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn token_endpoint(mut self, url: impl Into<String>) -> Self {
        self.config.token_endpoint = url.into();
        self
    }

    pub fn token_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.token_path = path.into();
        self
    }

    pub fn credentials_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.credentials_path = path.into();
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs.max(1);
        self
    }

    pub fn suggestion_count(mut self, n: usize) -> Self {
        self.config.suggestion_count = n;
        self
    }

    pub fn suggestion_horizon_days(mut self, days: u32) -> Self {
        self.config.suggestion_horizon_days = days;
        self
    }

    pub fn cancellation_window_hours(mut self, hours: i64) -> Self {
        self.config.cancellation_window_hours = hours;
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<PlannerConfig, Tt2CalError> {
        let c = &self.config;
        if c.max_document_bytes == 0 {
            return Err(Tt2CalError::InvalidConfig(
                "max_document_bytes must be ≥ 1".into(),
            ));
        }
        if c.static_calendar_name.trim().is_empty() || c.club_calendar_name.trim().is_empty() {
            return Err(Tt2CalError::InvalidConfig(
                "calendar names must not be empty".into(),
            ));
        }
        if c.static_calendar_name == c.club_calendar_name {
            return Err(Tt2CalError::InvalidConfig(format!(
                "static and club calendars must differ (both '{}')",
                c.static_calendar_name
            )));
        }
        if !c.calendar_api_base.starts_with("http://") && !c.calendar_api_base.starts_with("https://")
        {
            return Err(Tt2CalError::InvalidConfig(format!(
                "calendar_api_base must be an HTTP(S) URL, got '{}'",
                c.calendar_api_base
            )));
        }
        if c.cancellation_window_hours < 0 {
            return Err(Tt2CalError::InvalidConfig(
                "cancellation_window_hours must not be negative".into(),
            ));
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let c = PlannerConfig::default();
        assert_eq!(c.max_retries, 0);
        assert_eq!(c.max_document_bytes, 5 * 1024 * 1024);
        assert_eq!(c.timezone, chrono_tz::Asia::Kolkata);
        assert_eq!(c.model_or_default(), DEFAULT_MODEL);
        assert_eq!(c.provider_or_default(), "gemini");
        assert_eq!(c.event_duration_minutes, 60);
    }

    #[test]
    fn builder_clamps() {
        let c = PlannerConfig::builder()
            .temperature(5.0)
            .event_duration_minutes(0)
            .calendar_api_base("http://127.0.0.1:9999/")
            .build()
            .unwrap();
        assert_eq!(c.temperature, 2.0);
        assert_eq!(c.event_duration_minutes, 1);
        assert_eq!(c.calendar_api_base, "http://127.0.0.1:9999");
    }

    #[test]
    fn retries_are_capped() {
        let c = PlannerConfig::builder().max_retries(u32::MAX).build().unwrap();
        assert_eq!(c.max_retries, MAX_RETRIES);
    }

    #[test]
    fn same_calendar_names_rejected() {
        let err = PlannerConfig::builder()
            .static_calendar_name("Shared")
            .club_calendar_name("Shared")
            .build()
            .unwrap_err();
        assert!(matches!(err, Tt2CalError::InvalidConfig(_)));
    }

    #[test]
    fn zero_document_limit_rejected() {
        assert!(PlannerConfig::builder().max_document_bytes(0).build().is_err());
    }

    #[test]
    fn debug_hides_provider() {
        let dbg = format!("{:?}", PlannerConfig::default());
        assert!(dbg.contains("PlannerConfig"));
        assert!(dbg.contains("Kolkata"));
    }
}
