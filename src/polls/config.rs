//! Poll Types
//!
//! Shared types for the poll engine: creation requests, stored metadata,
//! inbound actions, and the poll error taxonomy.

use crate::config::PollSettings;
use serde::{Deserialize, Serialize};

use super::store::StoreError;

/// Errors produced by the poll engine.
///
/// All variants are scoped to a single poll or a single actor; none of
/// them is fatal to the host process.
#[derive(Debug, thiserror::Error)]
pub enum PollError {
    /// Rejected at the boundary before anything reaches the store.
    #[error("invalid poll: {0}")]
    Validation(String),

    /// The submitting user is inside the vote cooldown window.
    #[error("voting too fast, try again shortly")]
    RateLimited,

    /// No metadata for this poll id (never existed, expired, or deleted).
    #[error("poll not found")]
    PollNotFound,

    /// The poll's end time has passed or termination has begun.
    #[error("poll is closed to voting")]
    PollClosed,

    /// A second termination trigger lost the first-trigger-wins race.
    #[error("poll has already ended")]
    AlreadyEnded,

    /// The acting user is neither the creator nor a surface admin.
    #[error("not authorized to end this poll")]
    Unauthorized,

    /// The shared store could not be reached.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Request to create a poll, as handed over by the presentation layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollConfig {
    /// Poll title/question
    pub title: String,
    /// Channel the poll lives in
    pub channel_id: String,
    /// Guild/server the channel belongs to
    pub guild_id: String,
    /// User ID of poll creator
    pub created_by: String,
    /// Ordered option labels (2..=option ceiling, unique)
    pub options: Vec<String>,
    /// Auto-end after this many seconds (None = manual end only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_limit_secs: Option<u64>,
    /// Whether running counts are publicly visible before termination
    #[serde(default)]
    pub show_running_tally: bool,
}

impl PollConfig {
    /// Create a new poll request
    pub fn new(
        title: impl Into<String>,
        channel_id: impl Into<String>,
        guild_id: impl Into<String>,
        created_by: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            channel_id: channel_id.into(),
            guild_id: guild_id.into(),
            created_by: created_by.into(),
            options: Vec::new(),
            time_limit_secs: None,
            show_running_tally: false,
        }
    }

    /// Set option labels
    pub fn with_options(mut self, options: Vec<impl Into<String>>) -> Self {
        self.options = options.into_iter().map(Into::into).collect();
        self
    }

    /// Set the auto-end time limit in seconds
    pub fn with_time_limit(mut self, seconds: u64) -> Self {
        self.time_limit_secs = Some(seconds);
        self
    }

    /// Make running counts publicly visible before termination
    pub fn show_running_tally(mut self, show: bool) -> Self {
        self.show_running_tally = show;
        self
    }

    /// Validate the request against the configured bounds.
    ///
    /// Runs synchronously at the boundary; a failing request never
    /// reaches the store.
    pub fn validate(&self, settings: &PollSettings) -> Result<(), PollError> {
        if self.title.trim().is_empty() {
            return Err(PollError::Validation("poll title is required".to_string()));
        }

        if self.options.len() < settings.min_options {
            return Err(PollError::Validation(format!(
                "poll must have at least {} options",
                settings.min_options
            )));
        }
        if self.options.len() > settings.max_options {
            return Err(PollError::Validation(format!(
                "poll cannot have more than {} options",
                settings.max_options
            )));
        }

        let mut seen = std::collections::HashSet::new();
        for option in &self.options {
            if option.trim().is_empty() {
                return Err(PollError::Validation(
                    "option labels cannot be empty".to_string(),
                ));
            }
            if !seen.insert(option.as_str()) {
                return Err(PollError::Validation(format!(
                    "duplicate option label: {}",
                    option
                )));
            }
        }

        if let Some(limit) = self.time_limit_secs {
            if limit < settings.min_time_limit_secs || limit > settings.max_time_limit_secs {
                return Err(PollError::Validation(format!(
                    "time limit must be between {} and {} seconds",
                    settings.min_time_limit_secs, settings.max_time_limit_secs
                )));
            }
        }

        Ok(())
    }
}

/// Stored poll metadata.
///
/// Option labels are unique and immutable after creation; only the
/// message id and the `ending` flag change over the poll's lifetime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollMeta {
    /// Globally unique poll ID
    pub id: String,
    /// Poll title/question
    pub title: String,
    /// Channel the poll lives in
    pub channel_id: String,
    /// Guild/server the channel belongs to
    pub guild_id: String,
    /// User ID of poll creator
    pub created_by: String,
    /// Ordered, immutable option labels
    pub options: Vec<String>,
    /// When poll was created (Unix ms)
    pub created_at: i64,
    /// When poll auto-ends (Unix ms, None = manual end only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ends_at: Option<i64>,
    /// Whether running counts are publicly visible before termination
    #[serde(default)]
    pub show_running_tally: bool,
    /// ID of the public message currently displaying the poll
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    /// Set once termination has begun; never cleared
    #[serde(default)]
    pub ending: bool,
}

impl PollMeta {
    /// Build stored metadata from a validated creation request.
    pub fn from_config(id: impl Into<String>, config: &PollConfig) -> Self {
        let created_at = now_millis();
        Self {
            id: id.into(),
            title: config.title.clone(),
            channel_id: config.channel_id.clone(),
            guild_id: config.guild_id.clone(),
            created_by: config.created_by.clone(),
            options: config.options.clone(),
            created_at,
            ends_at: config
                .time_limit_secs
                .map(|secs| created_at + (secs as i64) * 1000),
            show_running_tally: config.show_running_tally,
            message_id: None,
            ending: false,
        }
    }

    /// Whether the configured end time has passed.
    pub fn is_past_end(&self) -> bool {
        match self.ends_at {
            Some(ends_at) => now_millis() > ends_at,
            None => false,
        }
    }

    /// Whether the poll still accepts votes.
    pub fn accepts_votes(&self) -> bool {
        !self.ending && !self.is_past_end()
    }

    /// Whether `option` is one of this poll's declared labels.
    pub fn has_option(&self, option: &str) -> bool {
        self.options.iter().any(|o| o == option)
    }
}

/// Inbound action from the presentation layer.
///
/// Closed set, validated at the boundary before reaching the core.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum PollAction {
    /// Create a new poll
    CreatePoll { config: PollConfig },
    /// Cast or change a vote
    SubmitVote {
        poll_id: String,
        user_id: String,
        option: String,
    },
    /// End a poll before its timer fires
    ManualEnd { poll_id: String, user_id: String },
}

/// Get current time in milliseconds since Unix epoch
pub(crate) fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings() -> PollSettings {
        PollSettings::default()
    }

    fn base_config() -> PollConfig {
        PollConfig::new("Favorite color?", "chan-1", "guild-1", "user-1")
            .with_options(vec!["Red", "Blue", "Green"])
    }

    #[test]
    fn test_validate_ok() {
        assert!(base_config().validate(&settings()).is_ok());
    }

    #[test]
    fn test_validate_empty_title() {
        let config =
            PollConfig::new("  ", "chan-1", "guild-1", "user-1").with_options(vec!["A", "B"]);
        let err = config.validate(&settings()).unwrap_err();
        assert!(err.to_string().contains("title"));
    }

    #[test]
    fn test_validate_too_few_options() {
        let config = base_config().with_options(vec!["Only one"]);
        let err = config.validate(&settings()).unwrap_err();
        assert!(err.to_string().contains("at least 2"));
    }

    #[test]
    fn test_validate_too_many_options() {
        let options: Vec<String> = (0..25).map(|i| format!("opt-{}", i)).collect();
        let config = base_config().with_options(options);
        let err = config.validate(&settings()).unwrap_err();
        assert!(err.to_string().contains("more than 24"));
    }

    #[test]
    fn test_validate_duplicate_options() {
        let config = base_config().with_options(vec!["A", "B", "A"]);
        let err = config.validate(&settings()).unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn test_validate_empty_option_label() {
        let config = base_config().with_options(vec!["A", " "]);
        assert!(config.validate(&settings()).is_err());
    }

    #[test]
    fn test_validate_time_limit_bounds() {
        let too_short = base_config().with_time_limit(5);
        assert!(too_short.validate(&settings()).is_err());

        let too_long = base_config().with_time_limit(7200);
        assert!(too_long.validate(&settings()).is_err());

        let ok = base_config().with_time_limit(600);
        assert!(ok.validate(&settings()).is_ok());
    }

    #[test]
    fn test_meta_from_config() {
        let config = base_config().with_time_limit(60).show_running_tally(true);
        let meta = PollMeta::from_config("poll-1", &config);

        assert_eq!(meta.id, "poll-1");
        assert_eq!(meta.options, vec!["Red", "Blue", "Green"]);
        assert_eq!(meta.ends_at, Some(meta.created_at + 60_000));
        assert!(meta.show_running_tally);
        assert!(!meta.ending);
        assert!(meta.accepts_votes());
    }

    #[test]
    fn test_meta_past_end() {
        let config = base_config().with_time_limit(60);
        let mut meta = PollMeta::from_config("poll-1", &config);
        assert!(!meta.is_past_end());

        meta.ends_at = Some(now_millis() - 1000);
        assert!(meta.is_past_end());
        assert!(!meta.accepts_votes());
    }

    #[test]
    fn test_meta_ending_blocks_votes() {
        let mut meta = PollMeta::from_config("poll-1", &base_config());
        assert!(meta.accepts_votes());
        meta.ending = true;
        assert!(!meta.accepts_votes());
    }

    #[test]
    fn test_action_serialization() {
        let action = PollAction::SubmitVote {
            poll_id: "poll-1".to_string(),
            user_id: "user-1".to_string(),
            option: "Red".to_string(),
        };
        let json = serde_json::to_string(&action).unwrap();
        assert!(json.contains("submit_vote"));

        let parsed: PollAction = serde_json::from_str(&json).unwrap();
        match parsed {
            PollAction::SubmitVote { option, .. } => assert_eq!(option, "Red"),
            other => panic!("unexpected action: {:?}", other),
        }
    }
}
