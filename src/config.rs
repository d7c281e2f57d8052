use std::time::Duration;

use crate::errors::ChatError;
use crate::models::{Caller, CallerRole};

const DEFAULT_POLL_INTERVAL_MS: u64 = 3_000;
const DEFAULT_FOLLOW_THRESHOLD: f64 = 100.0;
const DEFAULT_SCROLL_SETTLE_MS: u64 = 50;
const DEFAULT_MAX_TEXT_LENGTH: usize = 8_000;

/// Tunables of the conversation engine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SyncConfig {
    pub poll_interval: Duration,
    /// Distance from the bottom, in view units, that still counts as "at the bottom".
    pub follow_threshold: f64,
    /// Delay the host should wait for layout before applying a scroll.
    pub scroll_settle: Duration,
    pub max_text_length: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            follow_threshold: DEFAULT_FOLLOW_THRESHOLD,
            scroll_settle: Duration::from_millis(DEFAULT_SCROLL_SETTLE_MS),
            max_text_length: DEFAULT_MAX_TEXT_LENGTH,
        }
    }
}

impl SyncConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let poll_ms = parse_or(&lookup, "CHAT_POLL_INTERVAL_MS", DEFAULT_POLL_INTERVAL_MS)
            .clamp(250, 600_000);
        let follow_threshold =
            parse_or(&lookup, "CHAT_FOLLOW_THRESHOLD", DEFAULT_FOLLOW_THRESHOLD).clamp(0.0, 10_000.0);
        let settle_ms =
            parse_or(&lookup, "CHAT_SCROLL_SETTLE_MS", DEFAULT_SCROLL_SETTLE_MS).clamp(0, 5_000);
        let max_text_length =
            parse_or(&lookup, "CHAT_MAX_TEXT_LENGTH", DEFAULT_MAX_TEXT_LENGTH).clamp(1, 1_000_000);

        Self {
            poll_interval: Duration::from_millis(poll_ms),
            follow_threshold,
            scroll_settle: Duration::from_millis(settle_ms),
            max_text_length,
        }
    }
}

/// Settings of the headless runner binary.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub api_base_url: String,
    pub bearer_token: String,
    pub caller: Caller,
    pub partner_id: Option<String>,
    pub sync: SyncConfig,
}

impl RunnerConfig {
    pub fn from_env() -> Result<Self, ChatError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ChatError> {
        let required = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .ok_or_else(|| ChatError::Config(format!("{key} must be set")))
        };

        let api_base_url = lookup("CHAT_API_BASE_URL")
            .unwrap_or_else(|| "http://localhost:8080".to_string())
            .trim_end_matches('/')
            .to_string();
        let bearer_token = required("CHAT_BEARER_TOKEN")?;
        let user_id = required("CHAT_USER_ID")?;
        let role = CallerRole::try_from(lookup("CHAT_ROLE").unwrap_or_else(|| "consumer".into()))
            .map_err(ChatError::Config)?;
        let partner_id = lookup("CHAT_PARTNER_ID").filter(|v| !v.trim().is_empty());

        Ok(Self {
            api_base_url,
            bearer_token,
            caller: Caller::new(user_id, role),
            partner_id,
            sync: SyncConfig::from_lookup(&lookup),
        })
    }
}

fn parse_or<T: std::str::FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    lookup(key)
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}
