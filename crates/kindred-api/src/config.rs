use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result, ensure};

const MAX_CIRCLE_TTL_DAYS: i64 = 365;

fn max_circle_ttl() -> chrono::Duration {
    chrono::Duration::days(MAX_CIRCLE_TTL_DAYS)
}

/// Tunables for matching, quotas and the letter flow. Built once at startup
/// and shared through the application state.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Maximum active members per circle.
    pub circle_capacity: u32,
    /// Lifetime of a new circle.
    pub circle_ttl: chrono::Duration,
    /// Messages one device may send per circle per UTC day.
    pub daily_message_limit: u32,
    pub message_max_chars: usize,
    /// Upper bound on messages returned by one listing call.
    pub message_page_size: u32,
    pub letter_min_chars: usize,
    pub letter_max_chars: usize,
    /// How long clients keep a typing indicator alive.
    pub typing_ttl: Duration,
    /// Mixed into letter-flow device hashes.
    pub device_hash_salt: String,
    pub moderation: ModerationSettings,
}

#[derive(Debug, Clone)]
pub struct ModerationSettings {
    /// Classifier endpoint. `None` approves every letter.
    pub url: Option<String>,
    pub timeout: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            circle_capacity: 5,
            circle_ttl: chrono::Duration::days(7),
            daily_message_limit: 20,
            message_max_chars: 2000,
            message_page_size: 200,
            letter_min_chars: 10,
            letter_max_chars: 1000,
            typing_ttl: Duration::from_secs(2),
            device_hash_salt: "kindred-dev-salt".into(),
            moderation: ModerationSettings::default(),
        }
    }
}

impl Default for ModerationSettings {
    fn default() -> Self {
        Self {
            url: None,
            timeout: Duration::from_millis(3000),
        }
    }
}

impl Settings {
    /// Read `KINDRED_*` variables, falling back to defaults.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let settings = Self {
            circle_capacity: env_or("KINDRED_CIRCLE_CAPACITY", defaults.circle_capacity)?,
            circle_ttl: chrono::Duration::try_hours(env_or("KINDRED_CIRCLE_TTL_HOURS", 168)?)
                .context("KINDRED_CIRCLE_TTL_HOURS is out of range")?,
            daily_message_limit: env_or("KINDRED_DAILY_MESSAGE_LIMIT", defaults.daily_message_limit)?,
            message_max_chars: env_or("KINDRED_MESSAGE_MAX_CHARS", defaults.message_max_chars)?,
            message_page_size: defaults.message_page_size,
            letter_min_chars: env_or("KINDRED_LETTER_MIN_CHARS", defaults.letter_min_chars)?,
            letter_max_chars: env_or("KINDRED_LETTER_MAX_CHARS", defaults.letter_max_chars)?,
            typing_ttl: defaults.typing_ttl,
            device_hash_salt: env_or("KINDRED_DEVICE_HASH_SALT", defaults.device_hash_salt)?,
            moderation: ModerationSettings {
                url: std::env::var("KINDRED_MODERATION_URL").ok().filter(|u| !u.trim().is_empty()),
                timeout: Duration::from_millis(env_or("KINDRED_MODERATION_TIMEOUT_MS", 3000)?),
            },
        };

        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(self.circle_capacity >= 1, "circle capacity must be at least 1");
        ensure!(self.circle_ttl > chrono::Duration::zero(), "circle TTL must be positive");
        ensure!(
            self.circle_ttl <= max_circle_ttl(),
            "circle TTL must be at most {} days",
            MAX_CIRCLE_TTL_DAYS
        );
        ensure!(
            self.letter_min_chars <= self.letter_max_chars,
            "letter length bounds are inverted ({} > {})",
            self.letter_min_chars,
            self.letter_max_chars
        );
        Ok(())
    }
}

fn env_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(key) {
        Ok(raw) => raw.trim().parse().with_context(|| format!("invalid value for {}: {:?}", key, raw)),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let settings = Settings::default();
        settings.validate().unwrap();
        assert_eq!(settings.circle_ttl, chrono::Duration::days(7));
        assert!(settings.moderation.url.is_none());
    }

    #[test]
    fn circle_ttl_is_bounded() {
        let settings = Settings {
            circle_ttl: chrono::Duration::hours(3_000_000_000),
            ..Settings::default()
        };
        assert!(settings.validate().is_err());

        let year = Settings {
            circle_ttl: chrono::Duration::days(365),
            ..Settings::default()
        };
        year.validate().unwrap();
    }

    #[test]
    fn inverted_letter_bounds_are_rejected() {
        let settings = Settings {
            letter_min_chars: 50,
            letter_max_chars: 10,
            ..Settings::default()
        };
        assert!(settings.validate().is_err());
    }
}
