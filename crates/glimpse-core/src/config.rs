//! Story engine configuration loaded from environment variables.
//!
//! Every setting has a default, so the server starts with no configuration
//! at all for local development.

use chrono::Duration;

/// Tunables for story lifecycle, uploads, feed shaping and moderation.
#[derive(Debug, Clone)]
pub struct StoryConfig {
    /// How long a new story stays live.
    /// Env: `GLIMPSE_STORY_DURATION_HOURS`
    /// Default: `24` (values below 1 fall back to the default)
    pub story_duration_hours: i64,

    /// Items a story can hold before uploads start a new one (0 = unlimited).
    /// Env: `GLIMPSE_MAX_ITEMS_PER_STORY`
    /// Default: `20`
    pub max_items_per_story: usize,

    /// Uploads per author per UTC calendar day (0 = unlimited).
    /// Env: `GLIMPSE_MAX_UPLOADS_PER_DAY`
    /// Default: `20`
    pub max_uploads_per_day: usize,

    /// Upload size cap in MiB.
    /// Env: `GLIMPSE_MAX_UPLOAD_MB`
    /// Default: `50` (minimum 1)
    pub max_upload_mb: usize,

    pub allowed_image_mimes: Vec<String>,
    pub allowed_video_mimes: Vec<String>,

    /// Display length for image items.
    pub image_duration_ms: u32,

    pub feed_limit_default: usize,
    pub feed_limit_max: usize,

    /// `unseen_first` feeds fetch `limit * overfetch_factor` stories, capped
    /// at `overfetch_cap`, so ordering can run before truncation.
    pub overfetch_factor: usize,
    pub overfetch_cap: usize,

    /// Env: `GLIMPSE_FEED_CACHE_TTL`
    /// Default: `60` (0 disables caching)
    pub feed_cache_ttl_secs: u64,

    /// Pending reports that pull a story for review (0 disables).
    /// Env: `GLIMPSE_AUTO_HIDE_THRESHOLD`
    /// Default: `5`
    pub auto_hide_threshold: i64,

    pub sweep_batch_size: usize,

    /// Env: `GLIMPSE_SWEEP_INTERVAL_SECS`
    /// Default: `3600`
    pub sweep_interval_secs: u64,

    // -- Per-user hourly action limits --
    pub rate_limit_reactions: u32,
    pub rate_limit_replies: u32,
    pub rate_limit_reports: u32,
}

impl Default for StoryConfig {
    fn default() -> Self {
        Self {
            story_duration_hours: 24,
            max_items_per_story: 20,
            max_uploads_per_day: 20,
            max_upload_mb: 50,
            allowed_image_mimes: ["image/jpeg", "image/png", "image/webp"]
                .into_iter()
                .map(String::from)
                .collect(),
            allowed_video_mimes: ["video/mp4", "video/webm"]
                .into_iter()
                .map(String::from)
                .collect(),
            image_duration_ms: 5000,
            feed_limit_default: 20,
            feed_limit_max: 50,
            overfetch_factor: 4,
            overfetch_cap: 200,
            feed_cache_ttl_secs: 60,
            auto_hide_threshold: 5,
            sweep_batch_size: 200,
            sweep_interval_secs: 3600,
            rate_limit_reactions: 200,
            rate_limit_replies: 60,
            rate_limit_reports: 10,
        }
    }
}

impl StoryConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(hours) = env_parse::<i64>("GLIMPSE_STORY_DURATION_HOURS") {
            if hours >= 1 {
                config.story_duration_hours = hours;
            }
        }
        if let Some(n) = env_parse("GLIMPSE_MAX_ITEMS_PER_STORY") {
            config.max_items_per_story = n;
        }
        if let Some(n) = env_parse("GLIMPSE_MAX_UPLOADS_PER_DAY") {
            config.max_uploads_per_day = n;
        }
        if let Some(mb) = env_parse::<usize>("GLIMPSE_MAX_UPLOAD_MB") {
            config.max_upload_mb = mb.max(1);
        }
        if let Some(ttl) = env_parse("GLIMPSE_FEED_CACHE_TTL") {
            config.feed_cache_ttl_secs = ttl;
        }
        if let Some(threshold) = env_parse::<i64>("GLIMPSE_AUTO_HIDE_THRESHOLD") {
            config.auto_hide_threshold = threshold.max(0);
        }
        if let Some(secs) = env_parse::<u64>("GLIMPSE_SWEEP_INTERVAL_SECS") {
            config.sweep_interval_secs = secs.max(1);
        }

        config
    }

    pub fn story_duration(&self) -> Duration {
        Duration::hours(self.story_duration_hours.max(1))
    }

    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_mb.max(1) * 1024 * 1024
    }

    pub fn is_allowed_mime(&self, mime: &str) -> bool {
        self.allowed_image_mimes.iter().any(|m| m == mime)
            || self.allowed_video_mimes.iter().any(|m| m == mime)
    }

    /// Clamp a requested feed size into `[1, feed_limit_max]`.
    pub fn clamp_feed_limit(&self, requested: Option<i64>) -> usize {
        match requested {
            Some(n) if n >= 1 => (n as usize).min(self.feed_limit_max.max(1)),
            Some(_) => 1,
            None => self.feed_limit_default.clamp(1, self.feed_limit_max.max(1)),
        }
    }

    /// Story rows to read for a feed of `limit` author buckets.
    pub fn overfetch(&self, limit: usize) -> usize {
        limit
            .saturating_mul(self.overfetch_factor)
            .max(limit)
            .min(self.overfetch_cap.max(limit))
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    let raw = std::env::var(name).ok()?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(name, value = %raw, "Invalid value, using default");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = StoryConfig::default();
        assert_eq!(config.story_duration(), Duration::hours(24));
        assert_eq!(config.max_upload_bytes(), 50 * 1024 * 1024);
        assert!(config.is_allowed_mime("image/webp"));
        assert!(config.is_allowed_mime("video/mp4"));
        assert!(!config.is_allowed_mime("image/gif"));
    }

    #[test]
    fn test_feed_limit_is_clamped() {
        let config = StoryConfig::default();
        assert_eq!(config.clamp_feed_limit(None), 20);
        assert_eq!(config.clamp_feed_limit(Some(0)), 1);
        assert_eq!(config.clamp_feed_limit(Some(-7)), 1);
        assert_eq!(config.clamp_feed_limit(Some(500)), 50);
    }

    #[test]
    fn test_overfetch_is_bounded() {
        let config = StoryConfig::default();
        assert_eq!(config.overfetch(1), 4);
        assert_eq!(config.overfetch(20), 80);
        assert_eq!(config.overfetch(50), 200);
    }
}
