use serde::Deserialize;

/// Root tracker configuration. Loaded from environment variables
/// with the prefix `PUSHLAP__`.
#[derive(Debug, Clone, Deserialize)]
pub struct TrackerConfig {
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    /// `src` prefix identifying the tracker's own script tag on the page.
    #[serde(default = "default_tracker_script_prefix")]
    pub tracker_script_prefix: String,
    /// Query parameter carrying the affiliate ref when the program sets none.
    #[serde(default = "default_url_modifier")]
    pub default_url_modifier: String,
    #[serde(default = "default_cookie_duration_days")]
    pub default_cookie_duration_days: i64,
    /// Delay before `affiliate_referral_ready` on the paths that skip click registration.
    #[serde(default = "default_ready_event_delay_ms")]
    pub ready_event_delay_ms: u64,
}

// Default functions
fn default_api_base_url() -> String {
    "https://www.pushlapgrowth.com".to_string()
}
fn default_tracker_script_prefix() -> String {
    "https://pushlapgrowth.com/affiliate-tracker.js".to_string()
}
fn default_url_modifier() -> String {
    "ref".to_string()
}
fn default_cookie_duration_days() -> i64 {
    60
}
fn default_ready_event_delay_ms() -> u64 {
    100
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            tracker_script_prefix: default_tracker_script_prefix(),
            default_url_modifier: default_url_modifier(),
            default_cookie_duration_days: default_cookie_duration_days(),
            ready_event_delay_ms: default_ready_event_delay_ms(),
        }
    }
}

impl TrackerConfig {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self, config::ConfigError> {
        let builder = config::Config::builder().add_source(
            config::Environment::with_prefix("PUSHLAP")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }

    /// Same configuration pointed at a different API host (tests, staging).
    pub fn with_api_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into();
        self
    }

    pub fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.api_base_url.trim_end_matches('/'), path)
    }

    pub fn ready_event_delay(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.ready_event_delay_ms)
    }
}
