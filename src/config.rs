use std::env;
use std::time::Duration;

use http::HeaderValue;

use crate::engine::SESSION_IDLE_TIMEOUT;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    /// `None` runs with in-memory stores.
    pub database_url: Option<String>,
    pub openai_api_key: Option<String>,
    pub openai_base_url: Option<String>,
    pub openai_model: Option<String>,
    /// Empty means any origin.
    pub allowed_origins: Vec<HeaderValue>,
    /// Abandoned quiz sessions are dropped after this much inactivity.
    pub session_idle_timeout: Duration,
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |key: &str| get(key).filter(|v| !v.trim().is_empty());

        let allowed_origins = non_empty("ALLOWED_ORIGINS")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|o| !o.is_empty())
                    .filter_map(|o| match HeaderValue::from_str(o) {
                        Ok(v) => Some(v),
                        Err(_) => {
                            tracing::warn!(origin = o, "ignoring invalid origin");
                            None
                        }
                    })
                    .collect()
            })
            .unwrap_or_default();

        Self {
            port: non_empty("PORT")
                .and_then(|s| s.parse().ok())
                .unwrap_or(3000),
            database_url: non_empty("DATABASE_URL"),
            openai_api_key: non_empty("OPENAI_API_KEY"),
            openai_base_url: non_empty("OPENAI_BASE_URL"),
            openai_model: non_empty("OPENAI_MODEL"),
            allowed_origins,
            session_idle_timeout: non_empty("SESSION_IDLE_MINUTES")
                .and_then(|s| s.parse::<u64>().ok())
                .filter(|m| *m > 0)
                .map(|m| Duration::from_secs(m * 60))
                .unwrap_or(SESSION_IDLE_TIMEOUT),
        }
    }
}
