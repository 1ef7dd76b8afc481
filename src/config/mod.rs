use serde::Deserialize;
use std::time::Duration;

use crate::services::auth::AuthStrategy;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Connection settings for the try-on service client.
pub struct ApiConfig {
    /// Base URL all stage endpoints are resolved against.
    pub base_url: String,

    /// Authorization header strategy applied per request.
    pub auth: AuthStrategy,

    /// Per-request timeout.
    pub timeout: Duration,
}

impl ApiConfig {
    pub fn new(base_url: impl Into<String>, auth: AuthStrategy) -> Self {
        Self {
            base_url: base_url.into(),
            auth,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Process configuration for the demo binary, read from `TRYON_`-prefixed
/// environment variables.
#[derive(Debug, Deserialize)]
pub struct AppConfig {
    /// Base URL of the try-on service
    pub base_url: String,

    /// Static API key
    pub api_key: String,

    /// Path of the local key/value store file
    #[serde(default = "default_store_path")]
    pub store_path: String,
}

fn default_store_path() -> String {
    "tryon-sdk-store.json".to_string()
}

impl AppConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::prefixed("TRYON_").from_env()
    }
}
