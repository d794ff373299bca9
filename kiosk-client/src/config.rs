//! Client configuration

use std::time::Duration;

/// Device credentials and backend location
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Backend base URL (e.g., "https://project.supabase.co")
    pub base_url: String,

    /// Anonymous API key, sent as the `apikey` header
    pub anon_key: String,

    /// Device account email
    pub user: String,

    pub password: String,

    pub device_id: String,

    pub device_name: String,

    /// Device type reported with every state push (e.g. "island")
    pub device_type: String,

    /// Request timeout in seconds
    pub timeout: u64,

    /// Extra `get_state` attempts after the first, each after a forced re-auth
    pub max_retries: u32,

    /// Pause before each retry
    pub retry_delay: Duration,
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>, anon_key: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            anon_key: anon_key.into(),
            user: String::new(),
            password: String::new(),
            device_id: String::new(),
            device_name: String::new(),
            device_type: "island".to_string(),
            timeout: 10,
            max_retries: 3,
            retry_delay: Duration::from_secs(1),
        }
    }

    /// Set the device account credentials
    pub fn with_credentials(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.user = user.into();
        self.password = password.into();
        self
    }

    /// Set the device identity
    pub fn with_device(
        mut self,
        id: impl Into<String>,
        name: impl Into<String>,
        device_type: impl Into<String>,
    ) -> Self {
        self.device_id = id.into();
        self.device_name = name.into();
        self.device_type = device_type.into();
        self
    }

    /// Set the request timeout
    pub fn with_timeout(mut self, seconds: u64) -> Self {
        self.timeout = seconds;
        self
    }

    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }
}
