//! Access token lifecycle

use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;

/// Lifetime assumed when the token response omits `expires_in`
pub const DEFAULT_EXPIRES_IN: i64 = 3600;

/// Token response from the auth endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub expires_in: Option<i64>,
}

/// A bearer token and when it stops being valid
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthSession {
    pub access_token: String,
    pub expires_at: DateTime<Utc>,
}

impl AuthSession {
    pub fn new(access_token: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            access_token: access_token.into(),
            expires_at,
        }
    }

    pub fn from_response(response: TokenResponse, now: DateTime<Utc>) -> Self {
        let expires_in = response.expires_in.unwrap_or(DEFAULT_EXPIRES_IN);
        Self::new(response.access_token, now + Duration::seconds(expires_in))
    }

    /// Valid while `now < expires_at`
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }

    pub fn is_valid(&self) -> bool {
        self.is_valid_at(Utc::now())
    }
}
