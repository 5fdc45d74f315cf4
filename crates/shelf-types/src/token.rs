use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Payload stored under a random token key.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub email: String,
    pub expires: DateTime<Utc>,
}

impl Token {
    pub fn new(email: impl Into<String>, expires: DateTime<Utc>) -> Self {
        Self {
            email: email.into(),
            expires,
        }
    }

    /// Expiry is checked lazily at lookup; nothing sweeps old tokens.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }
}
