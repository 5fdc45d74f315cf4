use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;
use shelf_store::{Mutation, Query, Storer};
use shelf_types::Token;
use tracing::{debug, warn};

use crate::config::TokenTtl;
use crate::error::{RepoError, RepoResult};

/// The two token families and where each lives.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TokenKind {
    /// Email verification for wholesale applicants.
    Verification,
    PasswordReset,
}

impl TokenKind {
    pub fn namespace(&self) -> &'static str {
        match self {
            Self::Verification => "verifications",
            Self::PasswordReset => "tokens",
        }
    }

    pub fn key_len(&self) -> usize {
        match self {
            Self::Verification => 32,
            Self::PasswordReset => 64,
        }
    }
}

fn random_key(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// Issues and redeems single-use tokens.
///
/// Expiry is checked lazily on lookup: an expired token is reported as not
/// found and left in place. Nothing sweeps old tokens.
#[derive(Clone)]
pub struct Tokens {
    store: Arc<dyn Storer>,
    ttl: TokenTtl,
}

impl Tokens {
    pub fn new(store: Arc<dyn Storer>, ttl: TokenTtl) -> Self {
        Self { store, ttl }
    }

    pub(crate) fn query(kind: TokenKind, key: &str) -> Query {
        Query::at([kind.namespace()]).key(key)
    }

    fn lifetime(&self, kind: TokenKind) -> RepoResult<Duration> {
        let hours = match kind {
            TokenKind::Verification => self.ttl.verification_hours,
            TokenKind::PasswordReset => self.ttl.password_reset_hours,
        };
        Duration::try_hours(hours)
            .filter(|d| *d > Duration::zero())
            .ok_or_else(|| {
                RepoError::Config(format!(
                    "{} token lifetime of {hours} hours is out of range",
                    kind.namespace()
                ))
            })
    }

    /// Expiry of a token issued now, or a config error when the configured
    /// lifetime overflows the calendar.
    fn expiry(&self, kind: TokenKind) -> RepoResult<DateTime<Utc>> {
        let lifetime = self.lifetime(kind)?;
        Utc::now().checked_add_signed(lifetime).ok_or_else(|| {
            RepoError::Config(format!(
                "{} token lifetime of {lifetime} does not fit a timestamp",
                kind.namespace()
            ))
        })
    }

    /// Build a fresh token and the write that stores it, for callers that
    /// batch it with other writes.
    pub(crate) fn prepare(&self, kind: TokenKind, email: &str) -> RepoResult<(String, Query)> {
        self.prepare_expiring(kind, email, self.expiry(kind)?)
    }

    fn prepare_expiring(
        &self,
        kind: TokenKind,
        email: &str,
        expires: DateTime<Utc>,
    ) -> RepoResult<(String, Query)> {
        let key = random_key(kind.key_len());
        let record = serde_json::to_vec(&Token::new(email, expires))?;
        let write = Self::query(kind, &key).value(record);
        Ok((key, write))
    }

    /// Store a new token for `email` with the configured lifetime.
    pub fn issue(&self, kind: TokenKind, email: &str) -> RepoResult<String> {
        self.issue_expiring(kind, email, self.expiry(kind)?)
    }

    /// Store a new token for `email` that expires at `expires`.
    pub fn issue_expiring(
        &self,
        kind: TokenKind,
        email: &str,
        expires: DateTime<Utc>,
    ) -> RepoResult<String> {
        let (key, write) = self.prepare_expiring(kind, email, expires)?;
        self.store.put(&[write])?;
        debug!(namespace = kind.namespace(), %expires, "token issued");
        Ok(key)
    }

    /// Look a token up without consuming it. Expired tokens are not found.
    pub fn peek(&self, kind: TokenKind, key: &str) -> RepoResult<Token> {
        let raw = self.store.fetch(&Self::query(kind, key))?;
        let token: Token = serde_json::from_slice(&raw)?;
        if token.is_expired() {
            warn!(
                namespace = kind.namespace(),
                email = %token.email,
                expired = %token.expires,
                "expired token presented"
            );
            return Err(RepoError::NotFound(format!("{}#{key}", kind.namespace())));
        }
        Ok(token)
    }

    /// Look a token up and delete it. Only one of several concurrent
    /// redemptions succeeds; the others see the token as not found.
    pub fn consume(&self, kind: TokenKind, key: &str) -> RepoResult<Token> {
        let token = self.peek(kind, key)?;
        self.store.batch(&[Mutation::Take(&Self::query(kind, key))])?;
        Ok(token)
    }
}
