//! Accounts, passwords and wholesale onboarding.

use std::sync::Arc;

use shelf_store::{Mutation, Query, StoreError, Storer};
use shelf_types::{Permission, User};
use tracing::{info, warn};

use crate::error::{RepoError, RepoResult};
use crate::external::PasswordHasher;
use crate::tokens::{TokenKind, Tokens};

pub(crate) const USERS: &str = "users";

fn user_query(email: &str) -> Query {
    Query::at([USERS]).key(email)
}

pub struct Users {
    store: Arc<dyn Storer>,
    hasher: Arc<dyn PasswordHasher>,
    tokens: Tokens,
    min_password_len: usize,
}

impl Users {
    pub fn new(
        store: Arc<dyn Storer>,
        hasher: Arc<dyn PasswordHasher>,
        tokens: Tokens,
        min_password_len: usize,
    ) -> Self {
        Self {
            store,
            hasher,
            tokens,
            min_password_len,
        }
    }

    /// Every account, in email order, without password material.
    pub fn users(&self) -> RepoResult<Vec<User>> {
        let mut users = Vec::new();
        self.store.get_all(&Query::at([USERS]), &mut |_, value| {
            let user: User = serde_json::from_slice(value)
                .map_err(|e| StoreError::Serialization(e.to_string()))?;
            users.push(user.redacted());
            Ok(())
        })?;
        Ok(users)
    }

    pub fn fetch(&self, email: &str) -> RepoResult<User> {
        let raw = self.store.fetch(&user_query(email))?;
        Ok(serde_json::from_slice(&raw)?)
    }

    fn validate_password(&self, password: &str, confirm: &str) -> RepoResult<()> {
        if password.chars().count() < self.min_password_len {
            return Err(RepoError::Validation(format!(
                "password is too short (must be at least {} characters long)",
                self.min_password_len
            )));
        }
        if password != confirm {
            return Err(RepoError::Validation("passwords do not match".into()));
        }
        Ok(())
    }

    /// Hash the plaintext password of a new account and clear it.
    fn seal(&self, user: &mut User) -> RepoResult<()> {
        if user.is_new() {
            self.validate_password(&user.password, &user.password_confirm)?;
            user.hashed_password = self.hasher.hash(&user.password)?;
        }
        user.password.clear();
        user.password_confirm.clear();
        Ok(())
    }

    fn record(user: &User) -> RepoResult<Query> {
        Ok(user_query(&user.email).value(serde_json::to_vec(user)?))
    }

    /// Store a user. The password is hashed on the first save only; later
    /// saves keep the stored hash (see [`Users::update_password`]).
    pub fn save(&self, user: &User) -> RepoResult<User> {
        if user.email.trim().is_empty() {
            return Err(RepoError::Validation("email must not be empty".into()));
        }
        let mut user = user.clone();
        if user.is_new() {
            match self.fetch(&user.email) {
                Ok(stored) => user.hashed_password = stored.hashed_password,
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(e),
            }
        }
        self.seal(&mut user)?;
        self.store.put(&[Self::record(&user)?])?;
        Ok(user)
    }

    /// Create a new account. Fails if the email is taken, including by an
    /// account created after the initial check.
    pub fn register(&self, user: &User) -> RepoResult<User> {
        if user.email.trim().is_empty() {
            return Err(RepoError::Validation("email must not be empty".into()));
        }
        if self.store.exists(&user_query(&user.email))? {
            return Err(RepoError::AlreadyExists(user.email.clone()));
        }
        let mut user = user.clone();
        user.confirmed = false;
        user.verified = false;
        user.hashed_password.clear();
        self.seal(&mut user)?;
        self.store.batch(&[Mutation::Insert(&Self::record(&user)?)])?;
        info!(email = %user.email, permission = %user.permission, "user registered");
        Ok(user)
    }

    pub fn update_password(&self, email: &str, password: &str, confirm: &str) -> RepoResult<User> {
        self.validate_password(password, confirm)?;
        let mut user = self.fetch(email)?;
        user.hashed_password = self.hasher.hash(password)?;
        self.store.put(&[Self::record(&user)?])?;
        info!(email, "password updated");
        Ok(user)
    }

    /// Whether `password` matches the stored hash. Accounts without a hash
    /// never match.
    pub fn check_password(&self, email: &str, password: &str) -> RepoResult<bool> {
        let user = self.fetch(email)?;
        if user.hashed_password.is_empty() {
            return Ok(false);
        }
        self.hasher.verify(password, &user.hashed_password)
    }

    pub fn delete(&self, email: &str) -> RepoResult<()> {
        if !self.store.exists(&user_query(email))? {
            return Err(RepoError::NotFound(format!("{USERS}#{email}")));
        }
        self.store.delete(&[user_query(email)])?;
        info!(email, "user deleted");
        Ok(())
    }

    /// Record a wholesale application: the account (as an unverified,
    /// unconfirmed wholesaler) and its email verification token are stored
    /// together. Returns the saved user and the token to mail out.
    pub fn apply_wholesale(&self, applicant: &User) -> RepoResult<(User, String)> {
        if applicant.email.trim().is_empty() {
            return Err(RepoError::Validation("email must not be empty".into()));
        }
        if self.store.exists(&user_query(&applicant.email))? {
            return Err(RepoError::AlreadyExists(applicant.email.clone()));
        }
        let mut user = applicant.clone().with_permission(Permission::Wholesaler);
        user.verified = false;
        user.confirmed = false;
        self.seal(&mut user)?;

        let (token, token_write) = self.tokens.prepare(TokenKind::Verification, &user.email)?;
        let user_write = Self::record(&user)?;
        self.store.batch(&[
            Mutation::Insert(&user_write),
            Mutation::Insert(&token_write),
        ])?;
        info!(email = %user.email, "wholesale application stored");
        Ok((user, token))
    }

    /// Redeem an email verification token. The token is consumed and the
    /// user marked verified in one batch; an expired, unknown or already
    /// redeemed token is not found and changes nothing.
    pub fn verify_wholesaler(&self, token: &str) -> RepoResult<User> {
        let issued = self.tokens.peek(TokenKind::Verification, token)?;
        let mut user = self.fetch(&issued.email)?;
        user.verified = true;

        let consumed = Tokens::query(TokenKind::Verification, token);
        let user_write = Self::record(&user)?;
        self.store
            .batch(&[Mutation::Take(&consumed), Mutation::Put(&user_write)])?;
        info!(
            email = %user.email,
            status = ?user.wholesale_status(),
            "wholesaler email verified"
        );
        Ok(user)
    }

    /// Admin confirmation of a wholesale account.
    pub fn confirm_wholesaler(&self, email: &str) -> RepoResult<User> {
        let mut user = self.fetch(email)?;
        user.confirmed = true;
        self.store.put(&[Self::record(&user)?])?;
        info!(email, status = ?user.wholesale_status(), "wholesaler confirmed");
        Ok(user)
    }

    /// Issue a password reset token. Unknown emails get `None` so callers
    /// can answer identically either way.
    pub fn issue_reset_token(&self, email: &str) -> RepoResult<Option<String>> {
        if !self.store.exists(&user_query(email))? {
            warn!(email, "password reset requested for unknown account");
            return Ok(None);
        }
        let token = self.tokens.issue(TokenKind::PasswordReset, email)?;
        info!(email, "password reset token issued");
        Ok(Some(token))
    }

    pub fn user_from_reset_token(&self, token: &str) -> RepoResult<User> {
        let issued = self.tokens.peek(TokenKind::PasswordReset, token)?;
        Ok(self.fetch(&issued.email)?.redacted())
    }

    /// Set a new password with a reset token, consuming the token.
    pub fn reset_password(&self, token: &str, password: &str, confirm: &str) -> RepoResult<User> {
        self.validate_password(password, confirm)?;
        let issued = self.tokens.peek(TokenKind::PasswordReset, token)?;
        let mut user = self.fetch(&issued.email)?;
        user.hashed_password = self.hasher.hash(password)?;

        let consumed = Tokens::query(TokenKind::PasswordReset, token);
        let user_write = Self::record(&user)?;
        self.store
            .batch(&[Mutation::Take(&consumed), Mutation::Put(&user_write)])?;
        info!(email = %user.email, "password reset");
        Ok(user)
    }
}
