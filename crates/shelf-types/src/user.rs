use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Access level of a user. Levels are ordered: `Read < Wholesaler < Admin`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Permission {
    #[default]
    Read,
    Wholesaler,
    Admin,
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Read => write!(f, "read"),
            Self::Wholesaler => write!(f, "wholesaler"),
            Self::Admin => write!(f, "admin"),
        }
    }
}

impl FromStr for Permission {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "read" => Ok(Self::Read),
            "wholesaler" => Ok(Self::Wholesaler),
            "admin" => Ok(Self::Admin),
            other => Err(TypeError::InvalidPermission(other.to_string())),
        }
    }
}

/// Postal address attached to a wholesale account.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub address: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub address2: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub zip: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub city: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub state: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub country: String,
}

/// Where a wholesale applicant stands in onboarding.
///
/// The two flags move independently: the applicant verifies their email,
/// an admin confirms the business. Purchasing at wholesale requires both.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WholesaleStatus {
    /// Neither flag set.
    Applied,
    /// Email verified, awaiting admin confirmation.
    EmailVerified,
    /// Confirmed by an admin, email not yet verified.
    AdminConfirmed,
    /// Both flags set.
    Active,
}

/// A storefront account, keyed by email.
///
/// `password` and `password_confirm` are transient form input and never
/// serialized; only `hashed_password` is persisted.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub email: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub store_name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub website: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub first_name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub last_name: String,
    #[serde(default)]
    pub address: Address,
    #[serde(default)]
    pub shipping_address: Address,
    #[serde(default)]
    pub permission: Permission,
    #[serde(skip)]
    pub password: String,
    #[serde(skip)]
    pub password_confirm: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub hashed_password: String,
    /// The user followed the verification link sent to their email.
    #[serde(default)]
    pub verified: bool,
    /// An admin approved the user as a real wholesaler.
    #[serde(default)]
    pub confirmed: bool,
}

impl User {
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            ..Default::default()
        }
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        let password = password.into();
        self.password_confirm = password.clone();
        self.password = password;
        self
    }

    pub fn with_permission(mut self, permission: Permission) -> Self {
        self.permission = permission;
        self
    }

    /// Whether the password has never been hashed (a brand-new account).
    pub fn is_new(&self) -> bool {
        self.hashed_password.is_empty()
    }

    pub fn has_permission(&self, required: Permission) -> bool {
        self.permission >= required
    }

    pub fn wholesale_status(&self) -> WholesaleStatus {
        match (self.verified, self.confirmed) {
            (false, false) => WholesaleStatus::Applied,
            (true, false) => WholesaleStatus::EmailVerified,
            (false, true) => WholesaleStatus::AdminConfirmed,
            (true, true) => WholesaleStatus::Active,
        }
    }

    /// Full wholesale purchasing privilege.
    pub fn can_buy_wholesale(&self) -> bool {
        self.has_permission(Permission::Wholesaler)
            && self.wholesale_status() == WholesaleStatus::Active
    }

    /// A copy safe to hand out in listings (no password material).
    pub fn redacted(&self) -> Self {
        Self {
            password: String::new(),
            password_confirm: String::new(),
            hashed_password: String::new(),
            ..self.clone()
        }
    }
}
