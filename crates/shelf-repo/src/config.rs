use std::path::Path;

use serde::{Deserialize, Serialize};
use shelf_store::StoreConfig;

use crate::error::{RepoError, RepoResult};

/// Widths (in pixels) of the renditions derived from every uploaded image.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ImageSizes {
    pub full: u32,
    pub thumb: u32,
}

impl Default for ImageSizes {
    fn default() -> Self {
        Self {
            full: 660,
            thumb: 260,
        }
    }
}

/// Lifetimes of issued tokens, in hours.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TokenTtl {
    pub verification_hours: i64,
    pub password_reset_hours: i64,
}

impl Default for TokenTtl {
    fn default() -> Self {
        Self {
            verification_hours: 7 * 24,
            password_reset_hours: 24,
        }
    }
}

/// Configuration for a [`Shop`](crate::Shop).
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ShopConfig {
    /// Retail price used when a category has no `_price_` entry.
    pub default_price: String,
    /// Wholesale price used when a category has no `_price_` entry.
    pub wholesale_price: String,
    pub min_password_len: usize,
    pub bcrypt_cost: u32,
    pub store: StoreConfig,
    pub tokens: TokenTtl,
    pub images: ImageSizes,
}

impl Default for ShopConfig {
    fn default() -> Self {
        Self {
            default_price: "0.00".into(),
            wholesale_price: "0.00".into(),
            min_password_len: 8,
            bcrypt_cost: bcrypt::DEFAULT_COST,
            store: StoreConfig::default(),
            tokens: TokenTtl::default(),
            images: ImageSizes::default(),
        }
    }
}

impl ShopConfig {
    pub fn from_toml_str(raw: &str) -> RepoResult<Self> {
        toml::from_str(raw).map_err(|e| RepoError::Config(e.to_string()))
    }

    pub fn load(path: impl AsRef<Path>) -> RepoResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| RepoError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&raw)
    }

    pub fn to_toml_string(&self) -> RepoResult<String> {
        toml::to_string_pretty(self).map_err(|e| RepoError::Config(e.to_string()))
    }
}
