use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Top-level namespaces every fresh store starts with.
pub const DEFAULT_NAMESPACES: &[&str] = &[
    "users",
    "products",
    "images",
    "blogs",
    "verifications",
    "tokens",
];

/// Where the database lives and how it is bootstrapped.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct StoreConfig {
    pub data_dir: PathBuf,
    pub file_name: String,
    /// Top-level namespaces created on open when missing.
    pub namespaces: Vec<String>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("/var/lib/shelf"),
            file_name: "shelf.redb".into(),
            namespaces: DEFAULT_NAMESPACES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl StoreConfig {
    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = dir.into();
        self
    }

    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join(&self.file_name)
    }
}
