use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// A blog entry. Stored under its [`BlogKey`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlogPost {
    pub title: String,
    pub date: DateTime<Utc>,
    pub body: String,
}

impl BlogPost {
    pub fn new(title: impl Into<String>, date: DateTime<Utc>, body: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            date,
            body: body.into(),
        }
    }

    pub fn key(&self) -> BlogKey {
        BlogKey {
            date: self.date.format("%Y-%m-%d").to_string(),
            title: self.title.clone(),
        }
    }
}

/// Composite blog key `"<YYYY-MM-DD>:<title>"`.
///
/// Keys sort by date first, so the newest post has the greatest key.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlogKey {
    pub date: String,
    pub title: String,
}

impl BlogKey {
    /// Parse a stored key. The date is everything before the first `:`.
    pub fn parse(raw: &str) -> Result<Self, TypeError> {
        match raw.split_once(':') {
            Some((date, title)) if !date.is_empty() => Ok(Self {
                date: date.to_string(),
                title: title.to_string(),
            }),
            _ => Err(TypeError::InvalidBlogKey(raw.to_string())),
        }
    }

    pub fn id(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for BlogKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.date, self.title)
    }
}
