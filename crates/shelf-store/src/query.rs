//! Addressing for store operations.
//!
//! A [`Query`] names a location in the namespace tree: an ordered path of
//! namespace segments, an optional key inside the last namespace, and an
//! optional value to write there. Queries are plain values assembled with
//! builder methods and validated only when the store executes them.
//!
//! ```
//! use shelf_store::Query;
//!
//! let q = Query::at(["products", "Cards", "Birthday"])
//!     .key("clown")
//!     .value(br#"{"description":"sad"}"#.to_vec());
//! assert_eq!(q.segments().len(), 3);
//! assert_eq!(q.key_bytes(), Some(&b"clown"[..]));
//! ```

use std::fmt;

/// Location (and optional payload) of a single store operation.
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct Query {
    path: Vec<Vec<u8>>,
    key: Option<Vec<u8>>,
    value: Option<Vec<u8>>,
}

impl Query {
    /// An empty query. Useful only as a starting point for [`Query::path`].
    pub fn new() -> Self {
        Self::default()
    }

    /// A query addressing the namespace at `path`.
    pub fn at<I, S>(path: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<[u8]>,
    {
        Self::new().path(path)
    }

    /// Append namespace segments to the path.
    pub fn path<I, S>(mut self, segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<[u8]>,
    {
        self.path
            .extend(segments.into_iter().map(|s| s.as_ref().to_vec()));
        self
    }

    /// Set the key inside the addressed namespace.
    pub fn key(mut self, key: impl AsRef<[u8]>) -> Self {
        self.key = Some(key.as_ref().to_vec());
        self
    }

    /// Set the value to write at the key.
    pub fn value(mut self, value: impl Into<Vec<u8>>) -> Self {
        self.value = Some(value.into());
        self
    }

    pub fn segments(&self) -> &[Vec<u8>] {
        &self.path
    }

    pub fn key_bytes(&self) -> Option<&[u8]> {
        self.key.as_deref()
    }

    pub fn value_bytes(&self) -> Option<&[u8]> {
        self.value.as_deref()
    }

    /// The query that addresses the key as a namespace of its own: the
    /// path extended by the key, with no key or value.
    ///
    /// `Query::at(["products"]).key("Cards").as_namespace()` is the same
    /// location as `Query::at(["products", "Cards"])`.
    pub fn as_namespace(&self) -> Self {
        let mut path = self.path.clone();
        if let Some(key) = &self.key {
            path.push(key.clone());
        }
        Self {
            path,
            key: None,
            value: None,
        }
    }

    /// Same location, with the value replaced.
    pub fn with_value(&self, value: impl Into<Vec<u8>>) -> Self {
        Self {
            path: self.path.clone(),
            key: self.key.clone(),
            value: Some(value.into()),
        }
    }
}

fn lossy(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

impl fmt::Display for Query {
    /// Renders as `seg/seg/seg#key`, lossily decoding non-UTF-8 bytes.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let path: Vec<String> = self.path.iter().map(|s| lossy(s)).collect();
        write!(f, "{}", path.join("/"))?;
        if let Some(key) = &self.key {
            write!(f, "#{}", lossy(key))?;
        }
        Ok(())
    }
}

impl fmt::Debug for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Query")
            .field("location", &self.to_string())
            .field("value_len", &self.value.as_ref().map(Vec::len))
            .finish()
    }
}
