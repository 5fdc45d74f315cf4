//! Byte layout of namespace and entry keys.
//!
//! Both the `buckets` and `entries` tables are keyed by
//! `parent_id (8 bytes, big-endian) ++ name`. Big-endian ids keep all
//! children of one namespace contiguous, and redb's byte ordering then
//! yields them in ascending name order.

use crate::error::{StoreError, StoreResult};

/// Id of the implicit root namespace holding the top-level namespaces.
pub(crate) const ROOT: u64 = 0;

const ID_LEN: usize = 8;

pub(crate) fn child_key(parent: u64, name: &[u8]) -> Vec<u8> {
    let mut key = Vec::with_capacity(ID_LEN + name.len());
    key.extend_from_slice(&parent.to_be_bytes());
    key.extend_from_slice(name);
    key
}

/// Lower bound of the key range holding every child of `parent`.
pub(crate) fn children_start(parent: u64) -> [u8; ID_LEN] {
    parent.to_be_bytes()
}

/// Whether `raw` belongs to `parent`, returning the child name if so.
pub(crate) fn child_name(parent: u64, raw: &[u8]) -> Option<&[u8]> {
    let (id, name) = split(raw).ok()?;
    (id == parent).then_some(name)
}

pub(crate) fn split(raw: &[u8]) -> StoreResult<(u64, &[u8])> {
    if raw.len() < ID_LEN {
        return Err(StoreError::Serialization(format!(
            "key too short: {} bytes",
            raw.len()
        )));
    }
    let (id, name) = raw.split_at(ID_LEN);
    let mut buf = [0u8; ID_LEN];
    buf.copy_from_slice(id);
    Ok((u64::from_be_bytes(buf), name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn child_key_layout() {
        let k = child_key(1, b"Cards");
        assert_eq!(&k[..8], &[0, 0, 0, 0, 0, 0, 0, 1]);
        assert_eq!(&k[8..], b"Cards");
        assert_eq!(split(&k).unwrap(), (1, &b"Cards"[..]));
    }

    #[test]
    fn children_of_one_parent_are_contiguous() {
        let a = child_key(1, b"zzz");
        let b = child_key(2, b"");
        assert!(a < b);
        assert!(children_start(2).as_slice() <= b.as_slice());
    }

    #[test]
    fn child_name_filters_other_parents() {
        let k = child_key(7, b"thumb");
        assert_eq!(child_name(7, &k), Some(&b"thumb"[..]));
        assert_eq!(child_name(8, &k), None);
    }

    #[test]
    fn empty_name_is_allowed() {
        let k = child_key(3, b"");
        assert_eq!(split(&k).unwrap(), (3, &b""[..]));
    }

    #[test]
    fn short_key_rejected() {
        assert!(matches!(split(b"abc"), Err(StoreError::Serialization(_))));
    }
}
