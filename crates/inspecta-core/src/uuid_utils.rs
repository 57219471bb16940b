//! UUIDv7 utilities for time-ordered identifiers.
//!
//! All entity identifiers are UUIDv7 (RFC 9562): the first 48 bits embed
//! a millisecond Unix timestamp, so ids sort by creation time and
//! newest-first pagination can order by the id column alone.

use uuid::Uuid;

/// Generate a new UUIDv7 identifier.
///
/// # Example
///
/// ```
/// use inspecta_core::uuid_utils::new_v7;
///
/// let id = new_v7();
/// // IDs generated later will be lexicographically greater
/// ```
#[inline]
pub fn new_v7() -> Uuid {
    Uuid::now_v7()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_v7_is_time_ordered() {
        let a = new_v7();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let b = new_v7();
        assert!(b > a, "later v7 ids must sort after earlier ones");
    }

    #[test]
    fn test_new_v7_version() {
        assert_eq!(new_v7().get_version_num(), 7);
    }
}
