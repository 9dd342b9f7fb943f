//! Key-space ordering helpers
//!
//! Region boundaries use byte-string keys where the empty key is a sentinel:
//! an empty start key means the beginning of the key space, an empty end key
//! means the end of the key space.

/// Check whether `key` lies within `[start, end)`.
///
/// An empty `end` is treated as positive infinity. The empty key itself is
/// never "inside" a range's interior but is covered by a range starting at
/// the empty start key.
pub fn in_range(key: &[u8], start: &[u8], end: &[u8]) -> bool {
    key >= start && (end.is_empty() || key < end)
}

/// Check whether `key` lies strictly inside the open interval `(start, end)`.
///
/// Used for split-key validation: a split at either boundary is meaningless.
pub fn strictly_inside(key: &[u8], start: &[u8], end: &[u8]) -> bool {
    !key.is_empty() && key > start && (end.is_empty() || key < end)
}

/// Check whether the ranges `[a_start, a_end)` and `[b_start, b_end)` overlap.
pub fn ranges_overlap(a_start: &[u8], a_end: &[u8], b_start: &[u8], b_end: &[u8]) -> bool {
    let a_before_b = !a_end.is_empty() && a_end <= b_start;
    let b_before_a = !b_end.is_empty() && b_end <= a_start;
    !a_before_b && !b_before_a
}

/// Render a key for log output.
pub fn hex(key: &[u8]) -> String {
    key.iter().map(|b| format!("{:02x}", b)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_range_with_infinite_end() {
        assert!(in_range(b"z", b"a", b""));
        assert!(in_range(b"a", b"a", b"m"));
        assert!(!in_range(b"m", b"a", b"m"));
        assert!(!in_range(b"0", b"a", b"m"));
    }

    #[test]
    fn test_strictly_inside() {
        assert!(strictly_inside(b"f", b"a", b"m"));
        assert!(!strictly_inside(b"a", b"a", b"m"));
        assert!(!strictly_inside(b"m", b"a", b"m"));
        assert!(strictly_inside(b"f", b"a", b""));
        assert!(!strictly_inside(b"", b"", b""));
    }

    #[test]
    fn test_ranges_overlap() {
        assert!(ranges_overlap(b"a", b"m", b"f", b"z"));
        assert!(!ranges_overlap(b"a", b"m", b"m", b"z"));
        assert!(ranges_overlap(b"a", b"", b"x", b"z"));
        assert!(ranges_overlap(b"", b"", b"a", b"b"));
    }
}
