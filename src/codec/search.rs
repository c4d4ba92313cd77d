/// Whether `needle` occurs as a contiguous run anywhere in `haystack`.
///
/// An empty needle never matches, so a heuristic holding an unresolved literal
/// cannot accidentally accept every packet.
pub fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    if needle.is_empty() || needle.len() > haystack.len() {
        return false;
    }
    haystack.windows(needle.len()).any(|window| window == needle)
}

/// [`contains`] for an optional needle; `None` never matches.
pub fn contains_opt(haystack: &[u8], needle: Option<&[u8]>) -> bool {
    needle.is_some_and(|needle| contains(haystack, needle))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_needle_never_matches() {
        assert!(!contains(b"", b""));
        assert!(!contains(b"anything", b""));
        assert!(!contains_opt(b"anything", None));
    }

    #[test]
    fn test_needle_at_edges() {
        let haystack = b"hello world";
        assert!(contains(haystack, b"hello"));
        assert!(contains(haystack, b"world"));
        assert!(contains(haystack, b"d"));
        assert!(contains(haystack, haystack));
        assert!(contains_opt(haystack, Some(b"lo w")));
    }

    #[test]
    fn test_off_by_one_boundary() {
        let haystack = b"hello world";
        // "world!" would only fit one byte past the end
        assert!(!contains(haystack, b"world!"));
        assert!(!contains(haystack, b"hello world!"));
        assert!(!contains(b"abc", b"abcd"));
    }

    #[test]
    fn test_partial_prefix_then_match() {
        assert!(contains(&[1, 1, 1, 2], &[1, 1, 2]));
        assert!(!contains(&[1, 2, 1, 2], &[2, 2]));
    }
}
