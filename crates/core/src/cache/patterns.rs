//! Glob matching for cache keys.
//!
//! Only `*` is special: it matches any run of characters, including none.

/// Checks if a cache key matches a glob pattern.
///
/// # Examples
///
/// ```
/// use catalog_core::cache::pattern_matches;
///
/// assert!(pattern_matches("products:entity:1", "products:entity:1"));
/// assert!(pattern_matches("products:query:*", "products:query:9f86d081"));
/// assert!(pattern_matches("*:entity:*", "links:entity:4"));
/// assert!(!pattern_matches("products:query:*", "products:entity:1"));
/// ```
pub fn pattern_matches(pattern: &str, key: &str) -> bool {
    let mut parts = pattern.split('*');

    // Text before the first wildcard is a required prefix.
    let head = parts.next().unwrap_or_default();
    let Some(mut rest) = key.strip_prefix(head) else {
        return false;
    };

    let tail: Vec<&str> = parts.collect();
    let Some((last, middle)) = tail.split_last() else {
        // No wildcard at all.
        return rest.is_empty();
    };

    for segment in middle.iter().filter(|s| !s.is_empty()) {
        match rest.find(segment) {
            Some(pos) => rest = &rest[pos + segment.len()..],
            None => return false,
        }
    }

    rest.ends_with(last)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_match() {
        assert!(pattern_matches("products:entity:1", "products:entity:1"));
        assert!(!pattern_matches("products:entity:1", "products:entity:10"));
        assert!(!pattern_matches("products:entity:10", "products:entity:1"));
    }

    #[test]
    fn test_trailing_wildcard() {
        assert!(pattern_matches("products:query:*", "products:query:abc"));
        assert!(pattern_matches("products:query:*", "products:query:"));
        assert!(!pattern_matches("products:query:*", "categories:query:abc"));
        assert!(!pattern_matches("products:query:*", "products:entity:1"));
    }

    #[test]
    fn test_leading_and_middle_wildcards() {
        assert!(pattern_matches("*:entity:7", "badges:entity:7"));
        assert!(!pattern_matches("*:entity:7", "badges:entity:77"));
        assert!(pattern_matches("categories:*:ab", "categories:tree:ab"));
        assert!(pattern_matches("*:query:*", "links:query:ff00"));
        assert!(!pattern_matches("*:query:*", "links:entity:3"));
    }

    #[test]
    fn test_overlapping_segments() {
        assert!(pattern_matches("a*a", "aa"));
        assert!(!pattern_matches("aa*aa", "aaa"));
        assert!(pattern_matches("*ab*ab", "xabyab"));
    }

    #[test]
    fn test_wildcard_only_and_empty() {
        assert!(pattern_matches("*", ""));
        assert!(pattern_matches("*", "anything:at:all"));
        assert!(pattern_matches("**", "x"));
        assert!(pattern_matches("", ""));
        assert!(!pattern_matches("", "x"));
        assert!(!pattern_matches("x:*", ""));
    }
}
