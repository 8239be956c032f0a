//! Request path canonicalization.
//!
//! Route groups are picked from the canonical path and the same path is what
//! goes upstream, so dot segments or doubled slashes cannot move a request
//! into a different group than the one it is counted against.

#[derive(Debug, PartialEq, Eq)]
enum DotSegment {
    Current,
    Parent,
}

// "." and ".." including their percent-encoded spellings
fn dot_segment(segment: &str) -> Option<DotSegment> {
    if segment.len() > 6 || !segment.starts_with(['.', '%']) {
        return None;
    }
    match segment.to_ascii_lowercase().as_str() {
        "." | "%2e" => Some(DotSegment::Current),
        ".." | ".%2e" | "%2e." | "%2e%2e" => Some(DotSegment::Parent),
        _ => None,
    }
}

/// Resolves `.`/`..` segments (plain or `%2e`-encoded), treats `\` as `/`
/// and collapses empty segments. A trailing slash is kept.
pub fn canonical_path(raw: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    let mut trailing_slash = false;

    for segment in raw.split(['/', '\\']) {
        trailing_slash = segment.is_empty();
        match dot_segment(segment) {
            Some(DotSegment::Current) => trailing_slash = true,
            Some(DotSegment::Parent) => {
                segments.pop();
                trailing_slash = true;
            }
            None if segment.is_empty() => {}
            None => segments.push(segment),
        }
    }

    let mut path = String::with_capacity(raw.len());
    for segment in &segments {
        path.push('/');
        path.push_str(segment);
    }
    if path.is_empty() || trailing_slash {
        path.push('/');
    }
    path
}

/// True when `path` is `prefix` itself or lies below it.
pub fn is_under(path: &str, prefix: &str) -> bool {
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_paths_are_unchanged() {
        for path in ["/", "/api", "/api/auth/login", "/api/courses/", "/api/a.b/..c"] {
            assert_eq!(canonical_path(path), path);
        }
    }

    #[test]
    fn resolves_dot_segments() {
        assert_eq!(canonical_path("/api/x/../auth/login"), "/api/auth/login");
        assert_eq!(canonical_path("/api/./auth/./login"), "/api/auth/login");
        assert_eq!(canonical_path("/api/auth/login/.."), "/api/auth/");
        assert_eq!(canonical_path("/api/auth/."), "/api/auth/");
        assert_eq!(canonical_path("/../../api"), "/api");
        assert_eq!(canonical_path("/api/.."), "/");
    }

    #[test]
    fn resolves_encoded_dot_segments() {
        assert_eq!(canonical_path("/api/x/%2e%2e/auth/login"), "/api/auth/login");
        assert_eq!(canonical_path("/api/x/%2E./auth/login"), "/api/auth/login");
        assert_eq!(canonical_path("/api/x/.%2E/auth/login"), "/api/auth/login");
        assert_eq!(canonical_path("/api/%2e/auth"), "/api/auth");
        // other escapes are left alone
        assert_eq!(canonical_path("/api/%2e%2f/auth"), "/api/%2e%2f/auth");
    }

    #[test]
    fn collapses_slashes_and_backslashes() {
        assert_eq!(canonical_path("/api//auth///login"), "/api/auth/login");
        assert_eq!(canonical_path("/api\\x\\..\\auth"), "/api/auth");
        assert_eq!(canonical_path("//api/auth//"), "/api/auth/");
    }

    #[test]
    fn prefix_on_segment_boundary() {
        assert!(is_under("/api", "/api"));
        assert!(is_under("/api/auth", "/api"));
        assert!(!is_under("/apix", "/api"));
        assert!(!is_under("/", "/api"));
    }
}
