//! Relative path and URL helpers.
//!
//! Request paths arriving at the protocol server are checked here before they
//! are used as publication keys.

/// Check that a `/`-separated relative path stays inside its base
pub fn is_safe_relative_path(path: &str) -> bool {
    if path.is_empty() || path.starts_with('/') || path.contains('\\') {
        return false;
    }

    let mut depth = 0i32;
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                depth -= 1;
                if depth < 0 {
                    return false;
                }
            }
            _ => depth += 1,
        }
    }

    depth > 0
}

/// Join a relative path onto a base URL, keeping exactly one `/` between them
pub fn join_url(base: &str, relative: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        relative.trim_start_matches('/')
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_safe_relative_path() {
        assert!(is_safe_relative_path("hashicorp/consul/aws/1.0.0/module.tar.gz"));
        assert!(is_safe_relative_path("./a/b"));
        assert!(!is_safe_relative_path("../../etc/passwd"));
        assert!(!is_safe_relative_path("a/../../b"));
        assert!(!is_safe_relative_path("/absolute/path"));
        assert!(!is_safe_relative_path(""));
        assert!(!is_safe_relative_path("a\\b"));
    }

    #[test]
    fn test_join_url() {
        assert_eq!(
            join_url("https://host/v1/modules/", "hashicorp/consul/aws/versions"),
            "https://host/v1/modules/hashicorp/consul/aws/versions"
        );
        assert_eq!(join_url("https://host/v1", "/x"), "https://host/v1/x");
    }
}
