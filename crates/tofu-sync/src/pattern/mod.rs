//! Glob matching of exclude patterns against address paths
//!
//! Patterns use shell-glob syntax over the `/`-joined address. As with
//! `fnmatch`, `*` also matches across `/`, so `hashicorp/*` excludes every
//! module and provider in the `hashicorp` namespace.

use glob::Pattern;
use tracing::warn;

/// Compiled set of exclude patterns
#[derive(Debug, Clone, Default)]
pub struct PatternMatcher {
    patterns: Vec<CompiledPattern>,
}

#[derive(Debug, Clone)]
enum CompiledPattern {
    Glob(Pattern),
    /// Unparseable glob syntax falls back to exact comparison
    Literal(String),
}

impl CompiledPattern {
    fn compile(pattern: &str) -> Self {
        match Pattern::new(pattern) {
            Ok(glob) => CompiledPattern::Glob(glob),
            Err(e) => {
                warn!("Exclude pattern '{}' is not a valid glob ({}); matching it literally", pattern, e);
                CompiledPattern::Literal(pattern.to_string())
            }
        }
    }

    fn matches(&self, path: &str) -> bool {
        match self {
            CompiledPattern::Glob(glob) => glob.matches(path),
            CompiledPattern::Literal(literal) => literal == path,
        }
    }
}

impl PatternMatcher {
    pub fn new<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            patterns: patterns
                .into_iter()
                .map(|p| CompiledPattern::compile(p.as_ref()))
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Whether a single pattern matches an address path
    pub fn matches(pattern: &str, path: &str) -> bool {
        CompiledPattern::compile(pattern).matches(path)
    }

    /// True iff any pattern matches any of the given paths
    pub fn is_excluded<S: AsRef<str>>(&self, paths: &[S]) -> bool {
        paths
            .iter()
            .any(|path| self.patterns.iter().any(|pattern| pattern.matches(path.as_ref())))
    }
}

/// True iff some exclude pattern matches one of the paths
pub fn is_excluded<P, E>(paths: &[P], excludes: &[E]) -> bool
where
    P: AsRef<str>,
    E: AsRef<str>,
{
    PatternMatcher::new(excludes).is_excluded(paths)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_star_crosses_segments() {
        assert!(PatternMatcher::matches("hashicorp/*", "hashicorp/consul/aws"));
        assert!(PatternMatcher::matches("hashicorp/*", "hashicorp/random"));
        assert!(!PatternMatcher::matches("hashicorp/*", "opentofu/random"));
    }

    #[test]
    fn test_question_mark_is_one_character() {
        assert!(PatternMatcher::matches("a/b?/aws", "a/b1/aws"));
        assert!(!PatternMatcher::matches("a/b?/aws", "a/b12/aws"));
    }

    #[test]
    fn test_exact_pattern() {
        assert!(PatternMatcher::matches("hashicorp/consul/aws", "hashicorp/consul/aws"));
        assert!(!PatternMatcher::matches("hashicorp/consul/aws", "hashicorp/consul/gcp"));
    }

    #[test]
    fn test_version_and_platform_grains() {
        let matcher = PatternMatcher::new(["opentofu/random/0.*", "*/windows_*"]);
        assert!(matcher.is_excluded(&["opentofu/random/0.9.1"]));
        assert!(!matcher.is_excluded(&["opentofu/random/3.7.2"]));
        assert!(matcher.is_excluded(&["opentofu/random/3.7.2/windows_amd64"]));
        assert!(!matcher.is_excluded(&["opentofu/random/3.7.2/linux_amd64"]));
    }

    #[test]
    fn test_empty_excludes_never_exclude() {
        let none: [&str; 0] = [];
        assert!(!is_excluded(&["hashicorp/consul/aws"], &none));
        assert!(PatternMatcher::default().is_empty());
    }

    #[test]
    fn test_invalid_glob_matches_literally() {
        assert!(PatternMatcher::matches("a/[b", "a/[b"));
        assert!(!PatternMatcher::matches("a/[b", "a/b"));
    }
}
