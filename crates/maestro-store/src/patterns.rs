//! Failure-pattern detection over recorded error and output text.
//!
//! Deliberately shallow: substring probes over lowercased text. The
//! point is a stable vocabulary for the swapper and the warm-up context,
//! not a diagnostic parser.

/// `(pattern name, substrings that indicate it)`.
const PATTERN_PROBES: &[(&str, &[&str])] = &[
    (
        "compilation_error",
        &[
            "compilation failed",
            "compile error",
            "error[e",
            "cannot find",
            "undefined reference",
            "unresolved external",
        ],
    ),
    (
        "test_failure",
        &[
            "test failed",
            "tests failed",
            "assertion failed",
            "test result: failed",
        ],
    ),
    (
        "dependency_missing",
        &[
            "package not found",
            "could not resolve",
            "unresolved import",
            "no such module",
            "modulenotfounderror",
            "cannot find crate",
        ],
    ),
    ("timeout", &["timed out", "timeout", "deadline exceeded"]),
    (
        "syntax_error",
        &["syntax error", "unexpected token", "unexpected eof", "parse error"],
    ),
    (
        "type_error",
        &["mismatched types", "type mismatch", "typeerror", "incompatible types"],
    ),
];

/// Patterns present in `text`, in the fixed probe order.
pub fn detect_patterns(text: &str) -> Vec<String> {
    let lowered = text.to_lowercase();
    PATTERN_PROBES
        .iter()
        .filter(|(_, probes)| probes.iter().any(|p| lowered.contains(p)))
        .map(|(name, _)| (*name).to_owned())
        .collect()
}

/// Patterns seen across many failure texts, ordered by frequency
/// (descending), ties broken by probe order.
pub fn common_patterns<'a>(texts: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    let mut counts: Vec<(String, usize)> = Vec::new();
    for text in texts {
        for pattern in detect_patterns(text) {
            match counts.iter_mut().find(|(name, _)| *name == pattern) {
                Some((_, count)) => *count += 1,
                None => counts.push((pattern, 1)),
            }
        }
    }
    counts.sort_by(|a, b| b.1.cmp(&a.1));
    counts.into_iter().map(|(name, _)| name).collect()
}
