//! Detection of template sentinel values.

/// Tokens that mark a value as "not yet supplied by the user".
///
/// Matching is case-sensitive and substring-based, so
/// `YOUR_PUSHOVER_TOKEN` and `https://example.com/hook` both qualify.
pub const PLACEHOLDER_TOKENS: &[&str] = &[
    "YOUR_",
    "CHANGE_ME",
    "REPLACE_ME",
    "example.com",
    "<placeholder>",
];

/// Whether `value` is a template default the user has not replaced.
#[must_use]
pub fn is_placeholder(value: &str) -> bool {
    PLACEHOLDER_TOKENS.iter().any(|token| value.contains(token))
}
