//! Version-label extraction from the upstream version probe.
//!
//! The version source answers with a structured message (commit-style); the
//! label is whatever follows the word "patch" on its line. Absence of a
//! match is a warning at the call site, never an error here.

use regex::Regex;
use std::sync::LazyLock;

static LABEL: LazyLock<Regex> = LazyLock::new(|| {
    // Infallible: pattern is a compile-time constant.
    Regex::new(r"[Pp]atch\s+(\S[^\n]*)").unwrap()
});

/// Extract the version label from a probe message, if one is present.
///
/// # Examples
///
/// ```
/// use vellum_fetch::extract_version_label;
///
/// let message = "runtime: update docs\n\nPatch 9.1.0321: typo fixes\n";
/// assert_eq!(extract_version_label(message).as_deref(), Some("9.1.0321: typo fixes"));
/// assert!(extract_version_label("chore: bump deps").is_none());
/// ```
pub fn extract_version_label(message: &str) -> Option<String> {
    LABEL
        .captures(message)
        .and_then(|captures| captures.get(1))
        .map(|label| label.as_str().trim_end().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_label_after_patch_keyword() {
        assert_eq!(extract_version_label("patch 8.2.5000").as_deref(), Some("8.2.5000"));
        assert_eq!(extract_version_label("Patch 9.0.0000").as_deref(), Some("9.0.0000"));
    }

    #[test]
    fn label_stops_at_end_of_line() {
        let message = "Patch 9.1.0001\nfollowup line";
        assert_eq!(extract_version_label(message).as_deref(), Some("9.1.0001"));
    }

    #[test]
    fn trailing_whitespace_is_trimmed() {
        assert_eq!(extract_version_label("Patch 9.1.0002   \nrest").as_deref(), Some("9.1.0002"));
    }

    #[test]
    fn no_match_is_none() {
        assert!(extract_version_label("").is_none());
        assert!(extract_version_label("doc: fix typos").is_none());
    }

    #[test]
    fn first_match_wins() {
        let message = "Patch 9.1.0100\nPatch 9.1.0099";
        assert_eq!(extract_version_label(message).as_deref(), Some("9.1.0100"));
    }
}
