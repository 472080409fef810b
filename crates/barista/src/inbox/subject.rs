//! Routing tag extraction from message subjects.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

static TAG_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)^\[([^\]]+)\]\s*(.*)$").unwrap());

/// A subject split into its routing tag and the remaining text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaggedSubject {
    /// Tag text as written, e.g. `Support` for `[Support] ...`.
    pub tag: Option<String>,
    pub clean_subject: String,
}

/// Splits a leading `[Tag]` off `subject`.
///
/// The tag must start at the first character. Without one the subject is
/// returned unchanged; with one, the tag and any whitespace after it are
/// dropped from `clean_subject`.
pub fn parse_tag(subject: &str) -> TaggedSubject {
    match TAG_PATTERN.captures(subject) {
        Some(caps) => TaggedSubject {
            tag: caps.get(1).map(|m| m.as_str().to_string()),
            clean_subject: caps.get(2).map_or("", |m| m.as_str()).to_string(),
        },
        None => TaggedSubject {
            tag: None,
            clean_subject: subject.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_and_rest() {
        let parsed = parse_tag("[Support] Broken chair");
        assert_eq!(parsed.tag.as_deref(), Some("Support"));
        assert_eq!(parsed.clean_subject, "Broken chair");
    }

    #[test]
    fn test_untagged_subjects_unchanged() {
        for subject in ["Broken chair", "Re: [Support] Broken chair", " [Support] x", "", "[]"] {
            let parsed = parse_tag(subject);
            assert_eq!(parsed.tag, None, "subject {:?}", subject);
            assert_eq!(parsed.clean_subject, subject);
        }
    }

    #[test]
    fn test_tag_case_preserved() {
        assert_eq!(parse_tag("[sUpPoRt]hi").tag.as_deref(), Some("sUpPoRt"));
        assert_eq!(parse_tag("[sUpPoRt]hi").clean_subject, "hi");
    }

    #[test]
    fn test_tag_only() {
        let parsed = parse_tag("[Orders]   ");
        assert_eq!(parsed.tag.as_deref(), Some("Orders"));
        assert_eq!(parsed.clean_subject, "");
    }

    #[test]
    fn test_only_first_tag_consumed() {
        let parsed = parse_tag("[Orders] [Urgent] late delivery");
        assert_eq!(parsed.tag.as_deref(), Some("Orders"));
        assert_eq!(parsed.clean_subject, "[Urgent] late delivery");
    }
}
