//! Helpers for sanitizing untrusted email data before it reaches logs,
//! tracing span attributes or the filesystem.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Maximum length of a sanitized filename stem (before suffix/extension).
const MAX_STEM_LENGTH: usize = 100;

/// Masks the local part of an email address for log output.
///
/// - `alice@example.com` → `a***@example.com`
/// - `not-an-address` → `***`
pub fn redact_email(address: &str) -> String {
    match address.split_once('@') {
        Some((local, domain)) if !local.is_empty() => {
            let first = local.chars().next().unwrap_or('*');
            format!("{}***@{}", first, domain)
        }
        _ => "***".to_string(),
    }
}

/// Returns a short deterministic hash of a message id for correlation
/// without putting provider ids (which can be very long) into spans.
pub fn hash_id(id: &str) -> String {
    let mut hasher = DefaultHasher::new();
    id.hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}

/// Splits an attachment name into a safe stem and a lowercase extension.
///
/// Path components, control characters and characters that are awkward in
/// URLs are dropped. Empty results fall back to `attachment`.
///
/// - `../../etc/passwd` → (`passwd`, None)
/// - `Quarterly Report.PDF` → (`Quarterly_Report`, Some(`pdf`))
pub fn split_filename(name: &str) -> (String, Option<String>) {
    let base = name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(name)
        .trim();

    let (stem, ext) = match base.rfind('.') {
        Some(pos) if pos > 0 && pos < base.len() - 1 => (&base[..pos], Some(&base[pos + 1..])),
        _ => (base, None),
    };

    let mut clean: String = stem
        .chars()
        .map(|c| if c.is_whitespace() { '_' } else { c })
        .filter(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.'))
        .take(MAX_STEM_LENGTH)
        .collect();
    clean = clean.trim_matches('.').to_string();
    if clean.is_empty() {
        clean = "attachment".to_string();
    }

    let ext = ext
        .map(|e| {
            e.chars()
                .filter(|c| c.is_ascii_alphanumeric())
                .take(10)
                .collect::<String>()
                .to_lowercase()
        })
        .filter(|e| !e.is_empty());

    (clean, ext)
}
