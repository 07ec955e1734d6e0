//! Hostname normalization
//!
//! Turns free-form client names ("Living Room TV") into DNS labels
//! ("living-room-tv").

use crate::error::{Error, Result};

/// Longest DNS label, in octets (RFC 1035)
pub const MAX_LABEL_LEN: usize = 63;

/// Normalize a raw client name into a DNS-safe label
///
/// Lowercases the input, replaces every character outside `[a-z0-9-]`
/// (whitespace included) with `-`, collapses runs of `-`, cuts the result to
/// [`MAX_LABEL_LEN`] characters and trims leading and trailing `-`.
///
/// # Errors
///
/// [`Error::InvalidHostname`] if the input is missing, blank, or contains no
/// character that survives normalization.
///
/// # Example
///
/// ```
/// use mpsync_core::hostname::normalize_hostname;
///
/// assert_eq!(normalize_hostname(Some("Living Room TV")).unwrap(), "living-room-tv");
/// assert!(normalize_hostname(None).is_err());
/// ```
pub fn normalize_hostname(raw: Option<&str>) -> Result<String> {
    let raw = raw
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| Error::invalid_hostname("name is empty"))?;

    let mut label = String::with_capacity(raw.len());
    for c in raw.chars().flat_map(char::to_lowercase) {
        let c = if c.is_ascii_lowercase() || c.is_ascii_digit() {
            c
        } else {
            '-'
        };
        if c == '-' && label.ends_with('-') {
            continue;
        }
        label.push(c);
    }

    let label = label.trim_start_matches('-');
    let label = label
        .get(..MAX_LABEL_LEN)
        .unwrap_or(label)
        .trim_end_matches('-');
    if label.is_empty() {
        return Err(Error::invalid_hostname(format!(
            "'{}' contains no DNS-safe characters",
            raw
        )));
    }

    Ok(label.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spaces_become_hyphens() {
        assert_eq!(
            normalize_hostname(Some("Living Room TV")).unwrap(),
            "living-room-tv"
        );
    }

    #[test]
    fn punctuation_is_replaced_and_collapsed() {
        assert_eq!(
            normalize_hostname(Some("Bob's  iPhone (2)")).unwrap(),
            "bob-s-iphone-2"
        );
        assert_eq!(normalize_hostname(Some("a:b:c")).unwrap(), "a-b-c");
        assert_eq!(normalize_hostname(Some("nas--01")).unwrap(), "nas-01");
    }

    #[test]
    fn leading_and_trailing_separators_are_trimmed() {
        assert_eq!(normalize_hostname(Some("  -printer- ")).unwrap(), "printer");
        assert_eq!(normalize_hostname(Some("_db_")).unwrap(), "db");
    }

    #[test]
    fn non_ascii_letters_are_replaced() {
        assert_eq!(normalize_hostname(Some("Café Büro")).unwrap(), "caf-b-ro");
    }

    #[test]
    fn already_canonical_names_are_unchanged() {
        assert_eq!(normalize_hostname(Some("nas-01")).unwrap(), "nas-01");
    }

    #[test]
    fn empty_inputs_are_rejected() {
        assert!(matches!(
            normalize_hostname(None),
            Err(Error::InvalidHostname(_))
        ));
        assert!(normalize_hostname(Some("")).is_err());
        assert!(normalize_hostname(Some("   ")).is_err());
        assert!(normalize_hostname(Some("!!!")).is_err());
    }

    #[test]
    fn long_names_are_cut_to_one_label() {
        let raw = "a".repeat(70);
        let label = normalize_hostname(Some(&raw)).unwrap();
        assert_eq!(label.len(), MAX_LABEL_LEN);

        // a cut landing on a separator must not leave a trailing hyphen
        let raw = format!("{} tail", "b".repeat(62));
        let label = normalize_hostname(Some(&raw)).unwrap();
        assert_eq!(label, "b".repeat(62));
        assert_eq!(normalize_hostname(Some(&label)).unwrap(), label);
    }

    #[test]
    fn normalization_is_idempotent() {
        let once = normalize_hostname(Some("Kitchen Speaker #3")).unwrap();
        let twice = normalize_hostname(Some(&once)).unwrap();
        assert_eq!(once, twice);
    }
}
