//! Label key validation and label value normalization.
//!
//! Label values are restricted to lowercase letters, digits, `_` and `-`, at
//! most 63 characters. The transform is deterministic but lossy; operation
//! records always keep the canonical billing id instead.

use std::sync::LazyLock;

use regex::Regex;

use crate::core::types::BillingAccountRef;

/// Default label key used to remember the original billing account.
pub const DEFAULT_LABEL_KEY: &str = "original-billing-account-id";

/// Maximum length of a label key or value.
pub const MAX_LABEL_LEN: usize = 63;

static LABEL_KEY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z][a-z0-9_-]{0,62}$").expect("label key pattern compiles")
});

/// Check a configured label key. Returns a list of problems (empty when valid).
pub fn validate_label_key(key: &str) -> Vec<String> {
    let mut errors = Vec::new();
    if key.is_empty() {
        errors.push("label key must not be empty".to_string());
        return errors;
    }
    if key.len() > MAX_LABEL_LEN {
        errors.push(format!(
            "label key {key:?} exceeds {MAX_LABEL_LEN} characters"
        ));
    }
    if !LABEL_KEY_RE.is_match(key) {
        errors.push(format!(
            "label key {key:?} must start with a lowercase letter and contain only [a-z0-9_-]"
        ));
    }
    errors
}

/// Normalize a raw string into a valid label value.
pub fn normalize_label_value(raw: &str) -> String {
    raw.chars()
        .map(|c| {
            let c = c.to_ascii_lowercase();
            if c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .take(MAX_LABEL_LEN)
        .collect()
}

/// Label value written for a project whose original account is `account`.
pub fn label_value_for(account: &BillingAccountRef) -> String {
    normalize_label_value(account.id())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_key_is_valid() {
        assert!(validate_label_key(DEFAULT_LABEL_KEY).is_empty());
    }

    #[test]
    fn rejects_bad_keys() {
        assert!(!validate_label_key("").is_empty());
        assert!(!validate_label_key("Upper").is_empty());
        assert!(!validate_label_key("1starts-with-digit").is_empty());
        assert!(!validate_label_key("has space").is_empty());
        assert!(!validate_label_key(&"k".repeat(64)).is_empty());
    }

    #[test]
    fn normalizes_billing_ids() {
        assert_eq!(normalize_label_value("012345-ABCDEF-6789AB"), "012345-abcdef-6789ab");
        assert_eq!(normalize_label_value("a.b/c d"), "a_b_c_d");
        assert_eq!(normalize_label_value("éx"), "_x");
        assert_eq!(normalize_label_value(&"A".repeat(80)).len(), MAX_LABEL_LEN);
    }

    #[test]
    fn value_uses_id_portion_only() {
        let account = BillingAccountRef::new("billingAccounts/111-AAA");
        assert_eq!(label_value_for(&account), "111-aaa");
    }
}
