//! Prompt fingerprints for change detection.

use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::email::PromptConfig;

/// Hex SHA-256 digest of a prompt's exact text.
///
/// Used only for equality checks. No normalization is applied, so a
/// whitespace-only edit is a real change.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PromptFingerprint(String);

impl PromptFingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Wrap an already-computed digest (e.g. one read back from storage).
    pub fn from_digest(digest: impl Into<String>) -> Self {
        Self(digest.into())
    }

    /// Does a stored hash field match this fingerprint? Absent never matches.
    pub fn matches(&self, stored: Option<&str>) -> bool {
        stored == Some(self.0.as_str())
    }
}

impl fmt::Display for PromptFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Fingerprint a prompt string.
pub fn fingerprint(prompt: &str) -> PromptFingerprint {
    let mut hasher = Sha256::new();
    hasher.update(prompt.as_bytes());
    PromptFingerprint(format!("{:x}", hasher.finalize()))
}

/// Fingerprints of the two prompts that drive re-processing, computed once per pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptFingerprints {
    pub categorization: PromptFingerprint,
    pub action_item: PromptFingerprint,
}

impl PromptFingerprints {
    pub fn of(prompts: &PromptConfig) -> Self {
        Self {
            categorization: fingerprint(&prompts.categorization),
            action_item: fingerprint(&prompts.action_item),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_text_same_fingerprint() {
        let p = "Categorize into Work, Personal, Billing.";
        assert_eq!(fingerprint(p), fingerprint(p));
    }

    #[test]
    fn distinct_texts_differ() {
        let samples = [
            "Categorize",
            "categorize",
            "Categorize ",
            "Categorize.",
            "Extract task and deadline",
            "Extract task, deadline",
            "a",
            "b",
        ];
        for (i, a) in samples.iter().enumerate() {
            for b in &samples[i + 1..] {
                assert_ne!(fingerprint(a), fingerprint(b), "{a:?} vs {b:?}");
            }
        }
    }

    #[test]
    fn whitespace_edit_is_a_change() {
        assert_ne!(fingerprint("Classify email"), fingerprint("Classify  email"));
    }

    #[test]
    fn empty_string_has_fingerprint() {
        let fp = fingerprint("");
        assert_eq!(fp.as_str().len(), 64);
        assert_eq!(
            fp.as_str(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn matches_treats_absent_as_stale() {
        let fp = fingerprint("x");
        assert!(!fp.matches(None));
        assert!(!fp.matches(Some("other")));
        assert!(fp.matches(Some(fp.as_str())));
    }

    #[test]
    fn fingerprints_of_config() {
        let prompts = PromptConfig {
            categorization: "cat".into(),
            action_item: "act".into(),
            auto_reply: "reply".into(),
        };
        let fps = PromptFingerprints::of(&prompts);
        assert_eq!(fps.categorization, fingerprint("cat"));
        assert_eq!(fps.action_item, fingerprint("act"));
    }
}
