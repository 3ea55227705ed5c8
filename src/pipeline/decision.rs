//! Re-processing decision: which stages must run for an email.
//!
//! Pure function, no I/O. A missing output is treated exactly like an
//! output produced under a stale prompt, so emails whose previous attempt
//! failed are retried on the next pass.

use crate::email::EmailRecord;
use crate::pipeline::fingerprint::{PromptFingerprint, PromptFingerprints};

/// Which stages a pass must run for one email.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Decision {
    pub categorize: bool,
    pub extract: bool,
}

impl Decision {
    /// True when no stage needs to run.
    pub fn is_noop(&self) -> bool {
        !self.categorize && !self.extract
    }
}

/// Decide from the stored state and the current fingerprints.
pub fn decide(
    email: &EmailRecord,
    categorization: &PromptFingerprint,
    action_item: &PromptFingerprint,
) -> Decision {
    Decision {
        categorize: !categorization.matches(email.categorization_prompt_hash.as_deref())
            || !email.has_category(),
        extract: !action_item.matches(email.action_prompt_hash.as_deref()) || !email.has_actions(),
    }
}

/// Convenience wrapper over [`decide`] taking both fingerprints at once.
pub fn decide_with(email: &EmailRecord, fingerprints: &PromptFingerprints) -> Decision {
    decide(email, &fingerprints.categorization, &fingerprints.action_item)
}
