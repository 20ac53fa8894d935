//! Removal of server-managed CRM fields before any write.
//!
//! The CRM populates a fixed set of fields through its own automation and
//! rejects client writes that touch them. The set is configuration-defined;
//! sanitization happens immediately before each create/update call so the
//! original payload stays available for inspection and logging.

use std::collections::BTreeSet;

use crate::domain::decision::FieldMap;

#[derive(Clone, Debug, Default)]
pub struct FieldSanitizer {
    blocked: BTreeSet<String>,
}

impl FieldSanitizer {
    pub fn new<I, S>(blocked: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { blocked: blocked.into_iter().map(Into::into).collect() }
    }

    /// Returns a copy of the payload without the blocked fields. Idempotent:
    /// sanitizing an already-sanitized payload is a no-op.
    pub fn sanitize(&self, payload: &FieldMap) -> FieldMap {
        payload
            .iter()
            .filter(|(field, _)| !self.blocked.contains(field.as_str()))
            .map(|(field, value)| (field.clone(), value.clone()))
            .collect()
    }
}
