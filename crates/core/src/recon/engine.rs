//! The reconciliation decision state machine.
//!
//! One run per extracted contact: a name search pass, then a phone search
//! pass, then execution of the chosen action with a bounded fallback loop
//! over the remaining ranked candidates. The public entry point never
//! returns an error; every failure mode ends up inside the decision record.

use chrono::Utc;
use tracing::{info, warn};

use crate::config::CreatePolicy;
use crate::domain::candidate::{Candidate, RankedCandidate};
use crate::domain::contact::ExtractedContact;
use crate::domain::decision::{
    ExecutionStatus, FieldMap, InputId, ReconcileAction, ReconciliationDecision,
};
use crate::phone::{NormalizedPhone, PhoneNormalizer};
use crate::ranking::CandidateRanker;
use crate::recon::backend::{CandidateSource, NotePayload, RecordWriter, WriteError};
use crate::sanitize::FieldSanitizer;

#[derive(Clone, Debug)]
pub struct EngineOptions {
    pub create_policy: CreatePolicy,
    pub placeholder_surname: String,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self { create_policy: CreatePolicy::Always, placeholder_surname: "Unknown".to_string() }
    }
}

/// One reconciliation request. The payload is the CRM field map derived from
/// the contact; it is sanitized inside the engine immediately before each
/// write, never earlier.
#[derive(Clone, Debug)]
pub struct ReconciliationInput {
    pub input_id: InputId,
    pub contact: ExtractedContact,
    pub source_phone: Option<String>,
    pub payload: FieldMap,
    pub note: Option<NotePayload>,
    pub simulate: bool,
}

struct Selection {
    action: ReconcileAction,
    target: Option<Candidate>,
    ranked: Vec<RankedCandidate>,
}

pub struct ReconciliationEngine<S, W> {
    source: S,
    writer: W,
    normalizer: PhoneNormalizer,
    ranker: CandidateRanker,
    sanitizer: FieldSanitizer,
    options: EngineOptions,
}

impl<S, W> ReconciliationEngine<S, W>
where
    S: CandidateSource,
    W: RecordWriter,
{
    pub fn new(
        source: S,
        writer: W,
        normalizer: PhoneNormalizer,
        ranker: CandidateRanker,
        sanitizer: FieldSanitizer,
        options: EngineOptions,
    ) -> Self {
        Self { source, writer, normalizer, ranker, sanitizer, options }
    }

    /// Runs the full decide-and-execute flow and returns the finalized
    /// decision record. With `simulate` set, the action is computed but no
    /// write is issued and the status is `Skipped`.
    pub async fn run(&self, input: ReconciliationInput) -> ReconciliationDecision {
        let raw_phone =
            input.source_phone.as_deref().or(input.contact.phone.as_deref());
        let normalized = raw_phone.and_then(|raw| self.normalizer.normalize(raw));

        let selection = self.select_target(&input.contact, normalized.as_ref()).await;
        info!(
            event_name = "recon.target_selected",
            input_id = %input.input_id,
            action = selection.action.as_str(),
            target_id = selection.target.as_ref().map(|c| c.id.0.as_str()).unwrap_or("none"),
            candidates = selection.ranked.len(),
            "reconciliation target selected"
        );

        let status = if input.simulate {
            ExecutionStatus::Skipped
        } else {
            self.execute(&selection, &input, normalized.as_ref()).await
        };

        let target_id = match &status {
            ExecutionStatus::Created(id) | ExecutionStatus::Updated(id) => Some(id.clone()),
            ExecutionStatus::Failed(_) | ExecutionStatus::Skipped => {
                selection.target.as_ref().map(|candidate| candidate.id.clone())
            }
        };

        ReconciliationDecision {
            input_id: input.input_id,
            action: selection.action,
            target_id,
            candidates: selection.ranked,
            status,
            source_phone: input.source_phone,
            normalized_phone: normalized,
            decided_at: Utc::now(),
        }
    }

    /// Name pass, then phone pass. A non-empty name result set always wins
    /// over phone lookup: a name match is the stronger signal when several
    /// contacts share a household number.
    async fn select_target(
        &self,
        contact: &ExtractedContact,
        phone: Option<&NormalizedPhone>,
    ) -> Selection {
        if let Some(name) = contact.trimmed_name() {
            let (first, last) = contact.split_name();
            let found =
                self.source.search_by_name(first.as_deref(), last.as_deref()).await;
            if !found.is_empty() {
                let ranked = self.ranker.rank(found, Some(name));
                return pick(
                    ranked,
                    ReconcileAction::AttachByName,
                    ReconcileAction::AttachByNameConverted,
                );
            }
        }

        if let Some(phone) = phone {
            let found = self.source.search_by_phone(phone).await;
            if !found.is_empty() {
                let ranked = self.ranker.rank(found, contact.trimmed_name());
                return pick(
                    ranked,
                    ReconcileAction::AttachByPhone,
                    ReconcileAction::AttachByPhoneConverted,
                );
            }
        }

        Selection { action: ReconcileAction::NoCandidatesFound, target: None, ranked: Vec::new() }
    }

    async fn execute(
        &self,
        selection: &Selection,
        input: &ReconciliationInput,
        phone: Option<&NormalizedPhone>,
    ) -> ExecutionStatus {
        match &selection.target {
            Some(target) => self.execute_update(target, &selection.ranked, input).await,
            None => self.execute_create(input, phone).await,
        }
    }

    async fn execute_update(
        &self,
        target: &Candidate,
        ranked: &[RankedCandidate],
        input: &ReconciliationInput,
    ) -> ExecutionStatus {
        let fields = self.sanitizer.sanitize(&input.payload);

        match self.writer.update_record(&target.id, &fields).await {
            Ok(()) => ExecutionStatus::Updated(target.id.clone()),
            Err(WriteError::Converted(reason)) => {
                warn!(
                    event_name = "recon.update_rejected_converted",
                    input_id = %input.input_id,
                    target_id = %target.id,
                    reason = %reason,
                    "chosen record is converted, trying ranked alternates"
                );
                self.retry_alternates(target, ranked, &fields, input, reason).await
            }
            Err(WriteError::Other(reason)) => {
                warn!(
                    event_name = "recon.update_failed",
                    input_id = %input.input_id,
                    target_id = %target.id,
                    reason = %reason,
                    "update rejected, not retrying"
                );
                ExecutionStatus::Failed(reason)
            }
        }
    }

    /// Bounded fallback over the remaining ranked candidates. Known-converted
    /// records are skipped; each attempt failure is caught and the next
    /// candidate tried.
    async fn retry_alternates(
        &self,
        tried: &Candidate,
        ranked: &[RankedCandidate],
        fields: &FieldMap,
        input: &ReconciliationInput,
        rejection: String,
    ) -> ExecutionStatus {
        let alternates = ranked
            .iter()
            .map(|rc| &rc.candidate)
            .filter(|candidate| candidate.id != tried.id && !candidate.is_converted);

        for alternate in alternates {
            match self.writer.update_record(&alternate.id, fields).await {
                Ok(()) => {
                    info!(
                        event_name = "recon.fallback_updated",
                        input_id = %input.input_id,
                        target_id = %alternate.id,
                        "alternate candidate updated after converted rejection"
                    );
                    return ExecutionStatus::Updated(alternate.id.clone());
                }
                Err(error) => {
                    warn!(
                        event_name = "recon.fallback_attempt_failed",
                        input_id = %input.input_id,
                        target_id = %alternate.id,
                        error = %error,
                        "fallback candidate rejected, trying next"
                    );
                }
            }
        }

        ExecutionStatus::Failed(format!(
            "no updatable candidate remained after converted rejection: {rejection}"
        ))
    }

    async fn execute_create(
        &self,
        input: &ReconciliationInput,
        phone: Option<&NormalizedPhone>,
    ) -> ExecutionStatus {
        if self.options.create_policy == CreatePolicy::RequireIdentity
            && !input.contact.has_identity()
            && phone.is_none()
        {
            info!(
                event_name = "recon.create_skipped",
                input_id = %input.input_id,
                "no name and no phone extracted, create skipped by policy"
            );
            return ExecutionStatus::Skipped;
        }

        let mut fields = self.sanitizer.sanitize(&input.payload);
        ensure_surname(&mut fields, &self.options.placeholder_surname);

        match self.writer.create_record(&fields).await {
            Ok(id) => {
                if let Some(note) = &input.note {
                    // Note attach failure is non-fatal and must not change
                    // the execution status.
                    if let Err(error) = self.writer.attach_note(&id, note).await {
                        warn!(
                            event_name = "recon.note_attach_failed",
                            input_id = %input.input_id,
                            target_id = %id,
                            error = %error,
                            "note could not be attached to the new record"
                        );
                    }
                }
                ExecutionStatus::Created(id)
            }
            Err(error) => ExecutionStatus::Failed(error.to_string()),
        }
    }
}

fn pick(
    ranked: Vec<RankedCandidate>,
    unconverted_action: ReconcileAction,
    converted_action: ReconcileAction,
) -> Selection {
    if let Some(hit) = ranked.iter().find(|rc| !rc.candidate.is_converted) {
        let target = hit.candidate.clone();
        return Selection { action: unconverted_action, target: Some(target), ranked };
    }

    match ranked.first() {
        Some(first) => {
            let target = first.candidate.clone();
            Selection { action: converted_action, target: Some(target), ranked }
        }
        None => {
            Selection { action: ReconcileAction::NoCandidatesFound, target: None, ranked }
        }
    }
}

/// The backend requires a surname on create; fall back to the first name,
/// then to the configured placeholder.
fn ensure_surname(fields: &mut FieldMap, placeholder: &str) {
    let present = fields
        .get("LastName")
        .and_then(serde_json::Value::as_str)
        .is_some_and(|value| !value.trim().is_empty());
    if present {
        return;
    }

    let fallback = fields
        .get("FirstName")
        .and_then(serde_json::Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| placeholder.to_string());
    fields.insert("LastName".to_string(), serde_json::Value::String(fallback));
}
