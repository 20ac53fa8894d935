use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::candidate::{RankedCandidate, RecordId};
use crate::phone::NormalizedPhone;

/// Write payload handed to the CRM backend: field API name -> JSON value.
pub type FieldMap = serde_json::Map<String, serde_json::Value>;

/// Identifier of the input the run was started for (message id, transcript
/// basename). Decision records are keyed by it and overwritten on re-run.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InputId(pub String);

impl std::fmt::Display for InputId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconcileAction {
    AttachByName,
    AttachByNameConverted,
    AttachByPhone,
    AttachByPhoneConverted,
    NoCandidatesFound,
}

impl ReconcileAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AttachByName => "attach_by_name",
            Self::AttachByNameConverted => "attach_by_name_converted",
            Self::AttachByPhone => "attach_by_phone",
            Self::AttachByPhoneConverted => "attach_by_phone_converted",
            Self::NoCandidatesFound => "no_candidates_found",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ExecutionStatus {
    Created(RecordId),
    Updated(RecordId),
    Failed(String),
    Skipped,
}

impl ExecutionStatus {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Created(_) => "created",
            Self::Updated(_) => "updated",
            Self::Failed(_) => "failed",
            Self::Skipped => "skipped",
        }
    }

    pub fn record_id(&self) -> Option<&RecordId> {
        match self {
            Self::Created(id) | Self::Updated(id) => Some(id),
            Self::Failed(_) | Self::Skipped => None,
        }
    }
}

/// Durable audit record of one reconciliation run. Created once per input;
/// the execution status is the only field finalized after the decision.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReconciliationDecision {
    pub input_id: InputId,
    pub action: ReconcileAction,
    pub target_id: Option<RecordId>,
    pub candidates: Vec<RankedCandidate>,
    pub status: ExecutionStatus,
    pub source_phone: Option<String>,
    pub normalized_phone: Option<NormalizedPhone>,
    pub decided_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::{ExecutionStatus, ReconcileAction, RecordId};

    #[test]
    fn action_labels_are_stable() {
        assert_eq!(ReconcileAction::AttachByName.as_str(), "attach_by_name");
        assert_eq!(ReconcileAction::NoCandidatesFound.as_str(), "no_candidates_found");
    }

    #[test]
    fn status_serializes_with_tagged_payload() {
        let status = ExecutionStatus::Updated(RecordId("00Q1".to_string()));
        let json = serde_json::to_value(&status).expect("serialize");
        assert_eq!(json["kind"], "updated");
        assert_eq!(json["value"], "00Q1");

        let back: ExecutionStatus = serde_json::from_value(json).expect("deserialize");
        assert_eq!(back, status);
    }

    #[test]
    fn only_terminal_write_states_carry_a_record_id() {
        assert!(ExecutionStatus::Created(RecordId("a".into())).record_id().is_some());
        assert!(ExecutionStatus::Failed("boom".into()).record_id().is_none());
        assert!(ExecutionStatus::Skipped.record_id().is_none());
    }
}
