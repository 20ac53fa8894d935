use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordId(pub String);

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandidateKind {
    Contact,
    Lead,
}

/// Read-only snapshot of a CRM record fetched at decision time. Never mutated
/// locally; `is_converted` marks a lead already merged into an account, which
/// the backend refuses to update.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub id: RecordId,
    pub kind: CandidateKind,
    pub display_name: String,
    pub company: Option<String>,
    pub phone: Option<String>,
    pub is_converted: bool,
    #[serde(default)]
    pub raw: serde_json::Value,
}

impl Candidate {
    /// Best available name field for similarity scoring: display name, then
    /// company when the display name is blank.
    pub fn best_name(&self) -> &str {
        let display = self.display_name.trim();
        if !display.is_empty() {
            return display;
        }
        self.company.as_deref().map(str::trim).unwrap_or("")
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RankedCandidate {
    pub candidate: Candidate,
    pub score: f64,
}

#[cfg(test)]
mod tests {
    use super::{Candidate, CandidateKind, RecordId};

    #[test]
    fn best_name_falls_back_to_company() {
        let candidate = Candidate {
            id: RecordId("L1".to_string()),
            kind: CandidateKind::Lead,
            display_name: "  ".to_string(),
            company: Some("Acme Ltda".to_string()),
            phone: None,
            is_converted: false,
            raw: serde_json::Value::Null,
        };
        assert_eq!(candidate.best_name(), "Acme Ltda");
    }

    #[test]
    fn kinds_serialize_as_snake_case() {
        let candidate = Candidate {
            id: RecordId("C1".to_string()),
            kind: CandidateKind::Contact,
            display_name: "Maria Santos".to_string(),
            company: None,
            phone: Some("+5565991234567".to_string()),
            is_converted: false,
            raw: serde_json::Value::Null,
        };
        let json = serde_json::to_value(&candidate).expect("serialize");
        assert_eq!(json["kind"], "contact");
    }
}
