//! CRM field maps derived from an extraction.
//!
//! Built once per run, before sanitization: the engine logs the full payload
//! and strips server-managed fields only at write time.

use serde_json::Value;

use leadflow_core::domain::contact::ExtractedContact;
use leadflow_core::domain::decision::{FieldMap, InputId};
use leadflow_core::phone::NormalizedPhone;
use leadflow_core::recon::backend::NotePayload;

const LEAD_SOURCE: &str = "Conversation Capture";
const DESCRIPTION_LIMIT: usize = 2000;

pub fn lead_fields(contact: &ExtractedContact, phone: Option<&NormalizedPhone>) -> FieldMap {
    let mut fields = FieldMap::new();

    let (first, last) = contact.split_name();
    if let Some(first) = first {
        fields.insert("FirstName".to_string(), Value::String(first));
    }
    if let Some(last) = last {
        fields.insert("LastName".to_string(), Value::String(last));
    }
    if let Some(company) = contact.company.as_deref().map(str::trim).filter(|c| !c.is_empty()) {
        fields.insert("Company".to_string(), Value::String(company.to_string()));
    }

    let phone_value = phone
        .map(|phone| phone.as_str().to_string())
        .or_else(|| contact.phone.clone());
    if let Some(phone_value) = phone_value {
        fields.insert("Phone".to_string(), Value::String(phone_value));
    }

    let description: String = contact.free_text.chars().take(DESCRIPTION_LIMIT).collect();
    if !description.trim().is_empty() {
        fields.insert("Description".to_string(), Value::String(description));
    }
    fields.insert("LeadSource".to_string(), Value::String(LEAD_SOURCE.to_string()));

    fields
}

pub fn transcript_note(contact: &ExtractedContact, input_id: &InputId) -> NotePayload {
    NotePayload {
        title: format!("Conversation transcript {input_id}"),
        body: contact.free_text.clone(),
    }
}

#[cfg(test)]
mod tests {
    use leadflow_core::domain::contact::ExtractedContact;
    use leadflow_core::domain::decision::InputId;
    use leadflow_core::phone::{PhoneNormalizer, Region};

    use super::{lead_fields, transcript_note};

    fn contact() -> ExtractedContact {
        ExtractedContact {
            name: Some("Maria de Souza Santos".to_string()),
            company: Some("Acme Ltda".to_string()),
            phone: Some("(65) 99123-4567".to_string()),
            free_text: "wants a quote for the pro plan".to_string(),
        }
    }

    #[test]
    fn fields_carry_split_name_and_normalized_phone() {
        let phone = PhoneNormalizer::new(Region::Br).normalize("65991234567").expect("valid");
        let fields = lead_fields(&contact(), Some(&phone));

        assert_eq!(fields.get("FirstName"), Some(&serde_json::json!("Maria")));
        assert_eq!(fields.get("LastName"), Some(&serde_json::json!("de Souza Santos")));
        assert_eq!(fields.get("Company"), Some(&serde_json::json!("Acme Ltda")));
        assert_eq!(fields.get("Phone"), Some(&serde_json::json!("+5565991234567")));
        assert_eq!(fields.get("LeadSource"), Some(&serde_json::json!("Conversation Capture")));
        assert!(fields.get("Description").is_some());
    }

    #[test]
    fn raw_phone_is_kept_when_normalization_failed() {
        let fields = lead_fields(&contact(), None);
        assert_eq!(fields.get("Phone"), Some(&serde_json::json!("(65) 99123-4567")));
    }

    #[test]
    fn anonymous_contact_produces_a_minimal_payload() {
        let anonymous = ExtractedContact {
            free_text: "short call, no details".to_string(),
            ..ExtractedContact::default()
        };
        let fields = lead_fields(&anonymous, None);

        assert!(!fields.contains_key("FirstName"));
        assert!(!fields.contains_key("LastName"));
        assert!(!fields.contains_key("Phone"));
        assert!(fields.contains_key("Description"));
    }

    #[test]
    fn note_links_the_input_and_carries_the_transcript() {
        let note = transcript_note(&contact(), &InputId("msg-42".to_string()));
        assert!(note.title.contains("msg-42"));
        assert_eq!(note.body, "wants a quote for the pro plan");
    }
}
