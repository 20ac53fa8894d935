use async_trait::async_trait;
use serde_json::Value;
use tracing::warn;

use leadflow_core::domain::candidate::{Candidate, RecordId};
use leadflow_core::domain::decision::FieldMap;
use leadflow_core::phone::{NormalizedPhone, PhoneNormalizer};
use leadflow_core::recon::backend::{CandidateSource, NotePayload, RecordWriter, WriteError};

use crate::client::{CrmError, RestCrmClient};

/// Search side of the CRM boundary. Transport failures degrade to empty
/// candidate lists so a reconciliation run always has a defined fallback;
/// the failure is logged here for observability.
#[derive(Clone)]
pub struct CrmCandidateSource {
    client: RestCrmClient,
}

impl CrmCandidateSource {
    pub fn new(client: RestCrmClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl CandidateSource for CrmCandidateSource {
    async fn search_by_name(&self, first: Option<&str>, last: Option<&str>) -> Vec<Candidate> {
        match self.client.search_leads_by_name(first, last).await {
            Ok(candidates) => candidates,
            Err(error) => {
                warn!(
                    event_name = "crm.search_degraded",
                    kind = "name",
                    error = %error,
                    "candidate search failed, continuing with empty result"
                );
                Vec::new()
            }
        }
    }

    async fn search_by_phone(&self, phone: &NormalizedPhone) -> Vec<Candidate> {
        match self.client.search_leads_by_phone(phone).await {
            Ok(candidates) => candidates,
            Err(error) => {
                warn!(
                    event_name = "crm.search_degraded",
                    kind = "phone",
                    error = %error,
                    "candidate search failed, continuing with empty result"
                );
                Vec::new()
            }
        }
    }
}

/// Write side of the CRM boundary. New leads created from a recognized phone
/// are linked to the account already holding that number.
#[derive(Clone)]
pub struct CrmRecordWriter {
    client: RestCrmClient,
    normalizer: PhoneNormalizer,
}

impl CrmRecordWriter {
    pub fn new(client: RestCrmClient, normalizer: PhoneNormalizer) -> Self {
        Self { client, normalizer }
    }

    async fn enrich_with_account(&self, fields: &mut FieldMap) {
        let Some(phone) = fields
            .get("Phone")
            .and_then(Value::as_str)
            .and_then(|raw| self.normalizer.normalize(raw))
        else {
            return;
        };

        match self.client.find_account_by_phone(&phone).await {
            Ok(Some(account)) => {
                fields.insert("AccountId".to_string(), Value::String(account.id.0.clone()));
            }
            Ok(None) => {}
            Err(error) => {
                // Enrichment is optional; the create proceeds unlinked.
                warn!(
                    event_name = "crm.account_lookup_failed",
                    error = %error,
                    "account lookup by phone failed, creating without a link"
                );
            }
        }
    }
}

fn to_write_error(error: CrmError) -> WriteError {
    if error.is_converted_rejection() {
        WriteError::Converted(error.to_string())
    } else {
        WriteError::Other(error.to_string())
    }
}

#[async_trait]
impl RecordWriter for CrmRecordWriter {
    async fn create_record(&self, fields: &FieldMap) -> Result<RecordId, WriteError> {
        let mut fields = fields.clone();
        self.enrich_with_account(&mut fields).await;
        self.client.create_lead(&fields).await.map_err(to_write_error)
    }

    async fn update_record(&self, id: &RecordId, fields: &FieldMap) -> Result<(), WriteError> {
        self.client.update_lead(id, fields).await.map_err(to_write_error)
    }

    async fn attach_note(
        &self,
        parent: &RecordId,
        note: &NotePayload,
    ) -> Result<RecordId, WriteError> {
        self.client.create_note(parent, note).await.map_err(to_write_error)
    }
}

#[cfg(test)]
mod tests {
    use secrecy::SecretString;

    use super::{to_write_error, CrmCandidateSource};
    use crate::client::{CrmError, RestCrmClient};
    use leadflow_core::config::CrmConfig;
    use leadflow_core::recon::backend::{CandidateSource, WriteError};

    fn unreachable_client() -> RestCrmClient {
        let config = CrmConfig {
            enabled: true,
            // Nothing listens here; requests fail fast with a refusal.
            instance_url: Some("http://127.0.0.1:1".to_string()),
            access_token: Some(SecretString::from("test-token")),
            api_version: "v59.0".to_string(),
            timeout_secs: 1,
            default_region: "BR".to_string(),
            server_managed_fields: Vec::new(),
        };
        RestCrmClient::from_config(&config).expect("client should build")
    }

    #[test]
    fn converted_rejections_map_to_the_converted_variant() {
        let error = CrmError::Api {
            status: 400,
            code: Some("CANNOT_UPDATE_CONVERTED_LEAD".to_string()),
            message: "cannot reference converted lead".to_string(),
        };
        assert!(matches!(to_write_error(error), WriteError::Converted(_)));
    }

    #[test]
    fn everything_else_maps_to_other() {
        let transport = CrmError::Transport("connection reset".to_string());
        assert!(matches!(to_write_error(transport), WriteError::Other(_)));

        let api = CrmError::Api {
            status: 400,
            code: Some("REQUIRED_FIELD_MISSING".to_string()),
            message: "missing LastName".to_string(),
        };
        assert!(matches!(to_write_error(api), WriteError::Other(_)));
    }

    #[tokio::test]
    async fn unreachable_backend_degrades_to_empty_results() {
        let source = CrmCandidateSource::new(unreachable_client());

        let by_name = source.search_by_name(Some("Maria"), Some("Santos")).await;
        assert!(by_name.is_empty());
    }
}
