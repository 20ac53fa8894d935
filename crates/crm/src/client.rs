use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use leadflow_core::config::CrmConfig;
use leadflow_core::domain::candidate::{Candidate, CandidateKind, RecordId};
use leadflow_core::domain::decision::FieldMap;
use leadflow_core::phone::NormalizedPhone;
use leadflow_core::recon::backend::NotePayload;

const LEAD_FIELDS: &str = "Id, FirstName, LastName, Phone, Email, Status, Company, IsConverted";
const SEARCH_LIMIT: usize = 10;

/// The backend's rejection code for writes against a converted lead.
const CONVERTED_LEAD_CODE: &str = "CANNOT_UPDATE_CONVERTED_LEAD";

#[derive(Debug, Error)]
pub enum CrmError {
    #[error("crm client is not configured")]
    NotConfigured,
    #[error("crm transport failure: {0}")]
    Transport(String),
    #[error("crm rejected the request ({status}): {message}")]
    Api { status: u16, code: Option<String>, message: String },
    #[error("crm response could not be decoded: {0}")]
    Decode(String),
}

impl CrmError {
    pub fn is_converted_rejection(&self) -> bool {
        matches!(self, Self::Api { code: Some(code), .. } if code == CONVERTED_LEAD_CODE)
    }

    fn transport(error: reqwest::Error) -> Self {
        Self::Transport(error.to_string())
    }
}

/// Account linked to a known contact, used to enrich new leads created from
/// a recognized source phone.
#[derive(Clone, Debug, PartialEq)]
pub struct AccountRef {
    pub id: RecordId,
    pub name: String,
}

#[derive(Clone)]
pub struct RestCrmClient {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    http: Client,
    instance_url: String,
    api_version: String,
    access_token: SecretString,
}

impl RestCrmClient {
    pub fn from_config(config: &CrmConfig) -> Result<Self, CrmError> {
        if !config.enabled {
            return Err(CrmError::NotConfigured);
        }
        let instance_url = config.instance_url.clone().ok_or(CrmError::NotConfigured)?;
        let access_token = config.access_token.clone().ok_or(CrmError::NotConfigured)?;

        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(CrmError::transport)?;

        Ok(Self {
            inner: Arc::new(ClientInner {
                http,
                instance_url: instance_url.trim_end_matches('/').to_string(),
                api_version: config.api_version.clone(),
                access_token,
            }),
        })
    }

    fn data_url(&self, path: &str) -> String {
        format!(
            "{}/services/data/{}/{}",
            self.inner.instance_url, self.inner.api_version, path
        )
    }

    async fn query(&self, soql: &str) -> Result<Vec<Value>, CrmError> {
        debug!(event_name = "crm.query", soql, "running backend query");
        let response = self
            .inner
            .http
            .get(self.data_url("query"))
            .bearer_auth(self.inner.access_token.expose_secret())
            .query(&[("q", soql)])
            .send()
            .await
            .map_err(CrmError::transport)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(api_error(status, &body));
        }

        let payload: QueryResponse =
            response.json().await.map_err(|error| CrmError::Decode(error.to_string()))?;
        Ok(payload.records)
    }

    /// Most recent leads matching the name tokens. Either token may be
    /// absent, but not both.
    pub async fn search_leads_by_name(
        &self,
        first: Option<&str>,
        last: Option<&str>,
    ) -> Result<Vec<Candidate>, CrmError> {
        let Some(soql) = name_search_soql(first, last) else {
            return Ok(Vec::new());
        };
        let records = self.query(&soql).await?;
        Ok(records.iter().filter_map(candidate_from_lead).collect())
    }

    pub async fn search_leads_by_phone(
        &self,
        phone: &NormalizedPhone,
    ) -> Result<Vec<Candidate>, CrmError> {
        let records = self.query(&phone_search_soql(phone)).await?;
        Ok(records.iter().filter_map(candidate_from_lead).collect())
    }

    /// Account reachable through a contact (or directly) holding this phone.
    pub async fn find_account_by_phone(
        &self,
        phone: &NormalizedPhone,
    ) -> Result<Option<AccountRef>, CrmError> {
        let digits = soql_quote(phone.digits());
        let via_contact = format!(
            "SELECT AccountId, Account.Name FROM Contact \
             WHERE Phone LIKE '%{digits}%' OR MobilePhone LIKE '%{digits}%' LIMIT 1"
        );
        if let Some(account) = self.query(&via_contact).await?.first().and_then(account_from_contact)
        {
            return Ok(Some(account));
        }

        let direct = format!("SELECT Id, Name FROM Account WHERE Phone LIKE '%{digits}%' LIMIT 1");
        Ok(self.query(&direct).await?.first().and_then(account_from_record))
    }

    pub async fn create_lead(&self, fields: &FieldMap) -> Result<RecordId, CrmError> {
        let response = self
            .inner
            .http
            .post(self.data_url("sobjects/Lead"))
            .bearer_auth(self.inner.access_token.expose_secret())
            .json(&Value::Object(fields.clone()))
            .send()
            .await
            .map_err(CrmError::transport)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(api_error(status, &body));
        }

        let payload: CreateResponse =
            response.json().await.map_err(|error| CrmError::Decode(error.to_string()))?;
        Ok(RecordId(payload.id))
    }

    pub async fn update_lead(&self, id: &RecordId, fields: &FieldMap) -> Result<(), CrmError> {
        let response = self
            .inner
            .http
            .patch(self.data_url(&format!("sobjects/Lead/{}", id.0)))
            .bearer_auth(self.inner.access_token.expose_secret())
            .json(&Value::Object(fields.clone()))
            .send()
            .await
            .map_err(CrmError::transport)?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        let error = api_error(status, &body);

        // Server-side after-update triggers can fail after the record was
        // written; the backend reports an error although the field update
        // itself stuck. Treated as a partial success.
        if let CrmError::Api { message, .. } = &error {
            if message.contains("AfterUpdate") {
                warn!(
                    event_name = "crm.update_trigger_failed",
                    record_id = %id,
                    message = %message,
                    "update applied but a backend trigger failed"
                );
                return Ok(());
            }
        }

        Err(error)
    }

    pub async fn create_note(
        &self,
        parent: &RecordId,
        note: &NotePayload,
    ) -> Result<RecordId, CrmError> {
        let mut fields = FieldMap::new();
        fields.insert("Title".to_string(), Value::String(note.title.clone()));
        fields.insert("Body".to_string(), Value::String(note.body.clone()));
        fields.insert("ParentId".to_string(), Value::String(parent.0.clone()));

        let response = self
            .inner
            .http
            .post(self.data_url("sobjects/Note"))
            .bearer_auth(self.inner.access_token.expose_secret())
            .json(&Value::Object(fields))
            .send()
            .await
            .map_err(CrmError::transport)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(api_error(status, &body));
        }

        let payload: CreateResponse =
            response.json().await.map_err(|error| CrmError::Decode(error.to_string()))?;
        Ok(RecordId(payload.id))
    }
}

#[derive(Debug, Deserialize)]
struct QueryResponse {
    #[serde(default)]
    records: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct CreateResponse {
    id: String,
}

/// Escapes a value for inclusion in a quoted SOQL literal.
fn soql_quote(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

fn name_search_soql(first: Option<&str>, last: Option<&str>) -> Option<String> {
    let mut clauses = Vec::new();
    if let Some(first) = first.map(str::trim).filter(|value| !value.is_empty()) {
        clauses.push(format!("FirstName LIKE '%{}%'", soql_quote(first)));
    }
    if let Some(last) = last.map(str::trim).filter(|value| !value.is_empty()) {
        clauses.push(format!("LastName LIKE '%{}%'", soql_quote(last)));
    }
    if clauses.is_empty() {
        return None;
    }

    Some(format!(
        "SELECT {LEAD_FIELDS} FROM Lead WHERE {} ORDER BY CreatedDate DESC LIMIT {SEARCH_LIMIT}",
        clauses.join(" OR ")
    ))
}

fn phone_search_soql(phone: &NormalizedPhone) -> String {
    format!(
        "SELECT {LEAD_FIELDS} FROM Lead WHERE Phone LIKE '%{}%' \
         ORDER BY CreatedDate DESC LIMIT {SEARCH_LIMIT}",
        soql_quote(phone.digits())
    )
}

fn candidate_from_lead(record: &Value) -> Option<Candidate> {
    let id = record.get("Id")?.as_str()?.to_string();
    let first = record.get("FirstName").and_then(Value::as_str).unwrap_or("");
    let last = record.get("LastName").and_then(Value::as_str).unwrap_or("");
    let display_name = format!("{first} {last}").trim().to_string();

    Some(Candidate {
        id: RecordId(id),
        kind: CandidateKind::Lead,
        display_name,
        company: record.get("Company").and_then(Value::as_str).map(str::to_string),
        phone: record.get("Phone").and_then(Value::as_str).map(str::to_string),
        is_converted: record.get("IsConverted").and_then(Value::as_bool).unwrap_or(false),
        raw: record.clone(),
    })
}

fn account_from_contact(record: &Value) -> Option<AccountRef> {
    let id = record.get("AccountId")?.as_str()?.to_string();
    let name = record
        .pointer("/Account/Name")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    Some(AccountRef { id: RecordId(id), name })
}

fn account_from_record(record: &Value) -> Option<AccountRef> {
    let id = record.get("Id")?.as_str()?.to_string();
    let name = record.get("Name").and_then(Value::as_str).unwrap_or_default().to_string();
    Some(AccountRef { id: RecordId(id), name })
}

/// The backend reports errors as a JSON array of {message, errorCode}.
fn api_error(status: StatusCode, body: &str) -> CrmError {
    let parsed: Option<Vec<ApiErrorBody>> = serde_json::from_str(body).ok();
    match parsed.and_then(|errors| errors.into_iter().next()) {
        Some(error) => CrmError::Api {
            status: status.as_u16(),
            code: error.error_code,
            message: error.message.unwrap_or_else(|| body.to_string()),
        },
        None => CrmError::Api {
            status: status.as_u16(),
            code: None,
            message: if body.is_empty() { status.to_string() } else { body.to_string() },
        },
    }
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(rename = "errorCode", default)]
    error_code: Option<String>,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{
        api_error, candidate_from_lead, name_search_soql, phone_search_soql, soql_quote, CrmError,
    };
    use leadflow_core::phone::{PhoneNormalizer, Region};

    #[test]
    fn name_soql_combines_clauses_and_orders_by_recency() {
        let soql = name_search_soql(Some("Maria"), Some("Santos")).expect("query");
        assert!(soql.contains("FirstName LIKE '%Maria%'"));
        assert!(soql.contains("OR LastName LIKE '%Santos%'"));
        assert!(soql.ends_with("ORDER BY CreatedDate DESC LIMIT 10"));
    }

    #[test]
    fn name_soql_requires_at_least_one_token() {
        assert!(name_search_soql(None, None).is_none());
        assert!(name_search_soql(Some("  "), None).is_none());
    }

    #[test]
    fn phone_soql_searches_unprefixed_digits() {
        let phone = PhoneNormalizer::new(Region::Br).normalize("65991234567").expect("valid");
        let soql = phone_search_soql(&phone);
        assert!(soql.contains("Phone LIKE '%5565991234567%'"));
    }

    #[test]
    fn soql_literals_are_escaped() {
        assert_eq!(soql_quote("O'Neill"), "O\\'Neill");
    }

    #[test]
    fn lead_records_become_candidates() {
        let record = json!({
            "Id": "00Q123",
            "FirstName": "Maria",
            "LastName": "Santos",
            "Company": "Acme",
            "Phone": "+5565991234567",
            "IsConverted": true
        });

        let candidate = candidate_from_lead(&record).expect("candidate");
        assert_eq!(candidate.id.0, "00Q123");
        assert_eq!(candidate.display_name, "Maria Santos");
        assert!(candidate.is_converted);
        assert_eq!(candidate.raw, record);
    }

    #[test]
    fn records_without_an_id_are_dropped() {
        assert!(candidate_from_lead(&json!({"FirstName": "Maria"})).is_none());
    }

    #[test]
    fn converted_rejections_are_classified() {
        let body = r#"[{"message":"cannot reference converted lead","errorCode":"CANNOT_UPDATE_CONVERTED_LEAD"}]"#;
        let error = api_error(reqwest::StatusCode::BAD_REQUEST, body);
        assert!(error.is_converted_rejection());
    }

    #[test]
    fn other_rejections_keep_their_code_and_message() {
        let body = r#"[{"message":"Required fields are missing: [LastName]","errorCode":"REQUIRED_FIELD_MISSING"}]"#;
        match api_error(reqwest::StatusCode::BAD_REQUEST, body) {
            CrmError::Api { status, code, message } => {
                assert_eq!(status, 400);
                assert_eq!(code.as_deref(), Some("REQUIRED_FIELD_MISSING"));
                assert!(message.contains("LastName"));
            }
            other => panic!("expected Api error, got {other:?}"),
        }
    }

    #[test]
    fn unparseable_error_bodies_fall_back_to_raw_text() {
        match api_error(reqwest::StatusCode::BAD_GATEWAY, "upstream exploded") {
            CrmError::Api { code, message, .. } => {
                assert_eq!(code, None);
                assert_eq!(message, "upstream exploded");
            }
            other => panic!("expected Api error, got {other:?}"),
        }
    }
}
