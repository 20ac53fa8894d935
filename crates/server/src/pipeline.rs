//! End-to-end flow for one inbound conversation record: extract structured
//! fields, reconcile against the CRM, persist the decision.

use std::sync::Arc;

use tracing::{error, info, warn};

use leadflow_core::config::EngineConfig;
use leadflow_core::domain::contact::ExtractedContact;
use leadflow_core::domain::decision::{InputId, ReconciliationDecision};
use leadflow_core::phone::PhoneNormalizer;
use leadflow_core::recon::backend::{CandidateSource, RecordWriter};
use leadflow_core::recon::engine::{ReconciliationEngine, ReconciliationInput};
use leadflow_db::DecisionRepository;
use leadflow_extract::{lead_fields, transcript_note, ContactExtractor};

type DynEngine =
    ReconciliationEngine<Arc<dyn CandidateSource>, Arc<dyn RecordWriter>>;

pub struct Pipeline {
    extractor: Arc<dyn ContactExtractor>,
    engine: DynEngine,
    normalizer: PhoneNormalizer,
    decisions: Arc<dyn DecisionRepository>,
    /// Effective simulate flag: the configured value, forced on when no CRM
    /// backend is available so runs stay side-effect free.
    simulate: bool,
}

impl Pipeline {
    pub fn new(
        extractor: Arc<dyn ContactExtractor>,
        engine: DynEngine,
        normalizer: PhoneNormalizer,
        decisions: Arc<dyn DecisionRepository>,
        engine_config: &EngineConfig,
        crm_available: bool,
    ) -> Self {
        let simulate = engine_config.simulate || !crm_available;
        Self { extractor, engine, normalizer, decisions, simulate }
    }

    pub fn simulate(&self) -> bool {
        self.simulate
    }

    /// Processes one text. Extraction failures degrade to an empty contact
    /// carrying only the raw text; the run itself never fails.
    pub async fn process_text(
        &self,
        input_id: InputId,
        text: &str,
        source_phone: Option<&str>,
    ) -> ReconciliationDecision {
        let contact = match self.extractor.extract(text).await {
            Ok(contact) => contact,
            Err(extraction_error) => {
                warn!(
                    event_name = "pipeline.extraction_degraded",
                    input_id = %input_id,
                    error = %extraction_error,
                    "extraction failed, continuing with raw text only"
                );
                ExtractedContact { free_text: text.to_string(), ..Default::default() }
            }
        };

        let normalized = source_phone
            .or(contact.phone.as_deref())
            .and_then(|raw| self.normalizer.normalize(raw));
        let payload = lead_fields(&contact, normalized.as_ref());
        let note = Some(transcript_note(&contact, &input_id));

        let decision = self
            .engine
            .run(ReconciliationInput {
                input_id: input_id.clone(),
                contact,
                source_phone: source_phone.map(str::to_string),
                payload,
                note,
                simulate: self.simulate,
            })
            .await;

        info!(
            event_name = "pipeline.run_finished",
            input_id = %input_id,
            action = decision.action.as_str(),
            status = decision.status.kind(),
            "reconciliation run finished"
        );

        // Best effort: a failed audit write never invalidates CRM effects
        // that already happened.
        if let Err(persist_error) = self.decisions.upsert(&decision).await {
            error!(
                event_name = "pipeline.decision_persist_failed",
                input_id = %input_id,
                error = %persist_error,
                "decision record could not be persisted"
            );
        }

        decision
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;

    use leadflow_core::config::{CreatePolicy, EngineConfig};
    use leadflow_core::domain::contact::ExtractedContact;
    use leadflow_core::domain::decision::{ExecutionStatus, InputId, ReconcileAction};
    use leadflow_core::phone::{PhoneNormalizer, Region};
    use leadflow_core::ranking::CandidateRanker;
    use leadflow_core::recon::backend::{CandidateSource, RecordWriter};
    use leadflow_core::recon::engine::{EngineOptions, ReconciliationEngine};
    use leadflow_core::recon::memory::{RecordingCrm, StaticCandidateSource};
    use leadflow_core::sanitize::FieldSanitizer;
    use leadflow_db::{DecisionRepository, InMemoryDecisionRepository};
    use leadflow_extract::{ContactExtractor, ExtractError};

    use super::Pipeline;

    struct FixedExtractor(ExtractedContact);

    #[async_trait]
    impl ContactExtractor for FixedExtractor {
        async fn extract(&self, _text: &str) -> Result<ExtractedContact, ExtractError> {
            Ok(self.0.clone())
        }
    }

    struct BrokenExtractor;

    #[async_trait]
    impl ContactExtractor for BrokenExtractor {
        async fn extract(&self, _text: &str) -> Result<ExtractedContact, ExtractError> {
            Err(ExtractError::Transport("provider offline".to_string()))
        }
    }

    fn engine_config(simulate: bool) -> EngineConfig {
        EngineConfig {
            simulate,
            create_policy: CreatePolicy::Always,
            placeholder_surname: "Unknown".to_string(),
        }
    }

    fn pipeline(
        extractor: Arc<dyn ContactExtractor>,
        decisions: Arc<InMemoryDecisionRepository>,
        simulate: bool,
        crm_available: bool,
    ) -> Pipeline {
        let source: Arc<dyn CandidateSource> = Arc::new(StaticCandidateSource::default());
        let writer: Arc<dyn RecordWriter> = Arc::new(RecordingCrm::default());
        let engine = ReconciliationEngine::new(
            source,
            writer,
            PhoneNormalizer::new(Region::Br),
            CandidateRanker::default(),
            FieldSanitizer::default(),
            EngineOptions::default(),
        );
        Pipeline::new(
            extractor,
            engine,
            PhoneNormalizer::new(Region::Br),
            decisions,
            &engine_config(simulate),
            crm_available,
        )
    }

    #[tokio::test]
    async fn persists_one_decision_per_run() {
        let decisions = Arc::new(InMemoryDecisionRepository::default());
        let extractor = Arc::new(FixedExtractor(ExtractedContact {
            name: Some("Maria Santos".to_string()),
            company: None,
            phone: None,
            free_text: "call notes".to_string(),
        }));
        let pipeline = pipeline(extractor, decisions.clone(), false, true);

        let decision = pipeline
            .process_text(InputId("msg-7".to_string()), "call notes", Some("65991234567"))
            .await;

        assert_eq!(decision.action, ReconcileAction::NoCandidatesFound);
        let stored = decisions
            .find_by_input_id(&InputId("msg-7".to_string()))
            .await
            .expect("query")
            .expect("decision stored");
        assert_eq!(stored, decision);
    }

    #[tokio::test]
    async fn missing_crm_forces_simulation() {
        let decisions = Arc::new(InMemoryDecisionRepository::default());
        let extractor = Arc::new(FixedExtractor(ExtractedContact {
            name: Some("Maria Santos".to_string()),
            company: None,
            phone: None,
            free_text: "call notes".to_string(),
        }));
        let pipeline = pipeline(extractor, decisions, false, false);

        assert!(pipeline.simulate());
        let decision =
            pipeline.process_text(InputId("msg-8".to_string()), "call notes", None).await;
        assert_eq!(decision.status, ExecutionStatus::Skipped);
    }

    #[tokio::test]
    async fn broken_extractor_degrades_to_raw_text() {
        let decisions = Arc::new(InMemoryDecisionRepository::default());
        let pipeline = pipeline(Arc::new(BrokenExtractor), decisions, true, true);

        let decision = pipeline
            .process_text(InputId("msg-9".to_string()), "raw transcript", None)
            .await;

        assert_eq!(decision.action, ReconcileAction::NoCandidatesFound);
        assert_eq!(decision.status, ExecutionStatus::Skipped);
    }
}
