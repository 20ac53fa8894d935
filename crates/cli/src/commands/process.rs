use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use leadflow_core::config::{AppConfig, ConfigOverrides, LoadOptions};
use leadflow_core::domain::contact::ExtractedContact;
use leadflow_core::domain::decision::{InputId, ReconciliationDecision};
use leadflow_core::phone::{PhoneNormalizer, Region};
use leadflow_core::ranking::CandidateRanker;
use leadflow_core::recon::backend::{CandidateSource, RecordWriter};
use leadflow_core::recon::engine::{EngineOptions, ReconciliationEngine, ReconciliationInput};
use leadflow_core::recon::memory::{RecordingCrm, StaticCandidateSource};
use leadflow_core::sanitize::FieldSanitizer;
use leadflow_crm::{CrmCandidateSource, CrmRecordWriter, RestCrmClient};
use leadflow_db::{connect, migrations, DecisionRepository, SqlDecisionRepository};
use leadflow_extract::{
    lead_fields, transcript_note, ChatCompletionExtractor, ContactExtractor, Transcriber,
    WhisperHttpTranscriber,
};

use super::{runtime, CommandResult};

const AUDIO_EXTENSIONS: &[&str] = &["wav", "mp3", "ogg", "m4a", "opus"];

enum Source {
    Text(String),
    Audio(PathBuf),
}

pub fn run(
    input: Option<PathBuf>,
    text: Option<String>,
    phone: Option<String>,
    input_id: Option<String>,
    simulate: bool,
) -> CommandResult {
    let (input_id, source) = match resolve_input(input, text, input_id) {
        Ok(resolved) => resolved,
        Err(message) => return CommandResult::failure("process", "input", message, 2),
    };

    let config = match AppConfig::load(LoadOptions {
        overrides: ConfigOverrides {
            simulate: simulate.then_some(true),
            ..ConfigOverrides::default()
        },
        ..LoadOptions::default()
    }) {
        Ok(config) => config,
        Err(error) => return CommandResult::failure("process", "config", error.to_string(), 2),
    };

    let rt = match runtime() {
        Ok(rt) => rt,
        Err(error) => return CommandResult::failure("process", "runtime", error.to_string(), 1),
    };

    match rt.block_on(process(&config, input_id, source, phone.as_deref())) {
        Ok(decision) => {
            let document = serde_json::to_string_pretty(&decision)
                .unwrap_or_else(|error| format!("{{\"serialization_error\":\"{error}\"}}"));
            CommandResult { exit_code: 0, output: document }
        }
        Err(message) => CommandResult::failure("process", "pipeline", message, 1),
    }
}

fn is_audio(path: &Path) -> bool {
    path.extension()
        .and_then(|extension| extension.to_str())
        .map(str::to_ascii_lowercase)
        .is_some_and(|extension| AUDIO_EXTENSIONS.contains(&extension.as_str()))
}

fn resolve_input(
    input: Option<PathBuf>,
    text: Option<String>,
    input_id: Option<String>,
) -> Result<(InputId, Source), String> {
    match (input, text) {
        (Some(_), Some(_)) => Err("pass either a transcript file or --text, not both".to_string()),
        (None, None) => Err("a transcript file or --text is required".to_string()),
        (Some(path), None) => {
            let derived = input_id
                .or_else(|| path.file_stem().map(|stem| stem.to_string_lossy().into_owned()))
                .unwrap_or_else(|| "transcript".to_string());

            if is_audio(&path) {
                return Ok((InputId(derived), Source::Audio(path)));
            }

            let content = fs::read_to_string(&path)
                .map_err(|error| format!("could not read `{}`: {error}", path.display()))?;
            Ok((InputId(derived), Source::Text(content)))
        }
        (None, Some(text)) => {
            Ok((InputId(input_id.unwrap_or_else(|| "adhoc".to_string())), Source::Text(text)))
        }
    }
}

async fn transcribe_audio(
    config: &AppConfig,
    region: Region,
    path: &Path,
) -> Result<String, String> {
    let api_key = config
        .extractor
        .api_key
        .clone()
        .ok_or_else(|| "transcription requires extractor.api_key".to_string())?;
    let base_url = config
        .extractor
        .base_url
        .clone()
        .unwrap_or_else(|| "https://api.openai.com/v1".to_string());
    let language = match region {
        Region::Br => "pt",
        Region::Us => "en",
    };

    let transcriber =
        WhisperHttpTranscriber::new(&base_url, api_key, language, config.extractor.timeout_secs)
            .map_err(|error| format!("transcriber unavailable: {error}"))?;
    transcriber
        .transcribe(path)
        .await
        .map_err(|error| format!("transcription failed: {error}"))
}

async fn process(
    config: &AppConfig,
    input_id: InputId,
    source: Source,
    phone: Option<&str>,
) -> Result<ReconciliationDecision, String> {
    let region = Region::from_code(&config.crm.default_region).unwrap_or(Region::Br);
    let normalizer = PhoneNormalizer::new(region);

    let text = match source {
        Source::Text(text) => text,
        Source::Audio(path) => transcribe_audio(config, region, &path).await?,
    };

    let extractor = ChatCompletionExtractor::from_config(&config.extractor)
        .map_err(|error| format!("extractor unavailable: {error}"))?;

    let (crm_source, writer, crm_available): (
        Arc<dyn CandidateSource>,
        Arc<dyn RecordWriter>,
        bool,
    ) = match RestCrmClient::from_config(&config.crm) {
        Ok(client) => (
            Arc::new(CrmCandidateSource::new(client.clone())),
            Arc::new(CrmRecordWriter::new(client, normalizer)),
            true,
        ),
        Err(_) => {
            (Arc::new(StaticCandidateSource::default()), Arc::new(RecordingCrm::default()), false)
        }
    };

    let engine = ReconciliationEngine::new(
        crm_source,
        writer,
        normalizer,
        CandidateRanker::default(),
        FieldSanitizer::new(config.crm.server_managed_fields.clone()),
        EngineOptions {
            create_policy: config.engine.create_policy,
            placeholder_surname: config.engine.placeholder_surname.clone(),
        },
    );

    let contact = match extractor.extract(&text).await {
        Ok(contact) => contact,
        Err(_) => ExtractedContact { free_text: text.clone(), ..Default::default() },
    };

    let normalized = phone.or(contact.phone.as_deref()).and_then(|raw| normalizer.normalize(raw));
    let payload = lead_fields(&contact, normalized.as_ref());
    let note = Some(transcript_note(&contact, &input_id));

    let decision = engine
        .run(ReconciliationInput {
            input_id,
            contact,
            source_phone: phone.map(str::to_string),
            payload,
            note,
            simulate: config.engine.simulate || !crm_available,
        })
        .await;

    // Audit write is best effort; the decision is still reported on failure.
    if let Ok(pool) = connect(&config.database).await {
        if migrations::run_pending(&pool).await.is_ok() {
            let _ = SqlDecisionRepository::new(pool).upsert(&decision).await;
        }
    }

    Ok(decision)
}
