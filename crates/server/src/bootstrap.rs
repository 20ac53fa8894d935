use std::sync::Arc;

use thiserror::Error;
use tracing::{info, warn};

use leadflow_core::config::{AppConfig, ConfigError, LoadOptions};
use leadflow_core::phone::{PhoneNormalizer, Region};
use leadflow_core::ranking::CandidateRanker;
use leadflow_core::recon::backend::{CandidateSource, RecordWriter};
use leadflow_core::recon::engine::{EngineOptions, ReconciliationEngine};
use leadflow_core::recon::memory::{RecordingCrm, StaticCandidateSource};
use leadflow_core::sanitize::FieldSanitizer;
use leadflow_crm::{CrmCandidateSource, CrmRecordWriter, RestCrmClient};
use leadflow_db::{connect, migrations, DbPool, SqlDecisionRepository, SqlMessageRepository};
use leadflow_extract::{ChatCompletionExtractor, ExtractError};
use leadflow_gateway::{GatewayClient, GatewayError};

use crate::pipeline::Pipeline;
use crate::webhook::WebhookState;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub webhook_state: WebhookState,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("extractor initialization failed: {0}")]
    Extractor(#[source] ExtractError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let db_pool = connect(&config.database).await.map_err(BootstrapError::DatabaseConnect)?;
    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.database_ready",
        correlation_id = "bootstrap",
        "database connected and migrations applied"
    );

    // Region validity is enforced at config load.
    let region = Region::from_code(&config.crm.default_region).unwrap_or(Region::Br);
    let normalizer = PhoneNormalizer::new(region);

    let extractor =
        ChatCompletionExtractor::from_config(&config.extractor).map_err(BootstrapError::Extractor)?;

    let (source, writer, crm_available): (Arc<dyn CandidateSource>, Arc<dyn RecordWriter>, bool) =
        match RestCrmClient::from_config(&config.crm) {
            Ok(client) => (
                Arc::new(CrmCandidateSource::new(client.clone())),
                Arc::new(CrmRecordWriter::new(client, normalizer)),
                true,
            ),
            Err(crm_error) => {
                info!(
                    event_name = "system.bootstrap.crm_unavailable",
                    correlation_id = "bootstrap",
                    error = %crm_error,
                    "crm backend not configured, runs will be simulated"
                );
                (
                    Arc::new(StaticCandidateSource::default()),
                    Arc::new(RecordingCrm::default()),
                    false,
                )
            }
        };

    let engine = ReconciliationEngine::new(
        source,
        writer,
        normalizer,
        CandidateRanker::default(),
        FieldSanitizer::new(config.crm.server_managed_fields.clone()),
        EngineOptions {
            create_policy: config.engine.create_policy,
            placeholder_surname: config.engine.placeholder_surname.clone(),
        },
    );

    let decisions = Arc::new(SqlDecisionRepository::new(db_pool.clone()));
    let pipeline = Pipeline::new(
        Arc::new(extractor),
        engine,
        normalizer,
        decisions,
        &config.engine,
        crm_available,
    );

    let gateway = match GatewayClient::from_config(&config.gateway) {
        Ok(client) => Some(Arc::new(client)),
        Err(GatewayError::NotConfigured) => None,
        Err(gateway_error) => {
            warn!(
                event_name = "system.bootstrap.gateway_unavailable",
                correlation_id = "bootstrap",
                error = %gateway_error,
                "gateway client could not be built, acknowledgments disabled"
            );
            None
        }
    };

    let webhook_state = WebhookState {
        pipeline: Arc::new(pipeline),
        messages: Arc::new(SqlMessageRepository::new(db_pool.clone())),
        gateway,
        monitored_number: config.gateway.monitored_number.clone(),
    };

    Ok(Application { config, db_pool, webhook_state })
}

#[cfg(test)]
mod tests {
    use leadflow_core::config::{ConfigOverrides, LoadOptions};

    use super::bootstrap;

    fn overrides(database_url: &str) -> LoadOptions {
        LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some(database_url.to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        }
    }

    #[tokio::test]
    async fn bootstrap_fails_fast_on_invalid_config() {
        let result = bootstrap(LoadOptions {
            overrides: ConfigOverrides {
                database_url: Some("postgres://nope".to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        })
        .await;

        assert!(result.is_err());
        let message = result.err().map(|error| error.to_string()).unwrap_or_default();
        assert!(message.contains("database.url"));
    }

    #[tokio::test]
    async fn bootstrap_without_crm_runs_in_simulation() {
        let app = bootstrap(overrides("sqlite::memory:?cache=shared"))
            .await
            .expect("bootstrap should succeed with defaults");

        assert!(app.webhook_state.pipeline.simulate());
        assert!(app.webhook_state.gateway.is_none());

        let (table_count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM sqlite_master \
             WHERE type = 'table' AND name IN ('decision', 'inbound_message')",
        )
        .fetch_one(&app.db_pool)
        .await
        .expect("schema should be migrated");
        assert_eq!(table_count, 2);

        app.db_pool.close().await;
    }
}
