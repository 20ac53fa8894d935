use leadflow_core::config::{AppConfig, LoadOptions};
use leadflow_core::domain::decision::InputId;
use leadflow_db::{connect, DecisionRepository, SqlDecisionRepository};

use super::{runtime, CommandResult};

pub fn run(input_id: &str) -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return CommandResult::failure("decision", "config", error.to_string(), 2),
    };

    let rt = match runtime() {
        Ok(rt) => rt,
        Err(error) => return CommandResult::failure("decision", "runtime", error.to_string(), 1),
    };

    rt.block_on(async {
        let pool = match connect(&config.database).await {
            Ok(pool) => pool,
            Err(error) => {
                return CommandResult::failure("decision", "database", error.to_string(), 1)
            }
        };

        let repository = SqlDecisionRepository::new(pool);
        match repository.find_by_input_id(&InputId(input_id.to_string())).await {
            Ok(Some(decision)) => {
                let document = serde_json::to_string_pretty(&decision)
                    .unwrap_or_else(|error| format!("{{\"serialization_error\":\"{error}\"}}"));
                CommandResult { exit_code: 0, output: document }
            }
            Ok(None) => CommandResult::failure(
                "decision",
                "not_found",
                format!("no decision recorded for input `{input_id}`"),
                1,
            ),
            Err(error) => CommandResult::failure("decision", "database", error.to_string(), 1),
        }
    })
}
