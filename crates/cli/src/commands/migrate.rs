use leadflow_core::config::{AppConfig, LoadOptions};
use leadflow_db::{connect, migrations};

use super::{runtime, CommandResult};

pub fn run() -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return CommandResult::failure("migrate", "config", error.to_string(), 2),
    };

    let rt = match runtime() {
        Ok(rt) => rt,
        Err(error) => return CommandResult::failure("migrate", "runtime", error.to_string(), 1),
    };

    rt.block_on(async {
        let pool = match connect(&config.database).await {
            Ok(pool) => pool,
            Err(error) => {
                return CommandResult::failure("migrate", "database", error.to_string(), 1)
            }
        };

        match migrations::run_pending(&pool).await {
            Ok(()) => CommandResult::success(
                "migrate",
                format!("migrations applied for `{}`", config.database.url),
            ),
            Err(error) => CommandResult::failure("migrate", "migration", error.to_string(), 1),
        }
    })
}
