use leadflow_core::config::{AppConfig, LoadOptions};

const REDACTED: &str = "***redacted***";

pub fn run() -> String {
    match AppConfig::load(LoadOptions::default()) {
        Ok(config) => render(&config),
        Err(error) => format!("configuration error: {error}"),
    }
}

fn redact(present: bool) -> &'static str {
    if present {
        REDACTED
    } else {
        "(unset)"
    }
}

fn render(config: &AppConfig) -> String {
    let lines = [
        format!("database.url = {}", config.database.url),
        format!("database.max_connections = {}", config.database.max_connections),
        format!("crm.enabled = {}", config.crm.enabled),
        format!(
            "crm.instance_url = {}",
            config.crm.instance_url.as_deref().unwrap_or("(unset)")
        ),
        format!("crm.access_token = {}", redact(config.crm.access_token.is_some())),
        format!("crm.api_version = {}", config.crm.api_version),
        format!("crm.default_region = {}", config.crm.default_region),
        format!(
            "crm.server_managed_fields = {}",
            config.crm.server_managed_fields.join(", ")
        ),
        format!("extractor.provider = {:?}", config.extractor.provider),
        format!("extractor.model = {}", config.extractor.model),
        format!("extractor.api_key = {}", redact(config.extractor.api_key.is_some())),
        format!(
            "extractor.base_url = {}",
            config.extractor.base_url.as_deref().unwrap_or("(unset)")
        ),
        format!("gateway.enabled = {}", config.gateway.enabled),
        format!("gateway.base_url = {}", config.gateway.base_url),
        format!("gateway.api_key = {}", redact(config.gateway.api_key.is_some())),
        format!("gateway.instance_name = {}", config.gateway.instance_name),
        format!(
            "gateway.monitored_number = {}",
            config.gateway.monitored_number.as_deref().unwrap_or("(unset)")
        ),
        format!("server.bind_address = {}", config.server.bind_address),
        format!("server.port = {}", config.server.port),
        format!("engine.simulate = {}", config.engine.simulate),
        format!("engine.create_policy = {:?}", config.engine.create_policy),
        format!("engine.placeholder_surname = {}", config.engine.placeholder_surname),
        format!("logging.level = {}", config.logging.level),
        format!("logging.format = {:?}", config.logging.format),
    ];
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use leadflow_core::config::AppConfig;
    use secrecy::SecretString;

    use super::render;

    #[test]
    fn secrets_are_redacted_in_the_rendering() {
        let mut config = AppConfig::default();
        config.crm.access_token = Some(SecretString::from("very-secret"));

        let rendered = render(&config);
        assert!(!rendered.contains("very-secret"));
        assert!(rendered.contains("crm.access_token = ***redacted***"));
        assert!(rendered.contains("extractor.api_key = (unset)"));
    }
}
