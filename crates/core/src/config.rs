use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::phone::Region;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub crm: CrmConfig,
    pub extractor: ExtractorConfig,
    pub gateway: GatewayConfig,
    pub server: ServerConfig,
    pub engine: EngineConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct CrmConfig {
    pub enabled: bool,
    pub instance_url: Option<String>,
    pub access_token: Option<SecretString>,
    pub api_version: String,
    pub timeout_secs: u64,
    pub default_region: String,
    /// Fields populated by the CRM's own automation; stripped before writes.
    pub server_managed_fields: Vec<String>,
}

#[derive(Clone, Debug)]
pub struct ExtractorConfig {
    pub provider: ExtractorProvider,
    pub api_key: Option<SecretString>,
    pub base_url: Option<String>,
    pub model: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

#[derive(Clone, Debug)]
pub struct GatewayConfig {
    pub enabled: bool,
    pub base_url: String,
    pub api_key: Option<SecretString>,
    pub instance_name: String,
    /// Sender number whose messages drive the CRM pipeline. Other senders
    /// are archived only.
    pub monitored_number: Option<String>,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Compute decisions without issuing any CRM write.
    pub simulate: bool,
    pub create_policy: CreatePolicy,
    pub placeholder_surname: String,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractorProvider {
    OpenAi,
    Github,
    Ollama,
}

/// Resolution of the open policy question around inputs with neither a name
/// nor a phone: `Always` keeps the legacy behavior of leaving a CRM trace
/// for every input; `RequireIdentity` short-circuits those runs to Skipped.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CreatePolicy {
    Always,
    RequireIdentity,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub simulate: Option<bool>,
    pub crm_enabled: Option<bool>,
    pub crm_instance_url: Option<String>,
    pub crm_access_token: Option<String>,
    pub extractor_provider: Option<ExtractorProvider>,
    pub extractor_model: Option<String>,
    pub gateway_enabled: Option<bool>,
    pub gateway_base_url: Option<String>,
    pub gateway_api_key: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

pub fn default_server_managed_fields() -> Vec<String> {
    ["Company", "AssignedQueue__c", "QueuePosition__c", "QualifiedForNegotiation__c", "OwnerRouting__c"]
        .into_iter()
        .map(str::to_string)
        .collect()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://leadflow.db?mode=rwc".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            crm: CrmConfig {
                enabled: false,
                instance_url: None,
                access_token: None,
                api_version: "v59.0".to_string(),
                timeout_secs: 15,
                default_region: "BR".to_string(),
                server_managed_fields: default_server_managed_fields(),
            },
            extractor: ExtractorConfig {
                provider: ExtractorProvider::Ollama,
                api_key: None,
                base_url: Some("http://localhost:11434".to_string()),
                model: "llama3.1".to_string(),
                timeout_secs: 30,
                max_retries: 2,
            },
            gateway: GatewayConfig {
                enabled: false,
                base_url: "http://localhost:3001".to_string(),
                api_key: None,
                instance_name: "leadflow".to_string(),
                monitored_number: None,
                timeout_secs: 10,
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8080,
                graceful_shutdown_secs: 15,
            },
            engine: EngineConfig {
                simulate: false,
                create_policy: CreatePolicy::Always,
                placeholder_surname: "Unknown".to_string(),
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for ExtractorProvider {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "github" => Ok(Self::Github),
            "ollama" => Ok(Self::Ollama),
            other => Err(ConfigError::Validation(format!(
                "unsupported extractor provider `{other}` (expected openai|github|ollama)"
            ))),
        }
    }
}

impl std::str::FromStr for CreatePolicy {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "always" => Ok(Self::Always),
            "require_identity" => Ok(Self::RequireIdentity),
            other => Err(ConfigError::Validation(format!(
                "unsupported create policy `{other}` (expected always|require_identity)"
            ))),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("leadflow.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(crm) = patch.crm {
            if let Some(enabled) = crm.enabled {
                self.crm.enabled = enabled;
            }
            if let Some(instance_url) = crm.instance_url {
                self.crm.instance_url = Some(instance_url);
            }
            if let Some(token) = crm.access_token {
                self.crm.access_token = Some(secret_value(token));
            }
            if let Some(api_version) = crm.api_version {
                self.crm.api_version = api_version;
            }
            if let Some(timeout_secs) = crm.timeout_secs {
                self.crm.timeout_secs = timeout_secs;
            }
            if let Some(default_region) = crm.default_region {
                self.crm.default_region = default_region;
            }
            if let Some(fields) = crm.server_managed_fields {
                self.crm.server_managed_fields = fields;
            }
        }

        if let Some(extractor) = patch.extractor {
            if let Some(provider) = extractor.provider {
                self.extractor.provider = provider;
            }
            if let Some(api_key) = extractor.api_key {
                self.extractor.api_key = Some(secret_value(api_key));
            }
            if let Some(base_url) = extractor.base_url {
                self.extractor.base_url = Some(base_url);
            }
            if let Some(model) = extractor.model {
                self.extractor.model = model;
            }
            if let Some(timeout_secs) = extractor.timeout_secs {
                self.extractor.timeout_secs = timeout_secs;
            }
            if let Some(max_retries) = extractor.max_retries {
                self.extractor.max_retries = max_retries;
            }
        }

        if let Some(gateway) = patch.gateway {
            if let Some(enabled) = gateway.enabled {
                self.gateway.enabled = enabled;
            }
            if let Some(base_url) = gateway.base_url {
                self.gateway.base_url = base_url;
            }
            if let Some(api_key) = gateway.api_key {
                self.gateway.api_key = Some(secret_value(api_key));
            }
            if let Some(instance_name) = gateway.instance_name {
                self.gateway.instance_name = instance_name;
            }
            if let Some(monitored_number) = gateway.monitored_number {
                self.gateway.monitored_number = Some(monitored_number);
            }
            if let Some(timeout_secs) = gateway.timeout_secs {
                self.gateway.timeout_secs = timeout_secs;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
        }

        if let Some(engine) = patch.engine {
            if let Some(simulate) = engine.simulate {
                self.engine.simulate = simulate;
            }
            if let Some(create_policy) = engine.create_policy {
                self.engine.create_policy = create_policy;
            }
            if let Some(placeholder_surname) = engine.placeholder_surname {
                self.engine.placeholder_surname = placeholder_surname;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("LEADFLOW_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("LEADFLOW_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = parse_u32("LEADFLOW_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("LEADFLOW_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("LEADFLOW_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("LEADFLOW_CRM_ENABLED") {
            self.crm.enabled = parse_bool("LEADFLOW_CRM_ENABLED", &value)?;
        }
        if let Some(value) = read_env("LEADFLOW_CRM_INSTANCE_URL") {
            self.crm.instance_url = Some(value);
        }
        if let Some(value) = read_env("LEADFLOW_CRM_ACCESS_TOKEN") {
            self.crm.access_token = Some(secret_value(value));
        }
        if let Some(value) = read_env("LEADFLOW_CRM_API_VERSION") {
            self.crm.api_version = value;
        }
        if let Some(value) = read_env("LEADFLOW_CRM_TIMEOUT_SECS") {
            self.crm.timeout_secs = parse_u64("LEADFLOW_CRM_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("LEADFLOW_CRM_DEFAULT_REGION") {
            self.crm.default_region = value;
        }

        if let Some(value) = read_env("LEADFLOW_EXTRACTOR_PROVIDER") {
            self.extractor.provider = value.parse()?;
        }
        if let Some(value) = read_env("LEADFLOW_EXTRACTOR_API_KEY") {
            self.extractor.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("LEADFLOW_EXTRACTOR_BASE_URL") {
            self.extractor.base_url = Some(value);
        }
        if let Some(value) = read_env("LEADFLOW_EXTRACTOR_MODEL") {
            self.extractor.model = value;
        }
        if let Some(value) = read_env("LEADFLOW_EXTRACTOR_TIMEOUT_SECS") {
            self.extractor.timeout_secs = parse_u64("LEADFLOW_EXTRACTOR_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("LEADFLOW_EXTRACTOR_MAX_RETRIES") {
            self.extractor.max_retries = parse_u32("LEADFLOW_EXTRACTOR_MAX_RETRIES", &value)?;
        }

        if let Some(value) = read_env("LEADFLOW_GATEWAY_ENABLED") {
            self.gateway.enabled = parse_bool("LEADFLOW_GATEWAY_ENABLED", &value)?;
        }
        if let Some(value) = read_env("LEADFLOW_GATEWAY_BASE_URL") {
            self.gateway.base_url = value;
        }
        if let Some(value) = read_env("LEADFLOW_GATEWAY_API_KEY") {
            self.gateway.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("LEADFLOW_GATEWAY_INSTANCE_NAME") {
            self.gateway.instance_name = value;
        }
        if let Some(value) = read_env("LEADFLOW_GATEWAY_MONITORED_NUMBER") {
            self.gateway.monitored_number = Some(value);
        }
        if let Some(value) = read_env("LEADFLOW_GATEWAY_TIMEOUT_SECS") {
            self.gateway.timeout_secs = parse_u64("LEADFLOW_GATEWAY_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("LEADFLOW_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("LEADFLOW_SERVER_PORT") {
            self.server.port = parse_u16("LEADFLOW_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("LEADFLOW_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("LEADFLOW_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        if let Some(value) = read_env("LEADFLOW_ENGINE_SIMULATE") {
            self.engine.simulate = parse_bool("LEADFLOW_ENGINE_SIMULATE", &value)?;
        }
        if let Some(value) = read_env("LEADFLOW_ENGINE_CREATE_POLICY") {
            self.engine.create_policy = value.parse()?;
        }
        if let Some(value) = read_env("LEADFLOW_ENGINE_PLACEHOLDER_SURNAME") {
            self.engine.placeholder_surname = value;
        }

        let log_level =
            read_env("LEADFLOW_LOGGING_LEVEL").or_else(|| read_env("LEADFLOW_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("LEADFLOW_LOGGING_FORMAT").or_else(|| read_env("LEADFLOW_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(simulate) = overrides.simulate {
            self.engine.simulate = simulate;
        }
        if let Some(enabled) = overrides.crm_enabled {
            self.crm.enabled = enabled;
        }
        if let Some(instance_url) = overrides.crm_instance_url {
            self.crm.instance_url = Some(instance_url);
        }
        if let Some(token) = overrides.crm_access_token {
            self.crm.access_token = Some(secret_value(token));
        }
        if let Some(provider) = overrides.extractor_provider {
            self.extractor.provider = provider;
        }
        if let Some(model) = overrides.extractor_model {
            self.extractor.model = model;
        }
        if let Some(enabled) = overrides.gateway_enabled {
            self.gateway.enabled = enabled;
        }
        if let Some(base_url) = overrides.gateway_base_url {
            self.gateway.base_url = base_url;
        }
        if let Some(api_key) = overrides.gateway_api_key {
            self.gateway.api_key = Some(secret_value(api_key));
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_crm(&self.crm)?;
        validate_extractor(&self.extractor)?;
        validate_gateway(&self.gateway)?;
        validate_server(&self.server)?;
        validate_engine(&self.engine)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("leadflow.toml"), PathBuf::from("config/leadflow.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_crm(crm: &CrmConfig) -> Result<(), ConfigError> {
    if crm.timeout_secs == 0 || crm.timeout_secs > 300 {
        return Err(ConfigError::Validation("crm.timeout_secs must be in range 1..=300".to_string()));
    }

    if Region::from_code(&crm.default_region).is_none() {
        return Err(ConfigError::Validation(format!(
            "crm.default_region `{}` is not supported (expected BR|US)",
            crm.default_region
        )));
    }

    if crm.enabled {
        let instance_ok = crm
            .instance_url
            .as_deref()
            .is_some_and(|url| url.starts_with("http://") || url.starts_with("https://"));
        if !instance_ok {
            return Err(ConfigError::Validation(
                "crm.enabled is true but crm.instance_url is missing or not an http(s) URL"
                    .to_string(),
            ));
        }

        let token_missing = crm
            .access_token
            .as_ref()
            .map(|token| token.expose_secret().trim().is_empty())
            .unwrap_or(true);
        if token_missing {
            return Err(ConfigError::Validation(
                "crm.enabled is true but crm.access_token is missing".to_string(),
            ));
        }
    }

    Ok(())
}

fn validate_extractor(extractor: &ExtractorConfig) -> Result<(), ConfigError> {
    if extractor.timeout_secs == 0 || extractor.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "extractor.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    match extractor.provider {
        ExtractorProvider::OpenAi | ExtractorProvider::Github => {
            let missing = extractor
                .api_key
                .as_ref()
                .map(|value| value.expose_secret().trim().is_empty())
                .unwrap_or(true);
            if missing {
                return Err(ConfigError::Validation(
                    "extractor.api_key is required for openai/github providers".to_string(),
                ));
            }
        }
        ExtractorProvider::Ollama => {
            let missing =
                extractor.base_url.as_ref().map(|value| value.trim().is_empty()).unwrap_or(true);
            if missing {
                return Err(ConfigError::Validation(
                    "extractor.base_url is required for the ollama provider".to_string(),
                ));
            }
        }
    }

    Ok(())
}

fn validate_gateway(gateway: &GatewayConfig) -> Result<(), ConfigError> {
    if gateway.timeout_secs == 0 || gateway.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "gateway.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    if gateway.enabled {
        if !gateway.base_url.starts_with("http://") && !gateway.base_url.starts_with("https://") {
            return Err(ConfigError::Validation(
                "gateway.base_url must start with http:// or https://".to_string(),
            ));
        }

        let key_missing = gateway
            .api_key
            .as_ref()
            .map(|key| key.expose_secret().trim().is_empty())
            .unwrap_or(true);
        if key_missing {
            return Err(ConfigError::Validation(
                "gateway.enabled is true but gateway.api_key is missing".to_string(),
            ));
        }

        if gateway.instance_name.trim().is_empty() {
            return Err(ConfigError::Validation(
                "gateway.instance_name must not be empty".to_string(),
            ));
        }
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_engine(engine: &EngineConfig) -> Result<(), ConfigError> {
    if engine.placeholder_surname.trim().is_empty() {
        return Err(ConfigError::Validation(
            "engine.placeholder_surname must not be empty".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    value.parse::<bool>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    crm: Option<CrmPatch>,
    extractor: Option<ExtractorPatch>,
    gateway: Option<GatewayPatch>,
    server: Option<ServerPatch>,
    engine: Option<EnginePatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct CrmPatch {
    enabled: Option<bool>,
    instance_url: Option<String>,
    access_token: Option<String>,
    api_version: Option<String>,
    timeout_secs: Option<u64>,
    default_region: Option<String>,
    server_managed_fields: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
struct ExtractorPatch {
    provider: Option<ExtractorProvider>,
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    timeout_secs: Option<u64>,
    max_retries: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct GatewayPatch {
    enabled: Option<bool>,
    base_url: Option<String>,
    api_key: Option<String>,
    instance_name: Option<String>,
    monitored_number: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct EnginePatch {
    simulate: Option<bool>,
    create_policy: Option<CreatePolicy>,
    placeholder_surname: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;
    use std::io;
    use std::sync::{Mutex, OnceLock};

    use secrecy::ExposeSecret;
    use tempfile::TempDir;

    use super::{AppConfig, ConfigError, ConfigOverrides, CreatePolicy, LoadOptions, LogFormat};

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    fn env_lock() -> &'static Mutex<()> {
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    fn clear_vars(vars: &[&str]) {
        for var in vars {
            env::remove_var(var);
        }
    }

    fn ensure(condition: bool, message: &'static str) -> Result<(), String> {
        if condition {
            Ok(())
        } else {
            Err(message.to_string())
        }
    }

    #[test]
    fn file_load_supports_env_interpolation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TEST_CRM_TOKEN", "token-from-env");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("leadflow.toml");
            fs::write(
                &path,
                r#"
[crm]
enabled = true
instance_url = "https://example.my.crm"
access_token = "${TEST_CRM_TOKEN}"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            let token = config
                .crm
                .access_token
                .as_ref()
                .map(|token| token.expose_secret().to_string())
                .unwrap_or_default();
            ensure(token == "token-from-env", "crm token should be loaded from environment")?;
            Ok(())
        })();

        clear_vars(&["TEST_CRM_TOKEN"]);
        result
    }

    #[test]
    fn precedence_defaults_file_env_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("LEADFLOW_DATABASE_URL", "sqlite://from-env.db");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("leadflow.toml");
            fs::write(
                &path,
                r#"
[database]
url = "sqlite://from-file.db"

[logging]
level = "warn"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config = AppConfig::load(LoadOptions {
                config_path: Some(path),
                overrides: ConfigOverrides {
                    database_url: Some("sqlite://from-override.db".to_string()),
                    log_level: Some("debug".to_string()),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.database.url == "sqlite://from-override.db",
                "override database url should win",
            )?;
            ensure(config.logging.level == "debug", "overridden log level should be debug")?;
            Ok(())
        })();

        clear_vars(&["LEADFLOW_DATABASE_URL"]);
        result
    }

    #[test]
    fn crm_enabled_requires_instance_and_token() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("LEADFLOW_CRM_ENABLED", "true");

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => {
                    return Err("expected validation failure but config load succeeded".to_string())
                }
                Err(error) => error,
            };
            let has_message = matches!(
                error,
                ConfigError::Validation(ref message) if message.contains("crm.instance_url")
            );
            ensure(has_message, "validation failure should mention crm.instance_url")
        })();

        clear_vars(&["LEADFLOW_CRM_ENABLED"]);
        result
    }

    #[test]
    fn unsupported_region_fails_validation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("LEADFLOW_CRM_DEFAULT_REGION", "ZZ");

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => return Err("expected region validation failure".to_string()),
                Err(error) => error,
            };
            let has_message = matches!(
                error,
                ConfigError::Validation(ref message) if message.contains("default_region")
            );
            ensure(has_message, "validation failure should mention default_region")
        })();

        clear_vars(&["LEADFLOW_CRM_DEFAULT_REGION"]);
        result
    }

    #[test]
    fn engine_policy_parses_from_env() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("LEADFLOW_ENGINE_CREATE_POLICY", "require_identity");
        env::set_var("LEADFLOW_ENGINE_SIMULATE", "true");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.engine.create_policy == CreatePolicy::RequireIdentity,
                "create policy should come from env",
            )?;
            ensure(config.engine.simulate, "simulate flag should come from env")?;
            Ok(())
        })();

        clear_vars(&["LEADFLOW_ENGINE_CREATE_POLICY", "LEADFLOW_ENGINE_SIMULATE"]);
        result
    }

    #[test]
    fn secret_values_are_not_leaked_by_debug() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("LEADFLOW_CRM_INSTANCE_URL", "https://example.my.crm");
        env::set_var("LEADFLOW_CRM_ACCESS_TOKEN", "crm-secret-value");
        env::set_var("LEADFLOW_CRM_ENABLED", "true");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;
            let debug = format!("{config:?}");

            ensure(!debug.contains("crm-secret-value"), "debug output should not contain token")?;
            ensure(
                matches!(config.logging.format, LogFormat::Compact),
                "default logging format should be compact",
            )?;
            Ok(())
        })();

        clear_vars(&[
            "LEADFLOW_CRM_INSTANCE_URL",
            "LEADFLOW_CRM_ACCESS_TOKEN",
            "LEADFLOW_CRM_ENABLED",
        ]);
        result
    }
}
