use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub llm: LlmConfig,
    pub server: ServerConfig,
    pub agent: AgentConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub api_key: Option<SecretString>,
    pub base_url: Option<String>,
    pub model: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub health_check_port: u16,
    pub graceful_shutdown_secs: u64,
}

/// Per-turn bounds for context assembly and the tool loop.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AgentConfig {
    pub history_limit: u32,
    pub max_message_chars: usize,
    pub resumable_window_hours: i64,
    pub max_tool_rounds: u32,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmProvider {
    OpenAi,
    Anthropic,
    Ollama,
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
    pub llm_provider: Option<LlmProvider>,
    pub llm_model: Option<String>,
    pub llm_api_key: Option<String>,
    pub history_limit: Option<u32>,
    pub max_tool_rounds: Option<u32>,
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

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            history_limit: 10,
            max_message_chars: 2000,
            resumable_window_hours: 24,
            max_tool_rounds: 3,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://souschef.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            llm: LlmConfig {
                provider: LlmProvider::Ollama,
                api_key: None,
                base_url: Some("http://localhost:11434".to_string()),
                model: "llama3.1".to_string(),
                timeout_secs: 30,
                max_retries: 2,
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                health_check_port: 8080,
                graceful_shutdown_secs: 15,
            },
            agent: AgentConfig::default(),
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl FromStr for LlmProvider {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "anthropic" => Ok(Self::Anthropic),
            "ollama" => Ok(Self::Ollama),
            other => Err(ConfigError::Validation(format!(
                "unsupported llm provider `{other}` (expected openai|anthropic|ollama)"
            ))),
        }
    }
}

impl FromStr for LogFormat {
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
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("souschef.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        let ConfigPatch { database, llm, server, agent, logging } = patch;

        if let Some(database) = database {
            merge(&mut self.database.url, database.url);
            merge(&mut self.database.max_connections, database.max_connections);
            merge(&mut self.database.timeout_secs, database.timeout_secs);
        }
        if let Some(llm) = llm {
            merge(&mut self.llm.provider, llm.provider);
            merge_some(&mut self.llm.api_key, llm.api_key.map(secret_value));
            merge_some(&mut self.llm.base_url, llm.base_url);
            merge(&mut self.llm.model, llm.model);
            merge(&mut self.llm.timeout_secs, llm.timeout_secs);
            merge(&mut self.llm.max_retries, llm.max_retries);
        }
        if let Some(server) = server {
            merge(&mut self.server.bind_address, server.bind_address);
            merge(&mut self.server.health_check_port, server.health_check_port);
            merge(&mut self.server.graceful_shutdown_secs, server.graceful_shutdown_secs);
        }
        if let Some(agent) = agent {
            merge(&mut self.agent.history_limit, agent.history_limit);
            merge(&mut self.agent.max_message_chars, agent.max_message_chars);
            merge(&mut self.agent.resumable_window_hours, agent.resumable_window_hours);
            merge(&mut self.agent.max_tool_rounds, agent.max_tool_rounds);
        }
        if let Some(logging) = logging {
            merge(&mut self.logging.level, logging.level);
            merge(&mut self.logging.format, logging.format);
        }
    }

    /// `SOUSCHEF_<SECTION>_<KEY>` variables, applied after the file.
    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        merge(&mut self.database.url, read_env("SOUSCHEF_DATABASE_URL"));
        merge(&mut self.database.max_connections, env_value("SOUSCHEF_DATABASE_MAX_CONNECTIONS")?);
        merge(&mut self.database.timeout_secs, env_value("SOUSCHEF_DATABASE_TIMEOUT_SECS")?);

        merge(&mut self.llm.provider, env_value("SOUSCHEF_LLM_PROVIDER")?);
        merge_some(&mut self.llm.api_key, read_env("SOUSCHEF_LLM_API_KEY").map(secret_value));
        merge_some(&mut self.llm.base_url, read_env("SOUSCHEF_LLM_BASE_URL"));
        merge(&mut self.llm.model, read_env("SOUSCHEF_LLM_MODEL"));
        merge(&mut self.llm.timeout_secs, env_value("SOUSCHEF_LLM_TIMEOUT_SECS")?);
        merge(&mut self.llm.max_retries, env_value("SOUSCHEF_LLM_MAX_RETRIES")?);

        merge(&mut self.server.bind_address, read_env("SOUSCHEF_SERVER_BIND_ADDRESS"));
        merge(&mut self.server.health_check_port, env_value("SOUSCHEF_SERVER_HEALTH_CHECK_PORT")?);
        merge(
            &mut self.server.graceful_shutdown_secs,
            env_value("SOUSCHEF_SERVER_GRACEFUL_SHUTDOWN_SECS")?,
        );

        merge(&mut self.agent.history_limit, env_value("SOUSCHEF_AGENT_HISTORY_LIMIT")?);
        merge(&mut self.agent.max_message_chars, env_value("SOUSCHEF_AGENT_MAX_MESSAGE_CHARS")?);
        merge(
            &mut self.agent.resumable_window_hours,
            env_value("SOUSCHEF_AGENT_RESUMABLE_WINDOW_HOURS")?,
        );
        merge(&mut self.agent.max_tool_rounds, env_value("SOUSCHEF_AGENT_MAX_TOOL_ROUNDS")?);

        merge(
            &mut self.logging.level,
            read_env("SOUSCHEF_LOGGING_LEVEL").or_else(|| read_env("SOUSCHEF_LOG_LEVEL")),
        );
        let log_format = read_env("SOUSCHEF_LOGGING_FORMAT").or_else(|| read_env("SOUSCHEF_LOG_FORMAT"));
        merge(&mut self.logging.format, log_format.map(|value| value.parse()).transpose()?);

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        merge(&mut self.database.url, overrides.database_url);
        merge(&mut self.logging.level, overrides.log_level);
        merge(&mut self.llm.provider, overrides.llm_provider);
        merge(&mut self.llm.model, overrides.llm_model);
        merge_some(&mut self.llm.api_key, overrides.llm_api_key.map(secret_value));
        merge(&mut self.agent.history_limit, overrides.history_limit);
        merge(&mut self.agent.max_tool_rounds, overrides.max_tool_rounds);
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_llm(&self.llm)?;
        validate_server(&self.server)?;
        validate_agent(&self.agent)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("souschef.toml"), PathBuf::from("config/souschef.toml")]
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
    if !(url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:") {
        return invalid(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)",
        );
    }
    check(database.max_connections > 0, "database.max_connections must be greater than zero")?;
    check((1..=300).contains(&database.timeout_secs), "database.timeout_secs must be in range 1..=300")
}

fn validate_llm(llm: &LlmConfig) -> Result<(), ConfigError> {
    check((1..=300).contains(&llm.timeout_secs), "llm.timeout_secs must be in range 1..=300")?;
    check(!llm.model.trim().is_empty(), "llm.model must not be empty")?;

    match llm.provider {
        LlmProvider::OpenAi | LlmProvider::Anthropic => check(
            llm.api_key.as_ref().is_some_and(|key| !key.expose_secret().trim().is_empty()),
            "llm.api_key is required for openai/anthropic providers",
        ),
        LlmProvider::Ollama => check(
            llm.base_url.as_deref().is_some_and(|url| !url.trim().is_empty()),
            "llm.base_url is required for ollama provider",
        ),
    }
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    check(server.health_check_port > 0, "server.health_check_port must be greater than zero")?;
    check(
        server.graceful_shutdown_secs > 0,
        "server.graceful_shutdown_secs must be greater than zero",
    )
}

fn validate_agent(agent: &AgentConfig) -> Result<(), ConfigError> {
    check((1..=50).contains(&agent.history_limit), "agent.history_limit must be in range 1..=50")?;
    check(agent.max_message_chars >= 100, "agent.max_message_chars must be at least 100")?;
    check(
        agent.resumable_window_hours > 0,
        "agent.resumable_window_hours must be greater than zero",
    )?;
    check((1..=8).contains(&agent.max_tool_rounds), "agent.max_tool_rounds must be in range 1..=8")
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    check(
        matches!(level.as_str(), "trace" | "debug" | "info" | "warn" | "error"),
        "logging.level must be one of trace|debug|info|warn|error",
    )
}

fn check(condition: bool, message: &str) -> Result<(), ConfigError> {
    if condition {
        Ok(())
    } else {
        invalid(message)
    }
}

fn invalid(message: &str) -> Result<(), ConfigError> {
    Err(ConfigError::Validation(message.to_string()))
}

fn merge<T>(slot: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *slot = value;
    }
}

fn merge_some<T>(slot: &mut Option<T>, value: Option<T>) {
    if value.is_some() {
        *slot = value;
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

/// Parses a set variable; an unparseable value names the variable.
fn env_value<T: FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
    let Some(value) = read_env(key) else {
        return Ok(None);
    };
    match value.trim().parse::<T>() {
        Ok(parsed) => Ok(Some(parsed)),
        Err(_) => Err(ConfigError::InvalidEnvOverride { key: key.to_string(), value }),
    }
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    llm: Option<LlmPatch>,
    server: Option<ServerPatch>,
    agent: Option<AgentPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmPatch {
    provider: Option<LlmProvider>,
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    timeout_secs: Option<u64>,
    max_retries: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    health_check_port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct AgentPatch {
    history_limit: Option<u32>,
    max_message_chars: Option<usize>,
    resumable_window_hours: Option<i64>,
    max_tool_rounds: Option<u32>,
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

    use super::{AppConfig, ConfigError, ConfigOverrides, LlmProvider, LoadOptions, LogFormat};

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
    fn defaults_validate_without_any_file_or_env() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let config = AppConfig::load(LoadOptions::default())
            .map_err(|err| format!("config load failed: {err}"))?;

        ensure(config.agent.history_limit == 10, "history limit should default to 10")?;
        ensure(config.agent.max_message_chars == 2000, "message cap should default to 2000")?;
        ensure(config.agent.resumable_window_hours == 24, "resume window should be 24h")?;
        ensure(
            matches!(config.logging.format, LogFormat::Compact),
            "default logging format should be compact",
        )
    }

    #[test]
    fn file_load_supports_env_interpolation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TEST_SOUSCHEF_LLM_KEY", "sk-from-env");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("souschef.toml");
            fs::write(
                &path,
                r#"
[llm]
provider = "open_ai"
api_key = "${TEST_SOUSCHEF_LLM_KEY}"
model = "gpt-4o-mini"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.llm.provider == LlmProvider::OpenAi, "provider should come from file")?;
            ensure(
                config.llm.api_key.as_ref().map(|key| key.expose_secret() == "sk-from-env")
                    == Some(true),
                "api key should be interpolated from environment",
            )
        })();

        clear_vars(&["TEST_SOUSCHEF_LLM_KEY"]);
        result
    }

    #[test]
    fn precedence_defaults_file_env_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("SOUSCHEF_DATABASE_URL", "sqlite://from-env.db");
        env::set_var("SOUSCHEF_AGENT_HISTORY_LIMIT", "12");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("souschef.toml");
            fs::write(
                &path,
                r#"
[database]
url = "sqlite://from-file.db"

[agent]
history_limit = 6
max_tool_rounds = 2

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
            ensure(config.agent.history_limit == 12, "env history limit should beat the file")?;
            ensure(config.agent.max_tool_rounds == 2, "file tool rounds should beat defaults")
        })();

        clear_vars(&["SOUSCHEF_DATABASE_URL", "SOUSCHEF_AGENT_HISTORY_LIMIT"]);
        result
    }

    #[test]
    fn validation_fails_fast_with_actionable_error() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("SOUSCHEF_LLM_PROVIDER", "anthropic");

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => {
                    return Err("expected validation failure but config load succeeded".to_string())
                }
                Err(error) => error,
            };
            let has_message = matches!(
                error,
                ConfigError::Validation(ref message) if message.contains("llm.api_key")
            );
            ensure(has_message, "validation failure should mention llm.api_key")
        })();

        clear_vars(&["SOUSCHEF_LLM_PROVIDER"]);
        result
    }

    #[test]
    fn invalid_numeric_env_override_is_reported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("SOUSCHEF_AGENT_MAX_TOOL_ROUNDS", "many");

        let result = match AppConfig::load(LoadOptions::default()) {
            Err(ConfigError::InvalidEnvOverride { key, .. }) => {
                ensure(key == "SOUSCHEF_AGENT_MAX_TOOL_ROUNDS", "error should name the variable")
            }
            Err(other) => Err(format!("unexpected error: {other}")),
            Ok(_) => Err("expected invalid override error".to_string()),
        };

        clear_vars(&["SOUSCHEF_AGENT_MAX_TOOL_ROUNDS"]);
        result
    }

    #[test]
    fn secret_values_are_not_leaked_by_debug() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let config = AppConfig::load(LoadOptions {
            overrides: ConfigOverrides {
                llm_provider: Some(LlmProvider::OpenAi),
                llm_api_key: Some("sk-secret-value".to_string()),
                ..ConfigOverrides::default()
            },
            ..LoadOptions::default()
        })
        .map_err(|err| format!("config load failed: {err}"))?;
        let debug = format!("{config:?}");

        ensure(!debug.contains("sk-secret-value"), "debug output should not contain api key")
    }
}
