use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub discord: DiscordConfig,
    pub workflow: WorkflowConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct DiscordConfig {
    pub bot_token: SecretString,
    pub guild_id: u64,
    pub admin_role_id: u64,
    pub admin_channel_id: u64,
    pub worker_channel_id: u64,
    pub api_base_url: String,
}

/// Timings of the order workflow. Short waits are seconds; the stale sweep
/// and stage TTL operate at wall-clock scale.
#[derive(Clone, Debug)]
pub struct WorkflowConfig {
    pub rate_limit_backoff_secs: u64,
    pub pacing_delay_secs: u64,
    pub stale_sweep_interval_secs: u64,
    pub stale_after_hours: u64,
    pub reason_timeout_secs: u64,
    pub archive_delay_secs: u64,
    pub stage_ttl_hours: u64,
    pub name_tie_break: NameTieBreak,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub health_check_port: u16,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

/// Policy for resolving a customer name that matches several guild members.
/// `FirstMatch` keeps the storefront's historical behavior (first entry in
/// listing order); `RejectAmbiguous` turns the collision into a resolve
/// failure so the admin channel is alerted instead of a possible
/// misdelivery.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NameTieBreak {
    #[default]
    FirstMatch,
    RejectAmbiguous,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub bot_token: Option<String>,
    pub guild_id: Option<u64>,
    pub admin_role_id: Option<u64>,
    pub admin_channel_id: Option<u64>,
    pub worker_channel_id: Option<u64>,
    pub log_level: Option<String>,
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

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://orderly.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            discord: DiscordConfig {
                bot_token: String::new().into(),
                guild_id: 0,
                admin_role_id: 0,
                admin_channel_id: 0,
                worker_channel_id: 0,
                api_base_url: "https://discord.com/api/v10".to_string(),
            },
            workflow: WorkflowConfig {
                rate_limit_backoff_secs: 5,
                pacing_delay_secs: 2,
                stale_sweep_interval_secs: 1_800,
                stale_after_hours: 24,
                reason_timeout_secs: 300,
                archive_delay_secs: 300,
                stage_ttl_hours: 72,
                name_tie_break: NameTieBreak::FirstMatch,
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                health_check_port: 8080,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
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

impl std::str::FromStr for NameTieBreak {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "first_match" => Ok(Self::FirstMatch),
            "reject_ambiguous" => Ok(Self::RejectAmbiguous),
            other => Err(ConfigError::Validation(format!(
                "unsupported tie break `{other}` (expected first_match|reject_ambiguous)"
            ))),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    discord: Option<DiscordPatch>,
    workflow: Option<WorkflowPatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct DiscordPatch {
    bot_token: Option<String>,
    guild_id: Option<u64>,
    admin_role_id: Option<u64>,
    admin_channel_id: Option<u64>,
    worker_channel_id: Option<u64>,
    api_base_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct WorkflowPatch {
    rate_limit_backoff_secs: Option<u64>,
    pacing_delay_secs: Option<u64>,
    stale_sweep_interval_secs: Option<u64>,
    stale_after_hours: Option<u64>,
    reason_timeout_secs: Option<u64>,
    archive_delay_secs: Option<u64>,
    stage_ttl_hours: Option<u64>,
    name_tie_break: Option<NameTieBreak>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    health_check_port: Option<u16>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("orderly.toml"));
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

        if let Some(discord) = patch.discord {
            if let Some(bot_token_value) = discord.bot_token {
                self.discord.bot_token = secret_value(bot_token_value);
            }
            if let Some(guild_id) = discord.guild_id {
                self.discord.guild_id = guild_id;
            }
            if let Some(admin_role_id) = discord.admin_role_id {
                self.discord.admin_role_id = admin_role_id;
            }
            if let Some(admin_channel_id) = discord.admin_channel_id {
                self.discord.admin_channel_id = admin_channel_id;
            }
            if let Some(worker_channel_id) = discord.worker_channel_id {
                self.discord.worker_channel_id = worker_channel_id;
            }
            if let Some(api_base_url) = discord.api_base_url {
                self.discord.api_base_url = api_base_url;
            }
        }

        if let Some(workflow) = patch.workflow {
            if let Some(value) = workflow.rate_limit_backoff_secs {
                self.workflow.rate_limit_backoff_secs = value;
            }
            if let Some(value) = workflow.pacing_delay_secs {
                self.workflow.pacing_delay_secs = value;
            }
            if let Some(value) = workflow.stale_sweep_interval_secs {
                self.workflow.stale_sweep_interval_secs = value;
            }
            if let Some(value) = workflow.stale_after_hours {
                self.workflow.stale_after_hours = value;
            }
            if let Some(value) = workflow.reason_timeout_secs {
                self.workflow.reason_timeout_secs = value;
            }
            if let Some(value) = workflow.archive_delay_secs {
                self.workflow.archive_delay_secs = value;
            }
            if let Some(value) = workflow.stage_ttl_hours {
                self.workflow.stage_ttl_hours = value;
            }
            if let Some(value) = workflow.name_tie_break {
                self.workflow.name_tie_break = value;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(health_check_port) = server.health_check_port {
                self.server.health_check_port = health_check_port;
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
        if let Some(value) = read_env("ORDERLY_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("ORDERLY_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections =
                parse_u32("ORDERLY_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("ORDERLY_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("ORDERLY_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("ORDERLY_DISCORD_BOT_TOKEN") {
            self.discord.bot_token = secret_value(value);
        }
        if let Some(value) = read_env("ORDERLY_GUILD_ID") {
            self.discord.guild_id = parse_u64("ORDERLY_GUILD_ID", &value)?;
        }
        if let Some(value) = read_env("ORDERLY_ADMIN_ROLE_ID") {
            self.discord.admin_role_id = parse_u64("ORDERLY_ADMIN_ROLE_ID", &value)?;
        }
        if let Some(value) = read_env("ORDERLY_ADMIN_CHANNEL_ID") {
            self.discord.admin_channel_id = parse_u64("ORDERLY_ADMIN_CHANNEL_ID", &value)?;
        }
        if let Some(value) = read_env("ORDERLY_WORKER_CHANNEL_ID") {
            self.discord.worker_channel_id = parse_u64("ORDERLY_WORKER_CHANNEL_ID", &value)?;
        }
        if let Some(value) = read_env("ORDERLY_DISCORD_API_BASE_URL") {
            self.discord.api_base_url = value;
        }

        if let Some(value) = read_env("ORDERLY_STALE_AFTER_HOURS") {
            self.workflow.stale_after_hours = parse_u64("ORDERLY_STALE_AFTER_HOURS", &value)?;
        }
        if let Some(value) = read_env("ORDERLY_NAME_TIE_BREAK") {
            self.workflow.name_tie_break = value.parse()?;
        }

        if let Some(value) = read_env("ORDERLY_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("ORDERLY_SERVER_HEALTH_CHECK_PORT") {
            self.server.health_check_port =
                parse_u16("ORDERLY_SERVER_HEALTH_CHECK_PORT", &value)?;
        }

        let log_level =
            read_env("ORDERLY_LOGGING_LEVEL").or_else(|| read_env("ORDERLY_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("ORDERLY_LOGGING_FORMAT").or_else(|| read_env("ORDERLY_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(bot_token) = overrides.bot_token {
            self.discord.bot_token = secret_value(bot_token);
        }
        if let Some(guild_id) = overrides.guild_id {
            self.discord.guild_id = guild_id;
        }
        if let Some(admin_role_id) = overrides.admin_role_id {
            self.discord.admin_role_id = admin_role_id;
        }
        if let Some(admin_channel_id) = overrides.admin_channel_id {
            self.discord.admin_channel_id = admin_channel_id;
        }
        if let Some(worker_channel_id) = overrides.worker_channel_id {
            self.discord.worker_channel_id = worker_channel_id;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_discord(&self.discord)?;
        validate_workflow(&self.workflow)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    if let Some(from_env) = read_env("ORDERLY_CONFIG") {
        let path = PathBuf::from(from_env);
        return path.exists().then_some(path);
    }

    [PathBuf::from("orderly.toml"), PathBuf::from("config/orderly.toml")]
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

fn validate_discord(discord: &DiscordConfig) -> Result<(), ConfigError> {
    if discord.bot_token.expose_secret().trim().is_empty() {
        return Err(ConfigError::Validation("discord.bot_token must be set".to_string()));
    }

    for (field, value) in [
        ("discord.guild_id", discord.guild_id),
        ("discord.admin_role_id", discord.admin_role_id),
        ("discord.admin_channel_id", discord.admin_channel_id),
        ("discord.worker_channel_id", discord.worker_channel_id),
    ] {
        if value == 0 {
            return Err(ConfigError::Validation(format!("{field} must be set")));
        }
    }

    if discord.api_base_url.trim().is_empty() {
        return Err(ConfigError::Validation("discord.api_base_url must be set".to_string()));
    }

    Ok(())
}

fn validate_workflow(workflow: &WorkflowConfig) -> Result<(), ConfigError> {
    if workflow.stale_sweep_interval_secs == 0 {
        return Err(ConfigError::Validation(
            "workflow.stale_sweep_interval_secs must be greater than zero".to_string(),
        ));
    }
    if workflow.stale_after_hours == 0 {
        return Err(ConfigError::Validation(
            "workflow.stale_after_hours must be greater than zero".to_string(),
        ));
    }
    if workflow.reason_timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "workflow.reason_timeout_secs must be greater than zero".to_string(),
        ));
    }
    if workflow.stage_ttl_hours == 0 {
        return Err(ConfigError::Validation(
            "workflow.stage_ttl_hours must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    match logging.level.trim().to_ascii_lowercase().as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        other => Err(ConfigError::Validation(format!(
            "unsupported log level `{other}` (expected trace|debug|info|warn|error)"
        ))),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().map(|value| value.trim().to_string()).filter(|value| !value.is_empty())
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value
        .parse()
        .map_err(|_| ConfigError::InvalidEnvOverride { key: key.to_string(), value: value.to_string() })
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value
        .parse()
        .map_err(|_| ConfigError::InvalidEnvOverride { key: key.to_string(), value: value.to_string() })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value
        .parse()
        .map_err(|_| ConfigError::InvalidEnvOverride { key: key.to_string(), value: value.to_string() })
}
