use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use orderly_core::config::{AppConfig, LoadOptions};
use secrecy::ExposeSecret;
use toml::Value;

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());
    let source = |key_path: &str, env_key: &str| {
        field_source(key_path, env_key, config_file_doc.as_ref(), config_file_path.as_deref())
    };

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];

    lines.push(render_line(
        "database.url",
        &config.database.url,
        source("database.url", "ORDERLY_DATABASE_URL"),
    ));
    lines.push(render_line(
        "database.max_connections",
        &config.database.max_connections.to_string(),
        source("database.max_connections", "ORDERLY_DATABASE_MAX_CONNECTIONS"),
    ));

    lines.push(render_line(
        "discord.bot_token",
        &redact_token(config.discord.bot_token.expose_secret()),
        source("discord.bot_token", "ORDERLY_DISCORD_BOT_TOKEN"),
    ));
    lines.push(render_line(
        "discord.guild_id",
        &config.discord.guild_id.to_string(),
        source("discord.guild_id", "ORDERLY_GUILD_ID"),
    ));
    lines.push(render_line(
        "discord.admin_role_id",
        &config.discord.admin_role_id.to_string(),
        source("discord.admin_role_id", "ORDERLY_ADMIN_ROLE_ID"),
    ));
    lines.push(render_line(
        "discord.admin_channel_id",
        &config.discord.admin_channel_id.to_string(),
        source("discord.admin_channel_id", "ORDERLY_ADMIN_CHANNEL_ID"),
    ));
    lines.push(render_line(
        "discord.worker_channel_id",
        &config.discord.worker_channel_id.to_string(),
        source("discord.worker_channel_id", "ORDERLY_WORKER_CHANNEL_ID"),
    ));

    lines.push(render_line(
        "workflow.stale_after_hours",
        &config.workflow.stale_after_hours.to_string(),
        source("workflow.stale_after_hours", "ORDERLY_STALE_AFTER_HOURS"),
    ));
    lines.push(render_line(
        "workflow.name_tie_break",
        &format!("{:?}", config.workflow.name_tie_break),
        source("workflow.name_tie_break", "ORDERLY_NAME_TIE_BREAK"),
    ));

    lines.push(render_line(
        "server.bind_address",
        &config.server.bind_address,
        source("server.bind_address", "ORDERLY_SERVER_BIND_ADDRESS"),
    ));
    lines.push(render_line(
        "server.health_check_port",
        &config.server.health_check_port.to_string(),
        source("server.health_check_port", "ORDERLY_SERVER_HEALTH_CHECK_PORT"),
    ));

    lines.push(render_line(
        "logging.level",
        &config.logging.level,
        source("logging.level", "ORDERLY_LOGGING_LEVEL"),
    ));
    lines.push(render_line(
        "logging.format",
        &format!("{:?}", config.logging.format),
        source("logging.format", "ORDERLY_LOGGING_FORMAT"),
    ));

    lines.join("\n")
}

fn detect_config_path() -> Option<PathBuf> {
    let root = PathBuf::from("orderly.toml");
    if root.exists() {
        return Some(root);
    }

    let nested = PathBuf::from("config/orderly.toml");
    if nested.exists() {
        return Some(nested);
    }

    None
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_key: &str,
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if env::var_os(env_key).is_some() {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

fn redact_token(token: &str) -> String {
    let trimmed = token.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    if let Some((prefix, _)) = trimmed.split_once('-') {
        return format!("{prefix}-***");
    }

    "<redacted>".to_string()
}

#[cfg(test)]
mod tests {
    use super::redact_token;

    #[test]
    fn tokens_never_render_in_full() {
        assert_eq!(redact_token(""), "<empty>");
        assert_eq!(redact_token("bot-abc123"), "bot-***");
        assert_eq!(redact_token("opaquetoken"), "<redacted>");
    }
}
