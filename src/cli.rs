//! Command-line interface for openpipe
//!
//! Provides argument parsing and subcommand handling for the openpipe binary.

use crate::request::CompletionRequest;
use clap::{Parser, Subcommand};

/// Chat completions with OpenPipe routing and request reporting
#[derive(Parser)]
#[command(name = "openpipe")]
#[command(version)]
#[command(about = "Chat completions with OpenPipe routing and request reporting")]
#[command(
    long_about = "Sends chat completions to an OpenAI-compatible provider, or to the OpenPipe \
    API for models prefixed with 'openpipe:', and reports every call to OpenPipe."
)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "openpipe.toml", global = true)]
    pub config: String,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Run one chat completion
    Chat {
        /// Model identifier ("openpipe:<name>" routes to the OpenPipe API)
        #[arg(short, long)]
        model: String,

        /// User message
        #[arg(long)]
        message: String,

        /// Optional system message, sent first
        #[arg(long)]
        system: Option<String>,

        /// Stream the response
        #[arg(long)]
        stream: bool,

        /// Reporting tag as key=value (repeatable)
        #[arg(long = "tag", value_parser = parse_tag)]
        tags: Vec<(String, String)>,

        /// Print Prometheus metrics after the call
        #[arg(long)]
        print_metrics: bool,
    },

    /// Generate a template configuration file
    Config {
        /// Output file path (prints to stdout if not specified)
        #[arg(short, long)]
        output: Option<String>,
    },
}

/// Parse a `key=value` reporting tag
pub fn parse_tag(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(format!("invalid tag '{}', expected key=value", raw)),
    }
}

/// Build the request sent by the `chat` subcommand
pub fn build_chat_request(
    model: &str,
    system: Option<&str>,
    message: &str,
    stream: bool,
    tags: &[(String, String)],
) -> CompletionRequest {
    let mut request = CompletionRequest::new(model);
    if let Some(system) = system {
        request = request.system_message(system);
    }
    request = request.user_message(message);
    if stream {
        request = request.stream(true);
    }
    for (key, value) in tags {
        request = request.tag(key.as_str(), value.as_str());
    }
    request
}

/// Generate template configuration content
pub fn generate_config_template() -> &'static str {
    r#"# openpipe Configuration
# ======================
#
# Configures the wrapped provider, the OpenPipe API (routed models and the
# report sink), reporting and logging.

# ─────────────────────────────────────────────────────────────────────────────
# OPENPIPE API
# ─────────────────────────────────────────────────────────────────────────────
#
# Models named "openpipe:<name>" are sent to {base_url}/chat/completions.
# Every call is reported to {base_url}/report.

[openpipe]
# Must start with http:// or https:// and must not end with '/'
base_url = "https://app.openpipe.ai/api/v1"

# API key; falls back to the OPENPIPE_API_KEY environment variable
# api_key = "opk_..."

# ─────────────────────────────────────────────────────────────────────────────
# PROVIDER
# ─────────────────────────────────────────────────────────────────────────────
#
# OpenAI-compatible API used for every other model.

[provider]
base_url = "https://api.openai.com/v1"

# API key; falls back to the OPENAI_API_KEY environment variable
# api_key = "sk-..."

# Request timeout in seconds (1-600), also applied to routed calls
request_timeout_seconds = 60

# ─────────────────────────────────────────────────────────────────────────────
# REPORTING
# ─────────────────────────────────────────────────────────────────────────────

[reporting]
# Set to false to drop reports instead of sending them
enabled = true

# Report transmission timeout in seconds (1-60)
timeout_seconds = 10

# ─────────────────────────────────────────────────────────────────────────────
# OBSERVABILITY
# ─────────────────────────────────────────────────────────────────────────────

[observability]
# Log level: "trace", "debug", "info", "warn", "error"
# Report delivery failures are logged at "debug".
log_level = "info"
"#
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli() {
        // Clap's built-in verification for the CLI structure
        Cli::command().debug_assert();
    }

    #[test]
    fn default_config_path() {
        let cli = Cli::parse_from(["openpipe"]);
        assert_eq!(cli.config, "openpipe.toml");
        assert!(cli.command.is_none());
    }

    #[test]
    fn custom_config_path() {
        let cli = Cli::parse_from(["openpipe", "--config", "custom.toml"]);
        assert_eq!(cli.config, "custom.toml");
    }

    #[test]
    fn config_subcommand_with_output() {
        let cli = Cli::parse_from(["openpipe", "config", "-o", "my-config.toml"]);
        assert!(matches!(
            cli.command,
            Some(Command::Config { output: Some(ref path) }) if path == "my-config.toml"
        ));
    }

    #[test]
    fn chat_subcommand_collects_tags() {
        let cli = Cli::parse_from([
            "openpipe",
            "chat",
            "-m",
            "openpipe:my-model",
            "--message",
            "hi",
            "--tag",
            "prompt_id=greeting",
            "--tag",
            "env=dev",
            "--stream",
        ]);
        match cli.command {
            Some(Command::Chat {
                model,
                tags,
                stream,
                print_metrics,
                ..
            }) => {
                assert_eq!(model, "openpipe:my-model");
                assert_eq!(
                    tags,
                    vec![
                        ("prompt_id".to_string(), "greeting".to_string()),
                        ("env".to_string(), "dev".to_string())
                    ]
                );
                assert!(stream);
                assert!(!print_metrics);
            }
            _ => panic!("expected chat subcommand"),
        }
    }

    #[test]
    fn chat_subcommand_rejects_bad_tag() {
        let result = Cli::try_parse_from([
            "openpipe", "chat", "-m", "gpt-4", "--message", "hi", "--tag", "novalue",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn parse_tag_keeps_equals_in_value() {
        assert_eq!(
            parse_tag("query=a=b"),
            Ok(("query".to_string(), "a=b".to_string()))
        );
        assert!(parse_tag("=x").is_err());
    }

    #[test]
    fn build_chat_request_orders_messages() {
        let tags = vec![("prompt_id".to_string(), "greeting".to_string())];
        let request = build_chat_request("gpt-4", Some("be brief"), "hi", true, &tags);
        assert!(request.is_stream());
        let messages = request.get("messages").unwrap().as_array().unwrap();
        assert_eq!(messages[0]["role"], "system");
        assert_eq!(messages[1]["content"], "hi");
        let (_, options) = request.split_reporting_options().unwrap();
        assert_eq!(options.tag("prompt_id"), Some("greeting"));
    }

    #[test]
    fn template_is_valid_toml() {
        let template = generate_config_template();
        // Should parse without errors
        let result: Result<toml::Value, _> = toml::from_str(template);
        assert!(
            result.is_ok(),
            "Template should be valid TOML: {:?}",
            result.err()
        );
    }

    #[test]
    fn template_has_all_sections() {
        let template = generate_config_template();
        assert!(template.contains("[openpipe]"));
        assert!(template.contains("[provider]"));
        assert!(template.contains("[reporting]"));
        assert!(template.contains("[observability]"));
    }
}
