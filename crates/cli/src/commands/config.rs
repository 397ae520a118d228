use std::env;
use std::fs;
use std::path::Path;

use secrecy::ExposeSecret;
use toml::Value;
use vendedor_core::config::{resolve_config_path, AppConfig, LoadOptions};

use crate::commands::{CommandResult, EXIT_CONFIG};

struct Field {
    key: &'static str,
    value: String,
    env_keys: &'static [&'static str],
    overridden: bool,
}

pub fn run(options: LoadOptions) -> CommandResult {
    let config_file_path = resolve_config_path(options.config_path.as_deref());
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());
    let catalog_overridden = options.overrides.catalog_path.is_some();
    let level_overridden = options.overrides.log_level.is_some();

    let config = match AppConfig::load(options) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult {
                exit_code: EXIT_CONFIG,
                output: format!("config validation failed: {error}"),
            }
        }
    };

    let mut lines =
        vec!["effective config (source precedence: flag > env > file > default):".to_string()];
    for field in fields(&config, catalog_overridden, level_overridden) {
        let source = if field.overridden {
            "flag".to_string()
        } else {
            field_source(
                field.key,
                field.env_keys,
                config_file_doc.as_ref(),
                config_file_path.as_deref(),
            )
        };
        lines.push(render_line(field.key, &field.value, source));
    }

    CommandResult { exit_code: 0, output: lines.join("\n") }
}

fn fields(config: &AppConfig, catalog_overridden: bool, level_overridden: bool) -> Vec<Field> {
    let api_key = match &config.llm.api_key {
        Some(key) => redact_key(key.expose_secret()),
        None => "<unset>".to_string(),
    };
    let category_budgets = config
        .catalog
        .category_budgets
        .iter()
        .map(|(category, budget)| format!("{category}={budget}"))
        .collect::<Vec<_>>()
        .join(", ");

    vec![
        field("llm.provider", config.llm.provider.as_str().to_string(), &["VENDEDOR_LLM_PROVIDER"]),
        field("llm.model", config.llm.model.clone(), &["VENDEDOR_LLM_MODEL"]),
        field(
            "llm.base_url",
            config.llm.effective_base_url().to_string(),
            &["VENDEDOR_LLM_BASE_URL"],
        ),
        field("llm.api_key", api_key, &["VENDEDOR_LLM_API_KEY", "VENDEDOR_OPENROUTER_KEY"]),
        field("llm.temperature", config.llm.temperature.to_string(), &["VENDEDOR_LLM_TEMPERATURE"]),
        field("llm.max_tokens", config.llm.max_tokens.to_string(), &["VENDEDOR_LLM_MAX_TOKENS"]),
        field(
            "llm.timeout_secs",
            config.llm.timeout_secs.to_string(),
            &["VENDEDOR_LLM_TIMEOUT_SECS"],
        ),
        field("llm.max_retries", config.llm.max_retries.to_string(), &["VENDEDOR_LLM_MAX_RETRIES"]),
        Field {
            overridden: catalog_overridden,
            ..field(
                "catalog.path",
                config.catalog.path.display().to_string(),
                &["VENDEDOR_CATALOG_PATH"],
            )
        },
        field(
            "catalog.cache_ttl_secs",
            config.catalog.cache_ttl_secs.to_string(),
            &["VENDEDOR_CATALOG_CACHE_TTL_SECS"],
        ),
        field(
            "catalog.default_budget",
            config.catalog.default_budget.to_string(),
            &["VENDEDOR_CATALOG_DEFAULT_BUDGET"],
        ),
        field("catalog.category_budgets", category_budgets, &[]),
        field("agent.store_name", config.agent.store_name.clone(), &["VENDEDOR_AGENT_STORE_NAME"]),
        field(
            "agent.history_window",
            config.agent.history_window.to_string(),
            &["VENDEDOR_AGENT_HISTORY_WINDOW"],
        ),
        field(
            "agent.max_questions_per_turn",
            config.agent.max_questions_per_turn.to_string(),
            &["VENDEDOR_AGENT_MAX_QUESTIONS_PER_TURN"],
        ),
        field(
            "agent.max_recommended_products",
            config.agent.max_recommended_products.to_string(),
            &["VENDEDOR_AGENT_MAX_RECOMMENDED_PRODUCTS"],
        ),
        field(
            "agent.recommendation_max_words",
            config.agent.recommendation_max_words.to_string(),
            &["VENDEDOR_AGENT_RECOMMENDATION_MAX_WORDS"],
        ),
        Field {
            overridden: level_overridden,
            ..field(
                "logging.level",
                config.logging.level.clone(),
                &["VENDEDOR_LOGGING_LEVEL", "VENDEDOR_LOG_LEVEL"],
            )
        },
        field(
            "logging.format",
            format!("{:?}", config.logging.format).to_lowercase(),
            &["VENDEDOR_LOGGING_FORMAT", "VENDEDOR_LOG_FORMAT"],
        ),
    ]
}

fn field(key: &'static str, value: String, env_keys: &'static [&'static str]) -> Field {
    Field { key, value, env_keys, overridden: false }
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
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

const KEY_SCHEMES: [&str; 3] = ["sk-or-v1-", "sk-or-", "sk-"];

/// Keeps a known key scheme such as `sk-or-` and hides the rest.
fn redact_key(key: &str) -> String {
    let trimmed = key.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    KEY_SCHEMES
        .iter()
        .find(|scheme| trimmed.len() > scheme.len() && trimmed.starts_with(*scheme))
        .map(|scheme| format!("{scheme}***"))
        .unwrap_or_else(|| "<redacted>".to_string())
}

#[cfg(test)]
mod tests {
    use toml::Value;

    use super::{contains_path, redact_key};

    #[test]
    fn redaction_keeps_only_known_schemes() {
        assert_eq!(redact_key("sk-or-v1abcdef"), "sk-or-***");
        assert_eq!(redact_key("sk-or-v1-abc"), "sk-or-v1-***");
        assert_eq!(redact_key("sk-abcdef"), "sk-***");
        assert_eq!(redact_key("SECRET-x"), "<redacted>");
        assert_eq!(redact_key("sk-"), "<redacted>");
        assert_eq!(redact_key("plainsecret"), "<redacted>");
        assert_eq!(redact_key("   "), "<empty>");
    }

    #[test]
    fn dotted_paths_resolve_inside_tables() {
        let doc = "[catalog]\npath = \"x.csv\"\n".parse::<Value>().expect("toml");
        assert!(contains_path(&doc, "catalog.path"));
        assert!(!contains_path(&doc, "catalog.cache_ttl_secs"));
        assert!(!contains_path(&doc, "llm.model"));
    }
}
