use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use rust_decimal::Decimal;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const CONFIG_FILE_CANDIDATES: [&str; 2] = ["vendedor.toml", "config/vendedor.toml"];

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub llm: LlmConfig,
    pub catalog: CatalogConfig,
    pub agent: AgentConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub api_key: Option<SecretString>,
    /// Falls back to the provider's public endpoint when unset.
    pub base_url: Option<String>,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

#[derive(Clone, Debug)]
pub struct CatalogConfig {
    pub path: PathBuf,
    pub cache_ttl_secs: u64,
    /// Ceiling applied when the customer never stated a budget and the
    /// category has no entry in `category_budgets`.
    pub default_budget: Decimal,
    pub category_budgets: BTreeMap<String, Decimal>,
}

#[derive(Clone, Debug)]
pub struct AgentConfig {
    pub store_name: String,
    pub history_window: usize,
    pub max_questions_per_turn: usize,
    pub max_recommended_products: usize,
    pub recommendation_max_words: usize,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmProvider {
    #[serde(alias = "openai")]
    OpenAi,
    #[serde(alias = "openrouter")]
    OpenRouter,
    Ollama,
}

impl LlmProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::OpenRouter => "openrouter",
            Self::Ollama => "ollama",
        }
    }

    pub fn default_base_url(&self) -> &'static str {
        match self {
            Self::OpenAi => "https://api.openai.com/v1",
            Self::OpenRouter => "https://openrouter.ai/api/v1",
            Self::Ollama => "http://localhost:11434/v1",
        }
    }
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
    pub log_level: Option<String>,
    pub llm_provider: Option<LlmProvider>,
    pub llm_model: Option<String>,
    pub llm_base_url: Option<String>,
    pub catalog_path: Option<PathBuf>,
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

fn default_category_budgets() -> BTreeMap<String, Decimal> {
    [
        ("televisor", 2_000_000),
        ("celular", 1_500_000),
        ("computador", 3_000_000),
        ("lavadora", 2_500_000),
        ("nevera", 3_500_000),
    ]
    .into_iter()
    .map(|(category, amount)| (category.to_string(), Decimal::new(amount, 0)))
    .collect()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            llm: LlmConfig {
                provider: LlmProvider::Ollama,
                api_key: None,
                base_url: None,
                model: "llama3.1".to_string(),
                temperature: 0.3,
                max_tokens: 700,
                timeout_secs: 30,
                max_retries: 2,
            },
            catalog: CatalogConfig {
                path: PathBuf::from("data/catalog.csv"),
                cache_ttl_secs: 300,
                default_budget: Decimal::new(2_000_000, 0),
                category_budgets: default_category_budgets(),
            },
            agent: AgentConfig {
                store_name: "Alkosto".to_string(),
                history_window: 3,
                max_questions_per_turn: 2,
                max_recommended_products: 5,
                recommendation_max_words: 300,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl CatalogConfig {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    /// Effective ceiling for a category when the customer has not stated one.
    pub fn default_budget_for(&self, category: &str) -> Decimal {
        self.category_budgets.get(category).copied().unwrap_or(self.default_budget)
    }
}

impl LlmConfig {
    pub fn effective_base_url(&self) -> &str {
        self.base_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .unwrap_or_else(|| self.provider.default_base_url())
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for LlmProvider {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "openai" | "open_ai" => Ok(Self::OpenAi),
            "openrouter" | "open_router" => Ok(Self::OpenRouter),
            "ollama" => Ok(Self::Ollama),
            other => Err(ConfigError::Validation(format!(
                "unsupported llm provider `{other}` (expected openai|openrouter|ollama)"
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
            let expected =
                options.config_path.unwrap_or_else(|| PathBuf::from(CONFIG_FILE_CANDIDATES[0]));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(llm) = patch.llm {
            if let Some(provider) = llm.provider {
                self.llm.provider = provider;
            }
            if let Some(llm_api_key_value) = llm.api_key {
                self.llm.api_key = Some(secret_value(llm_api_key_value));
            }
            if let Some(base_url) = llm.base_url {
                self.llm.base_url = Some(base_url);
            }
            if let Some(model) = llm.model {
                self.llm.model = model;
            }
            if let Some(temperature) = llm.temperature {
                self.llm.temperature = temperature;
            }
            if let Some(max_tokens) = llm.max_tokens {
                self.llm.max_tokens = max_tokens;
            }
            if let Some(timeout_secs) = llm.timeout_secs {
                self.llm.timeout_secs = timeout_secs;
            }
            if let Some(max_retries) = llm.max_retries {
                self.llm.max_retries = max_retries;
            }
        }

        if let Some(catalog) = patch.catalog {
            if let Some(path) = catalog.path {
                self.catalog.path = path;
            }
            if let Some(cache_ttl_secs) = catalog.cache_ttl_secs {
                self.catalog.cache_ttl_secs = cache_ttl_secs;
            }
            if let Some(default_budget) = catalog.default_budget {
                self.catalog.default_budget = default_budget;
            }
            if let Some(category_budgets) = catalog.category_budgets {
                self.catalog.category_budgets.extend(category_budgets);
            }
        }

        if let Some(agent) = patch.agent {
            if let Some(store_name) = agent.store_name {
                self.agent.store_name = store_name;
            }
            if let Some(history_window) = agent.history_window {
                self.agent.history_window = history_window;
            }
            if let Some(max_questions_per_turn) = agent.max_questions_per_turn {
                self.agent.max_questions_per_turn = max_questions_per_turn;
            }
            if let Some(max_recommended_products) = agent.max_recommended_products {
                self.agent.max_recommended_products = max_recommended_products;
            }
            if let Some(recommendation_max_words) = agent.recommendation_max_words {
                self.agent.recommendation_max_words = recommendation_max_words;
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
        if let Some(value) = read_env("VENDEDOR_LLM_PROVIDER") {
            self.llm.provider = value.parse()?;
        }
        if let Some(value) =
            read_env("VENDEDOR_LLM_API_KEY").or_else(|| read_env("VENDEDOR_OPENROUTER_KEY"))
        {
            self.llm.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("VENDEDOR_LLM_BASE_URL") {
            self.llm.base_url = Some(value);
        }
        if let Some(value) = read_env("VENDEDOR_LLM_MODEL") {
            self.llm.model = value;
        }
        if let Some(value) = read_env("VENDEDOR_LLM_TEMPERATURE") {
            self.llm.temperature = parse_env("VENDEDOR_LLM_TEMPERATURE", &value)?;
        }
        if let Some(value) = read_env("VENDEDOR_LLM_MAX_TOKENS") {
            self.llm.max_tokens = parse_env("VENDEDOR_LLM_MAX_TOKENS", &value)?;
        }
        if let Some(value) = read_env("VENDEDOR_LLM_TIMEOUT_SECS") {
            self.llm.timeout_secs = parse_env("VENDEDOR_LLM_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("VENDEDOR_LLM_MAX_RETRIES") {
            self.llm.max_retries = parse_env("VENDEDOR_LLM_MAX_RETRIES", &value)?;
        }

        if let Some(value) = read_env("VENDEDOR_CATALOG_PATH") {
            self.catalog.path = PathBuf::from(value);
        }
        if let Some(value) = read_env("VENDEDOR_CATALOG_CACHE_TTL_SECS") {
            self.catalog.cache_ttl_secs = parse_env("VENDEDOR_CATALOG_CACHE_TTL_SECS", &value)?;
        }
        if let Some(value) = read_env("VENDEDOR_CATALOG_DEFAULT_BUDGET") {
            self.catalog.default_budget = parse_env("VENDEDOR_CATALOG_DEFAULT_BUDGET", &value)?;
        }

        if let Some(value) = read_env("VENDEDOR_AGENT_STORE_NAME") {
            self.agent.store_name = value;
        }
        if let Some(value) = read_env("VENDEDOR_AGENT_HISTORY_WINDOW") {
            self.agent.history_window = parse_env("VENDEDOR_AGENT_HISTORY_WINDOW", &value)?;
        }
        if let Some(value) = read_env("VENDEDOR_AGENT_MAX_QUESTIONS_PER_TURN") {
            self.agent.max_questions_per_turn =
                parse_env("VENDEDOR_AGENT_MAX_QUESTIONS_PER_TURN", &value)?;
        }
        if let Some(value) = read_env("VENDEDOR_AGENT_MAX_RECOMMENDED_PRODUCTS") {
            self.agent.max_recommended_products =
                parse_env("VENDEDOR_AGENT_MAX_RECOMMENDED_PRODUCTS", &value)?;
        }
        if let Some(value) = read_env("VENDEDOR_AGENT_RECOMMENDATION_MAX_WORDS") {
            self.agent.recommendation_max_words =
                parse_env("VENDEDOR_AGENT_RECOMMENDATION_MAX_WORDS", &value)?;
        }

        let log_level =
            read_env("VENDEDOR_LOGGING_LEVEL").or_else(|| read_env("VENDEDOR_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("VENDEDOR_LOGGING_FORMAT").or_else(|| read_env("VENDEDOR_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(llm_provider) = overrides.llm_provider {
            self.llm.provider = llm_provider;
        }
        if let Some(llm_model) = overrides.llm_model {
            self.llm.model = llm_model;
        }
        if let Some(llm_base_url) = overrides.llm_base_url {
            self.llm.base_url = Some(llm_base_url);
        }
        if let Some(catalog_path) = overrides.catalog_path {
            self.catalog.path = catalog_path;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_llm(&self.llm)?;
        validate_catalog(&self.catalog)?;
        validate_agent(&self.agent)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

/// Returns the config file `load` would read, if any.
pub fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    CONFIG_FILE_CANDIDATES.into_iter().map(PathBuf::from).find(|path| path.exists())
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

fn validate_llm(llm: &LlmConfig) -> Result<(), ConfigError> {
    if llm.timeout_secs == 0 || llm.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "llm.timeout_secs must be in range 1..=300".to_string(),
        ));
    }
    if !(0.0..=2.0).contains(&llm.temperature) {
        return Err(ConfigError::Validation(
            "llm.temperature must be in range 0.0..=2.0".to_string(),
        ));
    }
    if llm.max_tokens == 0 {
        return Err(ConfigError::Validation(
            "llm.max_tokens must be greater than zero".to_string(),
        ));
    }
    if llm.model.trim().is_empty() {
        return Err(ConfigError::Validation("llm.model must not be empty".to_string()));
    }

    match llm.provider {
        LlmProvider::OpenAi | LlmProvider::OpenRouter => {
            let missing = llm
                .api_key
                .as_ref()
                .map(|value| value.expose_secret().trim().is_empty())
                .unwrap_or(true);
            if missing {
                return Err(ConfigError::Validation(
                    "llm.api_key is required for openai/openrouter providers (set VENDEDOR_LLM_API_KEY or VENDEDOR_OPENROUTER_KEY)"
                        .to_string(),
                ));
            }
        }
        LlmProvider::Ollama => {}
    }

    if let Some(base_url) = &llm.base_url {
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(ConfigError::Validation(
                "llm.base_url must start with http:// or https://".to_string(),
            ));
        }
    }

    Ok(())
}

fn validate_catalog(catalog: &CatalogConfig) -> Result<(), ConfigError> {
    if catalog.path.as_os_str().is_empty() {
        return Err(ConfigError::Validation("catalog.path must not be empty".to_string()));
    }
    if catalog.default_budget <= Decimal::ZERO {
        return Err(ConfigError::Validation(
            "catalog.default_budget must be greater than zero".to_string(),
        ));
    }
    if let Some((category, _)) =
        catalog.category_budgets.iter().find(|(_, amount)| **amount <= Decimal::ZERO)
    {
        return Err(ConfigError::Validation(format!(
            "catalog.category_budgets.{category} must be greater than zero"
        )));
    }

    Ok(())
}

fn validate_agent(agent: &AgentConfig) -> Result<(), ConfigError> {
    if agent.store_name.trim().is_empty() {
        return Err(ConfigError::Validation("agent.store_name must not be empty".to_string()));
    }
    if agent.history_window == 0 {
        return Err(ConfigError::Validation(
            "agent.history_window must be greater than zero".to_string(),
        ));
    }
    if !(1..=2).contains(&agent.max_questions_per_turn) {
        return Err(ConfigError::Validation(
            "agent.max_questions_per_turn must be in range 1..=2".to_string(),
        ));
    }
    if agent.max_recommended_products == 0 {
        return Err(ConfigError::Validation(
            "agent.max_recommended_products must be greater than zero".to_string(),
        ));
    }
    if agent.recommendation_max_words < 50 {
        return Err(ConfigError::Validation(
            "agent.recommendation_max_words must be at least 50".to_string(),
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

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse::<T>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    llm: Option<LlmPatch>,
    catalog: Option<CatalogPatch>,
    agent: Option<AgentPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmPatch {
    provider: Option<LlmProvider>,
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
    timeout_secs: Option<u64>,
    max_retries: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct CatalogPatch {
    path: Option<PathBuf>,
    cache_ttl_secs: Option<u64>,
    default_budget: Option<Decimal>,
    category_budgets: Option<BTreeMap<String, Decimal>>,
}

#[derive(Debug, Default, Deserialize)]
struct AgentPatch {
    store_name: Option<String>,
    history_window: Option<usize>,
    max_questions_per_turn: Option<usize>,
    max_recommended_products: Option<usize>,
    recommendation_max_words: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
