//! Runtime configuration: TOML file, then environment overrides, resolved once
//! at process start.
//!
//! ## Precedence (highest to lowest)
//!
//! 1. Environment variable overrides (`RACE_AGENTS_*`)
//! 2. Values in the TOML file
//! 3. Built-in defaults
//!
//! Core components receive the resolved value by reference and never read
//! the environment themselves.
//!
//! ## Provider enablement
//!
//! | `enabled` | credential present | result                          |
//! |-----------|--------------------|---------------------------------|
//! | unset     | yes                | enabled                         |
//! | unset     | no                 | skipped (logged)                |
//! | `true`    | no                 | `ConfigError::MissingCredential` |
//! | `false`   | any                | skipped                         |

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use triangulation::{ArbiterPolicy, ModelTier, ProviderId, RetryPolicy, MAX_ATTEMPTS};

/// Path to the TOML config file.
pub const ENV_CONFIG_PATH: &str = "RACE_AGENTS_CONFIG";
const ENV_MODE: &str = "RACE_AGENTS_MODE";
const ENV_TIER: &str = "RACE_AGENTS_TIER";
const ENV_DATA_DIR: &str = "RACE_AGENTS_DATA_DIR";
const ENV_OUTPUT_DIR: &str = "RACE_AGENTS_OUTPUT_DIR";
const ENV_RACE_TIMEOUT: &str = "RACE_AGENTS_RACE_TIMEOUT_SECS";

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const XAI_BASE_URL: &str = "https://api.x.ai/v1";
const ANTHROPIC_BASE_URL: &str = "https://api.anthropic.com/v1";
const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Configuration errors. Fatal at startup.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Provider '{provider}' is enabled but {env_var} is not set")]
    MissingCredential { provider: String, env_var: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Deployment mode. Selects log format and nothing else in the core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    #[default]
    Local,
    Cloud,
}

impl FromStr for RunMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "cloud" => Ok(Self::Cloud),
            other => Err(ConfigError::Invalid(format!("unknown mode '{other}'"))),
        }
    }
}

impl std::fmt::Display for RunMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Local => write!(f, "local"),
            Self::Cloud => write!(f, "cloud"),
        }
    }
}

fn parse_tier(s: &str) -> Result<ModelTier, ConfigError> {
    match s.trim().to_ascii_lowercase().as_str() {
        "cheap" => Ok(ModelTier::Cheap),
        "standard" => Ok(ModelTier::Standard),
        other => Err(ConfigError::Invalid(format!("unknown model tier '{other}'"))),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CorpusBackend {
    Memory,
    #[default]
    Jsonl,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CorpusConfig {
    pub backend: CorpusBackend,
    /// Directory holding `<race_id>.jsonl` files.
    pub data_dir: PathBuf,
    pub embedding_dimensions: usize,
}

impl Default for CorpusConfig {
    fn default() -> Self {
        Self {
            backend: CorpusBackend::Jsonl,
            data_dir: PathBuf::from("data/corpus"),
            embedding_dimensions: 256,
        }
    }
}

/// Retrieval budget per unit of work.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    pub k: usize,
    pub max_chars: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            k: 8,
            max_chars: 12_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub tier: ModelTier,
    /// Timeout for one provider attempt.
    pub call_timeout_secs: u64,
    /// Wall-clock budget for the whole fan-out of one unit.
    pub overall_budget_secs: u64,
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tier: ModelTier::Standard,
            call_timeout_secs: 60,
            overall_budget_secs: 180,
            max_attempts: MAX_ATTEMPTS,
            base_delay_ms: 1_000,
            max_delay_ms: 16_000,
        }
    }
}

impl EngineConfig {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }

    pub fn overall_budget(&self) -> Duration {
        Duration::from_secs(self.overall_budget_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_attempts,
            Duration::from_millis(self.base_delay_ms),
            Duration::from_millis(self.max_delay_ms),
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ArbiterConfig {
    pub agreement_threshold: f64,
    /// Provider ids in tie-break order.
    pub provider_priority: Vec<String>,
}

impl Default for ArbiterConfig {
    fn default() -> Self {
        Self {
            agreement_threshold: triangulation::DEFAULT_AGREEMENT_THRESHOLD,
            provider_priority: vec![
                "anthropic".into(),
                "openai".into(),
                "gemini".into(),
                "xai".into(),
            ],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Race-level budget; units not finished by then are reported UNKNOWN.
    pub race_timeout_secs: u64,
    pub placeholder_text: String,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            race_timeout_secs: 1_800,
            placeholder_text: triangulation::arbiter::DEFAULT_PLACEHOLDER.to_string(),
        }
    }
}

impl OrchestratorConfig {
    pub fn race_timeout(&self) -> Duration {
        Duration::from_secs(self.race_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Directory for published race summaries.
    pub dir: PathBuf,
    /// Append-only run report log. `None` disables it.
    pub telemetry_log: Option<PathBuf>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("output"),
            telemetry_log: Some(PathBuf::from("output/runs.jsonl")),
        }
    }
}

/// Wire protocol family of a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// OpenAI chat completions shape (OpenAI, xAI, compatible gateways).
    OpenaiCompat,
    Anthropic,
    Gemini,
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OpenaiCompat => write!(f, "openai_compat"),
            Self::Anthropic => write!(f, "anthropic"),
            Self::Gemini => write!(f, "gemini"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub id: String,
    pub kind: ProviderKind,
    /// Unset means "enabled when its credential is present".
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub base_url: Option<String>,
    pub cheap_model: String,
    pub standard_model: String,
    /// Environment variable holding the API key.
    pub api_key_env: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

fn default_max_tokens() -> u32 {
    1_024
}

fn default_temperature() -> f32 {
    0.2
}

impl ProviderConfig {
    fn preset(
        id: &str,
        kind: ProviderKind,
        base_url: &str,
        cheap: &str,
        standard: &str,
        key_env: &str,
    ) -> Self {
        Self {
            id: id.to_string(),
            kind,
            enabled: None,
            base_url: Some(base_url.to_string()),
            cheap_model: cheap.to_string(),
            standard_model: standard.to_string(),
            api_key_env: key_env.to_string(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
        }
    }

    /// Model id for the selected tier.
    pub fn model_for(&self, tier: ModelTier) -> &str {
        match tier {
            ModelTier::Cheap => &self.cheap_model,
            ModelTier::Standard => &self.standard_model,
        }
    }

    /// Configured base URL, or the vendor default for this kind.
    pub fn base_url(&self) -> String {
        let url = self.base_url.clone().unwrap_or_else(|| {
            match self.kind {
                ProviderKind::OpenaiCompat => OPENAI_BASE_URL,
                ProviderKind::Anthropic => ANTHROPIC_BASE_URL,
                ProviderKind::Gemini => GEMINI_BASE_URL,
            }
            .to_string()
        });
        url.trim_end_matches('/').to_string()
    }
}

/// A provider that passed credential resolution.
#[derive(Clone)]
pub struct ResolvedProvider {
    pub config: ProviderConfig,
    pub id: ProviderId,
    pub model: String,
    pub base_url: String,
    pub api_key: String,
}

impl std::fmt::Debug for ResolvedProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedProvider")
            .field("id", &self.id)
            .field("kind", &self.config.kind)
            .field("model", &self.model)
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RaceAgentsConfig {
    pub mode: RunMode,
    pub corpus: CorpusConfig,
    pub retrieval: RetrievalConfig,
    pub engine: EngineConfig,
    pub arbiter: ArbiterConfig,
    pub orchestrator: OrchestratorConfig,
    pub output: OutputConfig,
    pub providers: Vec<ProviderConfig>,
}

impl Default for RaceAgentsConfig {
    fn default() -> Self {
        Self {
            mode: RunMode::Local,
            corpus: CorpusConfig::default(),
            retrieval: RetrievalConfig::default(),
            engine: EngineConfig::default(),
            arbiter: ArbiterConfig::default(),
            orchestrator: OrchestratorConfig::default(),
            output: OutputConfig::default(),
            providers: vec![
                ProviderConfig::preset(
                    "openai",
                    ProviderKind::OpenaiCompat,
                    OPENAI_BASE_URL,
                    "gpt-4o-mini",
                    "gpt-4o",
                    "OPENAI_API_KEY",
                ),
                ProviderConfig::preset(
                    "anthropic",
                    ProviderKind::Anthropic,
                    ANTHROPIC_BASE_URL,
                    "claude-3-5-haiku-latest",
                    "claude-sonnet-4-20250514",
                    "ANTHROPIC_API_KEY",
                ),
                ProviderConfig::preset(
                    "gemini",
                    ProviderKind::Gemini,
                    GEMINI_BASE_URL,
                    "gemini-2.0-flash",
                    "gemini-2.5-pro",
                    "GEMINI_API_KEY",
                ),
                ProviderConfig::preset(
                    "xai",
                    ProviderKind::OpenaiCompat,
                    XAI_BASE_URL,
                    "grok-3-mini",
                    "grok-3",
                    "XAI_API_KEY",
                ),
            ],
        }
    }
}

impl RaceAgentsConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(raw)?)
    }

    /// Load from `path`, or built-in defaults when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })?;
                let config = Self::from_toml_str(&raw)?;
                info!(path = %path.display(), "Loaded configuration file");
                Ok(config)
            }
            None => Ok(Self::default()),
        }
    }

    /// Apply `RACE_AGENTS_*` overrides read through `env`.
    pub fn apply_env_overrides<F>(&mut self, env: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(mode) = env(ENV_MODE) {
            self.mode = mode.parse()?;
        }
        if let Some(tier) = env(ENV_TIER) {
            self.engine.tier = parse_tier(&tier)?;
        }
        if let Some(dir) = env(ENV_DATA_DIR) {
            self.corpus.data_dir = PathBuf::from(dir);
        }
        if let Some(dir) = env(ENV_OUTPUT_DIR) {
            self.output.dir = PathBuf::from(dir);
        }
        if let Some(secs) = env(ENV_RACE_TIMEOUT) {
            self.orchestrator.race_timeout_secs = secs.trim().parse().map_err(|_| {
                ConfigError::Invalid(format!("{ENV_RACE_TIMEOUT} must be an integer, got '{secs}'"))
            })?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.retrieval.k == 0 {
            return Err(ConfigError::Invalid("retrieval.k must be > 0".into()));
        }
        if self.retrieval.max_chars == 0 {
            return Err(ConfigError::Invalid("retrieval.max_chars must be > 0".into()));
        }
        if !(0.0..=1.0).contains(&self.arbiter.agreement_threshold) {
            return Err(ConfigError::Invalid(format!(
                "arbiter.agreement_threshold must be in [0, 1], got {}",
                self.arbiter.agreement_threshold
            )));
        }
        if self.engine.max_attempts == 0 || self.engine.max_attempts > MAX_ATTEMPTS {
            return Err(ConfigError::Invalid(format!(
                "engine.max_attempts must be in 1..={MAX_ATTEMPTS}, got {}",
                self.engine.max_attempts
            )));
        }
        if self.engine.call_timeout_secs == 0 || self.engine.overall_budget_secs == 0 {
            return Err(ConfigError::Invalid(
                "engine timeouts must be > 0 seconds".into(),
            ));
        }
        if self.corpus.embedding_dimensions == 0 {
            return Err(ConfigError::Invalid(
                "corpus.embedding_dimensions must be > 0".into(),
            ));
        }
        let mut seen = std::collections::HashSet::new();
        for p in &self.providers {
            if !seen.insert(p.id.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate provider id '{}'",
                    p.id
                )));
            }
            if !(0.0..=2.0).contains(&p.temperature) {
                return Err(ConfigError::Invalid(format!(
                    "provider '{}' temperature must be in [0, 2], got {}",
                    p.id, p.temperature
                )));
            }
            if p.max_tokens == 0 {
                return Err(ConfigError::Invalid(format!(
                    "provider '{}' max_tokens must be > 0",
                    p.id
                )));
            }
        }
        Ok(())
    }

    /// Resolve credentials for every provider, reading keys through `env`.
    pub fn resolve_providers<F>(&self, env: F) -> Result<Vec<ResolvedProvider>, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut resolved = Vec::new();
        for p in &self.providers {
            if p.enabled == Some(false) {
                debug!(provider = %p.id, "Provider disabled");
                continue;
            }
            let key = env(&p.api_key_env).filter(|k| !k.trim().is_empty());
            let Some(api_key) = key else {
                if p.enabled == Some(true) {
                    return Err(ConfigError::MissingCredential {
                        provider: p.id.clone(),
                        env_var: p.api_key_env.clone(),
                    });
                }
                info!(provider = %p.id, env_var = %p.api_key_env, "No credential, provider skipped");
                continue;
            };
            resolved.push(ResolvedProvider {
                config: p.clone(),
                id: ProviderId::new(&p.id),
                model: p.model_for(self.engine.tier).to_string(),
                base_url: p.base_url(),
                api_key,
            });
        }
        Ok(resolved)
    }

    /// Arbiter policy derived from the arbiter and orchestrator sections.
    pub fn arbiter_policy(&self) -> ArbiterPolicy {
        ArbiterPolicy::default()
            .with_threshold(self.arbiter.agreement_threshold)
            .with_priority(
                self.arbiter
                    .provider_priority
                    .iter()
                    .map(ProviderId::new)
                    .collect(),
            )
            .with_placeholder(&self.orchestrator.placeholder_text)
    }
}

/// Fully resolved startup configuration.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub config: RaceAgentsConfig,
    pub providers: Vec<ResolvedProvider>,
}

impl ResolvedConfig {
    /// Load, override, validate, and resolve credentials in one step.
    ///
    /// This is the only place the process environment is read.
    pub fn from_process_env(path: Option<&Path>) -> Result<Self, ConfigError> {
        let env = |name: &str| std::env::var(name).ok();
        let path = path
            .map(Path::to_path_buf)
            .or_else(|| env(ENV_CONFIG_PATH).map(PathBuf::from));
        Self::resolve(RaceAgentsConfig::load(path.as_deref())?, env)
    }

    pub fn resolve<F>(mut config: RaceAgentsConfig, env: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        config.apply_env_overrides(&env)?;
        config.validate()?;
        let providers = config.resolve_providers(&env)?;
        Ok(Self { config, providers })
    }
}
