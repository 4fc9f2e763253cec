//! Configuration models for trivium.
//!
//! All I^R (resolvable ignorance) is parameterized here.
//! The user resolves these unknowns at runtime via config file.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level configuration for trivium.
///
/// I^R resolved: All configurable parameters are explicit.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Chat-completions backend (required unless the source is CSV)
    #[serde(default)]
    pub llm: Option<LlmConfig>,

    /// Card pool sizing and refill behavior
    #[serde(default)]
    pub pool: PoolConfig,

    /// Data driving the style validator's rejection rules
    #[serde(default)]
    pub style: StylePolicy,

    /// Where front ends draw cards from (LLM pool or CSV deck)
    #[serde(default)]
    pub source: SourceConfig,

    /// Web front end
    #[serde(default)]
    pub web: WebConfig,
}

/// OpenAI-compatible endpoint configuration.
///
/// K_i: Aggregators and on-prem servers (vLLM, TGI, Ollama, llama.cpp)
/// all speak the chat completions API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Base URL of the endpoint (e.g. "http://localhost:8000")
    pub base_url: String,

    /// Model ID as known by the endpoint
    pub model: String,

    /// API key (can also be set via the env var named in `api_key_env`;
    /// local endpoints may run without one)
    #[serde(default)]
    pub api_key: Option<String>,

    /// Environment variable name for the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f64,

    /// Completion token budget; 0 omits the field from requests
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Maximum retries on failure
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Path joined onto `base_url` for chat requests
    #[serde(default = "default_chat_completions_path")]
    pub chat_completions_path: String,

    /// `response_format` type (e.g. "json_object"); omitted when unset
    #[serde(default)]
    pub response_format: Option<String>,
}

fn default_api_key_env() -> String {
    "TRIVIUM_API_KEY".to_string()
}

fn default_temperature() -> f64 {
    0.7
}

fn default_max_tokens() -> u32 {
    256
}

fn default_timeout() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    5
}

fn default_chat_completions_path() -> String {
    "/v1/chat/completions".to_string()
}

impl LlmConfig {
    /// Resolve the API key from config or environment.
    ///
    /// B_i(key available) → Option; None is valid for local endpoints
    /// without auth.
    pub fn resolve_api_key(&self) -> Option<String> {
        if let Some(key) = &self.api_key {
            let key = key.trim();
            if !key.is_empty() {
                return Some(key.to_string());
            }
        }
        match std::env::var(&self.api_key_env) {
            Ok(key) if !key.trim().is_empty() => Some(key.trim().to_string()),
            _ => None,
        }
    }
}

/// Pool sizing and refill behavior.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Number of ready cards the pool aims to hold
    #[serde(default = "default_target_size")]
    pub target_size: usize,

    /// Background refill kicks in when the buffer drops below this
    #[serde(default = "default_refill_threshold")]
    pub refill_threshold: usize,

    /// Cards requested from the generator per fill worker
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Parallel fill workers per fill pass
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

fn default_target_size() -> usize {
    25
}

fn default_refill_threshold() -> usize {
    10
}

fn default_batch_size() -> usize {
    1
}

fn default_concurrency() -> usize {
    1
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            target_size: default_target_size(),
            refill_threshold: default_refill_threshold(),
            batch_size: default_batch_size(),
            concurrency: default_concurrency(),
        }
    }
}

impl PoolConfig {
    /// Fail fast on sizes that make the refill loop meaningless.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.target_size < 1 {
            return Err(ConfigError::Invalid {
                field: "pool.target_size",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.batch_size < 1 {
            return Err(ConfigError::Invalid {
                field: "pool.batch_size",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.concurrency < 1 {
            return Err(ConfigError::Invalid {
                field: "pool.concurrency",
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

/// Data for the style validator's rejection rules.
///
/// I^R: The rule *mechanism* is fixed; the lists and bounds that feed it
/// are user-tunable. Keywords match case-insensitive substrings; patterns
/// are regexes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StylePolicy {
    /// Question keywords that mark algebra/combinatorics puzzles
    #[serde(default = "default_puzzle_keywords")]
    pub puzzle_keywords: Vec<String>,

    /// Question regexes that mark algebra/combinatorics puzzles
    #[serde(default = "default_puzzle_patterns")]
    pub puzzle_patterns: Vec<String>,

    /// Question keywords that mark technical/physics phrasing
    #[serde(default = "default_technical_keywords")]
    pub technical_keywords: Vec<String>,

    /// Question keywords that mark calculation/scoring tasks
    #[serde(default = "default_calculation_keywords")]
    pub calculation_keywords: Vec<String>,

    /// Explanation regexes that mark arithmetic instead of facts
    #[serde(default = "default_arithmetic_patterns")]
    pub arithmetic_patterns: Vec<String>,

    /// Question length window, in characters
    #[serde(default = "default_min_question_chars")]
    pub min_question_chars: usize,

    #[serde(default = "default_max_question_chars")]
    pub max_question_chars: usize,

    /// Accepted answer range (inclusive)
    #[serde(default = "default_min_answer")]
    pub min_answer: f64,

    #[serde(default = "default_max_answer")]
    pub max_answer: f64,
}

fn default_puzzle_keywords() -> Vec<String> {
    [
        "combinat",
        "permut",
        "variant",
        "probabilit",
        "equation",
        "square root",
        "sequence",
        "function",
        "matrix",
        "logarithm",
        "factorial",
        "gcd",
        "lcm",
        "pin",
        "code",
        "without repetition",
        "how many ways",
        "how many possibilities",
    ]
    .into_iter()
    .map(str::to_string)
    .collect()
}

fn default_puzzle_patterns() -> Vec<String> {
    [
        r"\b\d+\s*[+\-*/^]\s*\d+\b",
        r"\b[xyz]\b",
        r"=\s*\d",
        r"\b(?:sin|cos|tan)\b",
    ]
    .into_iter()
    .map(str::to_string)
    .collect()
}

fn default_technical_keywords() -> Vec<String> {
    [
        "radius",
        "equator",
        "circumference",
        "densit",
        "pressure",
        "velocit",
        "acceleration",
        "m/s",
        "km/s",
        "hz",
        "volt",
        "amper",
        "watt",
        "joule",
        "kelvin",
        "atom",
        "molecul",
        "reaction",
        "formula",
        "π",
    ]
    .into_iter()
    .map(str::to_string)
    .collect()
}

fn default_calculation_keywords() -> Vec<String> {
    [
        "calculate",
        "compute",
        "sum of",
        "in total",
        "combined",
        "how many points",
        "deck of cards",
        "playing cards",
    ]
    .into_iter()
    .map(str::to_string)
    .collect()
}

fn default_arithmetic_patterns() -> Vec<String> {
    [r"[+\-*/^=±√∑]", r"[×∙·]", r"\b\d+\s*[xX]\s*\d+\b"]
        .into_iter()
        .map(str::to_string)
        .collect()
}

fn default_min_question_chars() -> usize {
    12
}

fn default_max_question_chars() -> usize {
    180
}

fn default_min_answer() -> f64 {
    0.001
}

fn default_max_answer() -> f64 {
    10_000_000.0
}

impl Default for StylePolicy {
    fn default() -> Self {
        Self {
            puzzle_keywords: default_puzzle_keywords(),
            puzzle_patterns: default_puzzle_patterns(),
            technical_keywords: default_technical_keywords(),
            calculation_keywords: default_calculation_keywords(),
            arithmetic_patterns: default_arithmetic_patterns(),
            min_question_chars: default_min_question_chars(),
            max_question_chars: default_max_question_chars(),
            min_answer: default_min_answer(),
            max_answer: default_max_answer(),
        }
    }
}

/// Which card source front ends draw from.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// Pool of LLM-generated cards, refilled in the background
    #[default]
    Llm,
    /// Shuffled deck loaded from CSV files
    Csv,
}

/// Card source configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    #[serde(default)]
    pub kind: SourceKind,

    /// Directory of *.csv files (required when kind = "csv")
    #[serde(default)]
    pub csv_dir: Option<PathBuf>,

    /// Single-character CSV field delimiter
    #[serde(default = "default_csv_delimiter")]
    pub csv_delimiter: String,
}

fn default_csv_delimiter() -> String {
    ";".to_string()
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            kind: SourceKind::default(),
            csv_dir: None,
            csv_delimiter: default_csv_delimiter(),
        }
    }
}

impl SourceConfig {
    /// The delimiter as the raw byte the CSV reader wants.
    pub fn delimiter_byte(&self) -> Result<u8, ConfigError> {
        let mut bytes = self.csv_delimiter.bytes();
        match (bytes.next(), bytes.next()) {
            (Some(byte), None) => Ok(byte),
            _ => Err(ConfigError::Invalid {
                field: "source.csv_delimiter",
                reason: "must be a single ASCII character".to_string(),
            }),
        }
    }
}

/// Web front end configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebConfig {
    #[serde(default = "default_web_host")]
    pub host: String,

    #[serde(default = "default_web_port")]
    pub port: u16,

    /// POST /shutdown is refused unless enabled
    #[serde(default)]
    pub allow_shutdown: bool,
}

fn default_web_host() -> String {
    "127.0.0.1".to_string()
}

fn default_web_port() -> u16 {
    8001
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            host: default_web_host(),
            port: default_web_port(),
            allow_shutdown: false,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// B_i(file exists) → Result
    /// B_i(file is valid TOML) → Result
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.to_owned(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_owned(),
            source: e,
        })
    }

    /// The `[llm]` section, which is mandatory for LLM-sourced cards.
    pub fn llm(&self) -> Result<&LlmConfig, ConfigError> {
        self.llm.as_ref().ok_or(ConfigError::MissingSection("llm"))
    }

    /// Validate cross-field constraints.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.pool.validate()?;
        self.source.delimiter_byte()?;

        match self.source.kind {
            SourceKind::Csv => {
                if self.source.csv_dir.is_none() {
                    return Err(ConfigError::Invalid {
                        field: "source.csv_dir",
                        reason: "required when source.kind = \"csv\"".to_string(),
                    });
                }
            }
            SourceKind::Llm => {
                let llm = self.llm()?;
                if llm.base_url.trim().is_empty() {
                    return Err(ConfigError::Invalid {
                        field: "llm.base_url",
                        reason: "must not be empty".to_string(),
                    });
                }
                if llm.model.trim().is_empty() {
                    return Err(ConfigError::Invalid {
                        field: "llm.model",
                        reason: "must not be empty".to_string(),
                    });
                }
            }
        }

        Ok(())
    }
}

/// Configuration errors.
///
/// Epistemic origin:
/// - B_i falsified: File not found, parse error
/// - I^B materialized: Missing required values
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Missing [{0}] section in config")]
    MissingSection(&'static str),

    #[error("Invalid value for {field}: {reason}")]
    Invalid {
        field: &'static str,
        reason: String,
    },
}
