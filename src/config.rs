use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Application-level constants
pub const APP_NAME: &str = "Tanyadata";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Filter used when `RUST_LOG` is not set.
pub fn default_log_filter() -> &'static str {
    "warn,tanyadata=info,tanyadata_lib=info"
}

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("Missing required setting: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },
}

/// SQL flavour the compiler emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    #[default]
    BigQuery,
    Postgres,
}

impl FromStr for Dialect {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "bigquery" | "bq" => Ok(Self::BigQuery),
            "postgres" | "postgresql" | "pg" => Ok(Self::Postgres),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InferenceProvider {
    #[default]
    Gemini,
    OpenRouter,
}

impl FromStr for InferenceProvider {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "gemini" | "google" => Ok(Self::Gemini),
            "openrouter" => Ok(Self::OpenRouter),
            _ => Err(()),
        }
    }
}

impl InferenceProvider {
    pub fn default_model(&self) -> &'static str {
        match self {
            Self::Gemini => "gemini-1.5-flash",
            Self::OpenRouter => "meta-llama/llama-3.3-70b-instruct",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WarehouseConfig {
    pub project_id: String,
    pub dataset_id: String,
    pub dialect: Dialect,
    pub location: Option<String>,
    #[serde(skip_serializing)]
    pub access_token: Option<String>,
    pub timeout_secs: u64,
    pub max_rows: usize,
}

impl Default for WarehouseConfig {
    fn default() -> Self {
        Self {
            project_id: String::new(),
            dataset_id: String::new(),
            dialect: Dialect::BigQuery,
            location: None,
            access_token: None,
            timeout_secs: 60,
            max_rows: 10_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InferenceConfig {
    pub provider: InferenceProvider,
    pub model: String,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub timeout_secs: u64,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Language the final narrative answer is written in.
    pub answer_language: String,
}

impl Default for InferenceConfig {
    fn default() -> Self {
        let provider = InferenceProvider::default();
        Self {
            provider,
            model: provider.default_model().to_string(),
            api_key: None,
            timeout_secs: 60,
            temperature: 0.3,
            max_tokens: 3000,
            answer_language: "Indonesian".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionConfig {
    /// Direct-extraction text shorter than this (trimmed chars) triggers OCR.
    pub min_text_chars: usize,
    pub render_dpi: u32,
    pub ocr_languages: String,
    pub tessdata_dir: Option<PathBuf>,
    pub fetch_timeout_secs: u64,
    pub max_document_bytes: u64,
    pub document_workers: usize,
    pub ocr_workers: usize,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            min_text_chars: 100,
            render_dpi: 300,
            ocr_languages: "ind+eng".to_string(),
            tessdata_dir: None,
            fetch_timeout_secs: 30,
            max_document_bytes: 50 * 1024 * 1024,
            document_workers: 4,
            ocr_workers: 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScannerConfig {
    pub suffixes: Vec<String>,
    pub require_network_locator: bool,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            suffixes: vec![".pdf".to_string()],
            require_network_locator: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    pub warehouse: WarehouseConfig,
    pub inference: InferenceConfig,
    pub extraction: ExtractionConfig,
    pub scanner: ScannerConfig,
    pub dataset_description: Option<String>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Unset and blank values fall back to defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let mut config = AppConfig::default();

        config.warehouse.project_id =
            get("TANYADATA_PROJECT_ID").ok_or(ConfigError::Missing("TANYADATA_PROJECT_ID"))?;
        config.warehouse.dataset_id =
            get("TANYADATA_DATASET_ID").ok_or(ConfigError::Missing("TANYADATA_DATASET_ID"))?;
        if let Some(v) = get("TANYADATA_DIALECT") {
            config.warehouse.dialect = v.parse().map_err(|_| ConfigError::Invalid {
                key: "TANYADATA_DIALECT",
                value: v.clone(),
            })?;
        }
        config.warehouse.location = get("TANYADATA_LOCATION");
        config.warehouse.access_token = get("BIGQUERY_ACCESS_TOKEN");
        if let Some(v) = get("TANYADATA_WAREHOUSE_TIMEOUT_SECS") {
            config.warehouse.timeout_secs = parse_number("TANYADATA_WAREHOUSE_TIMEOUT_SECS", &v)?;
        }

        if let Some(v) = get("TANYADATA_INFERENCE_PROVIDER") {
            config.inference.provider = v.parse().map_err(|_| ConfigError::Invalid {
                key: "TANYADATA_INFERENCE_PROVIDER",
                value: v.clone(),
            })?;
        }
        config.inference.model = get("TANYADATA_MODEL")
            .unwrap_or_else(|| config.inference.provider.default_model().to_string());
        config.inference.api_key = match config.inference.provider {
            InferenceProvider::Gemini => {
                Some(get("GOOGLE_API_KEY").ok_or(ConfigError::Missing("GOOGLE_API_KEY"))?)
            }
            InferenceProvider::OpenRouter => {
                Some(get("OPENROUTER_API_KEY").ok_or(ConfigError::Missing("OPENROUTER_API_KEY"))?)
            }
        };
        if let Some(v) = get("TANYADATA_INFERENCE_TIMEOUT_SECS") {
            config.inference.timeout_secs = parse_number("TANYADATA_INFERENCE_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = get("TANYADATA_ANSWER_LANGUAGE") {
            config.inference.answer_language = v;
        }

        if let Some(v) = get("TANYADATA_MIN_TEXT_CHARS") {
            config.extraction.min_text_chars = parse_number("TANYADATA_MIN_TEXT_CHARS", &v)?;
        }
        if let Some(v) = get("TANYADATA_OCR_LANGUAGES") {
            config.extraction.ocr_languages = v;
        }
        config.extraction.tessdata_dir = get("TESSDATA_PREFIX").map(PathBuf::from);
        if let Some(v) = get("TANYADATA_FETCH_TIMEOUT_SECS") {
            config.extraction.fetch_timeout_secs =
                parse_number("TANYADATA_FETCH_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = get("TANYADATA_DOCUMENT_WORKERS") {
            config.extraction.document_workers = parse_number("TANYADATA_DOCUMENT_WORKERS", &v)?;
        }
        if let Some(v) = get("TANYADATA_OCR_WORKERS") {
            config.extraction.ocr_workers = parse_number("TANYADATA_OCR_WORKERS", &v)?;
        }

        if let Some(v) = get("TANYADATA_DOCUMENT_SUFFIXES") {
            config.scanner.suffixes = v
                .split(',')
                .map(|s| s.trim().to_ascii_lowercase())
                .filter(|s| !s.is_empty())
                .map(|s| if s.starts_with('.') { s } else { format!(".{s}") })
                .collect();
        }
        if let Some(v) = get("TANYADATA_REQUIRE_URL") {
            config.scanner.require_network_locator = parse_flag("TANYADATA_REQUIRE_URL", &v)?;
        }

        config.dataset_description = get("TANYADATA_DATASET_DESCRIPTION");
        Ok(config)
    }
}

fn parse_number<T: FromStr>(key: &'static str, value: &str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::Invalid {
        key,
        value: value.to_string(),
    })
}

fn parse_flag(key: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid {
            key,
            value: value.to_string(),
        }),
    }
}
