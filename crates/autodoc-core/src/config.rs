use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

// ── Constants ──

pub const DEFAULT_OPENROUTER_BASE_URL: &str = "https://openrouter.ai/api/v1";
pub const DEFAULT_QDRANT_URL: &str = "http://localhost:6333";
pub const DEFAULT_EMBEDDING_MODEL: &str = "openai/text-embedding-3-small";
pub const DEFAULT_SUMMARIZER_MODEL: &str = "anthropic/claude-3-haiku";
pub const DEFAULT_TRANSLATION_MODEL: &str = "google/gemini-pro";
pub const DEFAULT_RAG_MODEL: &str = "anthropic/claude-3-haiku";
pub const DEFAULT_SUMMARY_BATCH_SIZE: usize = 10;
pub const DEFAULT_TRANSLATION_BATCH_SIZE: usize = 5;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required configuration: {}", .0.join(", "))]
    Missing(Vec<String>),
    #[error("invalid value for {key}: {value}")]
    Invalid { key: String, value: String },
}

/// Documentation output language.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum OutputLanguage {
    #[serde(rename = "EN")]
    En,
    #[serde(rename = "VI")]
    Vi,
}

impl OutputLanguage {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "EN" => Some(OutputLanguage::En),
            "VI" => Some(OutputLanguage::Vi),
            _ => None,
        }
    }

    /// Upper-case name as written in configuration.
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputLanguage::En => "EN",
            OutputLanguage::Vi => "VI",
        }
    }

    /// Lower-case code used as the key of localized text.
    pub fn code(&self) -> &'static str {
        match self {
            OutputLanguage::En => "en",
            OutputLanguage::Vi => "vi",
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    Warning,
    Error,
}

impl LogLevel {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "DEBUG" => Some(LogLevel::Debug),
            "INFO" => Some(LogLevel::Info),
            "WARN" | "WARNING" => Some(LogLevel::Warning),
            "ERROR" | "CRITICAL" => Some(LogLevel::Error),
            _ => None,
        }
    }

    /// Directive understood by `tracing_subscriber::EnvFilter`.
    pub fn as_filter(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warning => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// CLI overrides applied on top of the environment.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub repo_url: Option<String>,
    pub output_dir: Option<PathBuf>,
    pub languages: Option<String>,
    pub github_pat: Option<String>,
    pub debug: bool,
}

/// Resolved application configuration, built once and handed to the workflow.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AppConfig {
    pub target_repo_url: String,
    pub output_dir: PathBuf,
    pub openrouter_api_key: String,
    pub openrouter_base_url: String,
    pub qdrant_url: String,
    pub github_pat: Option<String>,
    pub output_languages: Vec<OutputLanguage>,
    pub log_level: LogLevel,
    pub embedding_model_name: String,
    pub summarizer_model_name: String,
    pub translation_model_name: String,
    pub rag_model_name: String,
    pub sendgrid_api_key: Option<String>,
    pub sendgrid_from_email: Option<String>,
    pub notification_email_to: Option<String>,
    pub notify_webhook_url: Option<String>,
    pub notify_ntfy_url: Option<String>,
    pub git_executable_path: String,
    pub npm_executable_path: String,
    pub summary_batch_size: usize,
    pub translation_batch_size: usize,
    pub debug: bool,
    /// `OUTPUT_LANGUAGES` entries that were not recognized.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unsupported_languages: Vec<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            target_repo_url: String::new(),
            output_dir: PathBuf::new(),
            openrouter_api_key: String::new(),
            openrouter_base_url: DEFAULT_OPENROUTER_BASE_URL.to_string(),
            qdrant_url: DEFAULT_QDRANT_URL.to_string(),
            github_pat: None,
            output_languages: vec![OutputLanguage::En, OutputLanguage::Vi],
            log_level: LogLevel::Info,
            embedding_model_name: DEFAULT_EMBEDDING_MODEL.to_string(),
            summarizer_model_name: DEFAULT_SUMMARIZER_MODEL.to_string(),
            translation_model_name: DEFAULT_TRANSLATION_MODEL.to_string(),
            rag_model_name: DEFAULT_RAG_MODEL.to_string(),
            sendgrid_api_key: None,
            sendgrid_from_email: None,
            notification_email_to: None,
            notify_webhook_url: None,
            notify_ntfy_url: None,
            git_executable_path: "git".to_string(),
            npm_executable_path: "npm".to_string(),
            summary_batch_size: DEFAULT_SUMMARY_BATCH_SIZE,
            translation_batch_size: DEFAULT_TRANSLATION_BATCH_SIZE,
            debug: false,
            unsupported_languages: Vec::new(),
        }
    }
}

impl AppConfig {
    /// Build from the process environment plus CLI overrides.
    pub fn from_env(overrides: &ConfigOverrides) -> Result<Self, ConfigError> {
        Self::from_env_and_args(|key| std::env::var(key).ok(), overrides)
    }

    /// Build from an arbitrary variable lookup plus CLI overrides.
    ///
    /// Unset and blank variables fall back to defaults. Only malformed
    /// numbers are rejected here; completeness is checked by [`validate`].
    ///
    /// [`validate`]: AppConfig::validate
    pub fn from_env_and_args<F>(lookup: F, overrides: &ConfigOverrides) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let defaults = AppConfig::default();

        let (output_languages, unsupported_languages) =
            match overrides.languages.clone().or_else(|| var("OUTPUT_LANGUAGES")) {
                Some(raw) => parse_languages(&raw),
                None => (defaults.output_languages.clone(), Vec::new()),
            };

        let log_level = match var("LOG_LEVEL") {
            Some(raw) => LogLevel::parse(&raw).ok_or_else(|| ConfigError::Invalid {
                key: "LOG_LEVEL".into(),
                value: raw,
            })?,
            None => LogLevel::Info,
        };

        Ok(Self {
            target_repo_url: overrides
                .repo_url
                .clone()
                .or_else(|| var("TARGET_REPO_URL"))
                .unwrap_or_default(),
            output_dir: overrides
                .output_dir
                .clone()
                .or_else(|| var("OUTPUT_DIR").map(PathBuf::from))
                .unwrap_or_default(),
            openrouter_api_key: var("OPENROUTER_API_KEY").unwrap_or_default(),
            openrouter_base_url: var("OPENROUTER_BASE_URL").unwrap_or(defaults.openrouter_base_url),
            qdrant_url: var("QDRANT_URL").unwrap_or(defaults.qdrant_url),
            github_pat: overrides.github_pat.clone().or_else(|| var("GITHUB_PAT")),
            output_languages,
            log_level,
            embedding_model_name: var("EMBEDDING_MODEL_NAME").unwrap_or(defaults.embedding_model_name),
            summarizer_model_name: var("SUMMARIZER_MODEL_NAME")
                .unwrap_or(defaults.summarizer_model_name),
            translation_model_name: var("TRANSLATION_MODEL_NAME")
                .unwrap_or(defaults.translation_model_name),
            rag_model_name: var("RAG_MODEL_NAME").unwrap_or(defaults.rag_model_name),
            sendgrid_api_key: var("SENDGRID_API_KEY"),
            sendgrid_from_email: var("SENDGRID_FROM_EMAIL"),
            notification_email_to: var("NOTIFICATION_EMAIL_TO"),
            notify_webhook_url: var("NOTIFY_WEBHOOK_URL"),
            notify_ntfy_url: var("NOTIFY_NTFY_URL"),
            git_executable_path: var("GIT_EXECUTABLE_PATH").unwrap_or(defaults.git_executable_path),
            npm_executable_path: var("NPM_EXECUTABLE_PATH").unwrap_or(defaults.npm_executable_path),
            summary_batch_size: parse_batch(var("SUMMARY_BATCH_SIZE"), "SUMMARY_BATCH_SIZE", DEFAULT_SUMMARY_BATCH_SIZE)?,
            translation_batch_size: parse_batch(
                var("TRANSLATION_BATCH_SIZE"),
                "TRANSLATION_BATCH_SIZE",
                DEFAULT_TRANSLATION_BATCH_SIZE,
            )?,
            debug: overrides.debug,
            unsupported_languages,
        })
    }

    /// Check completeness and normalize. Returns warnings for the caller to log.
    pub fn validate(&mut self) -> Result<Vec<String>, ConfigError> {
        let mut missing = Vec::new();
        if self.target_repo_url.is_empty() {
            missing.push("TARGET_REPO_URL".to_string());
        }
        if self.output_dir.as_os_str().is_empty() {
            missing.push("OUTPUT_DIR".to_string());
        }
        if self.openrouter_api_key.is_empty() {
            missing.push("OPENROUTER_API_KEY".to_string());
        }
        if self.qdrant_url.is_empty() {
            missing.push("QDRANT_URL".to_string());
        }
        if !missing.is_empty() {
            return Err(ConfigError::Missing(missing));
        }

        let mut warnings: Vec<String> = self
            .unsupported_languages
            .iter()
            .map(|x| format!("unsupported output language dropped: {x}"))
            .collect();
        if self.output_languages.is_empty() {
            warnings.push("no supported output languages configured, defaulting to EN".to_string());
            self.output_languages = vec![OutputLanguage::En];
        }

        let email_parts = [
            self.sendgrid_api_key.is_some(),
            self.sendgrid_from_email.is_some(),
            self.notification_email_to.is_some(),
        ];
        if email_parts.iter().any(|p| *p) && !email_parts.iter().all(|p| *p) {
            warnings.push(
                "email notifications disabled: SENDGRID_API_KEY, SENDGRID_FROM_EMAIL and NOTIFICATION_EMAIL_TO must all be set"
                    .to_string(),
            );
            self.sendgrid_api_key = None;
            self.sendgrid_from_email = None;
            self.notification_email_to = None;
        }

        if self.debug {
            self.log_level = LogLevel::Debug;
        }
        Ok(warnings)
    }

    pub fn email_enabled(&self) -> bool {
        self.sendgrid_api_key.is_some()
            && self.sendgrid_from_email.is_some()
            && self.notification_email_to.is_some()
    }

    /// Human-readable `(key, value)` pairs with secrets masked.
    pub fn display_entries(&self) -> Vec<(&'static str, String)> {
        let opt = |v: &Option<String>| v.clone().unwrap_or_else(|| "(not set)".to_string());
        let langs: Vec<&str> = self.output_languages.iter().map(|l| l.as_str()).collect();
        vec![
            ("TARGET_REPO_URL", self.target_repo_url.clone()),
            ("OUTPUT_DIR", self.output_dir.display().to_string()),
            ("OPENROUTER_API_KEY", mask_secret(&self.openrouter_api_key)),
            ("OPENROUTER_BASE_URL", self.openrouter_base_url.clone()),
            ("QDRANT_URL", self.qdrant_url.clone()),
            (
                "GITHUB_PAT",
                self.github_pat
                    .as_deref()
                    .map(mask_secret)
                    .unwrap_or_else(|| "(not set)".to_string()),
            ),
            ("OUTPUT_LANGUAGES", langs.join(",")),
            ("LOG_LEVEL", format!("{:?}", self.log_level).to_ascii_uppercase()),
            ("EMBEDDING_MODEL_NAME", self.embedding_model_name.clone()),
            ("SUMMARIZER_MODEL_NAME", self.summarizer_model_name.clone()),
            ("TRANSLATION_MODEL_NAME", self.translation_model_name.clone()),
            ("RAG_MODEL_NAME", self.rag_model_name.clone()),
            (
                "SENDGRID_API_KEY",
                self.sendgrid_api_key
                    .as_deref()
                    .map(mask_secret)
                    .unwrap_or_else(|| "(not set)".to_string()),
            ),
            ("SENDGRID_FROM_EMAIL", opt(&self.sendgrid_from_email)),
            ("NOTIFICATION_EMAIL_TO", opt(&self.notification_email_to)),
            ("NOTIFY_WEBHOOK_URL", opt(&self.notify_webhook_url)),
            ("NOTIFY_NTFY_URL", opt(&self.notify_ntfy_url)),
            ("GIT_EXECUTABLE_PATH", self.git_executable_path.clone()),
            ("NPM_EXECUTABLE_PATH", self.npm_executable_path.clone()),
            ("SUMMARY_BATCH_SIZE", self.summary_batch_size.to_string()),
            ("TRANSLATION_BATCH_SIZE", self.translation_batch_size.to_string()),
        ]
    }
}

/// Comma-separated list, duplicates collapsed. Returns the recognized
/// languages and the unknown entries.
pub fn parse_languages(raw: &str) -> (Vec<OutputLanguage>, Vec<String>) {
    let mut out = Vec::new();
    let mut unknown = Vec::new();
    for part in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        match OutputLanguage::parse(part) {
            Some(lang) if !out.contains(&lang) => out.push(lang),
            Some(_) => {}
            None => unknown.push(part.to_string()),
        }
    }
    (out, unknown)
}

fn parse_batch(raw: Option<String>, key: &str, default: usize) -> Result<usize, ConfigError> {
    match raw {
        None => Ok(default),
        Some(v) => match v.parse::<usize>() {
            Ok(n) if n > 0 => Ok(n),
            _ => Err(ConfigError::Invalid {
                key: key.to_string(),
                value: v,
            }),
        },
    }
}

/// Keep the first and last four characters of long secrets.
pub fn mask_secret(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.is_empty() {
        return "(not set)".to_string();
    }
    if chars.len() <= 8 {
        return "*".repeat(chars.len());
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{head}...{tail}")
}
