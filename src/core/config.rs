//! Configuration management for the key-rotating proxy.
//!
//! Configuration comes from a `.env`-style file merged with the process
//! environment (process variables take precedence). Providers are declared
//! through `<NAME>_<OPENAI|GEMINI>_API_KEYS` variables; the legacy
//! `GEMINI_API_KEYS` / `OPENAI_API_KEYS` variables map to the built-in
//! `gemini` and `openai` providers.

use anyhow::{bail, Context, Result};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use crate::core::logging::mask_key;

/// Provider names that would collide with the proxy's own routes.
pub const RESERVED_PROVIDER_NAMES: &[&str] = &["admin", "health", "metrics"];

const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const LEGACY_OPENAI_BASE_URL: &str = "https://api.openai.com";
const LEGACY_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Upstream request-shaping family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiType {
    /// Key travels as the `key` query parameter.
    Gemini,
    /// Key travels as `Authorization: Bearer <key>`.
    #[serde(rename = "openai")]
    OpenAi,
}

impl ApiType {
    /// Parse an api type token (case-insensitive).
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "gemini" => Some(Self::Gemini),
            "openai" => Some(Self::OpenAi),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Gemini => "gemini",
            Self::OpenAi => "openai",
        }
    }

    fn default_base_url(&self) -> &'static str {
        match self {
            Self::Gemini => DEFAULT_GEMINI_BASE_URL,
            Self::OpenAi => DEFAULT_OPENAI_BASE_URL,
        }
    }

    /// Version segments a legacy route must start with.
    pub fn legacy_versions(&self) -> &'static [&'static str] {
        match self {
            Self::Gemini => &["v1", "v1beta"],
            Self::OpenAi => &["v1"],
        }
    }
}

impl fmt::Display for ApiType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Configuration for a single upstream provider.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Lowercase provider name, used as the first inbound path segment
    pub name: String,

    /// Request-shaping family
    pub api_type: ApiType,

    /// Base URL that upstream paths are appended to
    pub base_url: String,

    /// Ordered, de-duplicated API keys
    pub keys: Vec<String>,

    /// Whether this provider comes from the legacy variables
    #[serde(default)]
    pub legacy: bool,
}

impl ProviderConfig {
    pub fn new(
        name: impl Into<String>,
        api_type: ApiType,
        base_url: impl Into<String>,
        keys: Vec<String>,
    ) -> Self {
        Self {
            name: name.into().to_ascii_lowercase(),
            api_type,
            base_url: base_url.into(),
            keys: dedup_keys(keys),
            legacy: false,
        }
    }

    /// Mark this provider as a legacy route.
    pub fn legacy(mut self) -> Self {
        self.legacy = true;
        self
    }

    pub fn masked_keys(&self) -> Vec<String> {
        self.keys.iter().map(|k| mask_key(k)).collect()
    }
}

// Keys must never reach logs through a derived Debug.
impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("name", &self.name)
            .field("api_type", &self.api_type)
            .field("base_url", &self.base_url)
            .field("keys", &self.masked_keys())
            .field("legacy", &self.legacy)
            .finish()
    }
}

/// Server-specific configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to bind to
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8990
}

fn default_verify_ssl() -> bool {
    true
}

fn default_request_timeout() -> u64 {
    300
}

fn default_max_body_bytes() -> usize {
    50 * 1024 * 1024
}

fn default_log_buffer_size() -> usize {
    500
}

/// Main application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Server configuration (host, port)
    pub server: ServerConfig,

    /// Registered providers, named and legacy
    pub providers: Vec<ProviderConfig>,

    /// Bearer password for the admin API; admin routes are disabled when unset
    pub admin_password: Option<String>,

    /// Whether to verify SSL certificates for upstream requests
    pub verify_ssl: bool,

    /// Request timeout in seconds for upstream providers
    pub request_timeout_secs: u64,

    /// Maximum accepted inbound body size
    pub max_body_bytes: usize,

    /// Number of request events kept in memory
    pub log_buffer_size: usize,

    /// File the configuration was read from, reused on reload.
    /// `None` when only the process environment was used.
    pub env_file: Option<PathBuf>,
}

impl AppConfig {
    /// Load configuration from an env file merged with the process environment.
    ///
    /// A missing file is only an error when `required` is set; otherwise the
    /// process environment alone is used.
    pub fn load(env_file: &Path, required: bool) -> Result<Self> {
        let mut vars = HashMap::new();
        let found = env_file.exists();

        if found {
            let iter = dotenvy::from_path_iter(env_file)
                .with_context(|| format!("Failed to read env file: {}", env_file.display()))?;
            for item in iter {
                let (key, value) = item
                    .with_context(|| format!("Failed to parse env file: {}", env_file.display()))?;
                vars.insert(key, value);
            }
            tracing::info!(path = %env_file.display(), entries = vars.len(), "Loaded env file");
        } else if required {
            bail!("Env file not found: {}", env_file.display());
        }

        // Environment variables take precedence over the file
        vars.extend(std::env::vars());

        let mut config = Self::from_vars(&vars)?;
        config.env_file = found.then(|| env_file.to_path_buf());
        Ok(config)
    }

    /// Build configuration from an already-collected variable map.
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self> {
        let mut server = ServerConfig::default();
        if let Some(host) = non_empty(vars, "HOST") {
            server.host = host.to_string();
        }
        if let Some(port) = non_empty(vars, "PORT") {
            server.port = port
                .parse::<u16>()
                .with_context(|| format!("Invalid PORT value: {}", port))?;
        }

        let verify_ssl = non_empty(vars, "VERIFY_SSL")
            .map(str_to_bool)
            .unwrap_or_else(default_verify_ssl);
        let request_timeout_secs =
            parse_or(vars, "REQUEST_TIMEOUT_SECS", default_request_timeout())?;
        let max_body_bytes = parse_or(vars, "MAX_BODY_BYTES", default_max_body_bytes())?;
        let log_buffer_size = parse_or(vars, "LOG_BUFFER_SIZE", default_log_buffer_size())?;
        let admin_password = non_empty(vars, "ADMIN_PASSWORD").map(str::to_string);

        let providers = parse_providers(vars);

        if providers.is_empty() && admin_password.is_none() {
            bail!(
                "No providers configured and no ADMIN_PASSWORD set. \
                 Configure at least one <NAME>_<OPENAI|GEMINI>_API_KEYS variable"
            );
        }

        Ok(Self {
            server,
            providers,
            admin_password,
            verify_ssl,
            request_timeout_secs,
            max_body_bytes,
            log_buffer_size,
            env_file: None,
        })
    }

    /// Log a summary of the providers with masked keys.
    pub fn log_providers(&self) {
        for provider in &self.providers {
            tracing::info!(
                provider = %provider.name,
                api_type = %provider.api_type,
                base_url = %provider.base_url,
                legacy = provider.legacy,
                keys = ?provider.masked_keys(),
                "Provider registered"
            );
        }
    }
}

fn provider_var_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^([A-Za-z0-9][A-Za-z0-9_]*?)_(OPENAI|GEMINI)_API_KEYS$")
            .expect("provider variable pattern is valid")
    })
}

/// Collect named providers first, then fill in legacy ones whose name is free.
fn parse_providers(vars: &HashMap<String, String>) -> Vec<ProviderConfig> {
    let mut providers: Vec<ProviderConfig> = Vec::new();

    let mut names: Vec<&String> = vars.keys().collect();
    names.sort();

    for var in names {
        let Some(caps) = provider_var_regex().captures(var) else {
            continue;
        };
        let raw_name = &caps[1];
        let type_token = &caps[2];
        let Some(api_type) = ApiType::parse(type_token) else {
            continue;
        };
        let name = raw_name.to_ascii_lowercase();

        if RESERVED_PROVIDER_NAMES.contains(&name.as_str()) {
            tracing::warn!(provider = %name, "Skipping provider with reserved name");
            continue;
        }
        if providers.iter().any(|p| p.name == name) {
            tracing::warn!(provider = %name, "Duplicate provider name, keeping the first definition");
            continue;
        }

        let keys = parse_api_keys(&vars[var]);
        if keys.is_empty() {
            tracing::warn!(provider = %name, "Skipping provider without API keys");
            continue;
        }

        let base_url_var = format!("{}_{}_BASE_URL", raw_name, type_token);
        let base_url = non_empty(vars, &base_url_var)
            .unwrap_or_else(|| api_type.default_base_url())
            .to_string();

        providers.push(ProviderConfig::new(name, api_type, base_url, keys));
    }

    let shared_base = non_empty(vars, "BASE_URL");

    let legacy = [
        (
            ApiType::Gemini,
            "GEMINI_API_KEYS",
            shared_base.unwrap_or(LEGACY_GEMINI_BASE_URL),
        ),
        (
            ApiType::OpenAi,
            "OPENAI_API_KEYS",
            shared_base
                .or_else(|| non_empty(vars, "OPENAI_BASE_URL"))
                .unwrap_or(LEGACY_OPENAI_BASE_URL),
        ),
    ];

    for (api_type, var, base_url) in legacy {
        let keys = non_empty(vars, var).map(parse_api_keys).unwrap_or_default();
        if keys.is_empty() {
            continue;
        }
        if providers.iter().any(|p| p.name == api_type.as_str()) {
            tracing::warn!(
                provider = %api_type,
                "Named provider shadows legacy {} variable",
                var
            );
            continue;
        }
        providers.push(ProviderConfig::new(api_type.as_str(), api_type, base_url, keys).legacy());
    }

    providers
}

/// Split a comma-separated key list, trimming blanks.
pub fn parse_api_keys(value: &str) -> Vec<String> {
    dedup_keys(
        value
            .split(',')
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(str::to_string)
            .collect(),
    )
}

fn dedup_keys(keys: Vec<String>) -> Vec<String> {
    let mut unique: Vec<String> = Vec::with_capacity(keys.len());
    for key in keys {
        if !unique.contains(&key) {
            unique.push(key);
        }
    }
    unique
}

fn non_empty<'a>(vars: &'a HashMap<String, String>, key: &str) -> Option<&'a str> {
    vars.get(key)
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
}

fn parse_or<T: std::str::FromStr>(
    vars: &HashMap<String, String>,
    key: &str,
    default: T,
) -> Result<T> {
    match non_empty(vars, key) {
        Some(raw) => raw
            .parse::<T>()
            .map_err(|_| anyhow::anyhow!("Invalid {} value: {}", key, raw)),
        None => Ok(default),
    }
}

/// Convert string to boolean.
///
/// Accepts: "true", "1", "yes", "on" (case-insensitive)
fn str_to_bool(value: &str) -> bool {
    matches!(value.to_lowercase().as_str(), "true" | "1" | "yes" | "on")
}
