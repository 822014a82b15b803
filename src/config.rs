//! Configuration loading.
//!
//! Settings come from a TOML file; credentials come only from the
//! environment. Both are plain values threaded into the client and the
//! driver at construction.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use harvest_core::layout::Layout;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub harvest: HarvestConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub import: ImportConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    #[serde(default = "default_root")]
    pub root: PathBuf,
    #[serde(default = "default_scope_prefix")]
    pub scope_prefix: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            scope_prefix: default_scope_prefix(),
        }
    }
}

fn default_root() -> PathBuf {
    PathBuf::from("data/reddit/00_raw")
}
fn default_scope_prefix() -> String {
    "r_".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct HarvestConfig {
    #[serde(default = "default_days")]
    pub days: u32,
    #[serde(default = "default_page_limit")]
    pub page_limit: u32,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            days: default_days(),
            page_limit: default_page_limit(),
        }
    }
}

fn default_days() -> u32 {
    7
}
fn default_page_limit() -> u32 {
    100
}

/// Largest page the listing endpoint honours.
pub const MAX_PAGE_LIMIT: u32 = 100;

/// Clamp a requested page size into `1..=100`; out-of-range values fall
/// back to the maximum.
pub fn clamp_page_limit(limit: u32) -> u32 {
    if limit == 0 || limit > MAX_PAGE_LIMIT {
        MAX_PAGE_LIMIT
    } else {
        limit
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_token_url")]
    pub token_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            token_url: default_token_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_base_url() -> String {
    "https://oauth.reddit.com".to_string()
}
fn default_token_url() -> String {
    "https://www.reddit.com/api/v1/access_token".to_string()
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct ImportConfig {
    #[serde(default = "default_post_globs")]
    pub post_globs: Vec<String>,
    #[serde(default = "default_comment_globs")]
    pub comment_globs: Vec<String>,
    #[serde(default = "default_report_every")]
    pub report_every: u64,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            post_globs: default_post_globs(),
            comment_globs: default_comment_globs(),
            report_every: default_report_every(),
        }
    }
}

fn default_post_globs() -> Vec<String> {
    vec!["**/*_posts*".to_string()]
}
fn default_comment_globs() -> Vec<String> {
    vec!["**/*_comments*".to_string()]
}
fn default_report_every() -> u64 {
    200_000
}

impl Config {
    /// Defaults only, for when no config file exists.
    pub fn minimal() -> Self {
        Self::default()
    }

    pub fn layout(&self) -> Layout {
        Layout::new(&self.storage.root, &self.storage.scope_prefix)
    }
}

/// Read and validate a config file.
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

/// Load `path` if it exists. A missing file is only acceptable when the
/// caller is using the default location.
pub fn load_or_default(path: &Path, is_default_path: bool) -> Result<Config> {
    if is_default_path && !path.exists() {
        return Ok(Config::minimal());
    }
    load_config(path)
}

/// Longest lookback window accepted, in days.
pub const MAX_DAYS: u32 = 36_500;

/// Reject lookback windows too large to represent as a cutoff.
pub fn check_days(days: u32) -> Result<u32> {
    if days > MAX_DAYS {
        bail!("days must be <= {}, got {}", MAX_DAYS, days);
    }
    Ok(days)
}

fn validate(config: &Config) -> Result<()> {
    check_days(config.harvest.days)?;
    if config.api.timeout_secs == 0 {
        bail!("api.timeout_secs must be > 0");
    }
    for (key, url) in [
        ("api.base_url", &config.api.base_url),
        ("api.token_url", &config.api.token_url),
    ] {
        if !url.starts_with("http://") && !url.starts_with("https://") {
            bail!("{} must be an http(s) URL, got '{}'", key, url);
        }
    }
    if config.storage.scope_prefix.contains('/') || config.storage.scope_prefix.contains('\\') {
        bail!(
            "storage.scope_prefix must not contain a path separator: '{}'",
            config.storage.scope_prefix
        );
    }
    if config.import.post_globs.is_empty() {
        bail!("import.post_globs must not be empty");
    }
    Ok(())
}

/// API credentials, read from the environment.
#[derive(Clone)]
pub struct Credentials {
    pub client_id: String,
    pub client_secret: String,
    pub user_agent: String,
    /// Username and password, when both are set. Selects the password grant.
    pub password_login: Option<(String, String)>,
}

impl Credentials {
    /// Load `REDDIT_CLIENT_ID`, `REDDIT_CLIENT_SECRET`, `REDDIT_USER_AGENT`,
    /// and optionally `REDDIT_USERNAME` / `REDDIT_PASSWORD`.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let required = |key: &str| -> Result<String> {
            match lookup(key) {
                Some(v) if !v.is_empty() => Ok(v),
                _ => bail!("{} not set", key),
            }
        };
        let user_agent = required("REDDIT_USER_AGENT")?;
        let client_id = required("REDDIT_CLIENT_ID")?;
        let client_secret = required("REDDIT_CLIENT_SECRET")?;
        let username = lookup("REDDIT_USERNAME").filter(|v| !v.is_empty());
        let password = lookup("REDDIT_PASSWORD").filter(|v| !v.is_empty());
        Ok(Self {
            client_id,
            client_secret,
            user_agent,
            password_login: username.zip(password),
        })
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("user_agent", &self.user_agent)
            .field(
                "password_login",
                &self.password_login.as_ref().map(|(user, _)| user),
            )
            .finish()
    }
}
