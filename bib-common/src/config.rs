//! Configuration loading and root folder resolution
//!
//! Configuration comes from a TOML file whose every field has a default, so a
//! missing or partial file never prevents startup. A handful of values can be
//! overridden from the environment; CLI flags are applied by the binary.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// SQLite file name inside the root folder
pub const DATABASE_FILE_NAME: &str = "bib.db";

/// Environment variable naming the config file
pub const ENV_CONFIG: &str = "BIB_CONFIG";
/// Environment variable naming the root folder
pub const ENV_ROOT_FOLDER: &str = "BIB_ROOT_FOLDER";
pub const ENV_BIND: &str = "BIB_BIND";
pub const ENV_CATALOG_API_KEY: &str = "BIB_CATALOG_API_KEY";
pub const ENV_CATALOG_BEARER_TOKEN: &str = "BIB_CATALOG_BEARER_TOKEN";
pub const ENV_SERVICE_SECRET: &str = "BIB_SERVICE_SECRET";

/// Longest accepted session lifetime (ten years)
pub const MAX_SESSION_TTL_HOURS: i64 = 10 * 365 * 24;

/// Top-level TOML configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct TomlConfig {
    /// Folder holding the database (overridable by CLI/ENV)
    pub root_folder: Option<PathBuf>,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
    pub catalog: CatalogConfig,
    pub budget: BudgetConfig,
    pub auth: AuthConfig,
}

/// HTTP listener settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    /// Upper bound for small JSON bodies (analytics, RPC)
    pub max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:5780".to_string(),
            max_body_bytes: 16 * 1024,
        }
    }
}

/// Logging settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Third-party catalog API proxy settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CatalogConfig {
    /// Scheme, host and optional port of the only allowed upstream
    pub upstream_base: String,
    /// Every forwarded path must start with this prefix
    pub path_prefix: String,
    /// Injected as the `api_key` query parameter on upstream calls
    pub api_key: Option<String>,
    /// Sent as `Authorization: Bearer` on upstream calls
    pub bearer_token: Option<String>,
    /// Edge cache freshness window (`s-maxage`)
    pub revalidate_secs: u64,
    pub stale_while_revalidate_secs: u64,
    pub timeout_secs: u64,
    /// Query parameters removed before canonicalization
    pub strip_params: Vec<String>,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            upstream_base: "https://api.themoviedb.org".to_string(),
            path_prefix: "/3/".to_string(),
            api_key: None,
            bearer_token: None,
            revalidate_secs: 3600,
            stale_while_revalidate_secs: 86_400,
            timeout_secs: 10,
            strip_params: vec!["api_key".to_string(), "_".to_string(), "cb".to_string()],
        }
    }
}

/// AI spend guard settings
///
/// Amounts are integer micro-units of currency.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BudgetConfig {
    /// Hard limit given to a scope created without an override
    pub default_hard_limit: i64,
    /// Overrides keyed by exact scope or by the scope prefix before the first `:`
    pub scope_limits: BTreeMap<String, i64>,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            default_hard_limit: 5_000_000,
            scope_limits: BTreeMap::new(),
        }
    }
}

impl BudgetConfig {
    /// Hard limit applied when `scope` is first created
    pub fn limit_for(&self, scope: &str) -> i64 {
        if let Some(limit) = self.scope_limits.get(scope) {
            return *limit;
        }
        scope
            .split_once(':')
            .and_then(|(prefix, _)| self.scope_limits.get(prefix))
            .copied()
            .unwrap_or(self.default_hard_limit)
    }
}

/// Caller authentication settings
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthConfig {
    pub session_ttl_hours: i64,
    /// Oldest accepted service-role request timestamp
    pub max_past_ms: i64,
    /// Furthest-future accepted service-role request timestamp
    pub max_future_ms: i64,
    /// Overrides the secret stored in the database; 0 disables service-role checks
    pub service_secret: Option<i64>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            session_ttl_hours: 720,
            max_past_ms: 1000,
            max_future_ms: 1,
            service_secret: None,
        }
    }
}

impl TomlConfig {
    /// Reject values the server cannot run with
    pub fn validate(&self) -> Result<()> {
        if !self.catalog.path_prefix.starts_with('/') {
            return Err(Error::Config(format!(
                "catalog.path_prefix must start with '/': {}",
                self.catalog.path_prefix
            )));
        }
        if self.catalog.timeout_secs == 0 {
            return Err(Error::Config("catalog.timeout_secs must be > 0".to_string()));
        }
        if self.server.max_body_bytes == 0 {
            return Err(Error::Config("server.max_body_bytes must be > 0".to_string()));
        }
        if self.budget.default_hard_limit < 0 {
            return Err(Error::Config(
                "budget.default_hard_limit must not be negative".to_string(),
            ));
        }
        if let Some((scope, _)) = self.budget.scope_limits.iter().find(|(_, v)| **v < 0) {
            return Err(Error::Config(format!(
                "budget.scope_limits.{} must not be negative",
                scope
            )));
        }
        if !(1..=MAX_SESSION_TTL_HOURS).contains(&self.auth.session_ttl_hours) {
            return Err(Error::Config(format!(
                "auth.session_ttl_hours must be between 1 and {}",
                MAX_SESSION_TTL_HOURS
            )));
        }
        Ok(())
    }
}

/// Load TOML configuration from `path`
///
/// A missing file is not an error: a warning is logged and defaults are used.
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    if !path.exists() {
        warn!("Config file {} not found, using defaults", path.display());
        return Ok(TomlConfig::default());
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
    let config: TomlConfig = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))?;

    info!("Loaded configuration from {}", path.display());
    Ok(config)
}

/// Locate the config file
///
/// Priority: CLI argument → `BIB_CONFIG` → user config dir → `/etc/bib/config.toml`.
pub fn config_file_path(cli_arg: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    if let Some(path) = env_value(ENV_CONFIG) {
        return Some(PathBuf::from(path));
    }

    let user_config = dirs::config_dir().map(|d| d.join("bib").join("config.toml"));
    if let Some(path) = user_config {
        if path.exists() {
            return Some(path);
        }
    }

    let system_config = PathBuf::from("/etc/bib/config.toml");
    if system_config.exists() {
        return Some(system_config);
    }

    None
}

/// Resolve, load, apply environment overrides and validate
pub fn load_config(cli_arg: Option<&Path>) -> Result<TomlConfig> {
    let mut config = match config_file_path(cli_arg) {
        Some(path) => load_toml_config(&path)?,
        None => {
            info!("No config file found, using defaults");
            TomlConfig::default()
        }
    };
    apply_env_overrides(&mut config)?;
    config.validate()?;
    Ok(config)
}

/// Apply `BIB_*` environment overrides
pub fn apply_env_overrides(config: &mut TomlConfig) -> Result<()> {
    if let Some(bind) = env_value(ENV_BIND) {
        config.server.bind = bind;
    }
    if let Some(key) = env_value(ENV_CATALOG_API_KEY) {
        config.catalog.api_key = Some(key);
    }
    if let Some(token) = env_value(ENV_CATALOG_BEARER_TOKEN) {
        config.catalog.bearer_token = Some(token);
    }
    if let Some(secret) = env_value(ENV_SERVICE_SECRET) {
        let secret = secret.parse::<i64>().map_err(|e| {
            Error::Config(format!("{} must be a decimal i64: {}", ENV_SERVICE_SECRET, e))
        })?;
        config.auth.service_secret = Some(secret);
    }
    Ok(())
}

/// Non-empty, trimmed environment variable
fn env_value(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Root folder resolution
///
/// Priority order:
/// 1. Command-line argument (highest priority)
/// 2. `BIB_ROOT_FOLDER` environment variable
/// 3. `root_folder` from the TOML config
/// 4. OS-dependent default (fallback)
#[derive(Debug, Clone)]
pub struct RootFolderResolver {
    module_name: String,
    cli_arg: Option<PathBuf>,
    toml_root: Option<PathBuf>,
}

impl RootFolderResolver {
    pub fn new(module_name: impl Into<String>) -> Self {
        Self {
            module_name: module_name.into(),
            cli_arg: None,
            toml_root: None,
        }
    }

    pub fn with_cli_arg(mut self, path: Option<PathBuf>) -> Self {
        self.cli_arg = path;
        self
    }

    pub fn with_toml_root(mut self, path: Option<PathBuf>) -> Self {
        self.toml_root = path;
        self
    }

    pub fn resolve(&self) -> PathBuf {
        if let Some(path) = &self.cli_arg {
            info!("[{}] Root folder from command line: {}", self.module_name, path.display());
            return path.clone();
        }

        if let Some(path) = env_value(ENV_ROOT_FOLDER) {
            info!("[{}] Root folder from {}: {}", self.module_name, ENV_ROOT_FOLDER, path);
            return PathBuf::from(path);
        }

        if let Some(path) = &self.toml_root {
            info!("[{}] Root folder from config file: {}", self.module_name, path.display());
            return path.clone();
        }

        let path = default_root_folder();
        info!("[{}] Root folder (default): {}", self.module_name, path.display());
        path
    }
}

/// OS-dependent default root folder
pub fn default_root_folder() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("bib"))
        .unwrap_or_else(|| PathBuf::from("./bib_data"))
}

/// Creates the root folder and locates files inside it
#[derive(Debug, Clone)]
pub struct RootFolderInitializer {
    root_folder: PathBuf,
}

impl RootFolderInitializer {
    pub fn new(root_folder: PathBuf) -> Self {
        Self { root_folder }
    }

    pub fn ensure_directory_exists(&self) -> Result<()> {
        if !self.root_folder.exists() {
            std::fs::create_dir_all(&self.root_folder)?;
            info!("Created root folder: {}", self.root_folder.display());
        }
        Ok(())
    }

    pub fn database_path(&self) -> PathBuf {
        self.root_folder.join(DATABASE_FILE_NAME)
    }
}
