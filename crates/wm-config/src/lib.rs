//! Configuration management for wm.
//!
//! Parses `wm.toml` configuration files with serde and provides
//! auto-discovery of config files in parent directories.
//!
//! CLI settings can be applied during load via [`CliSettings`].
//!
//! ## Environment Variable Expansion
//!
//! String configuration values support environment variable expansion:
//!
//! - `${VAR}` - expands to the value of VAR, errors if unset
//! - `${VAR:-default}` - expands to VAR if set, otherwise uses default
//!
//! Expanded fields:
//! - `source.base_url`
//! - `source.token`
//! - `access[].password`

mod expand;

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Configuration filename to search for.
const CONFIG_FILENAME: &str = "wm.toml";

/// CLI settings that override configuration file values.
///
/// All fields are optional. Only non-None values override the loaded config.
#[derive(Debug, Default)]
pub struct CliSettings {
    /// Override cache enabled flag.
    pub cache_enabled: Option<bool>,
    /// Force re-fetch of all assets, bypassing the asset index.
    pub force_refresh: Option<bool>,
    /// Override the generated-content output directory.
    pub output_dir: Option<PathBuf>,
}

/// Application configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Site identity.
    pub site: SiteConfig,
    /// Content source connection. Required for `wm sync`.
    pub source: Option<SourceConfig>,
    /// Route overrides: node id → explicit route path.
    pub routes: HashMap<String, String>,
    /// Navigation items, in display order.
    pub nav: Vec<NavItem>,
    /// Access-control rules, emitted verbatim into the rules artifact.
    pub access: Vec<AccessRule>,
    /// Output locations (paths are relative strings from TOML).
    output: OutputConfigRaw,

    /// Resolved output configuration (set after loading).
    #[serde(skip)]
    pub output_resolved: OutputConfig,
    /// Force-refresh flag (CLI only, never from the file).
    #[serde(skip)]
    pub force_refresh: bool,
    /// Path to the config file (set after loading).
    #[serde(skip)]
    pub config_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self::default_with_base(Path::new("."))
    }
}

/// Site identity configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SiteConfig {
    /// Site display name.
    pub name: String,
    /// Content language tag.
    pub language: String,
    /// Production domain; absolute links to it are relativized during
    /// rendering.
    pub domain: Option<String>,
}

impl Default for SiteConfig {
    fn default() -> Self {
        Self {
            name: "Site".to_owned(),
            language: "en".to_owned(),
            domain: None,
        }
    }
}

/// Content source connection.
#[derive(Debug, Deserialize)]
pub struct SourceConfig {
    /// Workspace API base URL.
    pub base_url: String,
    /// API token (supports env expansion).
    pub token: String,
    /// Root node id; the sync mirrors everything under it.
    pub root: String,
    /// Node id served at `/`. Defaults to slug-based detection.
    #[serde(default)]
    pub home: Option<String>,
    /// Extra node ids synced as additional top-level nodes.
    #[serde(default)]
    pub include: Vec<String>,
}

impl SourceConfig {
    /// Validate that all required fields are properly set.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Validation` if any field is empty or has an
    /// invalid format.
    pub fn validate(&self) -> Result<(), ConfigError> {
        require_non_empty(&self.base_url, "source.base_url")?;
        require_http_url(&self.base_url, "source.base_url")?;
        require_non_empty(&self.token, "source.token")?;
        require_non_empty(&self.root, "source.root")?;
        Ok(())
    }
}

/// One navigation item.
#[derive(Clone, Debug, Deserialize)]
pub struct NavItem {
    /// Display title.
    pub title: String,
    /// Route path the item links to.
    pub path: String,
}

/// Matching mode of an access rule.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AccessMode {
    /// Match the path exactly.
    Exact,
    /// Match the path and everything under it.
    Prefix,
}

/// Authentication scheme of an access rule.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AccessAuth {
    /// Shared password.
    Password,
    /// GitHub identity.
    Github,
}

/// One access-control rule.
///
/// Consumed by the serving layer; this pipeline only validates and emits
/// them.
#[derive(Clone, Debug, Deserialize)]
pub struct AccessRule {
    /// Protected node id; resolved to its route path at sync time.
    #[serde(default)]
    pub page: Option<String>,
    /// Protected route path, used when no node id is given.
    #[serde(default)]
    pub path: Option<String>,
    /// Matching mode.
    pub mode: AccessMode,
    /// Authentication scheme.
    pub auth: AccessAuth,
    /// Shared password (supports env expansion). Required for
    /// `auth = "password"`.
    #[serde(default)]
    pub password: Option<String>,
}

impl AccessRule {
    fn validate(&self, index: usize) -> Result<(), ConfigError> {
        if self.page.is_none() && self.path.is_none() {
            return Err(ConfigError::Validation(format!(
                "access[{index}] needs either a page id or a path"
            )));
        }
        if self.auth == AccessAuth::Password
            && self.password.as_deref().is_none_or(str::is_empty)
        {
            return Err(ConfigError::Validation(format!(
                "access[{index}] uses password auth but sets no password"
            )));
        }
        Ok(())
    }
}

/// Raw output configuration as parsed from TOML (paths as strings).
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct OutputConfigRaw {
    dir: Option<String>,
    assets_dir: Option<String>,
    cache_dir: Option<String>,
    cache_enabled: Option<bool>,
}

/// Resolved output configuration with absolute paths.
#[derive(Debug, Default)]
pub struct OutputConfig {
    /// Generated-content directory (HTML files and JSON artifacts).
    pub dir: PathBuf,
    /// Public directory binary assets are written to.
    pub assets_dir: PathBuf,
    /// Cache directory for the traversal and render caches.
    pub cache_dir: PathBuf,
    /// Whether the traversal/render caches are enabled.
    pub cache_enabled: bool,
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File not found.
    #[error("Configuration file not found: {}", .0.display())]
    NotFound(PathBuf),
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// TOML parsing error.
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),
    /// Validation error.
    #[error("Configuration error: {0}")]
    Validation(String),
    /// Environment variable error during expansion.
    #[error("Environment variable error in {field}: {message}")]
    EnvVar {
        /// Config field path (e.g., "`source.token`").
        field: String,
        /// Error message (e.g., "${`WM_TOKEN`} not set").
        message: String,
    },
}

/// Require a string field to be non-empty.
fn require_non_empty(value: &str, field: &str) -> Result<(), ConfigError> {
    if value.is_empty() {
        return Err(ConfigError::Validation(format!("{field} cannot be empty")));
    }
    Ok(())
}

/// Require a URL field to use http:// or https:// scheme.
fn require_http_url(url: &str, field: &str) -> Result<(), ConfigError> {
    if !url.starts_with("http://") && !url.starts_with("https://") {
        return Err(ConfigError::Validation(format!(
            "{field} must start with http:// or https://"
        )));
    }
    Ok(())
}

impl Config {
    /// Load configuration from file with optional CLI settings.
    ///
    /// If `config_path` is provided, loads from that file.
    /// Otherwise, searches for `wm.toml` in current directory and parents.
    ///
    /// CLI settings are applied after loading and path resolution, allowing
    /// CLI arguments to take precedence over config file values.
    ///
    /// # Errors
    ///
    /// Returns error if explicit `config_path` doesn't exist or parsing fails.
    pub fn load(
        config_path: Option<&Path>,
        cli_settings: Option<&CliSettings>,
    ) -> Result<Self, ConfigError> {
        let mut config = if let Some(path) = config_path {
            if !path.exists() {
                return Err(ConfigError::NotFound(path.to_path_buf()));
            }
            Self::load_from_file(path)?
        } else if let Some(discovered) = Self::discover_config() {
            Self::load_from_file(&discovered)?
        } else {
            Self::default_with_cwd()
        };

        if let Some(settings) = cli_settings {
            config.apply_cli_settings(settings);
        }

        Ok(config)
    }

    /// Get validated source configuration.
    ///
    /// Use this instead of accessing the `source` field directly when the
    /// command requires the content source.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Validation` if the section is missing or invalid.
    pub fn require_source(&self) -> Result<&SourceConfig, ConfigError> {
        let source = self
            .source
            .as_ref()
            .ok_or_else(|| ConfigError::Validation("[source] section required in config".into()))?;
        source.validate()?;
        Ok(source)
    }

    /// Apply CLI settings to the configuration.
    fn apply_cli_settings(&mut self, settings: &CliSettings) {
        if let Some(cache_enabled) = settings.cache_enabled {
            self.output_resolved.cache_enabled = cache_enabled;
        }
        if let Some(force_refresh) = settings.force_refresh {
            self.force_refresh = force_refresh;
        }
        if let Some(output_dir) = &settings.output_dir {
            self.output_resolved.dir.clone_from(output_dir);
        }
    }

    /// Search for config file in current directory and parents.
    fn discover_config() -> Option<PathBuf> {
        let mut current = std::env::current_dir().ok()?;
        loop {
            let candidate = current.join(CONFIG_FILENAME);
            if candidate.exists() {
                return Some(candidate);
            }
            if !current.pop() {
                return None;
            }
        }
    }

    /// Create default config with paths relative to current working directory.
    fn default_with_cwd() -> Self {
        let cwd = std::env::current_dir().unwrap_or_default();
        Self::default_with_base(&cwd)
    }

    /// Create default config with paths relative to given base directory.
    fn default_with_base(base: &Path) -> Self {
        Self {
            site: SiteConfig::default(),
            source: None,
            routes: HashMap::new(),
            nav: Vec::new(),
            access: Vec::new(),
            output: OutputConfigRaw::default(),
            output_resolved: OutputConfig {
                dir: base.join("public/content"),
                assets_dir: base.join("public/assets"),
                cache_dir: base.join(".wm/cache"),
                cache_enabled: true,
            },
            force_refresh: false,
            config_path: None,
        }
    }

    /// Load configuration from a specific file.
    fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let mut config: Self = toml::from_str(&content)?;

        // Expand environment variables before path resolution
        config.expand_env_vars()?;

        let config_dir = path.parent().unwrap_or(Path::new("."));
        config.resolve_paths(config_dir);
        config.config_path = Some(path.to_path_buf());

        // Validate configuration after loading and resolution
        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values.
    ///
    /// Called automatically after loading from file. The `[source]` section
    /// is validated lazily via [`Config::require_source`], so a config
    /// without one still loads for commands that don't need it.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Validation` if any validation fails.
    pub fn validate(&self) -> Result<(), ConfigError> {
        require_non_empty(&self.site.name, "site.name")?;
        require_non_empty(&self.site.language, "site.language")?;

        for (id, path) in &self.routes {
            if path.trim_matches('/').is_empty() && path != "/" {
                return Err(ConfigError::Validation(format!(
                    "routes.{id} is not a usable path"
                )));
            }
        }

        for (index, rule) in self.access.iter().enumerate() {
            rule.validate(index)?;
        }

        Ok(())
    }

    /// Expand environment variable references in configuration strings.
    fn expand_env_vars(&mut self) -> Result<(), ConfigError> {
        if let Some(ref mut source) = self.source {
            source.base_url = expand::expand_env(&source.base_url, "source.base_url")?;
            source.token = expand::expand_env(&source.token, "source.token")?;
        }

        for (index, rule) in self.access.iter_mut().enumerate() {
            if let Some(ref password) = rule.password {
                rule.password = Some(expand::expand_env(
                    password,
                    &format!("access[{index}].password"),
                )?);
            }
        }

        Ok(())
    }

    /// Resolve relative paths to absolute paths based on config directory.
    fn resolve_paths(&mut self, config_dir: &Path) {
        let resolve = |path: Option<&str>, default: &str| config_dir.join(path.unwrap_or(default));

        self.output_resolved = OutputConfig {
            dir: resolve(self.output.dir.as_deref(), "public/content"),
            assets_dir: resolve(self.output.assets_dir.as_deref(), "public/assets"),
            cache_dir: resolve(self.output.cache_dir.as_deref(), ".wm/cache"),
            cache_enabled: self.output.cache_enabled.unwrap_or(true),
        };
    }
}
