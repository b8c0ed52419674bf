//! Configuration management with layered loading
//!
//! Precedence (lowest to highest):
//! 1. Compiled defaults
//! 2. Global config: `$XDG_CONFIG_HOME/layersort/layersort.toml`
//! 3. Local config: `<project_dir>/.layersort.toml`
//! 4. Environment variables: `LAYERSORT_*` prefix

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use config::{Config, ConfigError, Environment};
use directories::ProjectDirs;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::application::services::FilterTiming;
use crate::application::ApplicationError;
use crate::domain::{LocationRule, OriginClassifier, ProfileKind, DEFAULT_MAX_DEPTH};

pub const DEFAULT_SUCCESS_MESSAGE: &str = "Layer Sorting applied successfully.";
pub const DEFAULT_FAILURE_MESSAGE: &str =
    "Layer Sorting Configuration invalid. Please check your console for details.";

/// User-facing notification texts. Passed through verbatim.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct MessagesConfig {
    pub success: String,
    pub failure: String,
}

impl Default for MessagesConfig {
    fn default() -> Self {
        Self {
            success: DEFAULT_SUCCESS_MESSAGE.into(),
            failure: DEFAULT_FAILURE_MESSAGE.into(),
        }
    }
}

/// Domain bundle handling.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(default)]
pub struct DomainConfig {
    /// bundle id -> keep layers no instruction placed
    pub show_remaining: BTreeMap<String, bool>,
    /// layer id -> bundle id
    pub id_matches: BTreeMap<String, String>,
    /// Checked in order; first fragment contained in a layer url wins
    pub location_matches: Vec<LocationRule>,
}

impl DomainConfig {
    pub fn classifier(&self) -> OriginClassifier {
        OriginClassifier::from_tables(self.id_matches.clone(), self.location_matches.clone())
    }

    /// Merge overlay onto self (base).
    ///
    /// - Maps: union, overlay wins per key
    /// - Location rules: overlay rules are checked first, base rules for
    ///   other fragments follow
    fn merge(&self, overlay: &RawDomainConfig) -> Self {
        let mut show_remaining = self.show_remaining.clone();
        if let Some(o) = &overlay.show_remaining {
            show_remaining.extend(o.iter().map(|(k, v)| (k.clone(), *v)));
        }
        let mut id_matches = self.id_matches.clone();
        if let Some(o) = &overlay.id_matches {
            id_matches.extend(o.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        let location_matches = match &overlay.location_matches {
            Some(rules) => rules
                .iter()
                .cloned()
                .chain(
                    self.location_matches
                        .iter()
                        .filter(|r| !rules.iter().any(|o| o.fragment == r.fragment))
                        .cloned(),
                )
                .collect(),
            None => self.location_matches.clone(),
        };
        Self {
            show_remaining,
            id_matches,
            location_matches,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct RawMessagesConfig {
    pub success: Option<String>,
    pub failure: Option<String>,
}

/// Raw domain config for intermediate parsing (None = not specified, inherit).
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct RawDomainConfig {
    pub show_remaining: Option<BTreeMap<String, bool>>,
    pub id_matches: Option<BTreeMap<String, String>>,
    pub location_matches: Option<Vec<LocationRule>>,
}

/// Raw settings for intermediate parsing.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct RawSettings {
    pub validation_profile: Option<ProfileKind>,
    pub filter_timing: Option<FilterTiming>,
    pub max_depth: Option<usize>,
    pub map_file: Option<PathBuf>,
    pub instructions_file: Option<PathBuf>,
    pub messages: RawMessagesConfig,
    pub domain: RawDomainConfig,
}

/// Unified configuration for layersort.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Settings {
    pub validation_profile: ProfileKind,
    pub filter_timing: FilterTiming,
    /// Parent chains longer than this are reported
    pub max_depth: usize,
    /// Map document (live tree at rest)
    pub map_file: Option<PathBuf>,
    /// Instruction list
    pub instructions_file: Option<PathBuf>,
    pub messages: MessagesConfig,
    pub domain: DomainConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            validation_profile: ProfileKind::default(),
            filter_timing: FilterTiming::default(),
            max_depth: DEFAULT_MAX_DEPTH,
            map_file: None,
            instructions_file: None,
            messages: MessagesConfig::default(),
            domain: DomainConfig::default(),
        }
    }
}

/// Get the XDG config directory for layersort.
pub fn global_config_dir() -> Option<PathBuf> {
    ProjectDirs::from("", "", "layersort").map(|dirs| dirs.config_dir().to_path_buf())
}

/// Get the path to the global config file.
pub fn global_config_path() -> Option<PathBuf> {
    global_config_dir().map(|dir| dir.join("layersort.toml"))
}

/// Get the path to the local config file in a project directory.
pub fn local_config_path(project_dir: &Path) -> PathBuf {
    project_dir.join(".layersort.toml")
}

/// Load a TOML file into RawSettings for manual merging.
fn load_raw_settings(path: &Path) -> Result<RawSettings, ApplicationError> {
    let content = std::fs::read_to_string(path).map_err(|e| ApplicationError::Config {
        message: format!("read {}: {}", path.display(), e),
    })?;
    toml::from_str(&content).map_err(|e| ApplicationError::Config {
        message: format!("parse {}: {}", path.display(), e),
    })
}

fn expand_path(path: &Path) -> PathBuf {
    let raw = path.to_string_lossy();
    match shellexpand::full(raw.as_ref()) {
        Ok(expanded) => PathBuf::from(expanded.as_ref()),
        Err(_) => path.to_path_buf(),
    }
}

impl Settings {
    /// Expand shell variables and tilde in path-like fields.
    fn expand_paths(&mut self) {
        self.map_file = self.map_file.as_deref().map(expand_path);
        self.instructions_file = self.instructions_file.as_deref().map(expand_path);
    }

    /// Merge overlay config onto self (base).
    ///
    /// - Scalar options: overlay wins if Some, otherwise keep base
    /// - Tables: see [`DomainConfig::merge`]
    fn merge_with(&self, overlay: &RawSettings) -> Self {
        Self {
            validation_profile: overlay
                .validation_profile
                .unwrap_or(self.validation_profile),
            filter_timing: overlay.filter_timing.unwrap_or(self.filter_timing),
            max_depth: overlay.max_depth.unwrap_or(self.max_depth),
            map_file: overlay.map_file.clone().or_else(|| self.map_file.clone()),
            instructions_file: overlay
                .instructions_file
                .clone()
                .or_else(|| self.instructions_file.clone()),
            messages: MessagesConfig {
                success: overlay
                    .messages
                    .success
                    .clone()
                    .unwrap_or_else(|| self.messages.success.clone()),
                failure: overlay
                    .messages
                    .failure
                    .clone()
                    .unwrap_or_else(|| self.messages.failure.clone()),
            },
            domain: self.domain.merge(&overlay.domain),
        }
    }

    /// Load settings with layered precedence.
    ///
    /// # Arguments
    /// * `project_dir` - Optional project directory for local config
    pub fn load(project_dir: Option<&Path>) -> Result<Self, ApplicationError> {
        let global = global_config_path();
        let local = project_dir.map(local_config_path);
        Self::load_from(global.as_deref(), local.as_deref())
    }

    /// Load settings from explicit config file locations. Missing files are skipped.
    pub fn load_from(global: Option<&Path>, local: Option<&Path>) -> Result<Self, ApplicationError> {
        let mut current = Self::default();

        for path in [global, local].into_iter().flatten() {
            if path.exists() {
                debug!("loading config: {}", path.display());
                let raw = load_raw_settings(path)?;
                current = current.merge_with(&raw);
            }
        }

        current = Self::apply_env_overrides(current)?;
        current.expand_paths();

        Ok(current)
    }

    /// Apply LAYERSORT_* environment variables as explicit overrides.
    fn apply_env_overrides(mut settings: Self) -> Result<Self, ApplicationError> {
        let config = Config::builder()
            .add_source(Environment::with_prefix("LAYERSORT").separator("__"))
            .build()
            .map_err(config_err)?;

        if let Some(val) = env_value::<ProfileKind>(&config, "validation_profile")? {
            settings.validation_profile = val;
        }
        if let Some(val) = env_value::<FilterTiming>(&config, "filter_timing")? {
            settings.filter_timing = val;
        }
        if let Some(val) = env_value::<usize>(&config, "max_depth")? {
            settings.max_depth = val;
        }
        if let Some(val) = env_value::<String>(&config, "map_file")? {
            settings.map_file = Some(PathBuf::from(val));
        }
        if let Some(val) = env_value::<String>(&config, "instructions_file")? {
            settings.instructions_file = Some(PathBuf::from(val));
        }
        if let Some(val) = env_value::<String>(&config, "messages.success")? {
            settings.messages.success = val;
        }
        if let Some(val) = env_value::<String>(&config, "messages.failure")? {
            settings.messages.failure = val;
        }

        Ok(settings)
    }

    /// Show the effective configuration as TOML.
    pub fn to_toml(&self) -> Result<String, ApplicationError> {
        toml::to_string_pretty(self).map_err(|e| ApplicationError::Config {
            message: format!("serialize config: {e}"),
        })
    }

    /// Generate a template config file.
    pub fn template() -> String {
        r#"# layersort configuration
#
# Locations (by precedence, lowest to highest):
#   Global: ~/.config/layersort/layersort.toml
#   Local:  <project_dir>/.layersort.toml
#   Env:    LAYERSORT_* environment variables (e.g. LAYERSORT_VALIDATION_PROFILE)
#
# Tables ([domain.*]) are merged key by key, later layers win.

# "strict" checks declaration order, nesting depth and sibling order;
# "permissive" accepts any declaration order and creates missing parents.
# validation_profile = "strict"

# Run the domain bundle filter "before" or "after" restructuring
# filter_timing = "after"

# Parent chains deeper than this are reported
# max_depth = 5

# map_file = "map.json"
# instructions_file = "layersort.json"

[messages]
# success = "Layer Sorting applied successfully."
# failure = "Layer Sorting Configuration invalid. Please check your console for details."

[domain.show_remaining]
# Keep layers of a bundle that no instruction placed
# "domain-sample_1" = false

[domain.id_matches]
# Attribute layers to a bundle by exact id
# "layer_domain_1" = "domain-sample_1"

# Attribute layers to a bundle by url fragment, first match wins
# [[domain.location_matches]]
# fragment = "Hamburg_Schulen"
# bundle = "domain-sample_1"
"#
        .to_string()
    }
}

/// Typed env lookup: absent is `None`, unparsable is an error.
fn env_value<T: DeserializeOwned>(config: &Config, key: &str) -> Result<Option<T>, ApplicationError> {
    match config.get::<T>(key) {
        Ok(val) => Ok(Some(val)),
        Err(ConfigError::NotFound(_)) => Ok(None),
        Err(e) => Err(ApplicationError::Config {
            message: format!("LAYERSORT_{}: {e}", key.replace('.', "__").to_uppercase()),
        }),
    }
}

fn config_err(e: ConfigError) -> ApplicationError {
    ApplicationError::Config {
        message: e.to_string(),
    }
}
