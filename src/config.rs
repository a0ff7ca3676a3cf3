//! Configuration file support for remotejob.
//!
//! Load settings from `.remotejob.toml` or `~/.config/remotejob/config.toml`.
//!
//! ## Config Resolution Order
//!
//! 1. Explicit values set by the caller (highest priority)
//! 2. Environment variables (`S3_BUCKET`, `S3_ENDPOINT`, `S3_REGION`, `REMOTEJOB_*`)
//! 3. Profile-specific settings (if a profile is selected)
//! 4. Project-level `.remotejob.toml`
//! 5. User-level `~/.config/remotejob/config.toml`
//! 6. Built-in defaults (lowest priority)

use std::collections::{HashMap, HashSet};
use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::mq::{QueueAttributes, VISIBILITY_TIMEOUT_ATTRIBUTE};

/// Shortest long-poll wait a receive uses. A zero wait would make `next`
/// spin on an empty queue.
pub const MIN_WAIT_TIME_SECONDS: u64 = 1;

/// Longest long-poll wait a receive may request.
pub const MAX_WAIT_TIME_SECONDS: u64 = 20;

/// Longest visibility timeout a queue may be created with (12 hours).
pub const MAX_VISIBILITY_TIMEOUT_SECONDS: u64 = 43_200;

/// Resolved configuration for a remote job client.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct RemoteJobConfig {
    /// Bucket holding job payloads and result assets.
    pub bucket: String,
    /// Optional custom endpoint for S3/SQS-compatible services.
    pub endpoint: Option<String>,
    /// AWS region (defaults to "us-east-1").
    #[serde(default = "default_region")]
    pub region: String,
    /// Queue settings.
    #[serde(default)]
    pub queues: QueueSettings,
}

/// Logical queues and their polling behavior.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct QueueSettings {
    /// Logical queue names to provision.
    pub names: Vec<String>,
    /// Queue that `submit` sends to.
    pub default: String,
    /// Optional queue that receives failed job outcomes.
    pub failed: Option<String>,
    /// Prefix added to every logical name to form the backend queue name.
    pub prefix: String,
    /// Long-poll wait per receive, in seconds.
    pub wait_time_seconds: u64,
    /// Visibility timeout queues are created with, in seconds.
    pub visibility_timeout_seconds: u64,
}

fn default_region() -> String {
    "us-east-1".to_string()
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            names: vec!["pending".to_string()],
            default: "pending".to_string(),
            failed: None,
            prefix: String::new(),
            wait_time_seconds: MAX_WAIT_TIME_SECONDS,
            visibility_timeout_seconds: 30,
        }
    }
}

impl QueueSettings {
    /// Every logical queue the client provisions: the configured names plus
    /// the failed queue, without duplicates, in configuration order.
    #[must_use]
    pub fn provisioned_names(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        self.names
            .iter()
            .chain(self.failed.iter())
            .filter(|name| seen.insert(*name))
            .cloned()
            .collect()
    }

    /// Returns `true` if `name` is one of the provisioned logical queues.
    #[must_use]
    pub fn is_provisioned(&self, name: &str) -> bool {
        self.names.iter().any(|n| n == name) || self.failed.as_deref() == Some(name)
    }

    /// Backend queue name for a logical queue name.
    #[must_use]
    pub fn backend_name(&self, logical: &str) -> String {
        format!("{}{}", self.prefix, logical)
    }

    /// Long-poll wait per receive, clamped to the supported range.
    #[must_use]
    pub fn wait_time(&self) -> Duration {
        Duration::from_secs(
            self.wait_time_seconds
                .clamp(MIN_WAIT_TIME_SECONDS, MAX_WAIT_TIME_SECONDS),
        )
    }

    /// Attributes queues are created with.
    #[must_use]
    pub fn backend_attributes(&self) -> QueueAttributes {
        QueueAttributes::from([(
            VISIBILITY_TIMEOUT_ATTRIBUTE.to_string(),
            self.visibility_timeout_seconds.to_string(),
        )])
    }
}

impl Default for RemoteJobConfig {
    fn default() -> Self {
        Self {
            bucket: String::new(),
            endpoint: None,
            region: default_region(),
            queues: QueueSettings::default(),
        }
    }
}

impl RemoteJobConfig {
    /// Creates a configuration for `bucket` with default queues.
    #[must_use]
    pub fn new(bucket: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            ..Self::default()
        }
    }

    /// Replaces the logical queue names.
    #[must_use]
    pub fn with_queues<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.queues.names = names.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the queue `submit` sends to.
    #[must_use]
    pub fn with_default_queue(mut self, name: impl Into<String>) -> Self {
        self.queues.default = name.into();
        self
    }

    /// Sets the queue that receives failed job outcomes.
    #[must_use]
    pub fn with_failed_queue(mut self, name: impl Into<String>) -> Self {
        self.queues.failed = Some(name.into());
        self
    }

    /// Sets the long-poll wait per receive.
    #[must_use]
    pub const fn with_wait_time_seconds(mut self, seconds: u64) -> Self {
        self.queues.wait_time_seconds = seconds;
        self
    }

    /// Sets the visibility timeout queues are created with.
    #[must_use]
    pub const fn with_visibility_timeout_seconds(mut self, seconds: u64) -> Self {
        self.queues.visibility_timeout_seconds = seconds;
        self
    }
}

/// Configuration file structure supporting profiles.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct ConfigFile {
    /// Default settings (used when no profile is specified).
    #[serde(default)]
    pub default: DefaultSection,
    /// Named profiles that override default settings.
    #[serde(default)]
    pub profiles: HashMap<String, DefaultSection>,
    /// Queue configuration section.
    #[serde(default)]
    pub queues: QueueSection,
}

/// Connection settings in a config file, used by `[default]` and each profile.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct DefaultSection {
    /// Bucket name.
    pub bucket: Option<String>,
    /// AWS region.
    pub region: Option<String>,
    /// Custom endpoint.
    pub endpoint: Option<String>,
}

/// Queue section in a config file. Unset fields keep their defaults.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct QueueSection {
    /// Logical queue names to provision.
    pub names: Option<Vec<String>>,
    /// Queue that `submit` sends to.
    pub default: Option<String>,
    /// Queue that receives failed job outcomes.
    pub failed: Option<String>,
    /// Backend queue name prefix.
    pub prefix: Option<String>,
    /// Long-poll wait per receive, in seconds.
    pub wait_time_seconds: Option<u64>,
    /// Visibility timeout, in seconds.
    pub visibility_timeout_seconds: Option<u64>,
}

impl ConfigFile {
    /// Get resolved configuration for a given profile.
    /// Profile settings override the `[default]` section.
    #[must_use]
    pub fn resolve(&self, profile: Option<&str>) -> RemoteJobConfig {
        let mut config = RemoteJobConfig {
            bucket: self.default.bucket.clone().unwrap_or_default(),
            endpoint: self.default.endpoint.clone(),
            region: self.default.region.clone().unwrap_or_else(default_region),
            queues: QueueSettings::default(),
        };

        if let Some(profile_section) = profile.and_then(|name| self.profiles.get(name)) {
            if let Some(ref bucket) = profile_section.bucket {
                config.bucket.clone_from(bucket);
            }
            if let Some(ref region) = profile_section.region {
                config.region.clone_from(region);
            }
            if profile_section.endpoint.is_some() {
                config.endpoint.clone_from(&profile_section.endpoint);
            }
        }

        let queues = &self.queues;
        if let Some(ref names) = queues.names {
            config.queues.names.clone_from(names);
        }
        if let Some(ref default) = queues.default {
            config.queues.default.clone_from(default);
        }
        if queues.failed.is_some() {
            config.queues.failed.clone_from(&queues.failed);
        }
        if let Some(ref prefix) = queues.prefix {
            config.queues.prefix.clone_from(prefix);
        }
        if let Some(secs) = queues.wait_time_seconds {
            config.queues.wait_time_seconds = secs;
        }
        if let Some(secs) = queues.visibility_timeout_seconds {
            config.queues.visibility_timeout_seconds = secs;
        }

        config
    }
}

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to parse TOML configuration.
    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    /// Failed to read configuration file.
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
}

/// Get the user-level config path (~/.config/remotejob/config.toml).
#[must_use]
pub fn get_user_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("remotejob").join("config.toml"))
}

/// Get the project-level config path (.remotejob.toml in current directory).
#[must_use]
pub fn get_project_config_path() -> PathBuf {
    PathBuf::from(".remotejob.toml")
}

/// Load configuration from a TOML string.
///
/// # Errors
/// Returns `ConfigError::TomlParse` if the TOML is invalid.
pub fn load_from_str(toml_content: &str) -> Result<ConfigFile, ConfigError> {
    Ok(toml::from_str(toml_content)?)
}

/// Load configuration from a file path.
///
/// # Errors
/// Returns `ConfigError::Io` if the file cannot be read, or
/// `ConfigError::TomlParse` if the TOML is invalid.
pub fn load_from_file(path: &Path) -> Result<ConfigFile, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    load_from_str(&content)
}

/// Load configuration with the specified profile and optional custom config path.
///
/// Files are layered user, then project, then `custom_config`; the selected
/// profile is applied; environment variables override the result.
///
/// # Errors
/// Returns an error if a config file exists but cannot be parsed.
pub fn load_config(
    profile: Option<&str>,
    custom_config: Option<&PathBuf>,
) -> Result<RemoteJobConfig, ConfigError> {
    let mut merged = ConfigFile::default();

    if let Some(user_path) = get_user_config_path() {
        if user_path.exists() {
            merge_config_file(&mut merged, &load_from_file(&user_path)?);
        }
    }

    let project_path = get_project_config_path();
    if project_path.exists() {
        merge_config_file(&mut merged, &load_from_file(&project_path)?);
    }

    if let Some(custom_path) = custom_config {
        merge_config_file(&mut merged, &load_from_file(custom_path)?);
    }

    let mut config = merged.resolve(profile);
    apply_overrides(&mut config, |name| env::var(name).ok());

    Ok(config)
}

/// Merge a config file into the base config (later values override earlier).
fn merge_config_file(base: &mut ConfigFile, overlay: &ConfigFile) {
    merge_section(&mut base.default, &overlay.default);

    for (name, profile) in &overlay.profiles {
        base.profiles.insert(name.clone(), profile.clone());
    }

    let (queues, over) = (&mut base.queues, &overlay.queues);
    if over.names.is_some() {
        queues.names.clone_from(&over.names);
    }
    if over.default.is_some() {
        queues.default.clone_from(&over.default);
    }
    if over.failed.is_some() {
        queues.failed.clone_from(&over.failed);
    }
    if over.prefix.is_some() {
        queues.prefix.clone_from(&over.prefix);
    }
    if over.wait_time_seconds.is_some() {
        queues.wait_time_seconds = over.wait_time_seconds;
    }
    if over.visibility_timeout_seconds.is_some() {
        queues.visibility_timeout_seconds = over.visibility_timeout_seconds;
    }
}

fn merge_section(base: &mut DefaultSection, overlay: &DefaultSection) {
    if overlay.bucket.is_some() {
        base.bucket.clone_from(&overlay.bucket);
    }
    if overlay.region.is_some() {
        base.region.clone_from(&overlay.region);
    }
    if overlay.endpoint.is_some() {
        base.endpoint.clone_from(&overlay.endpoint);
    }
}

/// Apply variable overrides read through `lookup` (the process environment
/// in `load_config`).
pub fn apply_overrides<F>(config: &mut RemoteJobConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(bucket) = lookup("S3_BUCKET") {
        config.bucket = bucket;
    }
    if let Some(endpoint) = lookup("S3_ENDPOINT").filter(|s| !s.is_empty()) {
        config.endpoint = Some(endpoint);
    }
    if let Some(region) = lookup("S3_REGION").or_else(|| lookup("AWS_REGION")) {
        config.region = region;
    }

    if let Some(names) = lookup("REMOTEJOB_QUEUES") {
        config.queues.names = names
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(ToString::to_string)
            .collect();
    }
    if let Some(default) = lookup("REMOTEJOB_DEFAULT_QUEUE") {
        config.queues.default = default;
    }
    if let Some(failed) = lookup("REMOTEJOB_FAILED_QUEUE") {
        config.queues.failed = Some(failed).filter(|s| !s.is_empty());
    }
    if let Some(prefix) = lookup("REMOTEJOB_QUEUE_PREFIX") {
        config.queues.prefix = prefix;
    }
    if let Some(secs) = lookup("REMOTEJOB_WAIT_TIME_SECONDS").and_then(|v| v.parse().ok()) {
        config.queues.wait_time_seconds = secs;
    }
    if let Some(secs) =
        lookup("REMOTEJOB_VISIBILITY_TIMEOUT_SECONDS").and_then(|v| v.parse().ok())
    {
        config.queues.visibility_timeout_seconds = secs;
    }
}

/// Validate the configuration.
///
/// Returns a list of validation errors (empty if valid).
#[must_use]
pub fn validate_config(config: &RemoteJobConfig) -> Vec<String> {
    let mut errors = Vec::new();

    if config.bucket.is_empty() {
        errors.push("bucket: not configured (set S3_BUCKET or add to config file)".to_string());
    }
    if config.region.is_empty() {
        errors.push("region: not configured (set S3_REGION or add to config file)".to_string());
    }

    let queues = &config.queues;
    if queues.names.is_empty() {
        errors.push("queues.names: at least one queue is required".to_string());
    }

    let mut seen = HashSet::new();
    for name in &queues.names {
        if name.is_empty() {
            errors.push("queues.names: queue names must not be empty".to_string());
        } else if !seen.insert(name.as_str()) {
            errors.push(format!("queues.names: duplicate queue '{name}'"));
        }
    }

    if !queues.names.contains(&queues.default) {
        errors.push(format!(
            "queues.default: '{}' is not listed in queues.names",
            queues.default
        ));
    }
    if queues.failed.as_deref() == Some(queues.default.as_str()) {
        errors.push("queues.failed: must differ from queues.default".to_string());
    }

    if !(MIN_WAIT_TIME_SECONDS..=MAX_WAIT_TIME_SECONDS).contains(&queues.wait_time_seconds) {
        errors.push(format!(
            "queues.wait_time_seconds: must be {MIN_WAIT_TIME_SECONDS}-{MAX_WAIT_TIME_SECONDS}, got {}",
            queues.wait_time_seconds
        ));
    }
    if queues.visibility_timeout_seconds > MAX_VISIBILITY_TIMEOUT_SECONDS {
        errors.push(format!(
            "queues.visibility_timeout_seconds: must be 0-{MAX_VISIBILITY_TIMEOUT_SECONDS}, got {}",
            queues.visibility_timeout_seconds
        ));
    }

    errors
}
