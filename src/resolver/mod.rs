//! Config resolution: which plugins and processing options apply to a resource
//!
//! Explicit call-site options always win over anything discovered on disk.
//! Discovery itself lives in [`discovery`]; this module holds the shared types
//! and the [`ConfigResolver`] seam hosts can replace.

pub mod discovery;
pub mod memo;

pub use discovery::FsConfigResolver;

use async_trait::async_trait;
use serde::de::{self, Deserializer};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

use crate::error::ConfigError;
use crate::options::merge_json;
use crate::plugin::{PluginList, PluginRef};

/// How the external configuration is located
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ConfigDiscovery {
    /// Use explicit options only
    Disabled,
    /// Search upward from the resource's directory
    #[default]
    Auto,
    /// Load this file, or search upward from this directory
    Path(PathBuf),
}

impl<'de> Deserialize<'de> for ConfigDiscovery {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Flag(bool),
            Text(String),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::Flag(true) => ConfigDiscovery::Auto,
            Raw::Flag(false) => ConfigDiscovery::Disabled,
            Raw::Text(text) => match text.as_str() {
                "auto" | "true" => ConfigDiscovery::Auto,
                "none" | "false" | "off" => ConfigDiscovery::Disabled,
                "" => return Err(de::Error::custom("config path cannot be empty")),
                _ => ConfigDiscovery::Path(PathBuf::from(text)),
            },
        })
    }
}

impl Serialize for ConfigDiscovery {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            ConfigDiscovery::Disabled => serializer.serialize_bool(false),
            ConfigDiscovery::Auto => serializer.serialize_str("auto"),
            ConfigDiscovery::Path(path) => serializer.serialize_str(&path.to_string_lossy()),
        }
    }
}

/// Options given at the call site
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExplicitOptions {
    pub plugins: PluginList,
    pub options: Map<String, Value>,
}

/// Parsed contents of one config file.
///
/// The `plugins` key holds the plugin list; every other top-level key is a
/// processing option.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigFile {
    pub plugins: PluginList,
    pub options: Map<String, Value>,
}

impl ConfigFile {
    pub fn from_value(path: &Path, value: Value) -> Result<Self, ConfigError> {
        let Value::Object(mut options) = value else {
            return Err(ConfigError::malformed(path, "config must be an object"));
        };
        let plugins = match options.shift_remove("plugins") {
            Some(plugins) => {
                PluginList::from_value(plugins).map_err(|reason| ConfigError::InvalidPlugin {
                    path: path.to_path_buf(),
                    reason,
                })?
            }
            None => PluginList::default(),
        };
        Ok(Self { plugins, options })
    }
}

/// Effective configuration for one invocation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedConfig {
    /// Enabled plugins in application order
    pub plugins: Vec<PluginRef>,
    pub options: Map<String, Value>,
    /// Config file the values came from, if any
    pub file: Option<PathBuf>,
}

impl ResolvedConfig {
    pub fn from_explicit(explicit: &ExplicitOptions) -> Self {
        Self {
            plugins: explicit.plugins.enabled(),
            options: explicit.options.clone(),
            file: None,
        }
    }

    /// Layer explicit options over a discovered config file
    pub fn merge(discovered: Option<(PathBuf, ConfigFile)>, explicit: &ExplicitOptions) -> Self {
        let Some((path, config)) = discovered else {
            return Self::from_explicit(explicit);
        };

        let mut options = config.options;
        merge_json(&mut options, &explicit.options);

        Self {
            plugins: config.plugins.merged_with(&explicit.plugins).enabled(),
            options,
            file: Some(path),
        }
    }
}

/// Per-invocation inputs a resolver may consult
#[derive(Debug, Clone)]
pub struct ResolveContext {
    pub resource_path: PathBuf,
    /// Base for relative explicit config paths
    pub working_dir: PathBuf,
}

impl ResolveContext {
    pub fn new(resource_path: impl Into<PathBuf>, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            resource_path: resource_path.into(),
            working_dir: working_dir.into(),
        }
    }

    /// Directory auto discovery starts from
    pub fn resource_dir(&self) -> &Path {
        self.resource_path.parent().unwrap_or(Path::new(""))
    }
}

/// Produces the plugin list and processing options for one invocation
#[async_trait]
pub trait ConfigResolver: Send + Sync {
    async fn resolve(
        &self,
        ctx: &ResolveContext,
        discovery: &ConfigDiscovery,
        explicit: &ExplicitOptions,
    ) -> Result<ResolvedConfig, ConfigError>;
}
