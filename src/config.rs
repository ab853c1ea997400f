//! Stage options with layered loading.
//!
//! Sources, later ones winning:
//! - Default values
//! - TOML file
//! - Environment variable overrides
//!
//! # Environment Variables
//!
//! Environment variables must be prefixed with `STYLESTAGE_` and use double
//! underscores to separate nested levels:
//! - `STYLESTAGE_SOURCE_MAP=true` sets `source_map`
//! - `STYLESTAGE_CONFIG=none` disables config discovery
//! - `STYLESTAGE_ADVISORY__LEGACY_MAJOR=6` sets `advisory.legacy_major`

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::Path;

use crate::failure::AdvisoryPolicy;
use crate::plugin::PluginList;
use crate::resolver::{ConfigDiscovery, ExplicitOptions};

/// Environment prefix for overrides
pub const ENV_PREFIX: &str = "STYLESTAGE_";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageOptions {
    /// Where external config comes from: `"auto"`, `false`/`"none"`, or a path
    #[serde(default)]
    pub config: ConfigDiscovery,

    /// Plugins given at the call site; merged over discovered ones by name
    #[serde(default)]
    pub plugins: PluginList,

    /// Processing options given at the call site
    #[serde(default)]
    pub options: Map<String, Value>,

    /// Generate source maps; unset inherits the host's flag
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_map: Option<bool>,

    /// Accept syntax trees from the previous stage
    #[serde(default = "default_true")]
    pub reuse_tree: bool,

    #[serde(default)]
    pub advisory: AdvisoryPolicy,
}

fn default_true() -> bool {
    true
}

impl Default for StageOptions {
    fn default() -> Self {
        Self {
            config: ConfigDiscovery::default(),
            plugins: PluginList::default(),
            options: Map::new(),
            source_map: None,
            reuse_tree: default_true(),
            advisory: AdvisoryPolicy::default(),
        }
    }
}

impl StageOptions {
    /// Load options from a TOML file with env overrides; a missing file
    /// leaves the defaults in place
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, Box<figment::Error>> {
        Self::figment()
            .merge(Toml::file(path))
            .merge(env_overrides())
            .extract()
            .map_err(Box::new)
    }

    /// Defaults plus env overrides, without a file
    pub fn load() -> Result<Self, Box<figment::Error>> {
        Self::figment()
            .merge(env_overrides())
            .extract()
            .map_err(Box::new)
    }

    /// Defaults only; callers layer further providers on top
    pub fn figment() -> Figment {
        Figment::new().merge(Serialized::defaults(StageOptions::default()))
    }

    pub fn explicit(&self) -> ExplicitOptions {
        ExplicitOptions {
            plugins: self.plugins.clone(),
            options: self.options.clone(),
        }
    }

    /// Effective source map policy given the host's global flag
    pub fn source_maps(&self, host_flag: bool) -> bool {
        self.source_map.unwrap_or(host_flag)
    }
}

fn env_overrides() -> Env {
    // Double underscore separates nesting; single underscores stay in names
    Env::prefixed(ENV_PREFIX).map(|key| key.as_str().to_lowercase().replace("__", ".").into())
}
