//! Filesystem config discovery
//!
//! Walks from a start directory up to the filesystem root (or a configured
//! stop directory) and loads the first config found. Within one directory the
//! search places are tried in [`SEARCH_PLACES`] order.

use async_trait::async_trait;
use serde_json::Value;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::memo::{ConfigMemo, content_hash};
use super::{
    ConfigDiscovery, ConfigFile, ConfigResolver, ExplicitOptions, ResolveContext, ResolvedConfig,
};
use crate::error::ConfigError;

/// File names checked in every directory, in priority order
pub const SEARCH_PLACES: &[&str] = &[
    "package.json",
    ".stylestagerc",
    ".stylestagerc.json",
    ".stylestagerc.json5",
    ".stylestagerc.toml",
    "stylestage.config.json",
    "stylestage.config.toml",
];

/// Key holding the config inside `package.json`
pub const PACKAGE_KEY: &str = "stylestage";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConfigFormat {
    PackageJson,
    Json,
    Json5,
    Toml,
}

impl ConfigFormat {
    fn of(path: &Path) -> Self {
        if path.file_name().is_some_and(|name| name == "package.json") {
            return ConfigFormat::PackageJson;
        }
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("json") => ConfigFormat::Json,
            Some("toml") => ConfigFormat::Toml,
            // Extension-less rc files and anything unknown are read as JSON5,
            // which also accepts plain JSON.
            _ => ConfigFormat::Json5,
        }
    }
}

/// Parse config file content; `Ok(None)` means the file holds no config
fn parse_config(path: &Path, content: &str) -> Result<Option<ConfigFile>, ConfigError> {
    let value: Value = match ConfigFormat::of(path) {
        ConfigFormat::PackageJson => {
            let mut package: Value = serde_json::from_str(content)
                .map_err(|e| ConfigError::malformed(path, e))?;
            match package.get_mut(PACKAGE_KEY) {
                Some(config) => config.take(),
                None => return Ok(None),
            }
        }
        ConfigFormat::Json => {
            serde_json::from_str(content).map_err(|e| ConfigError::malformed(path, e))?
        }
        ConfigFormat::Json5 => {
            json5::from_str(content).map_err(|e| ConfigError::malformed(path, e))?
        }
        ConfigFormat::Toml => {
            toml::from_str(content).map_err(|e| ConfigError::malformed(path, e))?
        }
    };

    ConfigFile::from_value(path, value).map(Some)
}

/// Default [`ConfigResolver`] backed by the real filesystem
#[derive(Default)]
pub struct FsConfigResolver {
    memo: ConfigMemo,
    stop_dir: Option<PathBuf>,
}

impl FsConfigResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Do not search above this directory
    pub fn with_stop_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.stop_dir = Some(dir.into());
        self
    }

    pub fn memo(&self) -> &ConfigMemo {
        &self.memo
    }

    /// Load one config file, reusing the memoised parse while content is unchanged
    pub async fn load(&self, path: &Path) -> Result<Option<ConfigFile>, ConfigError> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })?;

        let hash = content_hash(&content);
        if let Some(cached) = self.memo.get(path, &hash) {
            return Ok(cached.as_ref().clone());
        }

        let parsed = parse_config(path, &content)?;
        self.memo.insert(path, hash, parsed.clone());
        Ok(parsed)
    }

    /// Find the nearest config at or above `start`
    pub async fn search(&self, start: &Path) -> Result<Option<(PathBuf, ConfigFile)>, ConfigError> {
        for dir in start.ancestors() {
            for place in SEARCH_PLACES {
                let candidate = dir.join(place);
                if !is_file(&candidate).await {
                    continue;
                }
                if let Some(config) = self.load(&candidate).await? {
                    debug!("Using config {}", candidate.display());
                    return Ok(Some((candidate, config)));
                }
            }

            if self.stop_dir.as_deref() == Some(dir) {
                break;
            }
        }

        debug!("No config found above {}", start.display());
        Ok(None)
    }

    async fn load_explicit(
        &self,
        path: &Path,
    ) -> Result<Option<(PathBuf, ConfigFile)>, ConfigError> {
        let metadata = match tokio::fs::metadata(path).await {
            Ok(metadata) => metadata,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(ConfigError::NotFound {
                    path: path.to_path_buf(),
                });
            }
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };

        if metadata.is_dir() {
            return self.search(path).await;
        }

        match self.load(path).await? {
            Some(config) => Ok(Some((path.to_path_buf(), config))),
            None => Err(ConfigError::malformed(
                path,
                format!("no \"{PACKAGE_KEY}\" key"),
            )),
        }
    }
}

async fn is_file(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .is_ok_and(|metadata| metadata.is_file())
}

#[async_trait]
impl ConfigResolver for FsConfigResolver {
    async fn resolve(
        &self,
        ctx: &ResolveContext,
        discovery: &ConfigDiscovery,
        explicit: &ExplicitOptions,
    ) -> Result<ResolvedConfig, ConfigError> {
        let discovered = match discovery {
            ConfigDiscovery::Disabled => None,
            ConfigDiscovery::Auto => self.search(ctx.resource_dir()).await?,
            ConfigDiscovery::Path(path) => {
                let path = if path.is_absolute() {
                    path.clone()
                } else {
                    ctx.working_dir.join(path)
                };
                self.load_explicit(&path).await?
            }
        };

        Ok(ResolvedConfig::merge(discovered, explicit))
    }
}
