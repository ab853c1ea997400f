//! Processing option merging
//!
//! Turns the resolved config, call-site options and source map policy into
//! the frozen [`ProcessingOptions`] handed to the engine.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

use crate::error::ConfigError;
use crate::resolver::ResolvedConfig;
use crate::source_map::{SourceMap, normalize_inbound};

/// Source map generation flags
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MapOptions {
    /// Embed the map into the CSS output instead of returning it
    #[serde(default)]
    pub inline: bool,

    /// Append a `sourceMappingURL` comment to the output
    #[serde(default)]
    pub annotation: bool,

    /// Map from the previous stage, already in the host's coordinate space
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prev: Option<SourceMap>,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Options passed to the engine for one invocation
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct ProcessingOptions {
    pub from: Option<PathBuf>,
    pub to: Option<PathBuf>,
    pub map: Option<MapOptions>,
    pub parser: Option<String>,
    pub syntax: Option<String>,
    pub stringifier: Option<String>,
    /// Engine-specific options passed through untouched
    pub extra: Map<String, Value>,
}

impl ProcessingOptions {
    /// Build typed options from a JSON object, validating the well-known keys
    pub fn from_object(mut options: Map<String, Value>) -> Result<Self, ConfigError> {
        Ok(Self {
            from: take_string(&mut options, "from")?.map(PathBuf::from),
            to: take_string(&mut options, "to")?.map(PathBuf::from),
            map: take_map(&mut options)?,
            parser: take_string(&mut options, "parser")?,
            syntax: take_string(&mut options, "syntax")?,
            stringifier: take_string(&mut options, "stringifier")?,
            extra: options,
        })
    }

    pub fn source_map_requested(&self) -> bool {
        self.map.is_some()
    }
}

fn take_string(options: &mut Map<String, Value>, key: &str) -> Result<Option<String>, ConfigError> {
    match options.shift_remove(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(text)) => Ok(Some(text)),
        Some(other) => Err(ConfigError::invalid_option(
            key,
            format!("expected a string, found {other}"),
        )),
    }
}

fn take_map(options: &mut Map<String, Value>) -> Result<Option<MapOptions>, ConfigError> {
    match options.shift_remove("map") {
        None | Some(Value::Null) | Some(Value::Bool(false)) => Ok(None),
        Some(Value::Bool(true)) => Ok(Some(MapOptions::default())),
        Some(value @ Value::Object(_)) => serde_json::from_value(value)
            .map(Some)
            .map_err(|e| ConfigError::invalid_option("map", e)),
        Some(other) => Err(ConfigError::invalid_option(
            "map",
            format!("expected a boolean or an object, found {other}"),
        )),
    }
}

/// Deep-merge `overlay` into `base`; nested objects merge key by key and
/// any other value in `overlay` replaces the one in `base`.
pub fn merge_json(base: &mut Map<String, Value>, overlay: &Map<String, Value>) {
    for (key, value) in overlay {
        match (base.get_mut(key), value) {
            (Some(Value::Object(existing)), Value::Object(incoming)) => {
                merge_json(existing, incoming);
            }
            _ => {
                base.insert(key.clone(), value.clone());
            }
        }
    }
}

/// Combine resolved config, explicit options and source map policy.
///
/// 1. start from the resolved options with explicit options layered on top
/// 2. `from`/`to` default to the resource path
/// 3. when maps are requested, `map` gets `inline: false, annotation: false`
///    unless overridden
/// 4. an inbound map becomes `map.prev`, rewritten relative to `context`
pub fn merge(
    resolved: &ResolvedConfig,
    explicit: &Map<String, Value>,
    source_maps: bool,
    inbound_map: Option<&SourceMap>,
    context: &Path,
    resource_path: &Path,
) -> Result<ProcessingOptions, ConfigError> {
    let mut combined = resolved.options.clone();
    merge_json(&mut combined, explicit);

    let mut options = ProcessingOptions::from_object(combined)?;
    options.from.get_or_insert_with(|| resource_path.to_path_buf());
    options.to.get_or_insert_with(|| resource_path.to_path_buf());

    if source_maps && options.map.is_none() {
        options.map = Some(MapOptions::default());
    }

    if let (Some(map), Some(inbound)) = (options.map.as_mut(), inbound_map) {
        map.prev = Some(normalize_inbound(inbound, context));
    }

    Ok(options)
}
