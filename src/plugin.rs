//! Plugin references as they appear in options and config files
//!
//! Accepted shapes:
//! - `["autoprefixer", ["nesting", { "edition": "2024" }]]`
//! - `{ "autoprefixer": true, "nesting": { "edition": "2024" }, "legacy": false }`
//!
//! Order is significant: engines apply plugins in list order.

use serde::de::{self, Deserializer};
use serde::ser::{SerializeSeq, Serializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One plugin with its options
#[derive(Debug, Clone, PartialEq)]
pub struct PluginRef {
    pub name: String,
    pub options: Value,
    /// Disabled entries only exist to switch off a same-named plugin while merging
    pub enabled: bool,
}

impl PluginRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            options: Value::Null,
            enabled: true,
        }
    }

    pub fn with_options(name: impl Into<String>, options: Value) -> Self {
        Self {
            name: name.into(),
            options,
            enabled: true,
        }
    }

    pub fn disabled(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            options: Value::Null,
            enabled: false,
        }
    }

    /// Build from an `(name, value)` pair where `false` disables and `true` means no options
    fn from_entry(name: String, value: Value) -> Self {
        match value {
            Value::Bool(false) => Self::disabled(name),
            Value::Bool(true) | Value::Null => Self::new(name),
            options => Self::with_options(name, options),
        }
    }
}

/// Ordered plugin list
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PluginList(Vec<PluginRef>);

impl PluginList {
    pub fn new(plugins: Vec<PluginRef>) -> Self {
        Self(plugins)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PluginRef> {
        self.0.iter()
    }

    pub fn push(&mut self, plugin: PluginRef) {
        self.0.push(plugin);
    }

    /// Merge `overrides` on top of `self`.
    ///
    /// A same-named override replaces the entry in place so the original
    /// position is kept; new names are appended in override order.
    pub fn merged_with(&self, overrides: &PluginList) -> PluginList {
        let mut merged = self.0.clone();
        for plugin in &overrides.0 {
            match merged.iter_mut().find(|p| p.name == plugin.name) {
                Some(existing) => *existing = plugin.clone(),
                None => merged.push(plugin.clone()),
            }
        }
        PluginList(merged)
    }

    /// Enabled plugins in application order
    pub fn enabled(&self) -> Vec<PluginRef> {
        self.0.iter().filter(|p| p.enabled).cloned().collect()
    }

    /// Parse any accepted JSON shape
    pub fn from_value(value: Value) -> Result<Self, String> {
        match value {
            Value::Null => Ok(Self::default()),
            Value::Array(items) => items
                .into_iter()
                .map(parse_array_entry)
                .collect::<Result<Vec<_>, _>>()
                .map(PluginList),
            Value::Object(map) => Ok(PluginList(
                map.into_iter()
                    .map(|(name, value)| PluginRef::from_entry(name, value))
                    .collect(),
            )),
            other => Err(format!(
                "expected an array or object of plugins, found {other}"
            )),
        }
    }
}

fn parse_array_entry(entry: Value) -> Result<PluginRef, String> {
    match entry {
        Value::String(name) => Ok(PluginRef::new(name)),
        Value::Array(mut pair) if (1..=2).contains(&pair.len()) => {
            let options = if pair.len() == 2 {
                pair.pop().unwrap_or(Value::Null)
            } else {
                Value::Null
            };
            match pair.pop() {
                Some(Value::String(name)) => Ok(PluginRef::from_entry(name, options)),
                _ => Err("plugin pair must start with the plugin name".to_string()),
            }
        }
        other => Err(format!("unsupported plugin entry {other}")),
    }
}

impl<'de> Deserialize<'de> for PluginList {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        PluginList::from_value(value).map_err(de::Error::custom)
    }
}

impl Serialize for PluginList {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.0.len()))?;
        for plugin in &self.0 {
            if !plugin.enabled {
                seq.serialize_element(&(plugin.name.as_str(), false))?;
            } else if plugin.options.is_null() {
                seq.serialize_element(&plugin.name)?;
            } else {
                seq.serialize_element(&(plugin.name.as_str(), &plugin.options))?;
            }
        }
        seq.end()
    }
}

impl FromIterator<PluginRef> for PluginList {
    fn from_iter<I: IntoIterator<Item = PluginRef>>(iter: I) -> Self {
        PluginList(iter.into_iter().collect())
    }
}
