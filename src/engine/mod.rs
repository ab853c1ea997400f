//! Contract with the pluggable transformation engine
//!
//! An [`EngineFactory`] turns a plugin list into a [`Processor`]; the processor
//! parses (or accepts a reused tree), runs its plugins and stringifies.

pub mod basic;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::path::PathBuf;

use crate::error::EngineError;
use crate::options::ProcessingOptions;
use crate::plugin::PluginRef;
use crate::reuse::{DEFAULT_TREE_FORMAT, SyntaxTree};
use crate::source_map::SourceMap;

/// What the processor works on
#[derive(Debug, Clone)]
pub enum ProcessInput {
    Text(String),
    Tree(SyntaxTree),
}

/// Non-fatal diagnostic produced by the engine or a plugin
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineWarning {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plugin: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<u32>,
}

impl EngineWarning {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            plugin: None,
            line: None,
            column: None,
        }
    }

    pub fn at(mut self, line: u32, column: u32) -> Self {
        self.line = Some(line);
        self.column = Some(column);
        self
    }

    pub fn from_plugin(mut self, plugin: impl Into<String>) -> Self {
        self.plugin = Some(plugin.into());
        self
    }
}

impl fmt::Display for EngineWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let (Some(line), Some(column)) = (self.line, self.column) {
            write!(f, "({line}:{column}) ")?;
        }
        if let Some(plugin) = &self.plugin {
            write!(f, "from \"{plugin}\" plugin: ")?;
        }
        f.write_str(&self.text)
    }
}

/// Result message emitted by plugins, tagged by `type`.
///
/// Tags this stage does not know deserialize to [`EngineMessage::Unknown`]
/// and are ignored when reconciling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum EngineMessage {
    Dependency {
        file: PathBuf,
    },
    BuildDependency {
        file: PathBuf,
    },
    MissingDependency {
        file: PathBuf,
    },
    ContextDependency {
        file: PathBuf,
    },
    DirDependency {
        dir: PathBuf,
    },
    Asset {
        #[serde(default)]
        file: Option<String>,
        #[serde(default)]
        content: Option<String>,
        #[serde(default, rename = "sourceMap")]
        source_map: Option<SourceMap>,
        #[serde(default)]
        info: Map<String, Value>,
    },
    #[serde(other)]
    Unknown,
}

/// Successful processing result
#[derive(Debug, Clone)]
pub struct EngineOutput {
    pub css: String,
    pub map: Option<SourceMap>,
    pub warnings: Vec<EngineWarning>,
    pub messages: Vec<EngineMessage>,
    pub root: SyntaxTree,
    /// Version of the processor that produced this output
    pub version: String,
}

/// Processor built for one plugin list
#[async_trait]
pub trait Processor: Send + Sync {
    fn version(&self) -> &str;

    async fn process(
        &self,
        input: ProcessInput,
        options: &ProcessingOptions,
    ) -> Result<EngineOutput, EngineError>;
}

/// Engine implementation the stage is configured with
pub trait EngineFactory: Send + Sync {
    /// Package name projects declare to depend on this engine
    fn package_name(&self) -> &str;

    fn version(&self) -> &str;

    /// Tag for trees this engine produces and accepts
    fn tree_format(&self) -> &str {
        DEFAULT_TREE_FORMAT
    }

    fn create(&self, plugins: &[PluginRef]) -> Result<Box<dyn Processor>, EngineError>;
}
