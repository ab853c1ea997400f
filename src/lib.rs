//! CSS transform stage for build pipelines

pub mod config;
pub mod engine;
pub mod error;
pub mod failure;
pub mod host;
pub mod invoke;
pub mod options;
pub mod plugin;
pub mod reconcile;
pub mod resolver;
pub mod reuse;
pub mod source_map;
pub mod stage;

// Explicit exports for better API clarity
pub use config::StageOptions;
pub use engine::basic::BasicEngine;
pub use engine::{EngineFactory, EngineMessage, EngineOutput, EngineWarning, Processor};
pub use error::{
    ConfigError, CssSyntaxError, EngineError, StageError, StageResult, TransformFailure,
};
pub use failure::{AdvisoryPolicy, AdvisoryState};
pub use host::{BuildHost, HostEvent, HostFs, RecordingHost, StageWarning};
pub use options::{MapOptions, ProcessingOptions};
pub use plugin::{PluginList, PluginRef};
pub use reconcile::TransformOutput;
pub use resolver::{ConfigDiscovery, ConfigResolver, FsConfigResolver, ResolvedConfig};
pub use reuse::{AstMeta, StageMeta, SyntaxTree};
pub use source_map::SourceMap;
pub use stage::{TransformRequest, TransformStage};
