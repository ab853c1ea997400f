//! Result Reconciler
//!
//! Forwards engine warnings and messages to the build host, normalizes the
//! output map and packages the tree for the next stage.

use tracing::{debug, trace};

use crate::engine::{EngineMessage, EngineOutput};
use crate::host::{BuildHost, EmittedAsset, StageWarning};
use crate::reuse::{AstMeta, StageMeta};
use crate::source_map::{SourceMap, normalize_outbound};

/// What the stage hands back after a successful run
#[derive(Debug, Clone)]
pub struct TransformOutput {
    pub css: String,
    pub map: Option<SourceMap>,
    pub meta: StageMeta,
}

pub fn reconcile(
    output: EngineOutput,
    maps_requested: bool,
    tree_format: &str,
    host: &dyn BuildHost,
) -> TransformOutput {
    for warning in output.warnings {
        host.emit_warning(StageWarning::Engine(warning));
    }

    for message in output.messages {
        dispatch(message, host);
    }

    let map = match output.map {
        Some(map) if maps_requested => Some(normalize_outbound(&map, host.context())),
        _ => None,
    };

    TransformOutput {
        css: output.css,
        map,
        meta: StageMeta {
            ast: Some(AstMeta {
                format: tree_format.to_string(),
                version: output.version,
                root: output.root,
            }),
        },
    }
}

fn dispatch(message: EngineMessage, host: &dyn BuildHost) {
    match message {
        EngineMessage::Dependency { file } => host.add_dependency(&file),
        EngineMessage::BuildDependency { file } => host.add_build_dependency(&file),
        EngineMessage::MissingDependency { file } => host.add_missing_dependency(&file),
        EngineMessage::ContextDependency { file } => host.add_context_dependency(&file),
        EngineMessage::DirDependency { dir } => host.add_context_dependency(&dir),
        EngineMessage::Asset {
            file: Some(file),
            content: Some(content),
            source_map,
            info,
        } if !content.is_empty() => host.emit_file(EmittedAsset {
            file,
            content,
            source_map,
            info,
        }),
        EngineMessage::Asset { file, .. } => {
            debug!("Ignoring asset message without file or content ({file:?})");
        }
        EngineMessage::Unknown => trace!("Ignoring unknown engine message"),
    }
}
