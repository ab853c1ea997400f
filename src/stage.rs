//! The transform stage: one unit of work from source text to output CSS
//!
//! resolve config -> merge options -> decide tree reuse -> invoke engine ->
//! reconcile results. Suspension happens only while resolving config and while
//! the engine processes.

use std::sync::Arc;
use tracing::{debug, info};

use crate::config::StageOptions;
use crate::engine::{EngineFactory, ProcessInput};
use crate::error::StageResult;
use crate::failure::{AdvisoryState, FailureClassifier};
use crate::host::BuildHost;
use crate::invoke::Invoker;
use crate::options;
use crate::reconcile::{TransformOutput, reconcile};
use crate::resolver::{ConfigResolver, FsConfigResolver, ResolveContext};
use crate::reuse::{self, StageMeta, TreeCapability};
use crate::source_map::SourceMap;

/// What the previous stage hands over
#[derive(Debug, Clone, Default)]
pub struct TransformRequest {
    pub source: String,
    pub source_map: Option<SourceMap>,
    pub meta: Option<StageMeta>,
}

impl TransformRequest {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            ..Default::default()
        }
    }

    pub fn with_source_map(mut self, map: SourceMap) -> Self {
        self.source_map = Some(map);
        self
    }

    pub fn with_meta(mut self, meta: StageMeta) -> Self {
        self.meta = Some(meta);
        self
    }
}

pub struct TransformStage {
    options: StageOptions,
    resolver: Arc<dyn ConfigResolver>,
    engine: Arc<dyn EngineFactory>,
    advisory: Arc<AdvisoryState>,
}

impl TransformStage {
    /// Stage with filesystem config discovery and the process-wide advisory state
    pub fn new(options: StageOptions, engine: Arc<dyn EngineFactory>) -> Self {
        Self {
            options,
            resolver: Arc::new(FsConfigResolver::new()),
            engine,
            advisory: AdvisoryState::process_wide(),
        }
    }

    pub fn with_resolver(mut self, resolver: Arc<dyn ConfigResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn with_advisory_state(mut self, state: Arc<AdvisoryState>) -> Self {
        self.advisory = state;
        self
    }

    pub fn options(&self) -> &StageOptions {
        &self.options
    }

    pub async fn run(
        &self,
        request: TransformRequest,
        host: &dyn BuildHost,
    ) -> StageResult<TransformOutput> {
        let ctx = ResolveContext::new(host.resource_path(), host.working_dir());
        let explicit = self.options.explicit();

        let resolved = self
            .resolver
            .resolve(&ctx, &self.options.config, &explicit)
            .await?;
        if let Some(file) = &resolved.file {
            host.add_dependency(file);
        }

        let processing = options::merge(
            &resolved,
            &explicit.options,
            self.options.source_maps(host.source_map_enabled()),
            request.source_map.as_ref(),
            host.context(),
            host.resource_path(),
        )?;

        let reused = if self.options.reuse_tree {
            reuse::decide(
                request.meta.as_ref(),
                TreeCapability {
                    format: self.engine.tree_format(),
                    engine_version: self.engine.version(),
                },
            )
        } else {
            None
        };
        let input = match reused {
            Some(tree) => {
                debug!("Reusing syntax tree from previous stage");
                ProcessInput::Tree(tree)
            }
            None => ProcessInput::Text(request.source),
        };

        let classifier = FailureClassifier::new(&self.options.advisory, &self.advisory);
        let output = Invoker::new(self.engine.as_ref(), classifier)
            .invoke(&resolved.plugins, &processing, input, host)
            .await?;

        info!(
            "Transformed {} ({} warning(s), {} message(s))",
            host.resource_path().display(),
            output.warnings.len(),
            output.messages.len()
        );

        Ok(reconcile(
            output,
            processing.source_map_requested(),
            self.engine.tree_format(),
            host,
        ))
    }
}
