//! Transform Invoker
//!
//! Builds a processor for the resolved plugins and awaits one `process` call.
//! Engine errors are classified on the spot; nothing is retried here.

use tracing::debug;

use crate::engine::{EngineFactory, EngineOutput, ProcessInput};
use crate::error::TransformFailure;
use crate::failure::{EngineIdentity, FailureClassifier};
use crate::host::BuildHost;
use crate::options::ProcessingOptions;
use crate::plugin::PluginRef;

pub struct Invoker<'a> {
    engine: &'a dyn EngineFactory,
    classifier: FailureClassifier<'a>,
}

impl<'a> Invoker<'a> {
    pub fn new(engine: &'a dyn EngineFactory, classifier: FailureClassifier<'a>) -> Self {
        Self { engine, classifier }
    }

    pub async fn invoke(
        &self,
        plugins: &[PluginRef],
        options: &ProcessingOptions,
        input: ProcessInput,
        host: &dyn BuildHost,
    ) -> Result<EngineOutput, TransformFailure> {
        let processor = match self.engine.create(plugins) {
            Ok(processor) => processor,
            Err(err) => {
                let engine = self.identity(self.engine.version());
                return Err(self.classifier.classify(err, engine, host));
            }
        };

        debug!(
            "Processing {} with {} plugin(s), engine {}",
            options
                .from
                .as_deref()
                .map_or_else(|| "<input css>".into(), |p| p.display().to_string()),
            plugins.len(),
            processor.version()
        );

        processor
            .process(input, options)
            .await
            .map_err(|err| self.classifier.classify(err, self.identity(processor.version()), host))
    }

    fn identity<'v>(&'v self, version: &'v str) -> EngineIdentity<'v> {
        EngineIdentity {
            package: self.engine.package_name(),
            version,
        }
    }
}
