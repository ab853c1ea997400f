//! Fake engine shared by the stage tests

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use stylestage::engine::{
    EngineFactory, EngineMessage, EngineOutput, EngineWarning, ProcessInput, Processor,
};
use stylestage::{EngineError, PluginRef, ProcessingOptions, SourceMap, SyntaxTree};

/// What the fake processor was handed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    Text,
    Tree,
}

type Thrower = Arc<dyn Fn() -> EngineError + Send + Sync>;

/// Engine that echoes its input, or throws on demand.
///
/// Output maps are `map.prev` when one was passed in, else a single-source
/// map pointing at `from`.
#[derive(Clone)]
pub struct FakeEngine {
    pub version: String,
    pub messages: Vec<EngineMessage>,
    pub warnings: Vec<EngineWarning>,
    pub inputs: Arc<Mutex<Vec<InputKind>>>,
    throw: Option<Thrower>,
}

impl FakeEngine {
    pub fn new(version: &str) -> Self {
        Self {
            version: version.to_string(),
            messages: Vec::new(),
            warnings: Vec::new(),
            inputs: Arc::new(Mutex::new(Vec::new())),
            throw: None,
        }
    }

    pub fn throwing(
        version: &str,
        throw: impl Fn() -> EngineError + Send + Sync + 'static,
    ) -> Self {
        Self {
            throw: Some(Arc::new(throw)),
            ..Self::new(version)
        }
    }

    pub fn with_messages(mut self, messages: Vec<EngineMessage>) -> Self {
        self.messages = messages;
        self
    }

    pub fn with_warnings(mut self, warnings: Vec<EngineWarning>) -> Self {
        self.warnings = warnings;
        self
    }

    pub fn inputs(&self) -> Vec<InputKind> {
        self.inputs.lock().clone()
    }
}

impl EngineFactory for FakeEngine {
    fn package_name(&self) -> &str {
        "stylestage"
    }

    fn version(&self) -> &str {
        &self.version
    }

    fn create(&self, _plugins: &[PluginRef]) -> Result<Box<dyn Processor>, EngineError> {
        Ok(Box::new(self.clone()))
    }
}

#[async_trait]
impl Processor for FakeEngine {
    fn version(&self) -> &str {
        &self.version
    }

    async fn process(
        &self,
        input: ProcessInput,
        options: &ProcessingOptions,
    ) -> Result<EngineOutput, EngineError> {
        if let Some(throw) = &self.throw {
            return Err(throw());
        }

        let css = match input {
            ProcessInput::Text(text) => {
                self.inputs.lock().push(InputKind::Text);
                text
            }
            ProcessInput::Tree(tree) => {
                self.inputs.lock().push(InputKind::Tree);
                tree.downcast_ref::<String>().cloned().unwrap_or_default()
            }
        };

        let map = options.map.as_ref().map(|map| {
            map.prev.clone().unwrap_or_else(|| {
                let from = options
                    .from
                    .as_ref()
                    .map(|f| f.to_string_lossy().into_owned())
                    .unwrap_or_default();
                SourceMap::new(vec![from], "AAAA")
            })
        });

        Ok(EngineOutput {
            root: SyntaxTree::new(css.clone()),
            css,
            map,
            warnings: self.warnings.clone(),
            messages: self.messages.clone(),
            version: self.version.clone(),
        })
    }
}
