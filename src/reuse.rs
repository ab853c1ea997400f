//! Syntax tree hand-off between pipeline stages
//!
//! A stage may receive an already-parsed tree from the previous stage. It is
//! only reused when the producer declares the same tree format and an engine
//! version within the current engine's major version; otherwise the raw text
//! is parsed again.

use semver::{Version, VersionReq};
use std::any::Any;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Opaque parsed tree shared between stages
#[derive(Clone)]
pub struct SyntaxTree(Arc<dyn Any + Send + Sync>);

impl SyntaxTree {
    pub fn new<T: Any + Send + Sync>(root: T) -> Self {
        Self(Arc::new(root))
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref::<T>()
    }

    pub fn ptr_eq(&self, other: &SyntaxTree) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for SyntaxTree {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SyntaxTree(..)")
    }
}

/// Format tag engines use when none is declared
pub const DEFAULT_TREE_FORMAT: &str = "postcss";

/// Tree plus the identity of the engine that produced it
#[derive(Debug, Clone)]
pub struct AstMeta {
    /// Tree format tag
    pub format: String,
    /// Version of the engine that produced the tree
    pub version: String,
    pub root: SyntaxTree,
}

/// Metadata passed between stages
#[derive(Debug, Clone, Default)]
pub struct StageMeta {
    pub ast: Option<AstMeta>,
}

/// What this stage can accept: a format tag and the running engine version
#[derive(Debug, Clone, Copy)]
pub struct TreeCapability<'a> {
    pub format: &'a str,
    pub engine_version: &'a str,
}

impl TreeCapability<'_> {
    pub fn accepts(&self, meta: &AstMeta) -> bool {
        if meta.format != self.format {
            debug!(
                "Not reusing tree: format '{}' does not match '{}'",
                meta.format, self.format
            );
            return false;
        }
        if !is_version_compatible(&meta.version, self.engine_version) {
            debug!(
                "Not reusing tree: version {} is incompatible with engine {}",
                meta.version, self.engine_version
            );
            return false;
        }
        true
    }
}

/// True when `tree_version` satisfies `^<major of engine_version>`.
///
/// Unparseable versions are never compatible.
pub fn is_version_compatible(tree_version: &str, engine_version: &str) -> bool {
    let (Ok(tree), Ok(engine)) = (Version::parse(tree_version), Version::parse(engine_version))
    else {
        return false;
    };
    VersionReq::parse(&format!("^{}", engine.major)).is_ok_and(|req| req.matches(&tree))
}

/// Pick the inbound tree if this stage can reuse it
pub fn decide(inbound: Option<&StageMeta>, capability: TreeCapability<'_>) -> Option<SyntaxTree> {
    let meta = inbound?.ast.as_ref()?;
    capability.accepts(meta).then(|| meta.root.clone())
}
