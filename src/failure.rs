//! Failure classification and the one-time environment advisory
//!
//! Engine errors become [`TransformFailure`]s. Syntax errors keep their
//! position data; everything else passes through as a generic failure. A file
//! the error points at is registered as a dependency so editing it re-runs the
//! stage.
//!
//! Independently, when the engine runs a legacy major version, the nearest
//! project manifest is checked for a direct dependency on the engine. A
//! missing declaration produces a single advisory warning per
//! [`AdvisoryState`].

use semver::Version;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, LazyLock};
use thiserror::Error;
use tracing::debug;

use crate::error::{EngineError, TransformFailure};
use crate::host::{BuildHost, HostFs, StageWarning};

fn default_legacy_major() -> u64 {
    7
}

fn default_manifest_file() -> String {
    "package.json".to_string()
}

/// When and where to look for the engine dependency declaration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdvisoryPolicy {
    /// Engine major version that triggers the manifest check
    #[serde(default = "default_legacy_major")]
    pub legacy_major: u64,

    /// Manifest file name searched from the working directory upward
    #[serde(default = "default_manifest_file")]
    pub manifest_file: String,
}

impl Default for AdvisoryPolicy {
    fn default() -> Self {
        Self {
            legacy_major: default_legacy_major(),
            manifest_file: default_manifest_file(),
        }
    }
}

/// Shared flag recording that the environment check has been settled.
///
/// The flag only moves from unset to set, except through [`reset`](Self::reset)
/// which exists for tests and long-lived hosts that reload their project.
#[derive(Debug, Default)]
pub struct AdvisoryState {
    settled: AtomicBool,
}

static PROCESS_WIDE: LazyLock<Arc<AdvisoryState>> =
    LazyLock::new(|| Arc::new(AdvisoryState::new()));

impl AdvisoryState {
    pub fn new() -> Self {
        Self::default()
    }

    /// State shared by every stage in this process that was not given its own
    pub fn process_wide() -> Arc<Self> {
        Arc::clone(&PROCESS_WIDE)
    }

    pub fn is_settled(&self) -> bool {
        self.settled.load(Ordering::Acquire)
    }

    /// Set the flag; true only for the single caller that actually set it
    pub fn try_settle(&self) -> bool {
        self.settled
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub fn reset(&self) {
        self.settled.store(false, Ordering::Release);
    }
}

/// Why the manifest check could not reach a verdict
#[derive(Error, Debug)]
pub enum ManifestError {
    #[error("No {file} found at or above '{start}'")]
    NotFound { file: String, start: PathBuf },

    #[error("Failed to read '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to parse '{path}': {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Nearest ancestor of `start` (inclusive) that holds `file`
pub fn find_manifest(fs: &dyn HostFs, start: &Path, file: &str) -> Result<PathBuf, ManifestError> {
    start
        .ancestors()
        .map(|dir| dir.join(file))
        .find(|candidate| fs.stat(candidate).is_ok_and(|kind| kind.is_file()))
        .ok_or_else(|| ManifestError::NotFound {
            file: file.to_string(),
            start: start.to_path_buf(),
        })
}

/// Whether `dependencies` or `devDependencies` names `package`
pub fn declares_dependency(manifest: &Value, package: &str) -> bool {
    ["dependencies", "devDependencies"]
        .iter()
        .any(|section| manifest.get(section).and_then(|deps| deps.get(package)).is_some())
}

pub fn advisory_text(package: &str) -> String {
    format!(
        "Add {package} as project dependency. {package} is not a peer dependency of this stage."
    )
}

/// Identity of the engine that failed
#[derive(Debug, Clone, Copy)]
pub struct EngineIdentity<'a> {
    pub package: &'a str,
    pub version: &'a str,
}

/// Turns engine errors into [`TransformFailure`]s
pub struct FailureClassifier<'a> {
    policy: &'a AdvisoryPolicy,
    state: &'a AdvisoryState,
}

impl<'a> FailureClassifier<'a> {
    pub fn new(policy: &'a AdvisoryPolicy, state: &'a AdvisoryState) -> Self {
        Self { policy, state }
    }

    pub fn classify(
        &self,
        error: EngineError,
        engine: EngineIdentity<'_>,
        host: &dyn BuildHost,
    ) -> TransformFailure {
        let failure = match error.normalize() {
            EngineError::Syntax(err) => TransformFailure::Syntax(err),
            cause => TransformFailure::Generic { cause },
        };

        if let Some(file) = failure.file() {
            host.add_dependency(file);
        }

        self.check_environment(engine, host);
        failure
    }

    /// Best-effort; any error ends the check without touching the build outcome
    fn check_environment(&self, engine: EngineIdentity<'_>, host: &dyn BuildHost) {
        if self.state.is_settled() || !self.is_legacy(engine.version) {
            return;
        }

        match self.manifest_declares(engine.package, host) {
            Ok(true) => {
                self.state.try_settle();
            }
            Ok(false) => {
                if self.state.try_settle() {
                    host.emit_warning(StageWarning::Advisory(advisory_text(engine.package)));
                }
            }
            Err(err) => debug!("Skipping dependency advisory: {err}"),
        }
    }

    fn is_legacy(&self, version: &str) -> bool {
        Version::parse(version).is_ok_and(|v| v.major == self.policy.legacy_major)
    }

    fn manifest_declares(
        &self,
        package: &str,
        host: &dyn BuildHost,
    ) -> Result<bool, ManifestError> {
        let fs = host.fs();
        let path = find_manifest(fs, host.working_dir(), &self.policy.manifest_file)?;
        let bytes = fs.read_file(&path).map_err(|source| ManifestError::Io {
            path: path.clone(),
            source,
        })?;
        let manifest: Value =
            serde_json::from_slice(&bytes).map_err(|source| ManifestError::Json { path, source })?;
        Ok(declares_dependency(&manifest, package))
    }
}
