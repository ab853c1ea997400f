//! Build host boundary
//!
//! The stage never talks to the build system directly. Everything it needs
//! (dependency edges, emitted files, warnings, filesystem access) goes through
//! [`BuildHost`], so hosts can plug in their own caches and graph bookkeeping.

use parking_lot::{Mutex, RwLock};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::engine::EngineWarning;
use crate::source_map::SourceMap;

/// Kind of filesystem entry reported by [`HostFs::stat`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
    Other,
}

impl EntryKind {
    pub fn is_file(self) -> bool {
        self == EntryKind::File
    }

    pub fn is_dir(self) -> bool {
        self == EntryKind::Directory
    }
}

/// Filesystem accessors provided by the host.
///
/// Hosts typically back these with their own cache so repeated builds do not
/// hit the OS for every lookup.
pub trait HostFs: Send + Sync {
    fn stat(&self, path: &Path) -> io::Result<EntryKind>;

    fn read_file(&self, path: &Path) -> io::Result<Vec<u8>>;
}

/// Direct OS access
#[derive(Debug, Default, Clone, Copy)]
pub struct StdFs;

impl HostFs for StdFs {
    fn stat(&self, path: &Path) -> io::Result<EntryKind> {
        let metadata = std::fs::metadata(path)?;
        Ok(if metadata.is_file() {
            EntryKind::File
        } else if metadata.is_dir() {
            EntryKind::Directory
        } else {
            EntryKind::Other
        })
    }

    fn read_file(&self, path: &Path) -> io::Result<Vec<u8>> {
        std::fs::read(path)
    }
}

/// Thread-safe memoizing wrapper around another [`HostFs`].
///
/// Failed lookups are cached by error kind, which is enough for callers that
/// only branch on "exists or not".
pub struct CachedFs<F> {
    inner: F,
    stats: RwLock<HashMap<PathBuf, Result<EntryKind, io::ErrorKind>>>,
    contents: RwLock<HashMap<PathBuf, Arc<Vec<u8>>>>,
}

impl<F: HostFs> CachedFs<F> {
    pub fn new(inner: F) -> Self {
        Self {
            inner,
            stats: RwLock::new(HashMap::new()),
            contents: RwLock::new(HashMap::new()),
        }
    }

    /// Drop cached entries for a path after the host saw it change
    pub fn invalidate(&self, path: &Path) {
        self.stats.write().remove(path);
        self.contents.write().remove(path);
    }

    pub fn clear(&self) {
        self.stats.write().clear();
        self.contents.write().clear();
    }
}

impl<F: HostFs> HostFs for CachedFs<F> {
    fn stat(&self, path: &Path) -> io::Result<EntryKind> {
        if let Some(cached) = self.stats.read().get(path) {
            return (*cached).map_err(io::Error::from);
        }

        let result = self.inner.stat(path);
        self.stats
            .write()
            .insert(path.to_path_buf(), result.as_ref().copied().map_err(|e| e.kind()));
        result
    }

    fn read_file(&self, path: &Path) -> io::Result<Vec<u8>> {
        if let Some(cached) = self.contents.read().get(path) {
            return Ok(cached.as_ref().clone());
        }

        let content = self.inner.read_file(path)?;
        self.contents
            .write()
            .insert(path.to_path_buf(), Arc::new(content.clone()));
        Ok(content)
    }
}

/// File the stage asks the host to emit next to its own output
#[derive(Debug, Clone, PartialEq)]
pub struct EmittedAsset {
    pub file: String,
    pub content: String,
    pub source_map: Option<SourceMap>,
    pub info: Map<String, Value>,
}

/// Non-fatal diagnostic surfaced to the host
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageWarning {
    /// Warning reported by the engine or one of its plugins
    Engine(EngineWarning),
    /// One-time environment advisory
    Advisory(String),
}

impl fmt::Display for StageWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageWarning::Engine(warning) => fmt::Display::fmt(warning, f),
            StageWarning::Advisory(text) => f.write_str(text),
        }
    }
}

/// Everything the stage consumes from the build host for one unit of work.
///
/// Side-effect methods take `&self`; hosts use interior mutability so a single
/// host can be shared by concurrently running stages.
pub trait BuildHost: Send + Sync {
    /// Absolute path of the resource being transformed
    fn resource_path(&self) -> &Path;

    /// Directory that source map paths are expressed relative to
    fn context(&self) -> &Path {
        self.resource_path().parent().unwrap_or(Path::new(""))
    }

    /// Process working directory as the host sees it
    fn working_dir(&self) -> &Path;

    /// Host-wide source map flag, used when the stage options leave it unset
    fn source_map_enabled(&self) -> bool;

    fn add_dependency(&self, path: &Path);

    fn add_build_dependency(&self, path: &Path);

    fn add_missing_dependency(&self, path: &Path);

    fn add_context_dependency(&self, path: &Path);

    fn emit_file(&self, asset: EmittedAsset);

    fn emit_warning(&self, warning: StageWarning);

    fn fs(&self) -> &dyn HostFs;
}

/// Side effect recorded by [`RecordingHost`]
#[derive(Debug, Clone, PartialEq)]
pub enum HostEvent {
    Dependency(PathBuf),
    BuildDependency(PathBuf),
    MissingDependency(PathBuf),
    ContextDependency(PathBuf),
    EmitFile(EmittedAsset),
    Warning(StageWarning),
}

/// Host that records every side effect in order.
///
/// Used by the CLI to report what a real build system would have received.
pub struct RecordingHost {
    resource_path: PathBuf,
    context: PathBuf,
    working_dir: PathBuf,
    source_map: bool,
    fs: Arc<dyn HostFs>,
    events: Mutex<Vec<HostEvent>>,
}

impl RecordingHost {
    pub fn new(resource_path: impl Into<PathBuf>) -> Self {
        let resource_path = resource_path.into();
        let context = resource_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        Self {
            working_dir: context.clone(),
            context,
            resource_path,
            source_map: false,
            fs: Arc::new(StdFs),
            events: Mutex::new(Vec::new()),
        }
    }

    pub fn with_context(mut self, context: impl Into<PathBuf>) -> Self {
        self.context = context.into();
        self
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = dir.into();
        self
    }

    pub fn with_source_map(mut self, enabled: bool) -> Self {
        self.source_map = enabled;
        self
    }

    pub fn with_fs(mut self, fs: Arc<dyn HostFs>) -> Self {
        self.fs = fs;
        self
    }

    /// Snapshot of all recorded side effects
    pub fn events(&self) -> Vec<HostEvent> {
        self.events.lock().clone()
    }

    pub fn take_events(&self) -> Vec<HostEvent> {
        std::mem::take(&mut *self.events.lock())
    }

    pub fn dependencies(&self) -> Vec<PathBuf> {
        self.events
            .lock()
            .iter()
            .filter_map(|event| match event {
                HostEvent::Dependency(path) => Some(path.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn warnings(&self) -> Vec<StageWarning> {
        self.events
            .lock()
            .iter()
            .filter_map(|event| match event {
                HostEvent::Warning(warning) => Some(warning.clone()),
                _ => None,
            })
            .collect()
    }

    fn record(&self, event: HostEvent) {
        self.events.lock().push(event);
    }
}

impl BuildHost for RecordingHost {
    fn resource_path(&self) -> &Path {
        &self.resource_path
    }

    fn context(&self) -> &Path {
        &self.context
    }

    fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    fn source_map_enabled(&self) -> bool {
        self.source_map
    }

    fn add_dependency(&self, path: &Path) {
        self.record(HostEvent::Dependency(path.to_path_buf()));
    }

    fn add_build_dependency(&self, path: &Path) {
        self.record(HostEvent::BuildDependency(path.to_path_buf()));
    }

    fn add_missing_dependency(&self, path: &Path) {
        self.record(HostEvent::MissingDependency(path.to_path_buf()));
    }

    fn add_context_dependency(&self, path: &Path) {
        self.record(HostEvent::ContextDependency(path.to_path_buf()));
    }

    fn emit_file(&self, asset: EmittedAsset) {
        self.record(HostEvent::EmitFile(asset));
    }

    fn emit_warning(&self, warning: StageWarning) {
        self.record(HostEvent::Warning(warning));
    }

    fn fs(&self) -> &dyn HostFs {
        self.fs.as_ref()
    }
}
