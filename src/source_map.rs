//! Source map model and coordinate-space reconciliation
//!
//! Maps crossing the stage boundary may be expressed against a different base
//! directory than the one the host expects. Inbound maps are rewritten before
//! they are handed to the engine as `map.prev`; outbound maps are rewritten
//! before they are returned to the host. In both directions `sources` end up
//! relative to the host context directory.

use path_clean::PathClean;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Component, Path, PathBuf};
use std::sync::LazyLock;

/// Version 3 source map as JSON
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceMap {
    #[serde(default = "default_version")]
    pub version: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_root: Option<String>,

    #[serde(default)]
    pub sources: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sources_content: Option<Vec<Option<String>>>,

    #[serde(default)]
    pub names: Vec<String>,

    #[serde(default)]
    pub mappings: String,

    /// Vendor extensions such as `x_google_ignoreList`
    #[serde(flatten)]
    pub extensions: Map<String, Value>,
}

fn default_version() -> u32 {
    3
}

impl SourceMap {
    pub fn new(sources: Vec<String>, mappings: impl Into<String>) -> Self {
        Self {
            version: default_version(),
            file: None,
            source_root: None,
            sources,
            sources_content: None,
            names: Vec::new(),
            mappings: mappings.into(),
            extensions: Map::new(),
        }
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Classification of a `sources` entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UrlType {
    /// `//cdn.example.com/a.css`
    SchemeRelative,
    /// `/abs/a.css` or `C:\abs\a.css`
    PathAbsolute,
    /// `webpack://a.css`, `file:///a.css`
    Absolute,
    /// `a.css`, `../a.css`
    PathRelative,
}

static WINDOWS_ABSOLUTE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:[a-zA-Z]:[/\\]|\\\\)").expect("static regex is valid")
});
static URL_SCHEME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z][a-zA-Z\d+\-.]*:").expect("static regex is valid")
});

pub fn url_type(source: &str) -> UrlType {
    if source.starts_with("//") {
        UrlType::SchemeRelative
    } else if source.starts_with('/') || WINDOWS_ABSOLUTE.is_match(source) {
        UrlType::PathAbsolute
    } else if URL_SCHEME.is_match(source) {
        UrlType::Absolute
    } else {
        UrlType::PathRelative
    }
}

/// Rewrite a map received from an earlier stage so its sources are relative
/// to `context`. `sourceRoot` is folded into each source and dropped.
pub fn normalize_inbound(map: &SourceMap, context: &Path) -> SourceMap {
    let mut normalized = map.clone();
    normalized.file = None;
    let source_root = normalized.source_root.take().filter(|root| !root.is_empty());

    normalized.sources = map
        .sources
        .iter()
        .map(|source| {
            if is_virtual(source) {
                return source.clone();
            }
            match url_type(source) {
                UrlType::PathRelative => {
                    let joined = match &source_root {
                        Some(root) => Path::new(root).join(source),
                        None => PathBuf::from(source),
                    };
                    relativize(&joined, context)
                }
                UrlType::PathAbsolute => relativize(Path::new(source), context),
                UrlType::SchemeRelative | UrlType::Absolute => source.clone(),
            }
        })
        .collect();

    normalized
}

/// Rewrite a map produced by the engine back into the host's coordinate space
pub fn normalize_outbound(map: &SourceMap, context: &Path) -> SourceMap {
    let mut normalized = map.clone();
    normalized.file = None;
    normalized.source_root = Some(String::new());

    normalized.sources = map
        .sources
        .iter()
        .map(|source| {
            if is_virtual(source) {
                return source.clone();
            }
            match url_type(source) {
                UrlType::PathAbsolute | UrlType::PathRelative => {
                    relativize(Path::new(source), context)
                }
                UrlType::SchemeRelative | UrlType::Absolute => source.clone(),
            }
        })
        .collect();

    normalized
}

// Engines use `<input css 1>` style names for anonymous inputs
fn is_virtual(source: &str) -> bool {
    source.starts_with('<')
}

/// Express `path` relative to `context`. Relative paths are taken to already
/// be relative to the context and are only cleaned.
fn relativize(path: &Path, context: &Path) -> String {
    let relative = if path.is_absolute() && context.is_absolute() {
        relative_path(&path.clean(), &context.clean())
    } else {
        path.clean()
    };
    relative.to_string_lossy().into_owned()
}

/// Compute `path` relative to `base`; both must be clean and absolute
pub fn relative_path(path: &Path, base: &Path) -> PathBuf {
    let mut path_components = path.components().peekable();
    let mut base_components = base.components().peekable();

    while let (Some(a), Some(b)) = (path_components.peek(), base_components.peek()) {
        if a != b {
            break;
        }
        path_components.next();
        base_components.next();
    }

    let mut relative = PathBuf::new();
    for component in base_components {
        if matches!(component, Component::Normal(_)) {
            relative.push("..");
        }
    }
    for component in path_components {
        relative.push(component.as_os_str());
    }
    relative
}
