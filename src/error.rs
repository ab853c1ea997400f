//! Error types for the transform stage
//!
//! Fatal outcomes flow through [`StageError`]; the build host receives exactly
//! one of them per failed unit of work. Warnings and advisories never travel
//! through these types.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Failures while discovering or loading external configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error(
        "Config not found at '{path}'\nSuggestion: Point the `config` option at an existing file or directory, or set it to \"auto\""
    )]
    NotFound { path: PathBuf },

    #[error(
        "Malformed config in '{path}': {reason}\nSuggestion: Check the file syntax; .stylestagerc accepts JSON5 comments and trailing commas"
    )]
    Malformed { path: PathBuf, reason: String },

    #[error("Failed to read config '{path}': {source}\nSuggestion: Check file permissions")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(
        "Invalid plugin list in '{path}': {reason}\nSuggestion: Use a plugin name, a [name, options] pair, or an object keyed by plugin name"
    )]
    InvalidPlugin { path: PathBuf, reason: String },

    #[error("Invalid processing option '{key}': {reason}\nSuggestion: Check the option's type")]
    InvalidOption { key: String, reason: String },
}

impl ConfigError {
    pub fn malformed(path: impl Into<PathBuf>, reason: impl fmt::Display) -> Self {
        Self::Malformed {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub fn invalid_option(key: impl Into<String>, reason: impl fmt::Display) -> Self {
        Self::InvalidOption {
            key: key.into(),
            reason: reason.to_string(),
        }
    }

    /// Stable code for programmatic handling
    pub fn status_code(&self) -> &'static str {
        match self {
            ConfigError::NotFound { .. } => "CONFIG_NOT_FOUND",
            ConfigError::Malformed { .. } => "CONFIG_MALFORMED",
            ConfigError::Io { .. } => "CONFIG_IO",
            ConfigError::InvalidPlugin { .. } => "CONFIG_INVALID_PLUGIN",
            ConfigError::InvalidOption { .. } => "CONFIG_INVALID_OPTION",
        }
    }
}

/// Syntax error raised by an engine while parsing CSS input.
///
/// Line and column are 1-based. `input` holds the text that failed to parse so
/// a code frame can be rendered for the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CssSyntaxError {
    pub reason: String,
    pub file: Option<PathBuf>,
    pub line: u32,
    pub column: u32,
    pub input: Option<String>,
    pub plugin: Option<String>,
}

impl CssSyntaxError {
    /// Error name engines use to mark syntax-level failures
    pub const NAME: &'static str = "CssSyntaxError";

    pub fn new(reason: impl Into<String>, line: u32, column: u32) -> Self {
        Self {
            reason: reason.into(),
            file: None,
            line,
            column,
            input: None,
            plugin: None,
        }
    }

    pub fn with_file(mut self, file: impl Into<PathBuf>) -> Self {
        self.file = Some(file.into());
        self
    }

    pub fn with_input(mut self, input: impl Into<String>) -> Self {
        self.input = Some(input.into());
        self
    }

    /// Render the offending line with a caret under the failing column
    pub fn code_frame(&self) -> Option<String> {
        let input = self.input.as_deref()?;
        let index = usize::try_from(self.line).ok()?.checked_sub(1)?;
        let text = input.lines().nth(index)?;

        let number = self.line.to_string();
        let gutter = " ".repeat(number.len());
        let padding = " ".repeat(self.column.saturating_sub(1) as usize);

        Some(format!("> {number} | {text}\n  {gutter} | {padding}^"))
    }

    /// Full user-facing report: name, position, reason and code frame
    pub fn report(&self) -> String {
        let file = self
            .file
            .as_ref()
            .map(|f| format!(" {}", f.display()))
            .unwrap_or_default();
        let mut report = format!(
            "{}\n\n({}:{}){file}\n{}",
            Self::NAME,
            self.line,
            self.column,
            self.reason
        );
        if let Some(frame) = self.code_frame() {
            report.push_str("\n\n");
            report.push_str(&frame);
        }
        report
    }
}

impl fmt::Display for CssSyntaxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let file = self
            .file
            .as_ref()
            .map(|f| f.display().to_string())
            .unwrap_or_else(|| "<css input>".to_string());
        write!(f, "{file}:{}:{}: {}", self.line, self.column, self.reason)
    }
}

impl std::error::Error for CssSyntaxError {}

/// Anything an engine or one of its plugins can throw
#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Syntax(CssSyntaxError),

    #[error("{}{message}", plugin_prefix(.plugin))]
    Plugin {
        plugin: Option<String>,
        message: String,
        file: Option<PathBuf>,
    },

    #[error(transparent)]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

fn plugin_prefix(plugin: &Option<String>) -> String {
    plugin
        .as_ref()
        .map(|p| format!("[{p}] "))
        .unwrap_or_default()
}

impl From<CssSyntaxError> for EngineError {
    fn from(err: CssSyntaxError) -> Self {
        EngineError::Syntax(err)
    }
}

impl EngineError {
    pub fn plugin(plugin: impl Into<String>, message: impl Into<String>) -> Self {
        EngineError::Plugin {
            plugin: Some(plugin.into()),
            message: message.into(),
            file: None,
        }
    }

    /// Lifts a [`CssSyntaxError`] thrown through the boxed path into `Syntax`
    pub fn normalize(self) -> Self {
        match self {
            EngineError::Other(err) => match err.downcast::<CssSyntaxError>() {
                Ok(syntax) => EngineError::Syntax(*syntax),
                Err(err) => EngineError::Other(err),
            },
            other => other,
        }
    }

    fn as_syntax(&self) -> Option<&CssSyntaxError> {
        match self {
            EngineError::Syntax(err) => Some(err),
            EngineError::Other(err) => err.downcast_ref::<CssSyntaxError>(),
            EngineError::Plugin { .. } => None,
        }
    }

    /// Error name as the engine reports it
    pub fn name(&self) -> &'static str {
        match self.as_syntax() {
            Some(_) => CssSyntaxError::NAME,
            None => "Error",
        }
    }

    /// Source file the error points at, if any
    pub fn file(&self) -> Option<&Path> {
        match self {
            EngineError::Plugin { file, .. } => file.as_deref(),
            _ => self.as_syntax().and_then(|err| err.file.as_deref()),
        }
    }
}

/// Classified engine failure
#[derive(Error, Debug)]
pub enum TransformFailure {
    #[error("{}", CssSyntaxError::report(.0))]
    Syntax(CssSyntaxError),

    #[error("{cause}")]
    Generic {
        #[source]
        cause: EngineError,
    },
}

impl TransformFailure {
    /// File to register as a dependency even though the run failed
    pub fn file(&self) -> Option<&Path> {
        match self {
            TransformFailure::Syntax(err) => err.file.as_deref(),
            TransformFailure::Generic { cause } => cause.file(),
        }
    }

    pub fn is_syntax(&self) -> bool {
        matches!(self, TransformFailure::Syntax(_))
    }
}

/// Fatal outcome of one unit of work
#[derive(Error, Debug)]
pub enum StageError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Transform(#[from] TransformFailure),
}

impl StageError {
    /// Stable code for programmatic handling in host integrations
    pub fn status_code(&self) -> &'static str {
        match self {
            StageError::Config(err) => err.status_code(),
            StageError::Transform(TransformFailure::Syntax(_)) => "CSS_SYNTAX_ERROR",
            StageError::Transform(TransformFailure::Generic { .. }) => "TRANSFORM_FAILED",
        }
    }

    pub fn suggestion(&self) -> &'static str {
        match self {
            StageError::Config(_) => "Fix or remove the discovered config file and rebuild.",
            StageError::Transform(TransformFailure::Syntax(_)) => {
                "Fix the CSS at the reported position; the build re-runs when the file changes."
            }
            StageError::Transform(TransformFailure::Generic { .. }) => {
                "Check the failing plugin's options and its compatibility with the engine version."
            }
        }
    }
}

pub type StageResult<T> = Result<T, StageError>;
