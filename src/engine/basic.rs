//! Built-in reference engine
//!
//! Validates CSS structure, keeps the text as its tree and runs a small set
//! of registry plugins. Output is the input text unless a plugin rewrites it,
//! and source maps are line-granular identity maps.

use async_trait::async_trait;
use path_clean::PathClean;
use regex::Regex;
use serde_json::{Map, Value, json};
use std::collections::HashMap;
use std::iter::Peekable;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::str::CharIndices;
use std::sync::{Arc, LazyLock};

use super::{EngineFactory, EngineMessage, EngineOutput, EngineWarning, ProcessInput, Processor};
use crate::error::{CssSyntaxError, EngineError};
use crate::options::{MapOptions, ProcessingOptions};
use crate::plugin::PluginRef;
use crate::reuse::SyntaxTree;
use crate::source_map::{SourceMap, UrlType, url_type};

/// Package name projects declare to depend on the built-in engine
pub const PACKAGE_NAME: &str = "stylestage";

/// `@import` statement found in a stylesheet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportRule {
    pub url: String,
    pub line: u32,
    pub column: u32,
}

/// Validated stylesheet; the tree type of [`BasicEngine`]
#[derive(Debug, Clone, PartialEq)]
pub struct Stylesheet {
    /// Text as it was parsed
    pub input: String,
    /// Current text, rewritten by plugins
    pub css: String,
    pub from: Option<PathBuf>,
    pub imports: Vec<ImportRule>,
    /// Byte ranges of comments in `css`
    comments: Vec<Range<usize>>,
}

struct Cursor<'a> {
    chars: Peekable<CharIndices<'a>>,
    line: u32,
    column: u32,
}

impl<'a> Cursor<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            chars: text.char_indices().peekable(),
            line: 1,
            column: 1,
        }
    }

    /// Next char with its byte offset and 1-based position
    fn advance(&mut self) -> Option<(usize, char, u32, u32)> {
        let (offset, c) = self.chars.next()?;
        let (line, column) = (self.line, self.column);
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some((offset, c, line, column))
    }

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().map(|(_, c)| *c)
    }
}

static IMPORT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"@import\s+(?:url\(\s*)?(?:"([^"]*)"|'([^']*)'|([^\s;'")]+))"#)
        .expect("static regex is valid")
});
static IMPORTANT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)!\s*important").expect("static regex is valid"));

impl Stylesheet {
    pub fn parse(input: &str, from: Option<&Path>) -> Result<Self, CssSyntaxError> {
        let fail = |reason: &str, line: u32, column: u32| {
            let mut err = CssSyntaxError::new(reason, line, column).with_input(input);
            err.file = from.map(Path::to_path_buf);
            err
        };

        let mut cursor = Cursor::new(input);
        let mut blocks = Vec::new();
        let mut comments = Vec::new();

        while let Some((start, c, line, column)) = cursor.advance() {
            match c {
                '/' if cursor.peek() == Some('*') => {
                    cursor.advance();
                    let mut prev = '\0';
                    let mut end = None;
                    while let Some((offset, d, _, _)) = cursor.advance() {
                        if prev == '*' && d == '/' {
                            end = Some(offset + 1);
                            break;
                        }
                        prev = d;
                    }
                    match end {
                        Some(end) => comments.push(start..end),
                        None => return Err(fail("Unclosed comment", line, column)),
                    }
                }
                '"' | '\'' => {
                    let mut closed = false;
                    while let Some((_, d, _, _)) = cursor.advance() {
                        match d {
                            '\\' => {
                                cursor.advance();
                            }
                            '\n' => break,
                            d if d == c => {
                                closed = true;
                                break;
                            }
                            _ => {}
                        }
                    }
                    if !closed {
                        return Err(fail("Unclosed string", line, column));
                    }
                }
                '\\' => {
                    cursor.advance();
                }
                '{' => blocks.push((line, column)),
                '}' => {
                    if blocks.pop().is_none() {
                        return Err(fail("Unexpected }", line, column));
                    }
                }
                _ => {}
            }
        }

        if let Some((line, column)) = blocks.pop() {
            return Err(fail("Unclosed block", line, column));
        }

        let mut sheet = Self {
            input: input.to_string(),
            css: input.to_string(),
            from: from.map(Path::to_path_buf),
            imports: Vec::new(),
            comments,
        };
        sheet.imports = sheet.find_imports();
        Ok(sheet)
    }

    /// Current text with comments blanked out.
    ///
    /// Byte offsets match `css`, so positions must be computed against `css`.
    pub fn code(&self) -> String {
        let mut code = String::with_capacity(self.css.len());
        let mut last = 0;
        for range in &self.comments {
            code.push_str(&self.css[last..range.start]);
            // one ASCII char per byte keeps offsets aligned with `css`
            code.extend(
                self.css.as_bytes()[range.clone()]
                    .iter()
                    .map(|&b| if b == b'\n' { '\n' } else { ' ' }),
            );
            last = range.end;
        }
        code.push_str(&self.css[last..]);
        code
    }

    fn find_imports(&self) -> Vec<ImportRule> {
        let code = self.code();
        IMPORT
            .captures_iter(&code)
            .filter_map(|caps| {
                let whole = caps.get(0)?;
                let url = caps.get(1).or(caps.get(2)).or(caps.get(3))?;
                let (line, column) = position_at(&self.css, whole.start());
                Some(ImportRule {
                    url: url.as_str().to_string(),
                    line,
                    column,
                })
            })
            .collect()
    }

    /// Drop comments, keeping `/*! ... */` ones.
    ///
    /// Line breaks inside removed comments stay so output lines keep their
    /// source line numbers.
    pub fn strip_comments(&mut self) {
        let mut css = String::with_capacity(self.css.len());
        let mut kept = Vec::new();
        let mut last = 0;
        let mut removed = 0;

        for range in &self.comments {
            if self.css[range.clone()].starts_with("/*!") {
                kept.push(range.start - removed..range.end - removed);
                continue;
            }
            css.push_str(&self.css[last..range.start]);
            let breaks = self.css[range.clone()].matches('\n').count();
            css.push_str(&"\n".repeat(breaks));
            last = range.end;
            removed += range.len() - breaks;
        }
        css.push_str(&self.css[last..]);

        self.css = css;
        self.comments = kept;
    }
}

/// 1-based line and column of a byte offset
fn position_at(text: &str, offset: usize) -> (u32, u32) {
    let prefix = &text[..offset];
    let line = prefix.matches('\n').count() + 1;
    let line_start = prefix.rfind('\n').map_or(0, |i| i + 1);
    let column = prefix[line_start..].chars().count() + 1;
    (
        u32::try_from(line).unwrap_or(u32::MAX),
        u32::try_from(column).unwrap_or(u32::MAX),
    )
}

/// Warnings and messages collected while plugins run
#[derive(Debug, Default)]
pub struct PluginReport {
    pub warnings: Vec<EngineWarning>,
    pub messages: Vec<EngineMessage>,
}

/// Plugin for [`BasicEngine`]
#[async_trait]
pub trait BasicPlugin: Send + Sync {
    fn name(&self) -> &str;

    async fn run(
        &self,
        options: &Value,
        sheet: &mut Stylesheet,
        report: &mut PluginReport,
    ) -> Result<(), EngineError>;
}

pub struct StripComments;

#[async_trait]
impl BasicPlugin for StripComments {
    fn name(&self) -> &str {
        "strip-comments"
    }

    async fn run(
        &self,
        _options: &Value,
        sheet: &mut Stylesheet,
        _report: &mut PluginReport,
    ) -> Result<(), EngineError> {
        sheet.strip_comments();
        Ok(())
    }
}

/// Reports local `@import` targets as dependency edges
pub struct ImportDeps;

#[async_trait]
impl BasicPlugin for ImportDeps {
    fn name(&self) -> &str {
        "import-deps"
    }

    async fn run(
        &self,
        _options: &Value,
        sheet: &mut Stylesheet,
        report: &mut PluginReport,
    ) -> Result<(), EngineError> {
        let Some(base) = sheet.from.as_deref().and_then(Path::parent) else {
            report.warnings.push(
                EngineWarning::new("Cannot resolve imports without a source path")
                    .from_plugin(self.name()),
            );
            return Ok(());
        };

        for import in &sheet.imports {
            if !matches!(url_type(&import.url), UrlType::PathRelative | UrlType::PathAbsolute) {
                continue;
            }
            let file = base.join(&import.url).clean();
            let exists = tokio::fs::try_exists(&file).await.unwrap_or(false);
            report.messages.push(if exists {
                EngineMessage::Dependency { file }
            } else {
                EngineMessage::MissingDependency { file }
            });
        }
        Ok(())
    }
}

pub struct FlagImportant;

#[async_trait]
impl BasicPlugin for FlagImportant {
    fn name(&self) -> &str {
        "flag-important"
    }

    async fn run(
        &self,
        _options: &Value,
        sheet: &mut Stylesheet,
        report: &mut PluginReport,
    ) -> Result<(), EngineError> {
        let code = sheet.code();
        for found in IMPORTANT.find_iter(&code) {
            let (line, column) = position_at(&sheet.css, found.start());
            report.warnings.push(
                EngineWarning::new("Avoid !important")
                    .at(line, column)
                    .from_plugin(self.name()),
            );
        }
        Ok(())
    }
}

/// Emits a JSON asset listing the stylesheet's imports.
///
/// Options: `{ "file": "<asset name>" }`, defaulting to `imports.json`.
pub struct EmitManifest;

#[async_trait]
impl BasicPlugin for EmitManifest {
    fn name(&self) -> &str {
        "emit-manifest"
    }

    async fn run(
        &self,
        options: &Value,
        sheet: &mut Stylesheet,
        report: &mut PluginReport,
    ) -> Result<(), EngineError> {
        let file = match options.get("file") {
            None => "imports.json".to_string(),
            Some(Value::String(file)) if !file.is_empty() => file.clone(),
            Some(_) => {
                return Err(EngineError::plugin(
                    self.name(),
                    "option `file` must be a non-empty string",
                ));
            }
        };

        let urls: Vec<&str> = sheet.imports.iter().map(|i| i.url.as_str()).collect();
        let content = serde_json::to_string_pretty(&urls)
            .map_err(|e| EngineError::plugin(self.name(), e.to_string()))?;

        let mut info = Map::new();
        if let Some(from) = &sheet.from {
            info.insert("sourceFilename".to_string(), json!(from.to_string_lossy()));
        }

        report.messages.push(EngineMessage::Asset {
            file: Some(file),
            content: Some(content),
            source_map: None,
            info,
        });
        Ok(())
    }
}

/// Names of the plugins every [`BasicEngine`] knows
pub const BUILTIN_PLUGINS: &[&str] = &[
    "strip-comments",
    "import-deps",
    "flag-important",
    "emit-manifest",
];

/// Reference engine with a plugin registry
pub struct BasicEngine {
    version: String,
    registry: HashMap<String, Arc<dyn BasicPlugin>>,
}

impl Default for BasicEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl BasicEngine {
    pub fn new() -> Self {
        let engine = Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            registry: HashMap::new(),
        };
        engine
            .register(Arc::new(StripComments))
            .register(Arc::new(ImportDeps))
            .register(Arc::new(FlagImportant))
            .register(Arc::new(EmitManifest))
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Add or replace a plugin under its own name
    pub fn register(mut self, plugin: Arc<dyn BasicPlugin>) -> Self {
        self.registry.insert(plugin.name().to_string(), plugin);
        self
    }
}

impl EngineFactory for BasicEngine {
    fn package_name(&self) -> &str {
        PACKAGE_NAME
    }

    fn version(&self) -> &str {
        &self.version
    }

    fn create(&self, plugins: &[PluginRef]) -> Result<Box<dyn Processor>, EngineError> {
        let plugins = plugins
            .iter()
            .map(|plugin| {
                self.registry
                    .get(&plugin.name)
                    .map(|found| (Arc::clone(found), plugin.options.clone()))
                    .ok_or_else(|| EngineError::Plugin {
                        plugin: Some(plugin.name.clone()),
                        message: "plugin is not registered with the engine".to_string(),
                        file: None,
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Box::new(BasicProcessor {
            version: self.version.clone(),
            plugins,
        }))
    }
}

pub struct BasicProcessor {
    version: String,
    plugins: Vec<(Arc<dyn BasicPlugin>, Value)>,
}

#[async_trait]
impl Processor for BasicProcessor {
    fn version(&self) -> &str {
        &self.version
    }

    async fn process(
        &self,
        input: ProcessInput,
        options: &ProcessingOptions,
    ) -> Result<EngineOutput, EngineError> {
        let mut sheet = match input {
            ProcessInput::Text(text) => Stylesheet::parse(&text, options.from.as_deref())?,
            ProcessInput::Tree(tree) => tree
                .downcast_ref::<Stylesheet>()
                .cloned()
                .ok_or_else(|| EngineError::Plugin {
                    plugin: None,
                    message: "tree was not produced by this engine".to_string(),
                    file: options.from.clone(),
                })?,
        };

        let mut report = PluginReport::default();
        for (plugin, plugin_options) in &self.plugins {
            plugin.run(plugin_options, &mut sheet, &mut report).await?;
        }

        let mut css = sheet.css.clone();
        let map = match &options.map {
            Some(map_options) => {
                let map = identity_map(&sheet, options);
                embed_or_annotate(&mut css, map, map_options, options)?
            }
            None => None,
        };

        Ok(EngineOutput {
            css,
            map,
            warnings: report.warnings,
            messages: report.messages,
            root: SyntaxTree::new(sheet),
            version: self.version.clone(),
        })
    }
}

fn identity_map(sheet: &Stylesheet, options: &ProcessingOptions) -> SourceMap {
    let source = options
        .from
        .as_ref()
        .or(sheet.from.as_ref())
        .map(|from| from.to_string_lossy().into_owned())
        .unwrap_or_else(|| "<input css>".to_string());

    let lines = sheet.css.lines().count();
    let mappings = if lines == 0 {
        String::new()
    } else {
        let mut mappings = String::from("AAAA");
        for _ in 1..lines {
            mappings.push_str(";AACA");
        }
        mappings
    };

    let mut map = SourceMap::new(vec![source], mappings);
    map.sources_content = Some(vec![Some(sheet.input.clone())]);
    map.file = options
        .to
        .as_ref()
        .and_then(|to| to.file_name())
        .map(|name| name.to_string_lossy().into_owned());
    map
}

/// Inline maps are appended as a data URL and not returned separately
fn embed_or_annotate(
    css: &mut String,
    map: SourceMap,
    map_options: &MapOptions,
    options: &ProcessingOptions,
) -> Result<Option<SourceMap>, EngineError> {
    if map_options.inline {
        let json = map.to_json().map_err(|e| EngineError::Other(Box::new(e)))?;
        css.push_str(&format!(
            "\n/*# sourceMappingURL=data:application/json;charset=utf-8,{} */",
            percent_encode(&json)
        ));
        return Ok(None);
    }

    if map_options.annotation {
        let name = options
            .to
            .as_ref()
            .and_then(|to| to.file_name())
            .map_or_else(|| "out.css".to_string(), |n| n.to_string_lossy().into_owned());
        css.push_str(&format!("\n/*# sourceMappingURL={name}.map */"));
    }
    Ok(Some(map))
}

fn percent_encode(text: &str) -> String {
    let mut encoded = String::with_capacity(text.len());
    for byte in text.bytes() {
        if byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'_' | b'.' | b'~') {
            encoded.push(char::from(byte));
        } else {
            encoded.push_str(&format!("%{byte:02X}"));
        }
    }
    encoded
}
