//! CLI entry point for the CSS transform stage.
//!
//! Runs one stylesheet through the stage the way a build host would, using the
//! built-in engine, and reports the dependency edges, emitted files and
//! warnings the host would have received.

use anyhow::{Context, Result, bail};
use clap::{
    ArgAction, Parser,
    builder::styling::{AnsiColor, Effects, Styles},
};
use serde_json::{Value, json};
use std::path::{Component, Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use stylestage::host::{CachedFs, StdFs};
use stylestage::{
    BasicEngine, HostEvent, PluginRef, RecordingHost, StageOptions, TransformOutput,
    TransformRequest, TransformStage,
};
use tracing::{Level, warn};

fn clap_cargo_style() -> Styles {
    Styles::styled()
        .header(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .usage(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .literal(AnsiColor::Green.on_default())
        .placeholder(AnsiColor::Green.on_default())
}

/// CSS transform stage
#[derive(Parser)]
#[command(
    name = "stylestage",
    version = env!("CARGO_PKG_VERSION"),
    about = "Run the CSS transform stage on one stylesheet",
    after_help = "Examples:\n  stylestage src/app.css\n  stylestage src/app.css --plugin import-deps --source-map --out dist/app.css\n  stylestage src/app.css --config none --plugin strip-comments",
    styles = clap_cargo_style()
)]
struct Cli {
    /// Stylesheet to transform
    file: PathBuf,

    /// Config discovery: "auto", "none", or a config file/directory
    #[arg(short, long)]
    config: Option<String>,

    /// TOML file with stage options
    #[arg(short, long, env = "STYLESTAGE_SETTINGS")]
    settings: Option<PathBuf>,

    /// Add a plugin by name (repeatable)
    #[arg(short, long = "plugin")]
    plugins: Vec<String>,

    /// Generate a source map
    #[arg(long)]
    source_map: bool,

    /// Output file; CSS goes to stdout when omitted
    #[arg(short, long)]
    out: Option<PathBuf>,

    /// More logging; repeat for trace output
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => Level::WARN,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn stage_options(cli: &Cli, out: Option<&Path>) -> Result<StageOptions> {
    let mut options = match &cli.settings {
        Some(path) => StageOptions::load_from(path)
            .with_context(|| format!("Configuration error loading from {}", path.display()))?,
        None => StageOptions::load().context("Configuration error")?,
    };

    if let Some(config) = &cli.config {
        options.config = serde_json::from_value(Value::String(config.clone()))
            .with_context(|| format!("Invalid --config value '{config}'"))?;
    }
    for name in &cli.plugins {
        options.plugins.push(PluginRef::new(name));
    }
    if cli.source_map {
        options.source_map = Some(true);
    }
    if let Some(out) = out {
        options
            .options
            .insert("to".to_string(), json!(out.to_string_lossy()));
    }
    Ok(options)
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let file = std::path::absolute(&cli.file)
        .with_context(|| format!("Invalid path {}", cli.file.display()))?;
    let out = cli.out.as_deref().map(std::path::absolute).transpose()?;
    let options = stage_options(&cli, out.as_deref())?;

    let source = tokio::fs::read_to_string(&file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;

    let host = RecordingHost::new(&file)
        .with_working_dir(std::env::current_dir()?)
        .with_fs(Arc::new(CachedFs::new(StdFs)));
    let stage = TransformStage::new(options, Arc::new(BasicEngine::new()));

    let result = stage.run(TransformRequest::new(source), &host).await;
    report(&host, out.as_deref()).await?;

    match result {
        Ok(output) => {
            write_output(&output, out.as_deref()).await?;
            Ok(ExitCode::SUCCESS)
        }
        Err(err) => {
            eprintln!("Error [{}]: {err}", err.status_code());
            eprintln!("Suggestion: {}", err.suggestion());
            Ok(ExitCode::FAILURE)
        }
    }
}

/// Print what the host received; emitted files land next to the output
async fn report(host: &RecordingHost, out: Option<&Path>) -> Result<()> {
    for event in host.take_events() {
        match event {
            HostEvent::Dependency(path) => eprintln!("dependency: {}", path.display()),
            HostEvent::BuildDependency(path) => {
                eprintln!("build dependency: {}", path.display());
            }
            HostEvent::MissingDependency(path) => {
                eprintln!("missing dependency: {}", path.display());
            }
            HostEvent::ContextDependency(path) => {
                eprintln!("context dependency: {}", path.display());
            }
            HostEvent::Warning(warning) => eprintln!("warning: {warning}"),
            HostEvent::EmitFile(asset) => match out.and_then(Path::parent) {
                Some(dir) => {
                    tokio::fs::create_dir_all(dir).await?;
                    let target = asset_target(dir, &asset.file)?;
                    tokio::fs::write(&target, &asset.content)
                        .await
                        .with_context(|| format!("Failed to write {}", target.display()))?;
                    eprintln!("emitted: {}", target.display());
                }
                None => eprintln!("emitted (not written without --out): {}", asset.file),
            },
        }
    }
    Ok(())
}

/// Emitted file names must stay inside the output directory
fn asset_target(dir: &Path, name: &str) -> Result<PathBuf> {
    let relative = Path::new(name);
    let escapes = relative
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
    if escapes || name.is_empty() {
        bail!("Refusing to write emitted file '{name}' outside {}", dir.display());
    }
    Ok(dir.join(relative))
}

async fn write_output(output: &TransformOutput, out: Option<&Path>) -> Result<()> {
    let Some(out) = out else {
        print!("{}", output.css);
        if output.map.is_some() {
            warn!("Source map generated but not written; pass --out to save it");
        }
        return Ok(());
    };

    if let Some(dir) = out.parent() {
        tokio::fs::create_dir_all(dir).await?;
    }
    tokio::fs::write(out, &output.css)
        .await
        .with_context(|| format!("Failed to write {}", out.display()))?;

    if let Some(map) = &output.map {
        let mut map_path = out.as_os_str().to_owned();
        map_path.push(".map");
        let map_path = PathBuf::from(map_path);
        tokio::fs::write(&map_path, map.to_json()?)
            .await
            .with_context(|| format!("Failed to write {}", map_path.display()))?;
    }
    Ok(())
}
