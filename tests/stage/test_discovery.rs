//! Config discovery wired through the whole stage

use serde_json::json;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use stylestage::{
    AdvisoryState, BasicEngine, ConfigDiscovery, FsConfigResolver, HostEvent, PluginList,
    PluginRef, RecordingHost, StageError, StageOptions, TransformRequest, TransformStage,
};
use tempfile::TempDir;

fn stage(root: &Path, options: StageOptions) -> TransformStage {
    TransformStage::new(options, Arc::new(BasicEngine::new()))
        .with_resolver(Arc::new(FsConfigResolver::new().with_stop_dir(root)))
        .with_advisory_state(Arc::new(AdvisoryState::new()))
}

const CSS: &str = "/* note */\na { color: red !important }";

#[tokio::test]
async fn test_discovered_config_applies_and_is_tracked() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path();
    let src = root.join("src");
    fs::create_dir_all(&src).unwrap();
    fs::write(
        root.join(".stylestagerc"),
        "{\n  // project defaults\n  plugins: ['strip-comments', 'flag-important'],\n}\n",
    )
    .unwrap();

    let host = RecordingHost::new(src.join("a.css"));
    let output = stage(root, StageOptions::default())
        .run(TransformRequest::new(CSS), &host)
        .await
        .unwrap();

    assert_eq!(output.css, "\na { color: red !important }");
    let events = host.events();
    assert_eq!(events[0], HostEvent::Dependency(root.join(".stylestagerc")));
    assert_eq!(host.warnings().len(), 1);
}

#[tokio::test]
async fn test_explicit_plugins_override_discovered() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path();
    fs::write(
        root.join("package.json"),
        r#"{
            "name": "app",
            "stylestage": {
                "plugins": { "strip-comments": true, "flag-important": true },
                "map": { "annotation": true }
            }
        }"#,
    )
    .unwrap();

    let options = StageOptions {
        plugins: PluginList::new(vec![PluginRef::disabled("flag-important")]),
        source_map: Some(true),
        ..Default::default()
    };
    let host = RecordingHost::new(root.join("a.css"));

    let output = stage(root, options)
        .run(TransformRequest::new(CSS), &host)
        .await
        .unwrap();

    assert!(host.warnings().is_empty());
    assert!(output.css.starts_with("\na { color: red !important }"));
    assert!(output.css.ends_with("/*# sourceMappingURL=a.css.map */"));
    assert!(output.map.is_some());
}

#[tokio::test]
async fn test_explicit_option_wins_on_conflicting_key() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path();
    fs::write(
        root.join("stylestage.config.toml"),
        "plugins = []\n\n[map]\nannotation = true\n",
    )
    .unwrap();

    let mut options = StageOptions {
        source_map: Some(true),
        ..Default::default()
    };
    options
        .options
        .insert("map".to_string(), json!({ "annotation": false }));
    let host = RecordingHost::new(root.join("a.css"));

    let output = stage(root, options)
        .run(TransformRequest::new("a {}"), &host)
        .await
        .unwrap();

    assert_eq!(output.css, "a {}");
}

#[tokio::test]
async fn test_missing_explicit_config_is_config_error() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path();
    let options = StageOptions {
        config: ConfigDiscovery::Path(PathBuf::from("config/missing.json")),
        ..Default::default()
    };
    let host = RecordingHost::new(root.join("a.css")).with_working_dir(root);

    let err = stage(root, options)
        .run(TransformRequest::new("a {}"), &host)
        .await
        .unwrap_err();

    assert!(matches!(err, StageError::Config(_)));
    assert_eq!(err.status_code(), "CONFIG_NOT_FOUND");
    assert!(host.events().is_empty());
}

#[tokio::test]
async fn test_malformed_config_is_config_error() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path();
    fs::write(root.join(".stylestagerc.json"), "{ \"plugins\": [").unwrap();
    let host = RecordingHost::new(root.join("a.css"));

    let err = stage(root, StageOptions::default())
        .run(TransformRequest::new("a {}"), &host)
        .await
        .unwrap_err();

    assert_eq!(err.status_code(), "CONFIG_MALFORMED");
}

#[tokio::test]
async fn test_explicit_directory_searches_upward() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path();
    let config_dir = root.join("config/nested");
    fs::create_dir_all(&config_dir).unwrap();
    fs::write(root.join("config/.stylestagerc.toml"), "plugins = [\"strip-comments\"]\n").unwrap();

    let options = StageOptions {
        config: ConfigDiscovery::Path(config_dir),
        ..Default::default()
    };
    let host = RecordingHost::new(root.join("app/a.css"));

    let output = stage(root, options)
        .run(TransformRequest::new("a {} /* x */"), &host)
        .await
        .unwrap();

    assert_eq!(output.css, "a {} ");
    assert_eq!(host.dependencies(), vec![root.join("config/.stylestagerc.toml")]);
}
