//! Source map policy and coordinate-space reconciliation

use serde_json::{Value, json};
use std::sync::Arc;
use stylestage::{
    AdvisoryState, BasicEngine, ConfigDiscovery, RecordingHost, SourceMap, StageOptions,
    TransformRequest, TransformStage,
};

use crate::support::FakeEngine;

fn options(source_map: Option<bool>) -> StageOptions {
    StageOptions {
        config: ConfigDiscovery::Disabled,
        source_map,
        ..Default::default()
    }
}

fn stage(options: StageOptions, engine: FakeEngine) -> TransformStage {
    TransformStage::new(options, Arc::new(engine))
        .with_advisory_state(Arc::new(AdvisoryState::new()))
}

#[tokio::test]
async fn test_inbound_map_from_other_base_ends_relative_to_context() {
    let inbound = SourceMap::from_json(
        r#"{
            "version": 3,
            "file": "button.css",
            "sourceRoot": "/workspace/styles",
            "sources": ["button.scss", "/workspace/shared/_vars.scss", "webpack://app/x.scss"],
            "mappings": "AAAA"
        }"#,
    )
    .unwrap();
    let host = RecordingHost::new("/workspace/src/button.css");

    let output = stage(options(Some(true)), FakeEngine::new("8.4.2"))
        .run(
            TransformRequest::new("a {}").with_source_map(inbound),
            &host,
        )
        .await
        .unwrap();

    let map = output.map.unwrap();
    assert_eq!(
        map.sources,
        vec![
            "../styles/button.scss",
            "../shared/_vars.scss",
            "webpack://app/x.scss"
        ]
    );
    assert!(map.file.is_none());

    // Well-formed JSON with the host-facing shape
    let json: Value = serde_json::from_str(&map.to_json().unwrap()).unwrap();
    assert_eq!(json["version"], json!(3));
    assert_eq!(json["sourceRoot"], json!(""));
    assert!(json.get("file").is_none());
}

#[tokio::test]
async fn test_custom_context_directory() {
    let host = RecordingHost::new("/workspace/src/deep/button.css").with_context("/workspace");

    let output = stage(options(Some(true)), FakeEngine::new("8.4.2"))
        .run(TransformRequest::new("a {}"), &host)
        .await
        .unwrap();

    assert_eq!(output.map.unwrap().sources, vec!["src/deep/button.css"]);
}

#[tokio::test]
async fn test_inbound_map_ignored_when_maps_disabled() {
    let inbound = SourceMap::new(vec!["/elsewhere/a.scss".to_string()], "AAAA");
    let host = RecordingHost::new("/workspace/src/a.css").with_source_map(true);

    let output = stage(options(Some(false)), FakeEngine::new("8.4.2"))
        .run(TransformRequest::new("a {}").with_source_map(inbound), &host)
        .await
        .unwrap();

    assert!(output.map.is_none());
}

#[tokio::test]
async fn test_builtin_engine_map_and_annotation() {
    let mut options = options(Some(true));
    options.options.insert(
        "map".to_string(),
        json!({ "annotation": true, "sourcesContent": true }),
    );
    options
        .options
        .insert("to".to_string(), json!("/workspace/dist/site.css"));
    let host = RecordingHost::new("/workspace/src/site.css");

    let output = TransformStage::new(options, Arc::new(BasicEngine::new()))
        .with_advisory_state(Arc::new(AdvisoryState::new()))
        .run(TransformRequest::new("a {}\nb {}"), &host)
        .await
        .unwrap();

    assert!(
        output
            .css
            .ends_with("\n/*# sourceMappingURL=site.css.map */")
    );
    let map = output.map.unwrap();
    assert_eq!(map.sources, vec!["site.css"]);
    assert_eq!(map.mappings, "AAAA;AACA");
    assert_eq!(
        map.sources_content,
        Some(vec![Some("a {}\nb {}".to_string())])
    );
}
