//! Syntax tree hand-off between chained stages

use std::sync::Arc;
use stylestage::{
    AdvisoryState, BasicEngine, ConfigDiscovery, PluginList, PluginRef, RecordingHost,
    StageMeta, StageOptions, TransformRequest, TransformStage,
};

use crate::support::{FakeEngine, InputKind};

fn options() -> StageOptions {
    StageOptions {
        config: ConfigDiscovery::Disabled,
        ..Default::default()
    }
}

async fn produce_meta(version: &str, css: &str) -> StageMeta {
    let stage = TransformStage::new(options(), Arc::new(FakeEngine::new(version)))
        .with_advisory_state(Arc::new(AdvisoryState::new()));
    let host = RecordingHost::new("/project/a.css");
    stage
        .run(TransformRequest::new(css), &host)
        .await
        .unwrap()
        .meta
}

async fn consume(engine: &FakeEngine, options: StageOptions, meta: StageMeta) -> String {
    let stage = TransformStage::new(options, Arc::new(engine.clone()))
        .with_advisory_state(Arc::new(AdvisoryState::new()));
    let host = RecordingHost::new("/project/a.css");
    stage
        .run(TransformRequest::new("raw text").with_meta(meta), &host)
        .await
        .unwrap()
        .css
}

#[tokio::test]
async fn test_same_major_tree_is_reused() {
    let meta = produce_meta("8.1.0", "from tree").await;
    assert_eq!(meta.ast.as_ref().unwrap().version, "8.1.0");

    let engine = FakeEngine::new("8.4.2");
    let css = consume(&engine, options(), meta).await;

    assert_eq!(engine.inputs(), vec![InputKind::Tree]);
    assert_eq!(css, "from tree");
}

#[tokio::test]
async fn test_cross_major_tree_is_reparsed() {
    let meta = produce_meta("7.9.9", "from tree").await;

    let engine = FakeEngine::new("8.0.0");
    let css = consume(&engine, options(), meta).await;

    assert_eq!(engine.inputs(), vec![InputKind::Text]);
    assert_eq!(css, "raw text");
}

#[tokio::test]
async fn test_reuse_can_be_disabled() {
    let meta = produce_meta("8.1.0", "from tree").await;
    let engine = FakeEngine::new("8.1.0");
    let css = consume(
        &engine,
        StageOptions {
            reuse_tree: false,
            ..options()
        },
        meta,
    )
    .await;

    assert_eq!(engine.inputs(), vec![InputKind::Text]);
    assert_eq!(css, "raw text");
}

#[tokio::test]
async fn test_builtin_engine_chain_skips_reparse() {
    let first = TransformStage::new(
        StageOptions {
            plugins: PluginList::new(vec![PluginRef::new("strip-comments")]),
            ..options()
        },
        Arc::new(BasicEngine::new()),
    )
    .with_advisory_state(Arc::new(AdvisoryState::new()));
    let second = TransformStage::new(options(), Arc::new(BasicEngine::new()))
        .with_advisory_state(Arc::new(AdvisoryState::new()));
    let host = RecordingHost::new("/project/a.css");

    let source = "a { /* note */ color: red }";
    let stripped = first
        .run(TransformRequest::new(source), &host)
        .await
        .unwrap();
    assert_eq!(stripped.css, "a {  color: red }");

    // The second stage receives the untouched text but works on the tree
    let output = second
        .run(
            TransformRequest::new(source).with_meta(stripped.meta),
            &host,
        )
        .await
        .unwrap();
    assert_eq!(output.css, "a {  color: red }");
}
