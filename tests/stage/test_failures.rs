//! Failure classification and the environment advisory

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use stylestage::{
    AdvisoryState, BasicEngine, ConfigDiscovery, CssSyntaxError, EngineError, HostEvent,
    RecordingHost, StageError, StageOptions, StageWarning, TransformFailure, TransformRequest,
    TransformStage,
};
use tempfile::TempDir;

use crate::support::FakeEngine;

fn options() -> StageOptions {
    StageOptions {
        config: ConfigDiscovery::Disabled,
        ..Default::default()
    }
}

fn advisory_count(host: &RecordingHost) -> usize {
    host.warnings()
        .iter()
        .filter(|warning| matches!(warning, StageWarning::Advisory(_)))
        .count()
}

#[tokio::test]
async fn test_syntax_error_registers_dependency_and_fails() {
    let engine = FakeEngine::throwing("8.4.2", || {
        CssSyntaxError::new("Unknown word", 1, 1)
            .with_file("/a.css")
            .into()
    });
    let stage = TransformStage::new(options(), Arc::new(engine))
        .with_advisory_state(Arc::new(AdvisoryState::new()));
    let host = RecordingHost::new("/project/src/b.css");

    let err = stage
        .run(TransformRequest::new("a"), &host)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        StageError::Transform(TransformFailure::Syntax(_))
    ));
    assert_eq!(err.status_code(), "CSS_SYNTAX_ERROR");
    assert_eq!(host.events(), vec![HostEvent::Dependency(PathBuf::from("/a.css"))]);
}

#[tokio::test]
async fn test_boxed_syntax_error_keeps_its_shape() {
    let engine = FakeEngine::throwing("8.4.2", || {
        let thrown: Box<dyn std::error::Error + Send + Sync> =
            Box::new(CssSyntaxError::new("Unknown word", 1, 1).with_file("/a.css"));
        EngineError::from(thrown)
    });
    let stage = TransformStage::new(options(), Arc::new(engine))
        .with_advisory_state(Arc::new(AdvisoryState::new()));
    let host = RecordingHost::new("/project/src/b.css");

    let err = stage
        .run(TransformRequest::new("a"), &host)
        .await
        .unwrap_err();

    assert_eq!(err.status_code(), "CSS_SYNTAX_ERROR");
    assert_eq!(host.events(), vec![HostEvent::Dependency(PathBuf::from("/a.css"))]);
}

#[tokio::test]
async fn test_builtin_syntax_report() {
    let stage = TransformStage::new(options(), Arc::new(BasicEngine::new()))
        .with_advisory_state(Arc::new(AdvisoryState::new()));
    let host = RecordingHost::new("/project/src/b.css");

    let err = stage
        .run(TransformRequest::new("a {\n  color: red;\n"), &host)
        .await
        .unwrap_err();

    assert_eq!(
        err.to_string(),
        "CssSyntaxError\n\n(1:3) /project/src/b.css\nUnclosed block\n\n> 1 | a {\n    |   ^"
    );
    assert_eq!(host.dependencies(), vec![PathBuf::from("/project/src/b.css")]);
}

#[tokio::test]
async fn test_generic_failure_passes_through() {
    let engine = FakeEngine::throwing("8.4.2", || {
        EngineError::plugin("autoprefixer", "Unknown browser query")
    });
    let stage = TransformStage::new(options(), Arc::new(engine))
        .with_advisory_state(Arc::new(AdvisoryState::new()));
    let host = RecordingHost::new("/project/src/b.css");

    let err = stage
        .run(TransformRequest::new("a {}"), &host)
        .await
        .unwrap_err();

    assert_eq!(err.status_code(), "TRANSFORM_FAILED");
    assert_eq!(err.to_string(), "[autoprefixer] Unknown browser query");
    assert!(host.events().is_empty());
}

#[tokio::test]
async fn test_advisory_fires_at_most_once() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path();
    fs::write(root.join("package.json"), r#"{ "name": "app" }"#).unwrap();

    let state = Arc::new(AdvisoryState::new());
    let stage = TransformStage::new(
        options(),
        Arc::new(BasicEngine::new().with_version("7.0.39")),
    )
    .with_advisory_state(Arc::clone(&state));

    let mut total = 0;
    for _ in 0..5 {
        let host = RecordingHost::new(root.join("a.css")).with_working_dir(root);
        let err = stage.run(TransformRequest::new("a {"), &host).await.unwrap_err();
        // The advisory never replaces the fatal outcome
        assert_eq!(err.status_code(), "CSS_SYNTAX_ERROR");
        total += advisory_count(&host);
    }

    assert_eq!(total, 1);
    assert!(state.is_settled());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_advisory_once_under_concurrency() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path().to_path_buf();
    fs::write(root.join("package.json"), r#"{ "dependencies": {} }"#).unwrap();

    let stage = Arc::new(
        TransformStage::new(
            options(),
            Arc::new(BasicEngine::new().with_version("7.0.39")),
        )
        .with_advisory_state(Arc::new(AdvisoryState::new())),
    );

    let handles: Vec<_> = (0..16)
        .map(|i| {
            let stage = Arc::clone(&stage);
            let root = root.clone();
            tokio::spawn(async move {
                let host =
                    RecordingHost::new(root.join(format!("{i}.css"))).with_working_dir(&root);
                let _ = stage.run(TransformRequest::new("}"), &host).await;
                advisory_count(&host)
            })
        })
        .collect();

    let mut total = 0;
    for handle in handles {
        total += handle.await.unwrap();
    }
    assert_eq!(total, 1);
}

#[tokio::test]
async fn test_declared_dependency_silences_advisory() {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path();
    fs::write(
        root.join("package.json"),
        r#"{ "devDependencies": { "stylestage": "^7.0.0" } }"#,
    )
    .unwrap();
    let nested = root.join("packages/ui");
    fs::create_dir_all(&nested).unwrap();

    let state = Arc::new(AdvisoryState::new());
    let stage = TransformStage::new(
        options(),
        Arc::new(BasicEngine::new().with_version("7.0.39")),
    )
    .with_advisory_state(Arc::clone(&state));
    let host = RecordingHost::new(nested.join("a.css")).with_working_dir(&nested);

    stage
        .run(TransformRequest::new("a {"), &host)
        .await
        .unwrap_err();

    assert_eq!(advisory_count(&host), 0);
    assert!(state.is_settled());
}

#[tokio::test]
async fn test_missing_manifest_never_fails_build() {
    let temp_dir = TempDir::new().unwrap();
    let state = Arc::new(AdvisoryState::new());
    let mut options = options();
    options.advisory.manifest_file = "no-such-manifest.json".to_string();
    let stage = TransformStage::new(
        options,
        Arc::new(BasicEngine::new().with_version("7.0.39")),
    )
    .with_advisory_state(Arc::clone(&state));
    let host = RecordingHost::new(temp_dir.path().join("a.css")).with_working_dir(temp_dir.path());

    let err = stage
        .run(TransformRequest::new("a {"), &host)
        .await
        .unwrap_err();

    assert_eq!(err.status_code(), "CSS_SYNTAX_ERROR");
    assert_eq!(advisory_count(&host), 0);
    assert!(!state.is_settled());
}
