use brief_core::{ErrorKind, HardwareConfig, PipelineConfig, Request};
use brief_inference::models::ExtractiveFactory;
use brief_inference::{Pipeline, PipelineState};
use serde_json::json;
use std::path::Path;

fn config_in(dir: &Path) -> PipelineConfig {
    PipelineConfig::default()
        .with_hardware(HardwareConfig::new(vec![12, 12], 0.15, dir.join("exe_cache")).unwrap())
}

async fn pipeline_in(dir: &Path) -> Pipeline {
    Pipeline::new(&ExtractiveFactory::default(), config_in(dir))
        .await
        .unwrap()
}

#[tokio::test]
async fn test_response_has_exactly_the_summary_key() {
    let dir = tempfile::tempdir().unwrap();
    let mut pipeline = pipeline_in(dir.path()).await;

    let response = pipeline
        .call(&Request::from(json!({"documents": "Rain is expected. Bring an umbrella."})))
        .await
        .unwrap();
    let value = response.to_value().unwrap();
    let keys: Vec<&String> = value.as_object().unwrap().keys().collect();
    assert_eq!(keys, vec!["summary"]);
    assert_eq!(value["summary"][0]["summary_text"], "Rain is expected. Bring an umbrella.");
}

#[tokio::test]
async fn test_placeholder_call_succeeds_after_construction() {
    let dir = tempfile::tempdir().unwrap();
    let mut pipeline = pipeline_in(dir.path()).await;
    assert_eq!(pipeline.state(), PipelineState::Uncompiled);

    pipeline
        .call(&Request::from(json!({"documents": "Just compile"})))
        .await
        .unwrap();
    assert_eq!(pipeline.state(), PipelineState::Warmed);
}

#[tokio::test]
async fn test_bad_requests_are_invalid_input() {
    let dir = tempfile::tempdir().unwrap();
    let mut pipeline = pipeline_in(dir.path()).await;

    for request in [json!({}), json!({"documents": 123}), json!({"documents": null}), json!("text")] {
        let err = pipeline.call(&Request::from(request)).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }
}

#[tokio::test]
async fn test_repeated_warm_up_keeps_the_contract() {
    let dir = tempfile::tempdir().unwrap();
    let mut pipeline = pipeline_in(dir.path()).await;
    let request = Request::new("The bridge reopened today. Traffic is flowing again.");

    pipeline.warm_up().await.unwrap();
    let first = pipeline.call(&request).await.unwrap();
    pipeline.warm_up().await.unwrap();
    let second = pipeline.call(&request).await.unwrap();

    assert_eq!(first, second);
    assert!(pipeline.is_warmed());
}

#[tokio::test]
async fn test_long_documents_are_truncated() {
    let dir = tempfile::tempdir().unwrap();
    let mut pipeline = pipeline_in(dir.path()).await;

    let document = (0..2_000).map(|i| format!("w{}", i)).collect::<Vec<_>>().join(" ");
    let response = pipeline.call(&Request::new(document)).await.unwrap();

    let words: Vec<&str> = response.summary[0].summary_text.split_whitespace().collect();
    assert_eq!(words.len(), 100);
    assert_eq!(words[0], "w0");
}

#[tokio::test]
async fn test_unresolvable_model_fails_construction() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(dir.path()).with_model("nobody/no-such-model");

    let result = Pipeline::new(&ExtractiveFactory::default(), config).await;
    let err = result.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);
}

#[tokio::test]
async fn test_unpartitionable_layout_fails_construction() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_in(dir.path())
        .with_hardware(HardwareConfig::new(vec![8, 8], 0.15, dir.path().join("exe_cache")).unwrap());

    let err = Pipeline::new(&ExtractiveFactory::default(), config).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);
}

#[tokio::test]
async fn test_other_checkpoints_with_matching_layout() {
    let dir = tempfile::tempdir().unwrap();
    let config = PipelineConfig::default()
        .with_model("sshleifer/distilbart-cnn-12-6")
        .with_hardware(HardwareConfig::new(vec![10, 8], 0.2, dir.path().join("exe_cache")).unwrap());

    let mut pipeline = Pipeline::new(&ExtractiveFactory::default(), config).await.unwrap();
    assert_eq!(pipeline.model_name(), "sshleifer/distilbart-cnn-12-6");
    pipeline.warm_up().await.unwrap();
}
