//! End-to-end studio tests against mock backends.

#![cfg(all(feature = "gemini", feature = "huggingface", feature = "gradio"))]

use std::time::Duration;

use genstudio::config::{StudioConfig, FLUX, GEMINI, HUGGINGFACE, ZEROSCOPE};
use genstudio::content::{self, ArticleDraft, EditMode};
use genstudio::error::GenError;
use genstudio::provider::ImageBackend;
use genstudio::types::{Backend, GenerationRequest};
use genstudio::util::retry::BackoffPolicy;
use genstudio::{Studio, StudioOptions};
use pretty_assertions::assert_eq;
use serde_json::json;
use wiremock::matchers::{method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn options(backends: Vec<Backend>, image_backend: ImageBackend) -> StudioOptions {
    StudioOptions {
        backends,
        image_backend,
        timeout: Duration::from_secs(10),
        retry_policy: BackoffPolicy {
            max_attempts: 2,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(1),
            multiplier: 1.0,
        },
    }
}

async fn mount_space(server: &MockServer, endpoint: &str, output: serde_json::Value) {
    Mock::given(method("POST"))
        .and(path(format!("/gradio_api/call/{endpoint}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"event_id": "ev"})))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/gradio_api/call/{endpoint}/ev")))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/event-stream")
                .set_body_string(format!("event: complete\ndata: {output}\n\n")),
        )
        .mount(server)
        .await;
}

#[test]
fn article_backend_without_key_fails_at_construction() {
    let err = Studio::from_config(
        &StudioConfig::new(),
        options(vec![Backend::Article], ImageBackend::Flux),
    )
    .unwrap_err();

    match err {
        GenError::Configuration(message) => assert!(message.contains("GEMINI_API_KEY")),
        other => panic!("expected configuration error, got {other:?}"),
    }
}

#[test]
fn huggingface_image_backend_requires_token() {
    let err = Studio::from_config(
        &StudioConfig::new(),
        options(vec![Backend::Image], ImageBackend::HuggingFace),
    )
    .unwrap_err();
    assert!(matches!(err, GenError::Configuration(_)));
}

#[tokio::test]
async fn article_round_trips_through_the_editor() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path_regex(r"^/models/.+:generateContent$"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [{
                "content": {"parts": [{"text": "<h1><strong>Tide Pools</strong></h1><p>Life between tides.</p><p>Look closely.</p>"}]}
            }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let config = StudioConfig::new();
    config.set_api_key(GEMINI, "test-key".to_string());
    config.set_base_url(GEMINI, server.uri());

    let studio =
        Studio::from_config(&config, options(vec![Backend::Article], ImageBackend::Flux)).unwrap();
    let result = studio
        .submit(&GenerationRequest::article("tide pools"))
        .await
        .unwrap();

    let mut draft = ArticleDraft::from_result(&result).expect("article result");
    draft.switch_mode(EditMode::EditText);
    assert_eq!(
        draft.editing(),
        "Tide Pools\n\nLife between tides.\n\nLook closely."
    );

    draft
        .set_editing("Tide Pools\n\nLife between tides.\n\nBring boots.")
        .unwrap();
    draft.switch_mode(EditMode::View);

    assert_eq!(draft.mode(), EditMode::View);
    assert_eq!(
        draft.html(),
        content::to_html("Tide Pools\n\nLife between tides.\n\nBring boots.")
    );
}

#[tokio::test]
async fn image_and_video_are_served_by_spaces() {
    let flux = MockServer::start().await;
    mount_space(&flux, "generate_image", json!([{"url": "https://flux.example/a.webp"}, 42])).await;
    let zeroscope = MockServer::start().await;
    mount_space(&zeroscope, "run", json!([{"video": {"url": "https://zs.example/a.mp4"}}])).await;

    let config = StudioConfig::new();
    config.set_base_url(FLUX, flux.uri());
    config.set_base_url(ZEROSCOPE, zeroscope.uri());

    let studio = Studio::from_config(
        &config,
        options(vec![Backend::Image, Backend::Video], ImageBackend::Flux),
    )
    .unwrap();

    let image = studio
        .submit(&GenerationRequest::image("a heron"))
        .await
        .unwrap();
    assert_eq!(image.url(), Some("https://flux.example/a.webp"));

    let video = studio
        .submit(&GenerationRequest::video("a heron taking off").with_parameter("advanced", true))
        .await
        .unwrap();
    assert_eq!(video.backend(), Backend::Video);
    assert_eq!(video.url(), Some("https://zs.example/a.mp4"));
}

#[tokio::test]
async fn concurrent_submission_is_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/gradio_api/call/generate_image"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"event_id": "slow"}))
                .set_delay(Duration::from_millis(200)),
        )
        .expect(2)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/gradio_api/call/generate_image/slow"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/event-stream")
                .set_body_string("event: complete\ndata: [\"https://flux.example/slow.png\"]\n\n"),
        )
        .mount(&server)
        .await;

    let config = StudioConfig::new();
    config.set_base_url(FLUX, server.uri());
    let studio =
        Studio::from_config(&config, options(vec![Backend::Image], ImageBackend::Flux)).unwrap();

    let first_request = GenerationRequest::image("first");
    let second_request = GenerationRequest::image("second");
    let (first, second) = tokio::join!(
        studio.submit(&first_request),
        studio.submit(&second_request)
    );

    assert_eq!(first.unwrap().url(), Some("https://flux.example/slow.png"));
    match second {
        Err(GenError::InvalidState(message)) => {
            assert_eq!(message, "a generation request is already in flight")
        }
        other => panic!("expected in-flight rejection, got {other:?}"),
    }

    let third = studio.submit(&GenerationRequest::image("third")).await;
    assert!(third.is_ok(), "gate should be released: {third:?}");
}

#[tokio::test]
async fn blank_prompt_never_reaches_the_network() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let config = StudioConfig::new();
    config.set_api_key(HUGGINGFACE, "hf_test".to_string());
    config.set_base_url(HUGGINGFACE, server.uri());
    let studio = Studio::from_config(
        &config,
        options(vec![Backend::Image], ImageBackend::HuggingFace),
    )
    .unwrap();

    match studio.submit(&GenerationRequest::image("   ")).await {
        Err(GenError::InvalidArgument(message)) => {
            assert_eq!(message, "Please enter a prompt to generate an image.")
        }
        other => panic!("expected invalid argument, got {other:?}"),
    }
}
