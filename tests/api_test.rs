//! HTTP-level tests for the service endpoints.
//!
//! Everything here runs without ffmpeg installed: the cases cover the parts
//! of the surface that reject or answer before any tool is spawned
//! (validation, artifact access, lifecycle).

mod common;

use clipforge::config::Config;
use common::TestHarness;
use serde_json::json;
use std::time::Duration;

#[tokio::test]
async fn health_reports_service() {
    let (_harness, addr) = TestHarness::with_server().await;

    let body: serde_json::Value = reqwest::get(format!("http://{addr}/health"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(body["status"], "healthy");
    assert_eq!(body["service"], "clipforge");
}

#[tokio::test]
async fn info_lists_endpoints() {
    let (_harness, addr) = TestHarness::with_server().await;

    let body: serde_json::Value = reqwest::get(format!("http://{addr}/info"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    let endpoints = body["endpoints"].as_array().unwrap();
    assert!(endpoints.iter().any(|e| e == "POST /full-pipeline"));
    assert!(endpoints.iter().any(|e| e == "POST /normalize-audio"));
    assert!(body["renderer_url"].as_str().is_some());
}

#[tokio::test]
async fn download_existing_artifact() {
    let (harness, addr) = TestHarness::with_server().await;

    let job = harness.ctx.store.create_job(Some("dl-test")).unwrap();
    harness
        .ctx
        .store
        .write(&job, "final.mp4", b"fake video bytes")
        .unwrap();

    let response = reqwest::get(format!("http://{addr}/download/dl-test/final.mp4"))
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    assert_eq!(
        response.headers()["content-type"].to_str().unwrap(),
        "video/mp4"
    );
    assert_eq!(response.bytes().await.unwrap().as_ref(), b"fake video bytes");
}

#[tokio::test]
async fn download_missing_artifact_is_404() {
    let (_harness, addr) = TestHarness::with_server().await;

    let response = reqwest::get(format!("http://{addr}/download/nonexistent/out.mp4"))
        .await
        .unwrap();
    assert_eq!(response.status(), 404);

    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["code"], "not_found");
}

#[tokio::test]
async fn download_rejects_malformed_job_id() {
    let (_harness, addr) = TestHarness::with_server().await;

    // Dots are not valid in job ids, so this never reaches the filesystem.
    let response = reqwest::get(format!("http://{addr}/download/bad.id/out.mp4"))
        .await
        .unwrap();
    assert_eq!(response.status(), 400);

    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["code"], "invalid_job_id");
}

#[tokio::test]
async fn list_artifacts_returns_sorted_files() {
    let (harness, addr) = TestHarness::with_server().await;

    let job = harness.ctx.store.create_job(Some("listing")).unwrap();
    harness.ctx.store.write(&job, "a.mp4", b"a").unwrap();
    harness.ctx.store.write(&job, "b.srt", b"b").unwrap();

    let body: serde_json::Value = reqwest::get(format!("http://{addr}/jobs/listing/artifacts"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    let files = body.as_array().unwrap();
    assert_eq!(files.len(), 2);
    assert!(files.iter().any(|f| f["filename"] == "a.mp4"));
}

#[tokio::test]
async fn list_artifacts_of_missing_job_is_404() {
    let (_harness, addr) = TestHarness::with_server().await;

    let response = reqwest::get(format!("http://{addr}/jobs/ghost/artifacts"))
        .await
        .unwrap();
    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn cleanup_is_idempotent() {
    let (harness, addr) = TestHarness::with_server().await;

    let job = harness.ctx.store.create_job(Some("doomed")).unwrap();
    harness.ctx.store.write(&job, "x.mp4", b"x").unwrap();

    let client = reqwest::Client::new();
    let first = client
        .delete(format!("http://{addr}/cleanup/doomed"))
        .send()
        .await
        .unwrap();
    assert_eq!(first.status(), 200);

    // Deleting again is still a success, not a 404.
    let second = client
        .delete(format!("http://{addr}/cleanup/doomed"))
        .send()
        .await
        .unwrap();
    assert_eq!(second.status(), 200);
}

#[tokio::test]
async fn cleanup_all_reports_count() {
    let (harness, addr) = TestHarness::with_server().await;

    for id in ["one", "two"] {
        let job = harness.ctx.store.create_job(Some(id)).unwrap();
        harness.ctx.store.write(&job, "f.mp4", b"x").unwrap();
    }

    let client = reqwest::Client::new();
    let body: serde_json::Value = client
        .delete(format!("http://{addr}/cleanup-all"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(body["deleted_jobs"], 2);
}

#[tokio::test]
async fn merge_without_source_is_rejected() {
    let (_harness, addr) = TestHarness::with_server().await;

    let response = reqwest::Client::new()
        .post(format!("http://{addr}/merge"))
        .json(&json!({ "audio_base64": "AAAA" }))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 400);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["code"], "invalid_parameter");
}

#[tokio::test]
async fn merge_rejects_negative_volume() {
    let (_harness, addr) = TestHarness::with_server().await;

    // Parameter validation fires before any input is fetched or ffmpeg runs.
    let response = reqwest::Client::new()
        .post(format!("http://{addr}/merge"))
        .json(&json!({
            "video_url": "http://example.invalid/v.mp4",
            "audio_base64": "AAAA",
            "volume": -1.0,
        }))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 400);
}

#[tokio::test]
async fn concat_requires_two_videos() {
    let (_harness, addr) = TestHarness::with_server().await;

    let response = reqwest::Client::new()
        .post(format!("http://{addr}/concat"))
        .json(&json!({ "video_urls": ["http://example.invalid/a.mp4"] }))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 400);
}

#[tokio::test]
async fn trim_requires_end_or_duration() {
    let (_harness, addr) = TestHarness::with_server().await;

    let response = reqwest::Client::new()
        .post(format!("http://{addr}/trim"))
        .json(&json!({ "video_url": "http://example.invalid/v.mp4", "start": 5.0 }))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 400);
}

#[tokio::test]
async fn trim_rejects_inverted_range() {
    let (_harness, addr) = TestHarness::with_server().await;

    let response = reqwest::Client::new()
        .post(format!("http://{addr}/trim"))
        .json(&json!({
            "video_url": "http://example.invalid/v.mp4",
            "start": 30.0,
            "end": 10.0,
        }))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 400);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["code"], "invalid_range");
}

#[tokio::test]
async fn subtitles_require_text_or_url() {
    let (_harness, addr) = TestHarness::with_server().await;

    let response = reqwest::Client::new()
        .post(format!("http://{addr}/add-subtitles"))
        .json(&json!({ "video_url": "http://example.invalid/v.mp4" }))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 400);
}

#[tokio::test]
async fn resize_rejects_odd_dimensions() {
    let (_harness, addr) = TestHarness::with_server().await;

    let response = reqwest::Client::new()
        .post(format!("http://{addr}/resize"))
        .json(&json!({
            "video_url": "http://example.invalid/v.mp4",
            "width": 641,
            "height": 480,
        }))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 400);
}

#[tokio::test]
async fn normalize_rejects_out_of_range_target() {
    let (_harness, addr) = TestHarness::with_server().await;

    let response = reqwest::Client::new()
        .post(format!("http://{addr}/normalize-audio"))
        .json(&json!({
            "video_url": "http://example.invalid/v.mp4",
            "target_level": -80.0,
        }))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 400);
}

#[tokio::test]
async fn pipeline_failure_reports_failing_step() {
    let (_harness, addr) = TestHarness::with_server().await;

    let mock_server = wiremock::MockServer::start().await;
    wiremock::Mock::given(wiremock::matchers::method("GET"))
        .respond_with(wiremock::ResponseTemplate::new(500))
        .mount(&mock_server)
        .await;

    let response = reqwest::Client::new()
        .post(format!("http://{addr}/full-pipeline"))
        .json(&json!({ "video_url": format!("{}/video.mp4", mock_server.uri()) }))
        .send()
        .await
        .unwrap();

    // The source fetch fails, so the run dies at the first step.
    assert_eq!(response.status(), 502);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["status"]["state"], "failed");
    assert_eq!(body["status"]["step"], "fetch");
    assert_eq!(body["code"], "fetch_failed");
    assert_eq!(body["artifacts"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn pipeline_midstep_failure_keeps_earlier_artifacts() {
    let (_harness, addr) = TestHarness::with_server().await;

    // The fetch succeeds but the bytes are not a playable video, so the
    // merge step fails and the run stops there.
    let mock_server = wiremock::MockServer::start().await;
    wiremock::Mock::given(wiremock::matchers::method("GET"))
        .respond_with(
            wiremock::ResponseTemplate::new(200).set_body_bytes(b"not a video".to_vec()),
        )
        .mount(&mock_server)
        .await;

    let response = reqwest::Client::new()
        .post(format!("http://{addr}/full-pipeline"))
        .json(&json!({
            "video_url": format!("{}/video.mp4", mock_server.uri()),
            "audio_base64": "AAAA",
        }))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 500);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["status"]["state"], "failed");
    assert_eq!(body["status"]["step"], "merge_audio");
    assert_eq!(body["code"], "execution_failed");
    // The fetched source survives for inspection.
    let artifacts = body["artifacts"].as_array().unwrap();
    assert!(artifacts.iter().any(|a| a == "01_source.mp4"));
}

#[tokio::test]
async fn pipeline_timeout_names_in_flight_step() {
    let mut config = Config::default();
    config.ffmpeg.pipeline_timeout_secs = 1;
    let (_harness, addr) = TestHarness::with_server_config(config).await;

    // The source fetch outlives the whole pipeline budget.
    let mock_server = wiremock::MockServer::start().await;
    wiremock::Mock::given(wiremock::matchers::method("GET"))
        .respond_with(
            wiremock::ResponseTemplate::new(200)
                .set_body_bytes(b"slow".to_vec())
                .set_delay(Duration::from_secs(10)),
        )
        .mount(&mock_server)
        .await;

    let response = reqwest::Client::new()
        .post(format!("http://{addr}/full-pipeline"))
        .json(&json!({ "video_url": format!("{}/video.mp4", mock_server.uri()) }))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 504);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["status"]["state"], "failed");
    // The step that was actually running, not a placeholder.
    assert_eq!(body["status"]["step"], "fetch");
    assert_eq!(body["code"], "timeout");
    assert_eq!(body["artifacts"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn rejected_request_creates_no_job() {
    let (harness, addr) = TestHarness::with_server().await;

    let response = reqwest::Client::new()
        .post(format!("http://{addr}/merge"))
        .json(&json!({
            "job_id": "vacant",
            "video_url": "http://example.invalid/v.mp4",
            "audio_base64": "AAAA",
            "volume": -1.0,
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);

    // The named job was never materialized on disk.
    let job = clipforge::store::JobId::parse("vacant").unwrap();
    assert!(!harness.ctx.store.job_exists(&job));

    let listing = reqwest::get(format!("http://{addr}/jobs/vacant/artifacts"))
        .await
        .unwrap();
    assert_eq!(listing.status(), 404);
}

#[tokio::test]
async fn probe_of_missing_artifact_is_404() {
    let (harness, addr) = TestHarness::with_server().await;

    let job = harness.ctx.store.create_job(Some("probe-src")).unwrap();
    harness.ctx.store.write(&job, "real.mp4", b"x").unwrap();

    // Local sources are probed in place, so a bad filename is a clean 404
    // rather than a fetch attempt.
    let response = reqwest::Client::new()
        .post(format!("http://{addr}/probe"))
        .json(&json!({
            "video_job_id": "probe-src",
            "video_filename": "nope.mp4",
        }))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 404);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["code"], "not_found");
}
