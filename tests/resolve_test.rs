//! Remote input resolution against a mock HTTP server.

use assert_matches::assert_matches;
use clipforge::config::FetchConfig;
use clipforge::error::Error;
use clipforge::resolve::{InputRef, Resolver};
use clipforge::store::ArtifactStore;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn resolver_for(renderer: &str, max_bytes: u64) -> (tempfile::TempDir, ArtifactStore, Resolver) {
    let dir = tempfile::tempdir().unwrap();
    let store = ArtifactStore::new(dir.path()).unwrap();
    let resolver = Resolver::with_fetch_config(
        store.clone(),
        &FetchConfig {
            max_bytes,
            timeout_secs: 5,
        },
        renderer.to_string(),
    );
    (dir, store, resolver)
}

#[tokio::test]
async fn url_fetch_lands_as_artifact() {
    let mock = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/clip.mp4"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"mp4 bytes".to_vec()))
        .mount(&mock)
        .await;

    let (_dir, store, resolver) = resolver_for("http://renderer.local", 1024 * 1024);
    let job = store.create_job(None).unwrap();

    let path = resolver
        .resolve(
            &job,
            "input_video.mp4",
            &InputRef::Url(format!("{}/clip.mp4", mock.uri())),
        )
        .await
        .unwrap();

    assert_eq!(std::fs::read(&path).unwrap(), b"mp4 bytes");
    // The fetched file is a normal artifact of the job.
    assert_eq!(store.list(&job).unwrap()[0].filename, "input_video.mp4");
}

#[tokio::test]
async fn non_success_status_is_fetch_error() {
    let mock = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&mock)
        .await;

    let (_dir, store, resolver) = resolver_for("http://renderer.local", 1024);
    let job = store.create_job(None).unwrap();

    let err = resolver
        .resolve(
            &job,
            "in.mp4",
            &InputRef::Url(format!("{}/missing.mp4", mock.uri())),
        )
        .await
        .unwrap_err();

    assert_matches!(err, Error::Fetch(_));
    // Nothing half-written remains visible.
    assert!(store.list(&job).unwrap().is_empty());
}

#[tokio::test]
async fn declared_oversize_is_rejected_before_download() {
    let mock = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0u8; 2048]))
        .mount(&mock)
        .await;

    let (_dir, store, resolver) = resolver_for("http://renderer.local", 100);
    let job = store.create_job(None).unwrap();

    let err = resolver
        .resolve(&job, "in.mp4", &InputRef::Url(format!("{}/big.mp4", mock.uri())))
        .await
        .unwrap_err();

    assert_matches!(err, Error::Fetch(_));
    assert!(store.list(&job).unwrap().is_empty());
}

#[tokio::test]
async fn render_job_fetches_from_renderer_video_path() {
    let mock = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/video/render-42"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"rendered".to_vec()))
        .mount(&mock)
        .await;

    let (_dir, store, resolver) = resolver_for(&mock.uri(), 1024);
    let job = store.create_job(None).unwrap();

    let path = resolver
        .resolve(
            &job,
            "input_video.mp4",
            &InputRef::RenderJob("render-42".to_string()),
        )
        .await
        .unwrap();

    assert_eq!(std::fs::read(&path).unwrap(), b"rendered");
}

#[tokio::test]
async fn render_job_id_with_path_chars_is_rejected() {
    let (_dir, store, resolver) = resolver_for("http://renderer.local", 1024);
    let job = store.create_job(None).unwrap();

    let err = resolver
        .resolve(
            &job,
            "in.mp4",
            &InputRef::RenderJob("../../admin".to_string()),
        )
        .await
        .unwrap_err();

    assert_matches!(err, Error::InvalidParameter(_));
}
