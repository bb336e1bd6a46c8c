use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Router;
use base64::engine::general_purpose::URL_SAFE;
use base64::Engine as _;
use docker_image_syncer::engine::{DockerEngineClient, EngineSettings, ImageEngine};
use docker_image_syncer::error::SyncerError;
use docker_image_syncer::registry::auth::RegistryCredential;
use docker_image_syncer::registry::reference::ImageReference;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone)]
struct Recorded {
    method: Method,
    path: String,
    query: HashMap<String, String>,
    auth: Option<String>,
}

#[derive(Default)]
struct MockDaemon {
    requests: Mutex<Vec<Recorded>>,
}

/// Strip the `/v1.xx` prefix the client puts in front of every call
fn unversioned(path: &str) -> &str {
    match path.strip_prefix("/v") {
        Some(rest) => rest.find('/').map(|i| &rest[i..]).unwrap_or(path),
        None => path,
    }
}

async fn handle(
    State(daemon): State<Arc<MockDaemon>>,
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    _body: Bytes,
) -> Response {
    let query: HashMap<String, String> = url::form_urlencoded::parse(uri.query().unwrap_or("").as_bytes())
        .into_owned()
        .collect();
    daemon.requests.lock().unwrap().push(Recorded {
        method: method.clone(),
        path: uri.path().to_string(),
        query: query.clone(),
        auth: headers
            .get("x-registry-auth")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
    });

    let path = unversioned(uri.path());
    match (method.as_str(), path) {
        ("GET", "/version") if uri.path() == "/version" => {
            (StatusCode::OK, r#"{"Version":"24.0.7","ApiVersion":"1.41"}"#).into_response()
        }
        ("POST", "/images/create") => match query.get("fromImage").map(String::as_str) {
            Some("missing/x") => (
                StatusCode::NOT_FOUND,
                r#"{"message":"pull access denied for missing/x"}"#,
            )
                .into_response(),
            _ => (
                StatusCode::OK,
                "{\"status\":\"Pulling from a/x\"}\n{\"status\":\"Status: Downloaded newer image\"}\n",
            )
                .into_response(),
        },
        ("POST", p) if p.ends_with("/tag") => StatusCode::CREATED.into_response(),
        ("POST", "/images/denied/x/push") => (
            StatusCode::OK,
            "{\"status\":\"The push refers to repository\"}\n{\"errorDetail\":{\"message\":\"denied\"},\"error\":\"denied\"}\n",
        )
            .into_response(),
        ("POST", p) if p.ends_with("/push") => {
            (StatusCode::OK, "{\"status\":\"1: digest: sha256:abc size: 528\"}\n").into_response()
        }
        ("GET", "/images/json") => (
            StatusCode::OK,
            r#"[{"Id":"sha256:aaa","RepoTags":null,"RepoDigests":[],"Size":1024,"Containers":-1},
                {"Id":"sha256:bbb","RepoTags":["nginx:latest"],"RepoDigests":null,"Size":2048}]"#,
        )
            .into_response(),
        ("DELETE", p) if p.starts_with("/images/") => (
            StatusCode::OK,
            r#"[{"Untagged":"x"},{"Deleted":"sha256:aaa"}]"#,
        )
            .into_response(),
        _ => (StatusCode::NOT_FOUND, r#"{"message":"page not found"}"#).into_response(),
    }
}

async fn start_daemon() -> (SocketAddr, Arc<MockDaemon>) {
    let daemon = Arc::new(MockDaemon::default());
    let app = Router::new().fallback(handle).with_state(Arc::clone(&daemon));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, daemon)
}

async fn connect(addr: SocketAddr) -> DockerEngineClient {
    let settings = EngineSettings::default().with_host(format!("tcp://{}", addr));
    DockerEngineClient::connect(&settings).await.unwrap()
}

fn reference(s: &str) -> ImageReference {
    ImageReference::parse(s).unwrap()
}

fn last_request(daemon: &MockDaemon) -> Recorded {
    daemon.requests.lock().unwrap().last().cloned().unwrap()
}

#[tokio::test]
async fn test_connect_negotiates_api_version() {
    let (addr, daemon) = start_daemon().await;
    let client = connect(addr).await;
    assert_eq!(client.api_version(), "1.41");

    client.list_images().await.unwrap();
    assert_eq!(last_request(&daemon).path, "/v1.41/images/json");
}

#[tokio::test]
async fn test_pinned_api_version_is_kept() {
    let (addr, daemon) = start_daemon().await;
    let settings = EngineSettings::default()
        .with_host(format!("http://{}", addr))
        .with_api_version("1.40");
    let client = DockerEngineClient::connect(&settings).await.unwrap();
    assert_eq!(client.api_version(), "1.40");

    client.list_images().await.unwrap();
    let request = last_request(&daemon);
    assert_eq!(request.path, "/v1.40/images/json");
    assert_eq!(request.query.get("all").map(String::as_str), Some("true"));
}

#[tokio::test]
async fn test_unreachable_engine() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let settings = EngineSettings::default().with_host(format!("tcp://{}", addr));
    let err = DockerEngineClient::connect(&settings).await.unwrap_err();
    assert!(matches!(err, SyncerError::EngineUnreachable { .. }));
    assert!(err.is_startup_fatal());
}

#[tokio::test]
async fn test_pull_sends_query_and_credentials() {
    let (addr, daemon) = start_daemon().await;
    let client = connect(addr).await;
    let credential = RegistryCredential::from_basic("ghcr.io", "bot", "s3cret");

    client
        .pull_image(&reference("ghcr.io/org/app:1.2"), Some(&credential))
        .await
        .unwrap();

    let request = last_request(&daemon);
    assert_eq!(request.method, Method::POST);
    assert_eq!(request.path, "/v1.41/images/create");
    assert_eq!(request.query["fromImage"], "ghcr.io/org/app");
    assert_eq!(request.query["tag"], "1.2");

    let header = URL_SAFE.decode(request.auth.unwrap()).unwrap();
    let auth: serde_json::Value = serde_json::from_slice(&header).unwrap();
    assert_eq!(auth["username"], "bot");
    assert_eq!(auth["password"], "s3cret");
    assert_eq!(auth["serveraddress"], "ghcr.io");
}

#[tokio::test]
async fn test_anonymous_pull_sends_no_auth_header() {
    let (addr, daemon) = start_daemon().await;
    let client = connect(addr).await;

    client.pull_image(&reference("a/x"), None).await.unwrap();
    let request = last_request(&daemon);
    assert_eq!(request.query["tag"], "latest");
    assert!(request.auth.is_none());
}

#[tokio::test]
async fn test_pull_error_status_is_mapped() {
    let (addr, _daemon) = start_daemon().await;
    let client = connect(addr).await;

    let err = client.pull_image(&reference("missing/x:1"), None).await.unwrap_err();
    assert!(matches!(err, SyncerError::Engine(_)));
    assert_eq!(
        err.to_string(),
        "no such image for pull image: pull access denied for missing/x"
    );
}

#[tokio::test]
async fn test_tag_uses_target_repo_and_tag() {
    let (addr, daemon) = start_daemon().await;
    let client = connect(addr).await;

    client
        .tag_image(&reference("a/x:1"), &reference("registry.example.com:5000/b/x:2"))
        .await
        .unwrap();

    let request = last_request(&daemon);
    assert_eq!(request.path, "/v1.41/images/a/x:1/tag");
    assert_eq!(request.query["repo"], "registry.example.com:5000/b/x");
    assert_eq!(request.query["tag"], "2");
}

#[tokio::test]
async fn test_anonymous_push_sends_empty_auth() {
    let (addr, daemon) = start_daemon().await;
    let client = connect(addr).await;

    client.push_image(&reference("b/x:1"), None).await.unwrap();

    let request = last_request(&daemon);
    assert_eq!(request.path, "/v1.41/images/b/x/push");
    assert_eq!(request.query["tag"], "1");
    let header = URL_SAFE.decode(request.auth.unwrap()).unwrap();
    assert_eq!(header, b"{}");
}

#[tokio::test]
async fn test_push_error_inside_stream() {
    let (addr, _daemon) = start_daemon().await;
    let client = connect(addr).await;

    let err = client.push_image(&reference("denied/x:1"), None).await.unwrap_err();
    assert!(matches!(err, SyncerError::Stream(_)));
    assert_eq!(err.to_string(), "denied");
}

#[tokio::test]
async fn test_list_and_remove_images() {
    let (addr, daemon) = start_daemon().await;
    let client = connect(addr).await;

    let images = client.list_images().await.unwrap();
    assert_eq!(images.len(), 2);
    assert!(images[0].is_dangling());
    assert!(!images[1].is_dangling());

    let removed = client.remove_image("sha256:aaa").await.unwrap();
    assert_eq!(removed[1].deleted.as_deref(), Some("sha256:aaa"));

    let request = last_request(&daemon);
    assert_eq!(request.method, Method::DELETE);
    assert_eq!(request.path, "/v1.41/images/sha256:aaa");
    assert_eq!(request.query["force"], "true");
    assert_eq!(request.query["noprune"], "false");
}

#[tokio::test]
async fn test_runner_single_cycle_against_daemon() {
    use docker_image_syncer::cli::{Args, Runner};
    use docker_image_syncer::logging::LogFormat;

    let (addr, daemon) = start_daemon().await;
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sync.json");
    std::fs::write(
        &path,
        r#"{
            "images": [{"source": "a/x:1", "target": "registry.example.com/b/x:1"}],
            "auths": {"registry.example.com": {"username": "u", "password": "p"}}
        }"#,
    )
    .unwrap();

    let args = Args {
        config: path.display().to_string(),
        verbose: false,
        log_format: LogFormat::Text,
        once: true,
    };
    let settings = EngineSettings::default().with_host(format!("tcp://{}", addr));
    Runner::new(args).with_engine_settings(settings).run().await.unwrap();

    let paths: Vec<String> = daemon
        .requests
        .lock()
        .unwrap()
        .iter()
        .map(|r| format!("{} {}", r.method, r.path))
        .collect();
    assert_eq!(
        paths,
        vec![
            "GET /version",
            "POST /v1.41/images/create",
            "POST /v1.41/images/a/x:1/tag",
            "POST /v1.41/images/registry.example.com/b/x/push",
            "GET /v1.41/images/json",
            "DELETE /v1.41/images/sha256:aaa",
        ]
    );
}

#[tokio::test]
async fn test_runner_once_fails_when_a_job_fails() {
    use docker_image_syncer::cli::{Args, Runner};
    use docker_image_syncer::logging::LogFormat;

    let (addr, _daemon) = start_daemon().await;
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sync.json");
    std::fs::write(
        &path,
        r#"{
            "images": [{"source": "missing/x:1", "target": "b/x:1"}],
            "auths": {"registry.example.com": {"username": "u", "password": "p"}},
            "disable_prune": true
        }"#,
    )
    .unwrap();

    let args = Args {
        config: path.display().to_string(),
        verbose: false,
        log_format: LogFormat::Text,
        once: true,
    };
    let settings = EngineSettings::default().with_host(format!("tcp://{}", addr));
    let err = Runner::new(args).with_engine_settings(settings).run().await.unwrap_err();
    assert!(matches!(err, SyncerError::CycleFailed { failed: 1, total: 1, .. }));
}
