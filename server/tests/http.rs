//! End-to-end tests against a live server on an ephemeral loopback port.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use docview_server::{RunningServer, ServerOptions, ServerSlot};
use reqwest::Client;
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

const PNG_BYTES: &[u8] = &[
    0x89, 0x50, 0x4e, 0x47, 0x0d, 0x0a, 0x1a, 0x0a, 0x00, 0x00, 0x00, 0x0d, 0x49, 0x48, 0x44, 0x52,
    0x00, 0xff, 0xfe, 0x80, 0x0d, 0x0a,
];

fn client() -> Client {
    Client::builder().no_proxy().build().expect("build client")
}

async fn start(root: &Path) -> RunningServer {
    RunningServer::start(&ServerOptions::new(root)).await.expect("server starts")
}

async fn raw_request(server: &RunningServer, request: &str) -> String {
    let mut stream = TcpStream::connect(("127.0.0.1", server.connection_info().port()))
        .await
        .expect("connect");
    stream.write_all(request.as_bytes()).await.expect("write request");
    let mut response = Vec::new();
    stream.read_to_end(&mut response).await.expect("read response");
    String::from_utf8_lossy(&response).into_owned()
}

#[tokio::test]
async fn missing_file_gets_html_404() {
    let root = TempDir::new().expect("temp dir");
    let server = start(root.path()).await;

    let url = server.connection_info().root_url("missing.html");
    let response = client().get(url).send().await.expect("request succeeds");

    assert_eq!(response.status(), 404);
    assert_eq!(
        response.headers()["content-type"],
        "text/html; charset=UTF-8"
    );
    let body = response.text().await.expect("body is text");
    assert!(body.contains("/missing.html"));
    server.shutdown().await;
}

#[tokio::test]
async fn serves_file_under_root_with_default_headers() {
    let root = TempDir::new().expect("temp dir");
    fs::create_dir(root.path().join("_static")).expect("create dir");
    fs::write(root.path().join("_static/style.css"), "body { margin: 0 }").expect("write fixture");
    let server = start(root.path()).await;

    let url = server.connection_info().root_url("_static/style.css");
    let response = client().get(url).send().await.expect("request succeeds");

    assert_eq!(response.status(), 200);
    let headers = response.headers();
    assert_eq!(headers["content-type"], "text/css; charset=UTF-8");
    assert_eq!(headers["cache-control"], "no-cache");
    assert_eq!(headers["x-content-type-options"], "nosniff");
    assert_eq!(headers["access-control-allow-origin"], "*");
    assert!(headers.contains_key("content-security-policy"));
    assert_eq!(response.text().await.expect("body is text"), "body { margin: 0 }");
    server.shutdown().await;
}

#[tokio::test]
async fn fs_path_override_serves_binary_bytes_unchanged() {
    let root = TempDir::new().expect("temp dir");
    let elsewhere = TempDir::new().expect("temp dir");
    let image = elsewhere.path().join("logo.png");
    fs::write(&image, PNG_BYTES).expect("write fixture");
    let server = start(root.path()).await;

    let url = server.connection_info().fs_path_url(&image);
    let response = client().get(url).send().await.expect("request succeeds");

    assert_eq!(response.status(), 200);
    assert_eq!(response.headers()["content-type"], "image/png");
    assert_eq!(response.bytes().await.expect("body bytes").as_ref(), PNG_BYTES);
    server.shutdown().await;
}

#[tokio::test]
async fn traversal_is_answered_as_not_found() {
    let parent = TempDir::new().expect("temp dir");
    let root = parent.path().join("docs");
    fs::create_dir(&root).expect("create dir");
    fs::write(parent.path().join("secret.txt"), "top secret").expect("write fixture");
    let server = start(&root).await;

    for target in ["/../secret.txt", "/%2e%2e/secret.txt", "/a/../../secret.txt"] {
        let response = raw_request(
            &server,
            &format!("GET {target} HTTP/1.1\r\nHost: localhost\r\n\r\n"),
        )
        .await;
        assert!(response.starts_with("HTTP/1.1 404"), "{target}: {response}");
        assert!(!response.contains("top secret"));
    }
    server.shutdown().await;
}

#[tokio::test]
async fn head_returns_headers_without_body() {
    let root = TempDir::new().expect("temp dir");
    fs::write(root.path().join("index.html"), "<html></html>").expect("write fixture");
    let server = start(root.path()).await;

    let response = raw_request(&server, "HEAD /index.html HTTP/1.1\r\n\r\n").await;

    assert!(response.starts_with("HTTP/1.1 200 OK\r\n"));
    assert!(response.contains("Content-Length: 13\r\n"));
    assert!(response.ends_with("\r\n\r\n"));
    server.shutdown().await;
}

#[tokio::test]
async fn post_is_method_not_allowed() {
    let root = TempDir::new().expect("temp dir");
    let server = start(root.path()).await;

    let url = server.connection_info().root_url("index.html");
    let response = client().post(url).send().await.expect("request succeeds");

    assert_eq!(response.status(), 405);
    assert_eq!(response.headers()["allow"], "GET, HEAD");
    server.shutdown().await;
}

#[tokio::test]
async fn garbage_request_line_is_bad_request() {
    let root = TempDir::new().expect("temp dir");
    let server = start(root.path()).await;

    let response = raw_request(&server, "this is not http\r\n\r\n").await;

    assert!(response.starts_with("HTTP/1.1 400"), "{response}");
    server.shutdown().await;
}

#[tokio::test]
async fn registered_content_wins_over_disk() {
    let root = TempDir::new().expect("temp dir");
    fs::write(root.path().join("index.html"), "<p>disk</p>").expect("write fixture");
    let server = start(root.path()).await;
    let canonical = server.root().join("index.html");

    server
        .register_content(&canonical, b"<p>memory</p>".to_vec(), "text/html; charset=UTF-8")
        .await;
    let url = server.connection_info().root_url("index.html");
    assert_eq!(
        client().get(&url).send().await.expect("request succeeds").text().await.expect("body is text"),
        "<p>memory</p>"
    );

    assert!(server.unregister_content(&canonical).await);
    assert_eq!(
        client().get(&url).send().await.expect("request succeeds").text().await.expect("body is text"),
        "<p>disk</p>"
    );
    server.shutdown().await;
}

#[tokio::test]
async fn directory_request_serves_index() {
    let root = TempDir::new().expect("temp dir");
    fs::create_dir(root.path().join("guide")).expect("create dir");
    fs::write(root.path().join("guide/index.html"), "<h1>Guide</h1>").expect("write fixture");
    let server = start(root.path()).await;

    let url = server.connection_info().root_url("guide/");
    let response = client().get(url).send().await.expect("request succeeds");

    assert_eq!(response.status(), 200);
    assert_eq!(response.text().await.expect("body is text"), "<h1>Guide</h1>");
    server.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_starts_share_one_listener() {
    let root = TempDir::new().expect("temp dir");
    fs::write(root.path().join("index.html"), "ok").expect("write fixture");
    let slot = Arc::new(ServerSlot::new());
    let options = ServerOptions::new(root.path());

    let (a, b) = tokio::join!(slot.get_or_start(&options), slot.get_or_start(&options));
    let (a, b) = (a.expect("first start"), b.expect("second start"));

    assert_eq!(a.connection_info(), b.connection_info());
    assert_eq!(slot.start_count(), 1);

    let url = a.connection_info().root_url("index.html");
    assert_eq!(client().get(url).send().await.expect("request succeeds").text().await.expect("body is text"), "ok");
    slot.shutdown().await;
}
