//! Integration tests for aggregator notifications using wiremock

use argonode_bootstrap::{NotifyOutcome, UploadNotifier};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde_json::json;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn setup() -> (MockServer, UploadNotifier) {
    let server = MockServer::start().await;
    let notifier =
        UploadNotifier::new(reqwest::Client::new(), "sub").with_upload_url(Some(&server.uri()));
    (server, notifier)
}

#[tokio::test]
async fn test_delete_stale_nodes_sends_only_node_lines() {
    let (server, notifier) = setup().await;
    let dir = tempfile::tempdir().unwrap();
    let sub_file = dir.path().join("sub.txt");

    let previous = "vless://a@h:443?x#n\nnot a link\nvmess://eyJ2IjoiMiJ9\n\ntuic://b@h:1#t";
    tokio::fs::write(&sub_file, STANDARD.encode(previous))
        .await
        .unwrap();

    Mock::given(method("POST"))
        .and(path("/api/delete-nodes"))
        .and(body_json(json!({
            "nodes": ["vless://a@h:443?x#n", "vmess://eyJ2IjoiMiJ9", "tuic://b@h:1#t"]
        })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    assert_eq!(
        notifier.delete_stale_nodes(&sub_file).await,
        NotifyOutcome::Sent
    );
}

#[tokio::test]
async fn test_delete_stale_nodes_without_previous_run() {
    let (server, notifier) = setup().await;
    let dir = tempfile::tempdir().unwrap();

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    assert_eq!(
        notifier
            .delete_stale_nodes(&dir.path().join("sub.txt"))
            .await,
        NotifyOutcome::Skipped
    );
}

#[tokio::test]
async fn test_delete_stale_nodes_failure_is_swallowed() {
    let (server, notifier) = setup().await;
    let dir = tempfile::tempdir().unwrap();
    let sub_file = dir.path().join("sub.txt");
    tokio::fs::write(&sub_file, STANDARD.encode("trojan://x@h:443#n"))
        .await
        .unwrap();

    Mock::given(method("POST"))
        .and(path("/api/delete-nodes"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    assert_eq!(
        notifier.delete_stale_nodes(&sub_file).await,
        NotifyOutcome::Failed
    );
}

#[tokio::test]
async fn test_upload_registers_subscription_url() {
    let (server, notifier) = setup().await;
    let notifier = notifier.with_project_url(Some("https://app.example.com/"));

    Mock::given(method("POST"))
        .and(path("/api/add-subscriptions"))
        .and(body_json(json!({
            "subscription": ["https://app.example.com/sub"]
        })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    assert_eq!(
        notifier.upload(&dir.path().join("list.txt")).await,
        NotifyOutcome::Sent
    );
}

#[tokio::test]
async fn test_subscription_already_registered() {
    let (server, notifier) = setup().await;
    let notifier = notifier.with_project_url(Some("https://app.example.com"));

    Mock::given(method("POST"))
        .and(path("/api/add-subscriptions"))
        .respond_with(ResponseTemplate::new(400))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    assert_eq!(
        notifier.upload(&dir.path().join("list.txt")).await,
        NotifyOutcome::AlreadyRegistered
    );
}

#[tokio::test]
async fn test_upload_nodes_from_list_file() {
    let (server, notifier) = setup().await;
    let dir = tempfile::tempdir().unwrap();
    let list_file = dir.path().join("list.txt");
    tokio::fs::write(&list_file, "vless://a@h:443#n\nvmess://abc\ntrojan://c@h:443#n\n")
        .await
        .unwrap();

    Mock::given(method("POST"))
        .and(path("/api/add-nodes"))
        .and(body_json(json!({
            "nodes": ["vless://a@h:443#n", "vmess://abc", "trojan://c@h:443#n"]
        })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    assert_eq!(notifier.upload(&list_file).await, NotifyOutcome::Sent);
}

#[tokio::test]
async fn test_upload_without_url_is_skipped() {
    let notifier = UploadNotifier::new(reqwest::Client::new(), "sub")
        .with_project_url(Some("https://app.example.com"));
    let dir = tempfile::tempdir().unwrap();

    assert_eq!(
        notifier.upload(&dir.path().join("list.txt")).await,
        NotifyOutcome::Skipped
    );
}

#[tokio::test]
async fn test_auto_access_posts_project_url() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/add-url"))
        .and(body_json(json!({"url": "https://app.example.com"})))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let notifier = UploadNotifier::new(reqwest::Client::new(), "sub")
        .with_project_url(Some("https://app.example.com"))
        .with_auto_access(true)
        .with_auto_access_url(format!("{}/add-url", server.uri()));

    assert_eq!(notifier.register_auto_access().await, NotifyOutcome::Sent);
}

#[tokio::test]
async fn test_auto_access_needs_flag_and_project_url() {
    let disabled = UploadNotifier::new(reqwest::Client::new(), "sub")
        .with_project_url(Some("https://app.example.com"));
    assert_eq!(disabled.register_auto_access().await, NotifyOutcome::Skipped);

    let no_project = UploadNotifier::new(reqwest::Client::new(), "sub").with_auto_access(true);
    assert_eq!(
        no_project.register_auto_access().await,
        NotifyOutcome::Skipped
    );
}
