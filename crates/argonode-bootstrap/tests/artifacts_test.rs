//! Artifact downloads against a mock mirror

use argonode_bootstrap::{ArtifactDownloader, ArtifactError, ArtifactPlan, ArtifactRole};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn plan(server: &MockServer, dir: &std::path::Path, telemetry: bool) -> ArtifactPlan {
    ArtifactPlan::plan_from(&server.uri(), telemetry, true, dir, |role| {
        role.path_segment().to_string() + "x"
    })
}

async fn serve(server: &MockServer, segment: &str, status: u16, body: &str) {
    Mock::given(method("GET"))
        .and(path(format!("/{}", segment)))
        .respond_with(ResponseTemplate::new(status).set_body_string(body.to_string()))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_fetch_plan_writes_executables() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    serve(&server, "web", 200, "proxy-binary").await;
    serve(&server, "bot", 200, "tunnel-binary").await;

    let plan = plan(&server, dir.path(), false);
    let report = ArtifactDownloader::new(reqwest::Client::new())
        .fetch_plan(&plan)
        .await
        .unwrap();

    assert!(report.is_fetched(ArtifactRole::ProxyEngine));
    assert!(report.is_fetched(ArtifactRole::TunnelClient));
    assert!(report.skipped.is_empty());

    let proxy = plan.get(ArtifactRole::ProxyEngine).unwrap();
    assert_eq!(
        tokio::fs::read_to_string(&proxy.local_path).await.unwrap(),
        "proxy-binary"
    );

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let mode = std::fs::metadata(&proxy.local_path)
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o775);
    }
}

#[tokio::test]
async fn test_optional_agent_failure_is_skipped() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    serve(&server, "web", 200, "proxy").await;
    serve(&server, "bot", 200, "tunnel").await;
    serve(&server, "agent", 404, "").await;

    let plan = plan(&server, dir.path(), true);
    let report = ArtifactDownloader::new(reqwest::Client::new())
        .fetch_plan(&plan)
        .await
        .unwrap();

    assert_eq!(report.skipped, vec![ArtifactRole::TelemetryAgentV1]);
    assert!(!plan
        .get(ArtifactRole::TelemetryAgentV1)
        .unwrap()
        .local_path
        .exists());
}

#[tokio::test]
async fn test_required_failure_aborts() {
    let server = MockServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    serve(&server, "web", 200, "proxy").await;
    serve(&server, "bot", 503, "").await;

    let plan = plan(&server, dir.path(), false);
    let err = ArtifactDownloader::new(reqwest::Client::new())
        .fetch_plan(&plan)
        .await
        .unwrap_err();

    assert_eq!(err.role(), ArtifactRole::TunnelClient);
    assert!(matches!(err, ArtifactError::Status { status: 503, .. }));
}
