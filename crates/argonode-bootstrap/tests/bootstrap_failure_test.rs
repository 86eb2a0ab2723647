//! Bootstrap aborts cleanly when a required binary is unavailable

use argonode_api::SubscriptionCache;
use argonode_bootstrap::{Bootstrap, Settings};
use clap::Parser;
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

#[derive(Parser)]
struct Cli {
    #[command(flatten)]
    settings: Settings,
}

#[tokio::test]
async fn test_missing_proxy_binary_leaves_cache_empty() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let workdir = dir.path().join("tmp");
    let settings = Cli::try_parse_from([
        "argonode",
        "--file-path",
        workdir.to_str().unwrap(),
        "--discovery-rounds",
        "1",
    ])
    .unwrap()
    .settings;

    let cache = SubscriptionCache::new();
    let result = Bootstrap::new(settings, cache.clone())
        .with_artifact_base(server.uri())
        .run()
        .await;

    let err = match result {
        Ok(_) => panic!("bootstrap should fail without binaries"),
        Err(e) => e,
    };
    assert!(err.to_string().contains("Required binary"));
    assert!(cache.is_empty());
    assert!(workdir.is_dir());
    assert!(!workdir.join("config.json").exists());
}
