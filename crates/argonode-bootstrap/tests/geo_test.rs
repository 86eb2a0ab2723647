//! ISP lookup fallback chain against mock providers

use argonode_bootstrap::{GeoProvider, IspResolver, UNKNOWN_ISP};
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn providers(server: &MockServer) -> Vec<GeoProvider> {
    vec![
        GeoProvider::new(format!("{}/primary", server.uri()), "country_code", "org"),
        GeoProvider::new(format!("{}/secondary", server.uri()), "countryCode", "org"),
    ]
}

#[tokio::test]
async fn test_primary_provider_wins() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/primary"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"country_code": "US", "org": "Example Cloud"})),
        )
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/secondary"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let resolver = IspResolver::new(reqwest::Client::new()).with_providers(providers(&server));
    assert_eq!(resolver.resolve().await, "US_Example_Cloud");
}

#[tokio::test]
async fn test_falls_back_to_secondary() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/primary"))
        .respond_with(ResponseTemplate::new(429))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/secondary"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"countryCode": "DE", "org": "Hetzner Online GmbH"})),
        )
        .mount(&server)
        .await;

    let resolver = IspResolver::new(reqwest::Client::new()).with_providers(providers(&server));
    assert_eq!(resolver.resolve().await, "DE_Hetzner_Online_GmbH");
}

#[tokio::test]
async fn test_unknown_when_all_fail() {
    let server = MockServer::start().await;

    Mock::given(method("GET"))
        .and(path("/primary"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/secondary"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "fail"})))
        .mount(&server)
        .await;

    let resolver = IspResolver::new(reqwest::Client::new()).with_providers(providers(&server));
    assert_eq!(resolver.resolve().await, UNKNOWN_ISP);
}
