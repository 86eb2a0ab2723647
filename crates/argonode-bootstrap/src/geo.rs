//! ISP label lookup for share-link names

use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info};

pub const UNKNOWN_ISP: &str = "Unknown";

const LOOKUP_TIMEOUT: Duration = Duration::from_secs(3);

/// One geo/ASN JSON endpoint and the fields to read from it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeoProvider {
    pub url: String,
    pub country_field: String,
    pub org_field: String,
}

impl GeoProvider {
    pub fn new(url: impl Into<String>, country_field: &str, org_field: &str) -> Self {
        Self {
            url: url.into(),
            country_field: country_field.to_string(),
            org_field: org_field.to_string(),
        }
    }

    /// `{country}_{org}` from a provider response, spaces as underscores
    fn label(&self, body: &Value) -> Option<String> {
        let country = body.get(&self.country_field)?.as_str()?.trim();
        let org = body.get(&self.org_field)?.as_str()?.trim();
        if country.is_empty() || org.is_empty() {
            return None;
        }
        Some(format!("{}_{}", country, org).replace(' ', "_"))
    }
}

/// Tries each provider once, in order
#[derive(Debug, Clone)]
pub struct IspResolver {
    client: reqwest::Client,
    providers: Vec<GeoProvider>,
}

impl IspResolver {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            providers: vec![
                GeoProvider::new("https://ipapi.co/json/", "country_code", "org"),
                GeoProvider::new("http://ip-api.com/json/", "countryCode", "org"),
            ],
        }
    }

    pub fn with_providers(mut self, providers: Vec<GeoProvider>) -> Self {
        self.providers = providers;
        self
    }

    /// ISP label for this host, `Unknown` when every provider fails
    pub async fn resolve(&self) -> String {
        for provider in &self.providers {
            match self.query(provider).await {
                Some(label) => {
                    info!("ISP label: {}", label);
                    return label;
                }
                None => debug!("Geo lookup via {} gave no label", provider.url),
            }
        }

        info!("ISP lookup failed, using {:?}", UNKNOWN_ISP);
        UNKNOWN_ISP.to_string()
    }

    async fn query(&self, provider: &GeoProvider) -> Option<String> {
        let response = self
            .client
            .get(&provider.url)
            .timeout(LOOKUP_TIMEOUT)
            .send()
            .await
            .map_err(|e| debug!("Geo lookup via {} failed: {}", provider.url, e))
            .ok()?;

        if !response.status().is_success() {
            debug!(
                "Geo lookup via {} returned HTTP {}",
                provider.url,
                response.status()
            );
            return None;
        }

        let body: Value = response.json().await.ok()?;
        provider.label(&body)
    }
}
