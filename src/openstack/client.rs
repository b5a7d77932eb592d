//! Keystone v3 authentication and service catalog lookup

use crate::config::ProviderConfig;
use crate::error::{CloudockError, Result};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info};

/// Header carrying the issued token
const SUBJECT_TOKEN: &str = "X-Subject-Token";
/// Header authenticating every service call
pub const AUTH_TOKEN: &str = "X-Auth-Token";

/// Catalog entry of one service
#[derive(Debug, Clone, Deserialize)]
pub struct CatalogService {
    #[serde(rename = "type")]
    pub service_type: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub endpoints: Vec<CatalogEndpoint>,
}

/// One endpoint of a catalog service
#[derive(Debug, Clone, Deserialize)]
pub struct CatalogEndpoint {
    pub interface: String,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub region_id: Option<String>,
    pub url: String,
}

#[derive(Deserialize)]
struct TokenBody {
    token: Token,
}

#[derive(Deserialize)]
struct Token {
    #[serde(default)]
    catalog: Vec<CatalogService>,
}

/// Authenticated session against one OpenStack project
#[derive(Debug, Clone)]
pub struct Session {
    client: reqwest::Client,
    token: String,
    catalog: Vec<CatalogService>,
    region: Option<String>,
}

/// Body of a password authentication scoped to the configured project
pub fn password_auth_body(config: &ProviderConfig) -> Value {
    json!({
        "auth": {
            "identity": {
                "methods": ["password"],
                "password": {
                    "user": {
                        "name": config.username,
                        "domain": { "name": config.domain_name },
                        "password": config.password.clone().unwrap_or_default(),
                    }
                }
            },
            "scope": {
                "project": {
                    "name": config.tenant_name,
                    "domain": { "name": config.domain_name },
                }
            }
        }
    })
}

impl Session {
    /// Request a token and the service catalog from Keystone
    pub async fn authenticate(client: reqwest::Client, config: &ProviderConfig) -> Result<Self> {
        let url = format!("{}/auth/tokens", config.auth_url.trim_end_matches('/'));
        info!("Authenticating {} against {}", config.username, config.auth_url);

        let response = client
            .post(&url)
            .json(&password_auth_body(config))
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CloudockError::Compute(format!(
                "Authentication failed: {} {}",
                status,
                error_message(&body)
            )));
        }

        let token = response
            .headers()
            .get(SUBJECT_TOKEN)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| {
                CloudockError::Compute("Keystone answered without a token".to_string())
            })?;
        let body: TokenBody = response.json().await?;
        debug!("Catalog holds {} services", body.token.catalog.len());

        Ok(Self {
            client,
            token,
            catalog: body.token.catalog,
            region: config.region.clone(),
        })
    }

    /// Build a session from parts already known
    pub fn from_parts(
        client: reqwest::Client,
        token: String,
        catalog: Vec<CatalogService>,
        region: Option<String>,
    ) -> Self {
        Self {
            client,
            token,
            catalog,
            region,
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    /// Public endpoint of a service type in the configured region
    pub fn endpoint(&self, service_type: &str) -> Result<String> {
        find_endpoint(&self.catalog, service_type, self.region.as_deref())
            .map(|url| url.trim_end_matches('/').to_string())
            .ok_or_else(|| {
                CloudockError::Config(format!(
                    "No public {} endpoint{} in the service catalog",
                    service_type,
                    self.region
                        .as_deref()
                        .map(|r| format!(" for region {}", r))
                        .unwrap_or_default()
                ))
            })
    }

    pub fn get(&self, url: &str) -> reqwest::RequestBuilder {
        self.client.get(url).header(AUTH_TOKEN, &self.token)
    }

    pub fn post(&self, url: &str) -> reqwest::RequestBuilder {
        self.client.post(url).header(AUTH_TOKEN, &self.token)
    }

    pub fn delete(&self, url: &str) -> reqwest::RequestBuilder {
        self.client.delete(url).header(AUTH_TOKEN, &self.token)
    }
}

/// Pick the public endpoint of `service_type`, preferring `region`
pub fn find_endpoint<'a>(
    catalog: &'a [CatalogService],
    service_type: &str,
    region: Option<&str>,
) -> Option<&'a str> {
    let service = catalog.iter().find(|s| s.service_type == service_type)?;
    let mut public = service.endpoints.iter().filter(|e| e.interface == "public");

    match region {
        Some(region) => public
            .find(|e| {
                e.region.as_deref() == Some(region) || e.region_id.as_deref() == Some(region)
            })
            .map(|e| e.url.as_str()),
        None => public.next().map(|e| e.url.as_str()),
    }
}

/// Readable message from an OpenStack error body
///
/// Services wrap it as `{"<kind>": {"message": ...}}` or `{"NeutronError": ...}`.
pub fn error_message(body: &str) -> String {
    let Ok(value) = serde_json::from_str::<Value>(body) else {
        return body.trim().to_string();
    };
    value
        .as_object()
        .and_then(|o| o.values().next())
        .and_then(|inner| inner.get("message"))
        .and_then(|m| m.as_str())
        .map(str::to_string)
        .unwrap_or_else(|| body.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog() -> Vec<CatalogService> {
        serde_json::from_value(json!([
            {
                "type": "compute",
                "name": "nova",
                "endpoints": [
                    {"interface": "internal", "region": "Melbourne", "url": "http://internal:8774/v2.1"},
                    {"interface": "public", "region": "Sydney", "url": "https://syd:8774/v2.1"},
                    {"interface": "public", "region": "Melbourne", "url": "https://mel:8774/v2.1/"}
                ]
            },
            {
                "type": "network",
                "name": "neutron",
                "endpoints": [
                    {"interface": "public", "region_id": "Melbourne", "url": "https://net:9696"}
                ]
            }
        ]))
        .unwrap()
    }

    #[test]
    fn test_endpoint_by_region() {
        let catalog = catalog();
        assert_eq!(
            find_endpoint(&catalog, "compute", Some("Melbourne")),
            Some("https://mel:8774/v2.1/")
        );
        assert_eq!(find_endpoint(&catalog, "compute", None), Some("https://syd:8774/v2.1"));
        assert_eq!(
            find_endpoint(&catalog, "network", Some("Melbourne")),
            Some("https://net:9696")
        );
        assert_eq!(find_endpoint(&catalog, "compute", Some("Perth")), None);
        assert_eq!(find_endpoint(&catalog, "volume", None), None);
    }

    #[test]
    fn test_session_endpoint_trims_slash() {
        let session = Session::from_parts(
            reqwest::Client::new(),
            "tok".to_string(),
            catalog(),
            Some("Melbourne".to_string()),
        );
        assert_eq!(session.endpoint("compute").unwrap(), "https://mel:8774/v2.1");
        assert!(matches!(
            session.endpoint("volume"),
            Err(CloudockError::Config(_))
        ));
    }

    #[test]
    fn test_password_auth_body() {
        let config = ProviderConfig {
            username: "alice".to_string(),
            password: Some("secret".to_string()),
            tenant_name: "demo".to_string(),
            domain_name: "Default".to_string(),
            ..Default::default()
        };
        let body = password_auth_body(&config);
        assert_eq!(body["auth"]["identity"]["password"]["user"]["name"], "alice");
        assert_eq!(body["auth"]["identity"]["password"]["user"]["password"], "secret");
        assert_eq!(body["auth"]["scope"]["project"]["name"], "demo");
    }

    #[test]
    fn test_error_message() {
        assert_eq!(
            error_message(r#"{"itemNotFound": {"code": 404, "message": "Instance could not be found"}}"#),
            "Instance could not be found"
        );
        assert_eq!(error_message("gateway timeout\n"), "gateway timeout");
    }
}
