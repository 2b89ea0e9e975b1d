use super::{AuthError, IdentityClient, UrlType};
use parking_lot::RwLock;
use reqwest::header::ACCEPT;
use reqwest::{Client, ClientBuilder};
use serde::Deserialize;
use serde_json::{Map, Value, json};
use std::time::Duration;
use tracing::debug;

#[derive(Clone)]
pub struct KeystoneCredentials {
    pub auth_url: String,
    pub username: String,
    pub password: String,
    pub tenant_name: String,
    pub region: Option<String>,
}

impl std::fmt::Debug for KeystoneCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeystoneCredentials")
            .field("auth_url", &self.auth_url)
            .field("username", &self.username)
            .field("password", &"*****")
            .field("tenant_name", &self.tenant_name)
            .field("region", &self.region)
            .finish()
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access: Access,
}

#[derive(Debug, Deserialize)]
struct Access {
    token: TokenInfo,
    #[serde(rename = "serviceCatalog", default)]
    service_catalog: Vec<CatalogService>,
}

#[derive(Debug, Deserialize)]
struct TokenInfo {
    id: String,
}

#[derive(Debug, Clone, Deserialize)]
struct CatalogService {
    #[serde(default)]
    name: String,
    #[serde(default)]
    endpoints: Vec<Map<String, Value>>,
}

/// Lightweight client for the identity v2 API.
#[derive(Debug)]
pub struct KeystoneClient {
    http: Client,
    credentials: KeystoneCredentials,
    catalog: RwLock<Option<Vec<CatalogService>>>,
}

impl KeystoneClient {
    pub fn new(credentials: KeystoneCredentials, timeout: Duration) -> Result<Self, AuthError> {
        let http = ClientBuilder::new()
            .timeout(timeout)
            .user_agent(concat!("openstack-telemetry-forwarder/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            credentials,
            catalog: RwLock::new(None),
        })
    }

    fn tokens_url(&self) -> String {
        format!("{}/tokens", self.credentials.auth_url.trim_end_matches('/'))
    }

    fn auth_body(&self) -> Value {
        let mut auth = json!({
            "passwordCredentials": {
                "username": self.credentials.username,
                "password": self.credentials.password,
            }
        });
        if !self.credentials.tenant_name.is_empty() {
            auth["tenantName"] = Value::String(self.credentials.tenant_name.clone());
        }
        json!({ "auth": auth })
    }
}

impl IdentityClient for KeystoneClient {
    async fn authenticate(&self) -> Result<String, AuthError> {
        let url = self.tokens_url();
        debug!(url = %url, user = %self.credentials.username, "Requesting identity token");

        let response = self
            .http
            .post(&url)
            .header(ACCEPT, "application/json")
            .json(&self.auth_body())
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(AuthError::InvalidResponse {
                message: format!("identity service answered {status}"),
                body: Some(body),
            });
        }

        let parsed: TokenResponse =
            serde_json::from_str(&body).map_err(|e| AuthError::InvalidResponse {
                message: e.to_string(),
                body: Some(body.clone()),
            })?;

        *self.catalog.write() = Some(parsed.access.service_catalog);
        Ok(parsed.access.token.id)
    }

    fn service_endpoint(&self, service: &str, url_type: UrlType) -> Result<String, AuthError> {
        let catalog = self.catalog.read();
        let services = catalog.as_ref().ok_or(AuthError::NotAuthenticated)?;

        let missing = |reason: &str| AuthError::MissingService {
            service: service.to_string(),
            reason: reason.to_string(),
        };

        let endpoints = services
            .iter()
            .find(|entry| entry.name == service && !entry.endpoints.is_empty())
            .map(|entry| &entry.endpoints)
            .ok_or_else(|| missing("no such service in received catalog"))?;

        // First endpoint is the default; a configured region narrows it.
        let mut endpoint = &endpoints[0];
        if let Some(region) = &self.credentials.region
            && let Some(regional) = endpoints
                .iter()
                .find(|ep| ep.get("region").and_then(Value::as_str) == Some(region.as_str()))
        {
            endpoint = regional;
        }

        endpoint
            .get(url_type.as_str())
            .and_then(Value::as_str)
            .map(|url| url.trim_end_matches('/').to_string())
            .ok_or_else(|| missing(&format!("endpoint has no {url_type}")))
    }
}
