//! Token authentication against the identity service
//!
//! One password-credential exchange per process. The resulting token and the
//! object-storage endpoint from the service catalog are cached for the rest of
//! the invocation and never refreshed.

use reqwest::StatusCode;
use reqwest::header::{HeaderMap, SET_COOKIE};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::OnceCell;
use url::Url;

use obs_core::{Credentials, Error, Result};

/// Header (and cookie name) carrying the issued token
pub const SUBJECT_TOKEN_HEADER: &str = "X-Subject-Token";

const OBJECT_STORE_TYPE: &str = "object-store";
const PUBLIC_INTERFACE: &str = "public";

/// An authenticated session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub token: String,
    /// Public object-storage endpoint, without a trailing slash
    pub storage_endpoint: String,
}

/// Lazily authenticated identity session
pub struct AuthSession {
    http: reqwest::Client,
    credentials: Credentials,
    session: OnceCell<Session>,
}

impl AuthSession {
    pub fn new(http: reqwest::Client, credentials: Credentials) -> Self {
        Self {
            http,
            credentials,
            session: OnceCell::new(),
        }
    }

    /// Create a session that is already authenticated
    pub fn with_session(http: reqwest::Client, credentials: Credentials, session: Session) -> Self {
        Self {
            http,
            credentials,
            session: OnceCell::new_with(Some(session)),
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.session.initialized()
    }

    /// Authenticate if needed and return the session.
    ///
    /// Concurrent first callers share a single exchange.
    pub async fn authenticate(&self) -> Result<&Session> {
        self.session.get_or_try_init(|| self.exchange()).await
    }

    async fn exchange(&self) -> Result<Session> {
        let creds = &self.credentials;
        let url = format!("{}/auth/tokens", creds.auth_url.trim_end_matches('/'));
        tracing::debug!(url = %url, user = %creds.username, "Requesting token");

        let body = json!({
            "auth": {
                "identity": {
                    "methods": ["password"],
                    "password": {
                        "user": {
                            "name": creds.username,
                            "password": creds.password,
                            "domain": { "name": creds.domain },
                        }
                    }
                },
                "scope": {
                    "project": { "id": creds.tenant_id }
                }
            }
        });

        let response = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Network(format!("identity service unreachable: {e}")))?;

        let status = response.status();
        let headers = response.headers().clone();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| Error::Network(format!("reading identity response: {e}")))?;

        if !status.is_success() {
            return Err(Error::Auth(describe_status(status, &bytes)));
        }

        let parsed: TokenResponse = serde_json::from_slice(&bytes)
            .map_err(|e| Error::Auth(format!("malformed identity response: {e}")))?;

        let token = token_from_header(&headers)
            .or_else(|| token_from_cookie(&headers))
            .or_else(|| parsed.token.id.clone())
            .ok_or_else(|| Error::Auth("identity response carried no token".to_string()))?;

        let storage_endpoint = storage_endpoint(&parsed.token.catalog, &creds.region)?;
        tracing::info!(endpoint = %storage_endpoint, "Authenticated");

        Ok(Session {
            token,
            storage_endpoint,
        })
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    token: TokenBody,
}

#[derive(Debug, Deserialize)]
struct TokenBody {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    catalog: Vec<CatalogEntry>,
}

#[derive(Debug, Deserialize)]
struct CatalogEntry {
    #[serde(rename = "type")]
    service_type: String,
    #[serde(default)]
    endpoints: Vec<CatalogEndpoint>,
}

#[derive(Debug, Deserialize)]
struct CatalogEndpoint {
    interface: String,
    #[serde(default)]
    region: Option<String>,
    #[serde(default)]
    region_id: Option<String>,
    url: String,
}

impl CatalogEndpoint {
    fn in_region(&self, region: &str) -> bool {
        self.region.as_deref() == Some(region) || self.region_id.as_deref() == Some(region)
    }

    fn is_global(&self) -> bool {
        self.region.is_none() && self.region_id.is_none()
    }
}

fn describe_status(status: StatusCode, body: &[u8]) -> String {
    let text = String::from_utf8_lossy(body);
    let text = text.trim();
    if text.is_empty() {
        format!("identity service returned HTTP {}", status.as_u16())
    } else {
        format!("identity service returned HTTP {}: {text}", status.as_u16())
    }
}

fn token_from_header(headers: &HeaderMap) -> Option<String> {
    headers
        .get(SUBJECT_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn token_from_cookie(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .filter_map(|cookie| cookie.split(';').next())
        .filter_map(|pair| pair.split_once('='))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case(SUBJECT_TOKEN_HEADER))
        .map(|(_, value)| value.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Pick the public object-storage endpoint, preferring `region`
fn storage_endpoint(catalog: &[CatalogEntry], region: &str) -> Result<String> {
    let public: Vec<&CatalogEndpoint> = catalog
        .iter()
        .filter(|entry| entry.service_type == OBJECT_STORE_TYPE)
        .flat_map(|entry| entry.endpoints.iter())
        .filter(|endpoint| endpoint.interface == PUBLIC_INTERFACE)
        .collect();

    if public.is_empty() {
        return Err(Error::Catalog(format!(
            "no public {OBJECT_STORE_TYPE} endpoint in the service catalog"
        )));
    }

    // Endpoints pinned to another region are never used.
    let chosen = public
        .iter()
        .find(|endpoint| endpoint.in_region(region))
        .or_else(|| public.iter().find(|endpoint| endpoint.is_global()))
        .ok_or_else(|| {
            Error::Catalog(format!(
                "no public {OBJECT_STORE_TYPE} endpoint for region '{region}' in the service catalog"
            ))
        })?;

    let url = Url::parse(&chosen.url)
        .map_err(|e| Error::Catalog(format!("invalid endpoint '{}': {e}", chosen.url)))?;
    Ok(url.as_str().trim_end_matches('/').to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use httpmock::MockServer;
    use httpmock::prelude::*;
    use serde_json::Value;

    fn credentials(auth_url: String) -> Credentials {
        Credentials {
            username: "alice".to_string(),
            password: "secret".to_string(),
            domain: "acme".to_string(),
            tenant_id: "tenant-1".to_string(),
            region: "eu-west-0".to_string(),
            auth_url,
            access_key: None,
            secret_key: None,
            obs_endpoint: "https://obs.eu-west-0.example.com".to_string(),
        }
    }

    fn catalog_body(token_id: Option<&str>) -> Value {
        json!({
            "token": {
                "id": token_id,
                "catalog": [
                    {
                        "type": "compute",
                        "endpoints": [
                            { "interface": "public", "region": "eu-west-0", "url": "https://ecs.example.com" }
                        ]
                    },
                    {
                        "type": "object-store",
                        "endpoints": [
                            { "interface": "internal", "region": "eu-west-0", "url": "https://internal.example.com" },
                            { "interface": "public", "region": "ap-south-1", "url": "https://obs.ap-south-1.example.com" },
                            { "interface": "public", "region": "eu-west-0", "url": "https://obs.eu-west-0.example.com/" }
                        ]
                    }
                ]
            }
        })
    }

    fn session(server: &MockServer) -> AuthSession {
        AuthSession::new(reqwest::Client::new(), credentials(server.url("/v3")))
    }

    #[tokio::test]
    async fn test_token_from_header_and_regional_endpoint() -> Result<()> {
        let server = MockServer::start_async().await;
        let mock = server.mock(|when, then| {
            when.method(POST).path("/v3/auth/tokens");
            then.status(201)
                .header(SUBJECT_TOKEN_HEADER, "header-token")
                .json_body(catalog_body(Some("body-token")));
        });

        let auth = session(&server);
        assert!(!auth.is_authenticated());
        let session = auth.authenticate().await?;

        mock.assert();
        assert_eq!(session.token, "header-token");
        assert_eq!(session.storage_endpoint, "https://obs.eu-west-0.example.com");
        assert!(auth.is_authenticated());
        Ok(())
    }

    #[tokio::test]
    async fn test_authenticate_is_idempotent() -> Result<()> {
        let server = MockServer::start_async().await;
        let mock = server.mock(|when, then| {
            when.method(POST).path("/v3/auth/tokens");
            then.status(201)
                .header(SUBJECT_TOKEN_HEADER, "once")
                .json_body(catalog_body(None));
        });

        let auth = session(&server);
        let (first, second) = tokio::join!(auth.authenticate(), auth.authenticate());
        assert_eq!(first?.token, "once");
        assert_eq!(second?.token, "once");
        auth.authenticate().await?;

        mock.assert();
        Ok(())
    }

    #[tokio::test]
    async fn test_token_from_cookie() -> Result<()> {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(POST).path("/v3/auth/tokens");
            then.status(201)
                .header("Set-Cookie", "X-Subject-Token=cookie-token; Path=/; HttpOnly")
                .json_body(catalog_body(Some("body-token")));
        });

        let auth = session(&server);
        assert_eq!(auth.authenticate().await?.token, "cookie-token");
        Ok(())
    }

    #[tokio::test]
    async fn test_token_from_body() -> Result<()> {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(POST).path("/v3/auth/tokens");
            then.status(201).json_body(catalog_body(Some("body-token")));
        });

        let auth = session(&server);
        assert_eq!(auth.authenticate().await?.token, "body-token");
        Ok(())
    }

    #[tokio::test]
    async fn test_missing_token_is_auth_error() -> Result<()> {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(POST).path("/v3/auth/tokens");
            then.status(201).json_body(catalog_body(None));
        });

        let err = session(&server).authenticate().await.unwrap_err();
        assert!(matches!(err, Error::Auth(_)));
        Ok(())
    }

    #[tokio::test]
    async fn test_rejected_credentials_report_status() -> Result<()> {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(POST).path("/v3/auth/tokens");
            then.status(401).body("The request you have made requires authentication.");
        });

        let auth = session(&server);
        let err = auth.authenticate().await.unwrap_err();
        assert!(matches!(err, Error::Auth(_)));
        assert!(err.to_string().contains("401"));
        assert!(!auth.is_authenticated());
        Ok(())
    }

    #[tokio::test]
    async fn test_missing_object_store_is_catalog_error() -> Result<()> {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(POST).path("/v3/auth/tokens");
            then.status(201)
                .header(SUBJECT_TOKEN_HEADER, "t")
                .json_body(json!({ "token": { "catalog": [] } }));
        });

        let err = session(&server).authenticate().await.unwrap_err();
        assert!(matches!(err, Error::Catalog(_)));
        Ok(())
    }

    #[test]
    fn test_endpoint_of_another_region_is_rejected() {
        let body: TokenResponse = serde_json::from_value(catalog_body(None)).unwrap();
        let err = storage_endpoint(&body.token.catalog, "cn-north-4").unwrap_err();
        assert!(matches!(err, Error::Catalog(_)));
        assert!(err.to_string().contains("cn-north-4"));
    }

    #[test]
    fn test_endpoint_falls_back_to_regionless_public() {
        let body: TokenResponse = serde_json::from_value(serde_json::json!({
            "token": {
                "catalog": [{
                    "type": "object-store",
                    "endpoints": [
                        { "interface": "public", "region": "ap-south-1", "url": "https://obs.ap-south-1.example.com" },
                        { "interface": "public", "url": "https://obs.example.com/" }
                    ]
                }]
            }
        }))
        .unwrap();
        let endpoint = storage_endpoint(&body.token.catalog, "cn-north-4").unwrap();
        assert_eq!(endpoint, "https://obs.example.com");
    }

    #[test]
    fn test_preset_session_skips_exchange() {
        let preset = Session {
            token: "t".to_string(),
            storage_endpoint: "http://localhost".to_string(),
        };
        let auth = AuthSession::with_session(
            reqwest::Client::new(),
            credentials("http://unused".to_string()),
            preset,
        );
        assert!(auth.is_authenticated());
    }
}
