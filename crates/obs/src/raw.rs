//! Streamed object GET over the token-authenticated REST path

use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::StatusCode;
use reqwest::header::LAST_MODIFIED;

use obs_core::{Error, ObjectReader, ObjectStream, RemotePath, Result};

use crate::auth::AuthSession;

/// Header carrying the session token on object requests
pub const AUTH_TOKEN_HEADER: &str = "X-Auth-Token";

/// Raw HTTP client for object downloads
pub struct RawStreamClient {
    http: reqwest::Client,
    auth: Arc<AuthSession>,
}

impl RawStreamClient {
    pub fn new(http: reqwest::Client, auth: Arc<AuthSession>) -> Self {
        Self { http, auth }
    }

    fn object_url(endpoint: &str, path: &RemotePath) -> String {
        format!(
            "{}/{}/{}",
            endpoint.trim_end_matches('/'),
            urlencoding::encode(&path.container),
            encode_key(&path.key)
        )
    }
}

/// Percent-encode each segment of an object key, keeping the `/` separators
fn encode_key(key: &str) -> String {
    key.split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

#[async_trait]
impl ObjectReader for RawStreamClient {
    async fn get_object_stream(&self, path: &RemotePath) -> Result<ObjectStream> {
        let session = self.auth.authenticate().await?;
        let url = Self::object_url(&session.storage_endpoint, path);
        tracing::debug!(url = %url, "GET object");

        let response = self
            .http
            .get(&url)
            .header(AUTH_TOKEN_HEADER, &session.token)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::Network(format!("{path}: request timed out"))
                } else {
                    Error::Network(format!("{path}: {e}"))
                }
            })?;

        let status = response.status();
        if status != StatusCode::OK {
            let message = status
                .canonical_reason()
                .unwrap_or("unexpected status")
                .to_string();
            return Err(Error::Transfer {
                operation: "GET",
                path: path.to_string(),
                status: status.as_u16(),
                message,
            });
        }

        let content_length = response.content_length();
        let last_modified = response
            .headers()
            .get(LAST_MODIFIED)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(std::io::Error::other))
            .boxed();

        Ok(ObjectStream {
            body,
            content_length,
            last_modified,
        })
    }
}
