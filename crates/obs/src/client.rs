//! SDK object client
//!
//! Wraps aws-sdk-s3 against the OBS S3-compatible endpoint and implements the
//! ObjectStore trait from obs-core.

use std::path::Path;

use async_trait::async_trait;
use aws_sdk_s3::error::SdkError;
use aws_sdk_s3::primitives::ByteStream;
use aws_smithy_types::date_time::Format;
use aws_smithy_types::timeout::TimeoutConfig;

use obs_core::{
    Credentials, Error, ObjectInfo, ObjectStore, RemotePath, Result, TransferConfig,
};

/// Object-storage SDK client
pub struct ObsClient {
    inner: aws_sdk_s3::Client,
}

impl ObsClient {
    /// Create a client from resolved credentials
    pub async fn new(credentials: &Credentials, transfer: &TransferConfig) -> Result<Self> {
        let (access_key, secret_key) = credentials.key_pair()?;

        let sdk_credentials = aws_credential_types::Credentials::new(
            access_key,
            secret_key,
            None, // session token
            None, // expiry
            "obsctl-static-credentials",
        );

        let timeouts = TimeoutConfig::builder()
            .read_timeout(transfer.read_timeout())
            .connect_timeout(transfer.connect_timeout())
            .build();

        let config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .credentials_provider(sdk_credentials)
            .region(aws_config::Region::new(credentials.region.clone()))
            .endpoint_url(&credentials.obs_endpoint)
            .timeout_config(timeouts)
            .load()
            .await;

        let s3_config = aws_sdk_s3::config::Builder::from(&config)
            .force_path_style(true)
            .build();

        Ok(Self {
            inner: aws_sdk_s3::Client::from_conf(s3_config),
        })
    }

    /// Format AWS SDK error into a detailed error message
    fn format_sdk_error<E: std::fmt::Display>(error: &SdkError<E>) -> String {
        match error {
            SdkError::ServiceError(service_err) => {
                let err = service_err.err();
                let meta = service_err.raw();
                let mut msg = format!("Service error: {err}");
                if let Some(code) = meta.headers().get("x-obs-error-code") {
                    msg.push_str(&format!(" (code: {code})"));
                }
                msg
            }
            SdkError::ConstructionFailure(err) => {
                format!("Request construction failed: {err:?}")
            }
            SdkError::TimeoutError(_) => "Request timeout".to_string(),
            SdkError::DispatchFailure(err) => format!("Network dispatch error: {err:?}"),
            SdkError::ResponseError(err) => format!("Response error: {err:?}"),
            _ => error.to_string(),
        }
    }

    /// Map an SDK failure for `path` onto the core error type
    fn map_sdk_error<E: std::fmt::Display>(
        operation: &'static str,
        path: &RemotePath,
        error: &SdkError<E>,
    ) -> Error {
        match error {
            SdkError::ServiceError(service_err) => {
                let status = service_err.raw().status().as_u16();
                if status == 404 {
                    Error::NotFound(path.to_string())
                } else {
                    Error::Transfer {
                        operation,
                        path: path.to_string(),
                        status,
                        message: Self::format_sdk_error(error),
                    }
                }
            }
            SdkError::TimeoutError(_) => Error::Network(format!("{path}: request timed out")),
            _ => Error::Network(Self::format_sdk_error(error)),
        }
    }
}

/// `x-amz-copy-source` value for an object
fn copy_source(path: &RemotePath) -> String {
    format!("{}/{}", path.container, urlencoding::encode(&path.key))
}

fn content_type_for(source: &Path) -> String {
    mime_guess::from_path(source)
        .first_or_octet_stream()
        .to_string()
}

#[async_trait]
impl ObjectStore for ObsClient {
    async fn list_objects(&self, container: &str, prefix: &str) -> Result<Vec<ObjectInfo>> {
        let location = RemotePath::new(container, prefix);
        let mut objects = Vec::new();
        let mut continuation: Option<String> = None;

        loop {
            let mut request = self.inner.list_objects_v2().bucket(container);
            if !prefix.is_empty() {
                request = request.prefix(prefix);
            }
            if let Some(token) = &continuation {
                request = request.continuation_token(token);
            }

            let response = request
                .send()
                .await
                .map_err(|e| Self::map_sdk_error("LIST", &location, &e))?;

            for object in response.contents() {
                let mut info =
                    ObjectInfo::new(object.key().unwrap_or_default(), object.size().unwrap_or(0));
                info.last_modified = object
                    .last_modified()
                    .and_then(|dt| dt.fmt(Format::DateTime).ok());
                objects.push(info);
            }

            continuation = response.next_continuation_token().map(str::to_string);
            if !response.is_truncated().unwrap_or(false) || continuation.is_none() {
                break;
            }
        }

        tracing::debug!(container, prefix, count = objects.len(), "Listed objects");
        Ok(objects)
    }

    async fn put_object(&self, path: &RemotePath, source: &Path) -> Result<ObjectInfo> {
        let size = tokio::fs::metadata(source)
            .await
            .map_err(|e| Error::fs(source, e))?
            .len();
        let body = ByteStream::from_path(source)
            .await
            .map_err(|e| Error::fs(source, std::io::Error::other(e)))?;

        self.inner
            .put_object()
            .bucket(&path.container)
            .key(&path.key)
            .content_type(content_type_for(source))
            .body(body)
            .send()
            .await
            .map_err(|e| Self::map_sdk_error("PUT", path, &e))?;

        Ok(ObjectInfo::new(&path.key, size as i64))
    }

    async fn delete_object(&self, path: &RemotePath) -> Result<()> {
        self.inner
            .delete_object()
            .bucket(&path.container)
            .key(&path.key)
            .send()
            .await
            .map_err(|e| Self::map_sdk_error("DELETE", path, &e))?;

        Ok(())
    }

    async fn copy_object(&self, src: &RemotePath, dst: &RemotePath) -> Result<()> {
        self.inner
            .copy_object()
            .copy_source(copy_source(src))
            .bucket(&dst.container)
            .key(&dst.key)
            .send()
            .await
            .map_err(|e| Self::map_sdk_error("COPY", src, &e))?;

        Ok(())
    }
}
