//! Storage backend traits
//!
//! The transfer engine only talks to the object store through these traits.
//! `ObjectStore` covers metadata operations served by the SDK client;
//! `ObjectReader` is the raw streamed GET path.

use std::path::Path;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use serde::Serialize;

use crate::error::Result;
use crate::path::RemotePath;

/// Metadata for a single object
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ObjectInfo {
    /// Full object key
    pub key: String,
    pub size_bytes: i64,
    /// Last-modified value exactly as reported by the service
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<String>,
}

impl ObjectInfo {
    pub fn new(key: impl Into<String>, size_bytes: i64) -> Self {
        Self {
            key: key.into(),
            size_bytes,
            last_modified: None,
        }
    }
}

/// Live response body of a streamed GET
pub struct ObjectStream {
    pub body: BoxStream<'static, std::io::Result<Bytes>>,
    /// Advertised `Content-Length`, when the server sent one
    pub content_length: Option<u64>,
    /// Raw `Last-Modified` header
    pub last_modified: Option<String>,
}

impl std::fmt::Debug for ObjectStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectStream")
            .field("content_length", &self.content_length)
            .field("last_modified", &self.last_modified)
            .finish_non_exhaustive()
    }
}

/// Object metadata operations
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// List every object whose key starts with `prefix`, across all pages
    async fn list_objects(&self, container: &str, prefix: &str) -> Result<Vec<ObjectInfo>>;

    /// Upload a local file to `path`
    async fn put_object(&self, path: &RemotePath, source: &Path) -> Result<ObjectInfo>;

    async fn delete_object(&self, path: &RemotePath) -> Result<()>;

    /// Server-side copy of one object
    async fn copy_object(&self, src: &RemotePath, dst: &RemotePath) -> Result<()>;
}

/// Streamed object reads
#[async_trait]
pub trait ObjectReader: Send + Sync {
    /// Open a streamed GET for one object; the caller owns the body
    async fn get_object_stream(&self, path: &RemotePath) -> Result<ObjectStream>;
}
