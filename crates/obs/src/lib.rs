//! obs-client: network adapters for obsctl
//!
//! - [`AuthSession`]: lazy token exchange with the identity service
//! - [`RawStreamClient`]: streamed object GET using that token
//! - [`ObsClient`]: aws-sdk-s3 client for list, put, delete and copy

mod auth;
mod client;
mod raw;

pub use auth::{AuthSession, SUBJECT_TOKEN_HEADER, Session};
pub use client::ObsClient;
pub use raw::{AUTH_TOKEN_HEADER, RawStreamClient};

use obs_core::{Error, Result, TransferConfig};

/// Build the shared HTTP client with the configured deadlines.
///
/// Only connecting and waiting between reads are bounded; a body that keeps
/// arriving is read to the end however long it takes.
pub fn http_client(transfer: &TransferConfig) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .read_timeout(transfer.read_timeout())
        .connect_timeout(transfer.connect_timeout())
        .user_agent(concat!("obsctl/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| Error::Network(format!("failed to build HTTP client: {e}")))
}
