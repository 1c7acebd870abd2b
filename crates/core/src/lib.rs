//! obs-core: Core library for the obsctl object storage client
//!
//! This crate provides the core functionality for obsctl, including:
//! - Configuration and credential resolution
//! - `obs://` location parsing
//! - ObjectStore and ObjectReader traits for storage access
//! - The cp/mv/sync transfer engine
//!
//! This crate is independent of any specific HTTP client or SDK, so the
//! engine can be exercised against in-memory stores in tests.

pub mod config;
pub mod error;
pub mod path;
pub mod traits;
pub mod transfer;

pub use config::{Config, ConfigManager, Credentials, Profile, TransferConfig};
pub use error::{Error, Result};
pub use path::{Location, REMOTE_SCHEME, RemotePath, parse_location};
pub use traits::{ObjectInfo, ObjectReader, ObjectStore, ObjectStream};
