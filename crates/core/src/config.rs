//! Configuration management
//!
//! Handles loading and saving `config.toml`, which holds credential profiles
//! and transfer tuning. The directory defaults to `<config_dir>/obsctl` and can
//! be overridden with `OBSCTL_CONFIG_DIR`.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Environment variable overriding the configuration directory
pub const CONFIG_DIR_ENV: &str = "OBSCTL_CONFIG_DIR";

/// Environment variable overriding the profile region
pub const REGION_ENV: &str = "OBS_REGION";

const CONFIG_FILE: &str = "config.toml";
const DEFAULT_PROFILE: &str = "default";

/// Default identity endpoint template; `{region}` is substituted
pub const DEFAULT_AUTH_URL: &str = "https://iam.{region}.myhuaweicloud.com/v3";

/// Default object-storage endpoint template for SDK operations
pub const DEFAULT_OBS_ENDPOINT: &str = "https://obs.{region}.myhuaweicloud.com";

/// Root configuration document
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Profile used when none is selected on the command line
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_profile: Option<String>,

    #[serde(default)]
    pub profiles: BTreeMap<String, Profile>,

    #[serde(default)]
    pub transfer: TransferConfig,
}

/// Credentials and endpoints for one account
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Profile {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    /// Account domain; the username is used when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(default)]
    pub tenant_id: String,
    #[serde(default)]
    pub region: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub obs_endpoint: Option<String>,
}

/// Transfer tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferConfig {
    /// Maximum simultaneous uploads in a batch
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Longest wait for any response data before a call is abandoned.
    /// Bodies that keep making progress are never cut off.
    #[serde(default = "default_read_timeout")]
    pub read_timeout_secs: u64,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

fn default_concurrency() -> usize {
    10
}

fn default_read_timeout() -> u64 {
    120
}

fn default_connect_timeout() -> u64 {
    30
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            read_timeout_secs: default_read_timeout(),
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

impl TransferConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

/// Fully resolved credentials for one invocation
#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
    pub domain: String,
    pub tenant_id: String,
    pub region: String,
    /// Identity endpoint with the region already substituted
    pub auth_url: String,
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
    /// Object-storage endpoint with the region already substituted
    pub obs_endpoint: String,
}

impl Credentials {
    /// Access and secret key pair required by SDK operations
    pub fn key_pair(&self) -> Result<(&str, &str)> {
        match (self.access_key.as_deref(), self.secret_key.as_deref()) {
            (Some(ak), Some(sk)) if !ak.is_empty() && !sk.is_empty() => Ok((ak, sk)),
            _ => Err(Error::Config(
                "access_key and secret_key are required for object operations".to_string(),
            )),
        }
    }
}

impl Config {
    /// Resolve the credentials of a profile.
    ///
    /// Region precedence: `region_override` (the `--region` flag), then
    /// `OBS_REGION`, then the profile. Credential fields may be overridden
    /// through `OBS_USERNAME`, `OBS_PASSWORD`, `OBS_DOMAIN`, `OBS_TENANT_ID`,
    /// `OBS_ACCESS_KEY` and `OBS_SECRET_KEY`.
    pub fn resolve(
        &self,
        profile_name: Option<&str>,
        region_override: Option<&str>,
    ) -> Result<Credentials> {
        self.resolve_with(profile_name, region_override, |name| {
            std::env::var(name).ok().filter(|v| !v.is_empty())
        })
    }

    fn resolve_with(
        &self,
        profile_name: Option<&str>,
        region_override: Option<&str>,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Credentials> {
        let name = profile_name
            .or(self.default_profile.as_deref())
            .unwrap_or(DEFAULT_PROFILE);

        let profile = match self.profiles.get(name) {
            Some(p) => p.clone(),
            // An unconfigured default profile is allowed; env may fill it in.
            None if profile_name.is_none() => Profile::default(),
            None => return Err(Error::Config(format!("Profile '{name}' not found"))),
        };

        let pick = |var: &str, value: String| env(var).unwrap_or(value);
        let pick_opt = |var: &str, value: Option<String>| env(var).or(value);

        let region = region_override
            .map(str::to_string)
            .or_else(|| env(REGION_ENV))
            .unwrap_or(profile.region);
        let username = pick("OBS_USERNAME", profile.username);
        let domain = pick_opt("OBS_DOMAIN", profile.domain).unwrap_or_else(|| username.clone());

        let credentials = Credentials {
            password: pick("OBS_PASSWORD", profile.password),
            tenant_id: pick("OBS_TENANT_ID", profile.tenant_id),
            auth_url: expand_region(
                profile.auth_url.as_deref().unwrap_or(DEFAULT_AUTH_URL),
                &region,
            ),
            obs_endpoint: expand_region(
                profile.obs_endpoint.as_deref().unwrap_or(DEFAULT_OBS_ENDPOINT),
                &region,
            ),
            access_key: pick_opt("OBS_ACCESS_KEY", profile.access_key),
            secret_key: pick_opt("OBS_SECRET_KEY", profile.secret_key),
            username,
            domain,
            region,
        };

        for (field, value) in [
            ("region", &credentials.region),
            ("username", &credentials.username),
            ("password", &credentials.password),
            ("tenant_id", &credentials.tenant_id),
        ] {
            if value.is_empty() {
                return Err(Error::Config(format!(
                    "'{field}' is not set for profile '{name}'"
                )));
            }
        }

        Ok(credentials)
    }
}

fn expand_region(template: &str, region: &str) -> String {
    template.replace("{region}", region)
}

/// Loads and persists [`Config`]
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    /// Create a manager for the default configuration location
    pub fn new() -> Result<Self> {
        let dir = match std::env::var_os(CONFIG_DIR_ENV) {
            Some(dir) => PathBuf::from(dir),
            None => dirs::config_dir()
                .ok_or_else(|| {
                    Error::Config("Could not determine configuration directory".to_string())
                })?
                .join("obsctl"),
        };
        Ok(Self::with_path(dir.join(CONFIG_FILE)))
    }

    /// Create a manager for an explicit file (used by tests)
    pub fn with_path(config_path: PathBuf) -> Self {
        Self { config_path }
    }

    /// Load the configuration; a missing file yields the defaults
    pub fn load(&self) -> Result<Config> {
        if !self.config_path.exists() {
            tracing::debug!(path = %self.config_path.display(), "No config file, using defaults");
            return Ok(Config::default());
        }

        let content = std::fs::read_to_string(&self.config_path)
            .map_err(|e| Error::fs(&self.config_path, e))?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }
}
