use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::registry::DuplicateIdPolicy;

/// Provider configuration as supplied by the embedding host.
///
/// ```toml
/// address = "0xAbC..."
/// chain_id = 1
/// rpc_url = "http://127.0.0.1:8545"
/// request_timeout_ms = 300000
/// duplicate_ids = "reject"
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default)]
    pub address: Option<String>,
    pub chain_id: u64,
    #[serde(default)]
    pub rpc_url: String,
    #[serde(default)]
    pub debug: bool,
    #[serde(default)]
    pub request_timeout_ms: Option<u64>,
    #[serde(default)]
    pub duplicate_ids: DuplicateIdPolicy,
}

impl ProviderConfig {
    pub fn new(chain_id: u64, rpc_url: impl Into<String>) -> Self {
        Self { chain_id, rpc_url: rpc_url.into(), ..Self::default() }
    }

    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = Some(address.into());
        self
    }

    pub fn from_toml(input: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(input)
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, std::io::Error> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml(&contents)
            .map_err(|err| std::io::Error::new(std::io::ErrorKind::InvalidData, err))
    }

    /// `None` or zero disables expiry of pending host calls.
    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_ms.filter(|ms| *ms > 0).map(Duration::from_millis)
    }
}
