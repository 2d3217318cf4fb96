use serde_json::Value as JsonValue;

use crate::config::ProviderConfig;

/// Account and network view answered locally, without the host.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProviderState {
    address: String,
    chain_id: String,
    network_version: String,
    debug: bool,
}

impl ProviderState {
    pub fn from_config(config: &ProviderConfig) -> Self {
        let mut state = Self {
            address: String::new(),
            chain_id: format!("0x{:x}", config.chain_id),
            network_version: config.chain_id.to_string(),
            debug: config.debug,
        };
        state.set_address(config.address.as_deref().unwrap_or_default());
        state
    }

    pub fn set_address(&mut self, address: &str) {
        self.address = address.trim().to_ascii_lowercase();
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn chain_id(&self) -> &str {
        &self.chain_id
    }

    pub fn network_version(&self) -> &str {
        &self.network_version
    }

    pub fn is_ready(&self) -> bool {
        !self.address.is_empty()
    }

    pub fn is_debug(&self) -> bool {
        self.debug
    }

    pub fn accounts(&self) -> Vec<String> {
        if self.is_ready() {
            vec![self.address.clone()]
        } else {
            Vec::new()
        }
    }

    pub(crate) fn accounts_value(&self) -> JsonValue {
        JsonValue::from(self.accounts())
    }
}
