//! Registry configuration

use serde::Deserialize;

/// Default cap on registered channels
pub const DEFAULT_MAX_CHANNELS: usize = 256;

/// Default cap on channel name length in bytes
pub const DEFAULT_MAX_NAME_LEN: usize = 100;

/// Channel registry configuration options
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Maximum number of channels (0 = unlimited)
    pub max_channels: usize,

    /// Maximum channel name length in bytes
    pub max_name_len: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            max_channels: DEFAULT_MAX_CHANNELS,
            max_name_len: DEFAULT_MAX_NAME_LEN,
        }
    }
}

impl RegistryConfig {
    /// Set maximum channels
    pub fn max_channels(mut self, max: usize) -> Self {
        self.max_channels = max;
        self
    }

    /// Set maximum channel name length
    pub fn max_name_len(mut self, len: usize) -> Self {
        self.max_name_len = len;
        self
    }
}
