//! Channel registry implementation
//!
//! The central map from channel name to [`Channel`], shared by producers
//! (find-or-create) and HTTP readers (pure lookup).

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use super::channel::{Channel, ChannelStats};
use super::config::RegistryConfig;
use super::error::RegistryError;

struct Channels {
    by_name: HashMap<String, Arc<Channel>>,
    last_id: u64,
}

/// Central registry for all channels
///
/// Thread-safe via `RwLock`. Lookups only take the read lock; registration and
/// removal take the write lock, so find-or-create is atomic.
pub struct ChannelRegistry {
    channels: RwLock<Channels>,

    /// Configuration
    config: RegistryConfig,
}

impl ChannelRegistry {
    /// Create a new channel registry with default configuration
    pub fn new() -> Self {
        Self::with_config(RegistryConfig::default())
    }

    /// Create a new channel registry with custom configuration
    pub fn with_config(config: RegistryConfig) -> Self {
        Self {
            channels: RwLock::new(Channels {
                by_name: HashMap::new(),
                last_id: 0,
            }),
            config,
        }
    }

    /// Get the registry configuration
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Look up a channel by name
    pub fn find_by_name(&self, name: &str) -> Result<Arc<Channel>, RegistryError> {
        self.channels
            .read()
            .by_name
            .get(name)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))
    }

    /// Return the channel registered under `name`, creating it if needed.
    ///
    /// Concurrent callers with the same new name all receive the same
    /// channel object.
    pub fn find_or_register(&self, name: &str) -> Result<Arc<Channel>, RegistryError> {
        if let Some(channel) = self.channels.read().by_name.get(name) {
            return Ok(Arc::clone(channel));
        }

        self.validate_name(name)?;

        let mut channels = self.channels.write();
        let next_id = channels.last_id + 1;
        let count = channels.by_name.len();

        match channels.by_name.entry(name.to_string()) {
            // Another thread registered it between our read and write locks
            Entry::Occupied(entry) => Ok(Arc::clone(entry.get())),
            Entry::Vacant(entry) => {
                if self.config.max_channels > 0 && count >= self.config.max_channels {
                    tracing::warn!(
                        channel = name,
                        max_channels = self.config.max_channels,
                        "Channel rejected: limit reached"
                    );
                    return Err(RegistryError::LimitReached(self.config.max_channels));
                }

                let channel = Arc::new(Channel::new(next_id, name.to_string()));
                entry.insert(Arc::clone(&channel));
                channels.last_id = next_id;

                tracing::info!(channel = name, id = next_id, "Channel registered");
                Ok(channel)
            }
        }
    }

    /// Remove a channel.
    ///
    /// Serialized against `find_or_register` by the write lock: the removed
    /// channel stops accepting updates before the lock is released, and a
    /// later registration under the same name creates a fresh channel.
    pub fn remove(&self, name: &str) -> Result<Arc<Channel>, RegistryError> {
        let (channel, last_frame) = {
            let mut channels = self.channels.write();
            let channel = channels
                .by_name
                .remove(name)
                .ok_or_else(|| RegistryError::NotFound(name.to_string()))?;
            let last_frame = channel.retire();
            (channel, last_frame)
        };
        drop(last_frame);

        tracing::info!(channel = name, id = channel.id(), "Channel removed");
        Ok(channel)
    }

    /// Names of all registered channels, sorted
    pub fn channel_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.channels.read().by_name.keys().cloned().collect();
        names.sort();
        names
    }

    /// Statistics for every channel, ordered by id
    pub fn snapshot(&self) -> Vec<ChannelStats> {
        let channels: Vec<Arc<Channel>> = self.channels.read().by_name.values().cloned().collect();
        let mut stats: Vec<ChannelStats> = channels.iter().map(|c| c.stats()).collect();
        stats.sort_by_key(|s| s.id);
        stats
    }

    /// Get total number of channels
    pub fn len(&self) -> usize {
        self.channels.read().by_name.len()
    }

    /// Whether no channel is registered
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn validate_name(&self, name: &str) -> Result<(), RegistryError> {
        let invalid = name.is_empty()
            || name.len() > self.config.max_name_len
            || name.contains('/')
            || name.chars().any(char::is_control);

        if invalid {
            return Err(RegistryError::InvalidName(name.to_string()));
        }
        Ok(())
    }
}

impl Default for ChannelRegistry {
    fn default() -> Self {
        Self::new()
    }
}
