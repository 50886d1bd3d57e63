//! Application service: configuration use-cases.

use anyhow::Result;

use crate::application::ports::ConfigStore;
use crate::domain::config::DevpushConfig;

/// Load configuration.
pub fn load_config(store: &impl ConfigStore) -> Result<DevpushConfig> {
    store.load()
}

/// Validate and persist one setting, returning the updated configuration.
pub fn set_value(store: &impl ConfigStore, key: &str, value: &str) -> Result<DevpushConfig> {
    let mut config = store.load()?;
    config.set(key, value)?;
    store.save(&config)?;
    Ok(config)
}
