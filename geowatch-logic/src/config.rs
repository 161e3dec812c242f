use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{host::HostRequirement, location::WatchOptions, prelude::*};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
/// Settings for the directive set, chosen by the story author
pub struct PluginConfig {
    /// Story variable the location record is kept in
    pub state_key: String,
    /// Class of the container `live-update` renders into
    pub wrapper_class: String,
    /// Options handed to the platform for every watch
    pub watch: WatchOptions,
    /// Story engine the directives refuse to load without
    pub required_host: HostRequirement,
    /// Show live regions as blocks in the story's debug view
    pub debug: bool,
}

impl Default for PluginConfig {
    fn default() -> Self {
        Self {
            state_key: "location".to_string(),
            wrapper_class: "macro-live-update".to_string(),
            watch: WatchOptions::default(),
            required_host: HostRequirement::default(),
            debug: false,
        }
    }
}

impl PluginConfig {
    pub fn from_json(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).context("Failed to parse plugin config")
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        Self::from_json(&raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_object_gives_defaults() {
        let config = PluginConfig::from_json("{}").expect("Failed to parse");
        assert_eq!(config, PluginConfig::default());
        assert_eq!(config.state_key, "location");
        assert!(!config.debug);
    }

    #[test]
    fn debug_view_can_be_turned_on() {
        let config = PluginConfig::from_json(r#"{ "debug": true }"#).expect("Failed to parse");
        assert!(config.debug);
        assert_eq!(config.wrapper_class, "macro-live-update");
    }

    #[test]
    fn partial_overrides() {
        let config = PluginConfig::from_json(
            r#"{ "state_key": "here", "watch": { "enable_high_accuracy": true, "timeout_ms": 5000 } }"#,
        )
        .expect("Failed to parse");
        assert_eq!(config.state_key, "here");
        assert!(config.watch.enable_high_accuracy);
        assert_eq!(config.watch.maximum_age_ms, 0);
        assert_eq!(config.watch.timeout_ms, Some(5000));
        assert_eq!(config.wrapper_class, "macro-live-update");
    }

    #[test]
    fn garbage_is_an_error() {
        assert!(PluginConfig::from_json("[1, 2]").is_err());
    }
}
