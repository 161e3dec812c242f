use serde::{Deserialize, Serialize};

use crate::prelude::*;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
/// Identity and version the story engine reports about itself
pub struct HostVersion {
    pub title: String,
    pub major: u32,
    pub minor: u32,
    #[serde(default)]
    pub patch: u32,
}

impl HostVersion {
    pub fn new(title: impl Into<String>, major: u32, minor: u32, patch: u32) -> Self {
        Self {
            title: title.into(),
            major,
            minor,
            patch,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
/// The oldest story engine the directives can be loaded into
pub struct HostRequirement {
    pub title: String,
    pub major: u32,
    pub minor: u32,
}

impl Default for HostRequirement {
    fn default() -> Self {
        Self {
            title: "SugarCube".to_string(),
            major: 2,
            minor: 5,
        }
    }
}

impl HostRequirement {
    /// Major and minor are each held to their own floor, so a new major
    /// line with a low minor (3.0 against 2.5) is refused.
    pub fn is_met_by(&self, host: &HostVersion) -> bool {
        host.title == self.title && host.major >= self.major && host.minor >= self.minor
    }

    /// Fail the whole load unless `host` is present, has the right title and is
    /// at least the required version.
    pub fn check(&self, host: Option<&HostVersion>) -> Result {
        match host {
            Some(host) if self.is_met_by(host) => Ok(()),
            _ => bail!(
                "Geolocation directives require {} {}.{}.0 or greater, aborting load",
                self.title,
                self.major,
                self.minor
            ),
        }
    }
}
