mod replay;
mod templates;

use geowatch_logic::HostVersion;

pub use replay::{ReplayLocation, TrackStep, load_track, parse_track};
pub use templates::VariableTemplates;

pub mod prelude {
    pub use anyhow::{Context, anyhow, bail};
    pub type Result<T = (), E = anyhow::Error> = std::result::Result<T, E>;
}

pub use prelude::*;

/// Parse a `major.minor[.patch]` version string for the host named `title`
pub fn parse_host_version(title: &str, raw: &str) -> Result<HostVersion> {
    let mut parts = raw.trim().split('.').map(|p| {
        p.parse::<u32>()
            .with_context(|| format!("Invalid version component \"{p}\" in \"{raw}\""))
    });

    let major = parts
        .next()
        .ok_or_else(|| anyhow!("Empty version"))??;
    let minor = parts
        .next()
        .ok_or_else(|| anyhow!("Version \"{raw}\" has no minor component"))??;
    let patch = parts.next().transpose()?.unwrap_or(0);

    if parts.next().is_some() {
        bail!("Version \"{raw}\" has too many components");
    }

    Ok(HostVersion::new(title, major, minor, patch))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_versions() {
        assert_eq!(
            parse_host_version("SugarCube", "2.37.3").expect("Failed to parse"),
            HostVersion::new("SugarCube", 2, 37, 3)
        );
        assert_eq!(
            parse_host_version("SugarCube", "2.5").expect("Failed to parse"),
            HostVersion::new("SugarCube", 2, 5, 0)
        );
        assert!(parse_host_version("SugarCube", "2").is_err());
        assert!(parse_host_version("SugarCube", "2.x").is_err());
        assert!(parse_host_version("SugarCube", "1.2.3.4").is_err());
    }
}
