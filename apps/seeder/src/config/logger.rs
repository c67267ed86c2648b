use std::str::FromStr;

use serde::Deserialize;
use tracing::metadata::Level;

/// Logging section: one base level for the seeder's own crates, plus
/// optional per-target overrides. An override raises or lowers a single
/// subsystem, e.g. `"flokiseed_peer=trace"` while chasing handshake issues.
#[derive(Debug, Deserialize, Clone)]
pub struct LoggerConfig {
    #[serde(default = "default_level", deserialize_with = "deserialize_level")]
    pub level: Level,

    /// `target=level` pairs applied on top of the base level.
    #[serde(default)]
    pub overrides: Vec<String>,
}

impl LoggerConfig {
    /// Parse the configured `target=level` overrides. A malformed override
    /// is a config error, not something to silently skip.
    pub fn target_overrides(&self) -> eyre::Result<Vec<(String, Level)>> {
        self.overrides
            .iter()
            .map(|directive| {
                let (target, level) = directive.split_once('=').ok_or_else(|| {
                    eyre::eyre!("logger override `{directive}` is not of the form `target=level`")
                })?;
                let level = Level::from_str(level).map_err(|_| {
                    eyre::eyre!("logger override `{directive}` has an unknown level")
                })?;

                Ok((target.to_string(), level))
            })
            .collect()
    }
}

fn deserialize_level<'de, D>(deserializer: D) -> Result<Level, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;

    Level::from_str(&s).map_err(serde::de::Error::custom)
}

fn default_level() -> Level {
    Level::INFO
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            overrides: Vec::new(),
        }
    }
}
