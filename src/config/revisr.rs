use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::warn;

use crate::error::{Result, RevisrError};
use crate::vcs::VersionControl;

/// Git config section every revisr key lives under.
pub const CONFIG_SECTION: &str = "revisr";
pub const KEY_TRACKING_MODE: &str = "db-tracking";
pub const KEY_TRACKED_TABLES: &str = "tracked-tables";
pub const KEY_DEV_URL: &str = "dev-url";
pub const KEY_LIVE_URL: &str = "live-url";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackingMode {
    #[default]
    AllTables,
    Custom,
    None,
}

impl TrackingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrackingMode::AllTables => "all_tables",
            TrackingMode::Custom => "custom",
            TrackingMode::None => "none",
        }
    }

    /// Lenient parse used when reading stored settings: anything unset or
    /// unrecognized tracks every table.
    pub fn from_stored(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            None | Some("") => TrackingMode::AllTables,
            Some(raw) => raw.parse().unwrap_or_else(|_| {
                warn!(mode = raw, "unrecognized tracking mode; tracking all tables");
                TrackingMode::AllTables
            }),
        }
    }
}

impl FromStr for TrackingMode {
    type Err = RevisrError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "all_tables" | "all" => Ok(TrackingMode::AllTables),
            "custom" => Ok(TrackingMode::Custom),
            "none" => Ok(TrackingMode::None),
            other => Err(RevisrError::InvalidConfig(format!(
                "unknown tracking mode '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for TrackingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which tables are subject to versioning.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TrackingConfig {
    pub mode: TrackingMode,
    /// Only consulted in [`TrackingMode::Custom`]; kept in configured order.
    pub custom_tables: Vec<String>,
}

impl TrackingConfig {
    pub fn all_tables() -> Self {
        Self::default()
    }

    pub fn none() -> Self {
        Self {
            mode: TrackingMode::None,
            custom_tables: Vec::new(),
        }
    }

    pub fn custom<I, S>(tables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            mode: TrackingMode::Custom,
            custom_tables: tables.into_iter().map(Into::into).collect(),
        }
    }

    pub fn load(vcs: &dyn VersionControl) -> Result<Self> {
        let mode = TrackingMode::from_stored(
            vcs.get_config(CONFIG_SECTION, KEY_TRACKING_MODE)?.as_deref(),
        );
        let custom_tables = vcs.get_config_all(CONFIG_SECTION, KEY_TRACKED_TABLES)?;
        Ok(Self {
            mode,
            custom_tables,
        })
    }

    pub fn save(&self, vcs: &dyn VersionControl) -> Result<()> {
        vcs.set_config(CONFIG_SECTION, KEY_TRACKING_MODE, self.mode.as_str())?;
        if self.mode == TrackingMode::Custom {
            vcs.set_config_all(CONFIG_SECTION, KEY_TRACKED_TABLES, &self.custom_tables)?;
        }
        Ok(())
    }
}

/// String substitution applied to dump content on import, used to move data
/// between a development and a live environment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Substitution {
    pub from: String,
    pub to: String,
}

impl Substitution {
    /// `None` when there is nothing to replace.
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Option<Self> {
        let from = from.into();
        if from.is_empty() {
            return None;
        }
        let to = to.into();
        if from == to {
            return None;
        }
        Some(Self { from, to })
    }

    pub fn apply(&self, content: &[u8]) -> Vec<u8> {
        crate::utils::io::replace_bytes(content, self.from.as_bytes(), self.to.as_bytes())
    }
}

/// Settings read once by the caller and passed into every operation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RevisrConfig {
    pub tracking: TrackingConfig,
    pub substitution: Option<Substitution>,
}

impl RevisrConfig {
    pub fn load(vcs: &dyn VersionControl) -> Result<Self> {
        let tracking = TrackingConfig::load(vcs)?;
        let dev_url = vcs.get_config(CONFIG_SECTION, KEY_DEV_URL)?.unwrap_or_default();
        let live_url = vcs.get_config(CONFIG_SECTION, KEY_LIVE_URL)?.unwrap_or_default();
        Ok(Self {
            tracking,
            substitution: Substitution::new(dev_url, live_url),
        })
    }

    pub fn with_tracking(tracking: TrackingConfig) -> Self {
        Self {
            tracking,
            substitution: None,
        }
    }
}
