//! Query granularities

use serde::{Deserialize, Serialize};

/// Named granularities Druid accepts as a plain string
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimpleGranularity {
    All,
    None,
    Minute,
    FifteenMinute,
    ThirtyMinute,
    Hour,
    Day,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Granularity {
    Simple(SimpleGranularity),
    Spec(GranularitySpec),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum GranularitySpec {
    Period {
        period: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        time_zone: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        origin: Option<String>,
    },
    Duration {
        duration: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        origin: Option<String>,
    },
}

impl Granularity {
    pub fn all() -> Self {
        Granularity::Simple(SimpleGranularity::All)
    }

    /// Whether the whole interval collapses into one time bucket
    pub fn is_all(&self) -> bool {
        matches!(self, Granularity::Simple(SimpleGranularity::All))
    }
}

impl Default for Granularity {
    fn default() -> Self {
        Self::all()
    }
}
