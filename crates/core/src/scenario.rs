use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Model/scenario contexts offered by the scenario selector, in display order.
pub const KNOWN_SCENARIOS: &[&str] = &[
    "ERA-Interim",
    "GFDL-CM3 Historical",
    "GFDL-CM3 RCP85",
    "NCAR-CCSM4 Historical",
    "NCAR-CCSM4 RCP85",
];

/// Scenario shown when a session opens.
pub const DEFAULT_SCENARIO: &str = "GFDL-CM3 Historical";

/// Name of a model/scenario context.
///
/// Kept as a string on the wire: the closed set is enforced by the
/// `SelectionStore` it was created with, not by the type.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScenarioId(String);

impl ScenarioId {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Name with spaces replaced, for use in file names.
    pub fn file_stem(&self) -> String {
        self.0.replace(' ', "_")
    }

    /// The built-in scenario list.
    pub fn known() -> Vec<ScenarioId> {
        KNOWN_SCENARIOS.iter().map(|s| ScenarioId::new(*s)).collect()
    }
}

impl fmt::Display for ScenarioId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ScenarioId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

/// Temporal resolution a selection applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggregationKind {
    Hourly,
    #[default]
    Daily,
    Monthly,
}

impl AggregationKind {
    pub const ALL: [AggregationKind; 3] = [
        AggregationKind::Hourly,
        AggregationKind::Daily,
        AggregationKind::Monthly,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AggregationKind::Hourly => "hourly",
            AggregationKind::Daily => "daily",
            AggregationKind::Monthly => "monthly",
        }
    }
}

impl fmt::Display for AggregationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseAggregationError(pub String);

impl fmt::Display for ParseAggregationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown aggregation '{}' (expected hourly, daily or monthly)", self.0)
    }
}

impl std::error::Error for ParseAggregationError {}

impl FromStr for AggregationKind {
    type Err = ParseAggregationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "hourly" => Ok(AggregationKind::Hourly),
            "daily" => Ok(AggregationKind::Daily),
            "monthly" => Ok(AggregationKind::Monthly),
            _ => Err(ParseAggregationError(s.to_string())),
        }
    }
}
