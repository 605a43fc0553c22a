use std::{fmt, path::PathBuf, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(pub i64);
    };
}

id_newtype!(RequestId);
id_newtype!(SampleId);

/// Identity of one reconstruction run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(pub Uuid);

impl JobId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Error)]
#[error("unrecognized {what} value '{value}'")]
pub struct ParseValueError {
    pub what: &'static str,
    pub value: String,
}

/// Trade-off between reconstruction robustness and speed/memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureSensitivity {
    #[default]
    Normal,
    High,
}

impl FromStr for FeatureSensitivity {
    type Err = ParseValueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "normal" => Ok(Self::Normal),
            "high" => Ok(Self::High),
            _ => Err(ParseValueError {
                what: "feature sensitivity",
                value: s.to_string(),
            }),
        }
    }
}

/// Whether input images form a continuous capture sequence (enables
/// motion-based heuristics in the engine) or an unordered set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleOrdering {
    Sequential,
    #[default]
    Unordered,
}

impl FromStr for SampleOrdering {
    type Err = ParseValueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sequential" => Ok(Self::Sequential),
            "unordered" => Ok(Self::Unordered),
            _ => Err(ParseValueError {
                what: "sample ordering",
                value: s.to_string(),
            }),
        }
    }
}

/// Desired mesh/texture fidelity, monotonically more expensive upwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Detail {
    Preview,
    Reduced,
    Medium,
    #[default]
    Full,
    Raw,
}

impl FromStr for Detail {
    type Err = ParseValueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "preview" => Ok(Self::Preview),
            "reduced" => Ok(Self::Reduced),
            "medium" => Ok(Self::Medium),
            "full" => Ok(Self::Full),
            "raw" => Ok(Self::Raw),
            _ => Err(ParseValueError {
                what: "detail",
                value: s.to_string(),
            }),
        }
    }
}

/// Immutable engine configuration for one job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Configuration {
    pub feature_sensitivity: FeatureSensitivity,
    pub sample_ordering: SampleOrdering,
}

/// One desired output artifact within a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestSpec {
    pub output_path: PathBuf,
    pub detail: Detail,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_configuration_values_case_insensitively() {
        assert_eq!(
            "High".parse::<FeatureSensitivity>().unwrap(),
            FeatureSensitivity::High
        );
        assert_eq!(
            "SEQUENTIAL".parse::<SampleOrdering>().unwrap(),
            SampleOrdering::Sequential
        );
        assert_eq!("raw".parse::<Detail>().unwrap(), Detail::Raw);
    }

    #[test]
    fn rejects_unknown_detail_value() {
        let err = "ultra".parse::<Detail>().unwrap_err();
        assert!(err.to_string().contains("ultra"));
    }

    #[test]
    fn detail_orders_by_cost() {
        assert!(Detail::Preview < Detail::Reduced);
        assert!(Detail::Full < Detail::Raw);
    }
}
