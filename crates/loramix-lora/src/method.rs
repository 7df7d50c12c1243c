//! Merge method selection

use crate::error::MergeError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How two or more LoRAs are combined
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeMethod {
    /// Strength-weighted sum of tensors
    #[default]
    Linear,
    /// Linear merge with strengths normalized by the sum of their magnitudes
    WeightedAverage,
    /// Stack rank-decomposition factors instead of summing them
    Concatenation,
}

impl MergeMethod {
    /// All methods, in the order offered to users
    pub const ALL: [MergeMethod; 3] = [
        MergeMethod::Linear,
        MergeMethod::WeightedAverage,
        MergeMethod::Concatenation,
    ];

    /// Stable identifier
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Linear => "linear",
            Self::WeightedAverage => "weighted_average",
            Self::Concatenation => "concatenation",
        }
    }

    /// One-line description
    pub fn description(&self) -> &'static str {
        match self {
            Self::Linear => "Direct weighted addition (fastest, simplest)",
            Self::WeightedAverage => "Normalized linear merge (prevents overpowering)",
            Self::Concatenation => "Stacks LoRA factors (preserves low-rank structure)",
        }
    }

    /// What the method suits best
    pub fn best_for(&self) -> &'static str {
        match self {
            Self::Linear => "General purpose, quick merging",
            Self::WeightedAverage => "Balanced strength regardless of input weights",
            Self::Concatenation => "Keeping each LoRA's internal structure intact",
        }
    }
}

impl fmt::Display for MergeMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MergeMethod {
    type Err = MergeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "linear" => Ok(Self::Linear),
            "weighted_average" | "average" => Ok(Self::WeightedAverage),
            "concatenation" | "concat" => Ok(Self::Concatenation),
            _ => Err(MergeError::UnknownMergeMethod(s.to_string())),
        }
    }
}

impl<'de> Deserialize<'de> for MergeMethod {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let name = String::deserialize(deserializer)?;
        name.parse().map_err(serde::de::Error::custom)
    }
}

/// What the weighted average does when every strength is zero
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ZeroSumPolicy {
    /// Every input gets weight 0, so each key maps to a zero tensor
    #[default]
    Zeros,
    /// Every input gets weight 1/N
    Uniform,
}

impl FromStr for ZeroSumPolicy {
    type Err = MergeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "zeros" | "zero" => Ok(Self::Zeros),
            "uniform" => Ok(Self::Uniform),
            other => Err(MergeError::Recipe(format!(
                "unknown zero-sum policy '{other}'"
            ))),
        }
    }
}

impl<'de> Deserialize<'de> for ZeroSumPolicy {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let name = String::deserialize(deserializer)?;
        name.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_method() {
        assert_eq!("linear".parse::<MergeMethod>().unwrap(), MergeMethod::Linear);
        assert_eq!(
            "Weighted-Average".parse::<MergeMethod>().unwrap(),
            MergeMethod::WeightedAverage
        );
        assert_eq!(
            "concat".parse::<MergeMethod>().unwrap(),
            MergeMethod::Concatenation
        );
        assert!(matches!(
            "slerp".parse::<MergeMethod>(),
            Err(MergeError::UnknownMergeMethod(_))
        ));
    }

    #[test]
    fn test_method_roundtrips_through_name() {
        for method in MergeMethod::ALL {
            assert_eq!(method.as_str().parse::<MergeMethod>().unwrap(), method);
        }
    }

    #[test]
    fn test_serde_names() {
        let json = serde_json::to_string(&MergeMethod::WeightedAverage).unwrap();
        assert_eq!(json, "\"weighted_average\"");
        let policy: ZeroSumPolicy = serde_json::from_str("\"uniform\"").unwrap();
        assert_eq!(policy, ZeroSumPolicy::Uniform);
    }

    #[test]
    fn test_deserialize_accepts_parse_aliases() {
        for name in ["concat", "Concatenation", "concatenation"] {
            let json = format!("\"{name}\"");
            let method: MergeMethod = serde_json::from_str(&json).unwrap();
            assert_eq!(method, MergeMethod::Concatenation);
        }
        let method: MergeMethod = serde_json::from_str("\"average\"").unwrap();
        assert_eq!(method, MergeMethod::WeightedAverage);

        assert!(serde_json::from_str::<MergeMethod>("\"slerp\"").is_err());
        assert!(serde_json::from_str::<ZeroSumPolicy>("\"Zero\"").is_ok());
    }
}
