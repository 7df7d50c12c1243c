//! LoRA compatibility validation
//!
//! Checks whether two LoRAs share enough structure to be merged.

use crate::error::{MergeError, Result};
use crate::format::LoraFormat;
use crate::weights::{TensorSpec, WeightMapping};
use serde::Serialize;
use std::fmt;

/// Compatibility report for a pair of LoRAs
#[derive(Debug, Clone, Serialize)]
pub struct CompatibilityReport {
    /// Can the pair be merged without padding or dtype promotion?
    pub is_compatible: bool,
    /// Detected layout of the first LoRA
    pub lora1_format: LoraFormat,
    /// Detected layout of the second LoRA
    pub lora2_format: LoraFormat,
    /// Keys present in both
    pub common_keys: usize,
    /// Keys only in the first
    pub unique_keys1: usize,
    /// Keys only in the second
    pub unique_keys2: usize,
    /// Total keys in the first
    pub total_keys1: usize,
    /// Total keys in the second
    pub total_keys2: usize,
    /// Problems that make the pair incompatible
    pub issues: Vec<CompatibilityIssue>,
    /// Differences that merging tolerates
    pub warnings: Vec<CompatibilityWarning>,
}

impl CompatibilityReport {
    /// Add an issue
    pub fn add_issue(&mut self, issue: CompatibilityIssue) {
        self.is_compatible = false;
        self.issues.push(issue);
    }

    /// Add a warning
    pub fn add_warning(&mut self, warning: CompatibilityWarning) {
        self.warnings.push(warning);
    }

    /// Check if there are any warnings
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}

/// Problem that blocks a clean merge
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CompatibilityIssue {
    /// Key layouts differ
    FormatMismatch {
        lora1: LoraFormat,
        lora2: LoraFormat,
    },
    /// The two LoRAs have no key in common
    NoCommonKeys,
    /// A shared key has different shapes
    ShapeMismatch {
        key: String,
        lora1: Vec<usize>,
        lora2: Vec<usize>,
    },
}

impl fmt::Display for CompatibilityIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FormatMismatch { lora1, lora2 } => {
                write!(f, "LoRA types don't match: {lora1} vs {lora2}")
            }
            Self::NoCommonKeys => write!(f, "No common keys found between LoRAs"),
            Self::ShapeMismatch { key, lora1, lora2 } => {
                write!(f, "Dimension mismatch for '{key}': {lora1:?} vs {lora2:?}")
            }
        }
    }
}

/// Difference that merging tolerates
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CompatibilityWarning {
    /// A shared key has different element types
    DtypeMismatch {
        key: String,
        lora1: String,
        lora2: String,
    },
}

impl fmt::Display for CompatibilityWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DtypeMismatch { key, lora1, lora2 } => {
                write!(f, "Dtype mismatch for '{key}': {lora1} vs {lora2}")
            }
        }
    }
}

/// LoRA pair validator
#[derive(Debug, Clone, Default)]
pub struct LoraValidator {
    /// Treat dtype differences as errors in [`LoraValidator::ensure_mergeable`]
    check_dtype: bool,
}

impl LoraValidator {
    /// Create a validator that only compares shapes
    pub fn new() -> Self {
        Self::default()
    }

    /// Also require matching dtypes
    pub fn with_dtype_check(mut self, check_dtype: bool) -> Self {
        self.check_dtype = check_dtype;
        self
    }

    /// Build a full compatibility report
    pub fn check(&self, lora1: &WeightMapping, lora2: &WeightMapping) -> CompatibilityReport {
        let lora1_format = LoraFormat::detect(lora1.keys());
        let lora2_format = LoraFormat::detect(lora2.keys());

        let common = common_keys(lora1, lora2);

        let mut report = CompatibilityReport {
            is_compatible: true,
            lora1_format,
            lora2_format,
            common_keys: common.len(),
            unique_keys1: lora1.len() - common.len(),
            unique_keys2: lora2.len() - common.len(),
            total_keys1: lora1.len(),
            total_keys2: lora2.len(),
            issues: Vec::new(),
            warnings: Vec::new(),
        };

        if lora1_format != lora2_format {
            report.add_issue(CompatibilityIssue::FormatMismatch {
                lora1: lora1_format,
                lora2: lora2_format,
            });
        }

        if common.is_empty() {
            report.add_issue(CompatibilityIssue::NoCommonKeys);
        }

        for key in common {
            let (Some(left), Some(right)) = (lora1.spec(key), lora2.spec(key)) else {
                continue;
            };

            if left.shape != right.shape {
                report.add_issue(CompatibilityIssue::ShapeMismatch {
                    key: key.to_string(),
                    lora1: left.shape,
                    lora2: right.shape,
                });
            } else if left.dtype != right.dtype {
                report.add_warning(CompatibilityWarning::DtypeMismatch {
                    key: key.to_string(),
                    lora1: left.dtype.as_str().to_string(),
                    lora2: right.dtype.as_str().to_string(),
                });
            }
        }

        report
    }

    /// Fail on the first shared key, in sorted order, whose tensors differ
    pub fn ensure_mergeable(&self, lora1: &WeightMapping, lora2: &WeightMapping) -> Result<()> {
        for key in common_keys(lora1, lora2) {
            let (Some(left), Some(right)) = (lora1.get(key), lora2.get(key)) else {
                continue;
            };
            self.ensure_same(key, left, right)?;
        }
        Ok(())
    }

    /// Compare two tensors stored under the same key
    pub fn ensure_same(
        &self,
        key: &str,
        left: &candle_core::Tensor,
        right: &candle_core::Tensor,
    ) -> Result<()> {
        let (l, r) = (TensorSpec::of(left), TensorSpec::of(right));
        if l.shape != r.shape || (self.check_dtype && l.dtype != r.dtype) {
            return Err(MergeError::IncompatibleShape {
                key: key.to_string(),
                left: l,
                right: r,
            });
        }
        Ok(())
    }
}

/// Shared keys in lexical order
fn common_keys<'a>(lora1: &'a WeightMapping, lora2: &WeightMapping) -> Vec<&'a str> {
    lora1
        .sorted_keys()
        .into_iter()
        .filter(|k| lora2.contains_key(k))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::{DType, Device, Tensor};

    fn lora(entries: &[(&str, &[usize])]) -> WeightMapping {
        entries
            .iter()
            .map(|(k, shape)| {
                (
                    k.to_string(),
                    Tensor::zeros(*shape, DType::F32, &Device::Cpu).unwrap(),
                )
            })
            .collect()
    }

    #[test]
    fn test_compatible_pair() {
        let a = lora(&[("x.lora_down.weight", &[4, 8]), ("x.lora_up.weight", &[8, 4])]);
        let b = lora(&[("x.lora_down.weight", &[4, 8]), ("y.lora_down.weight", &[2, 2])]);

        let report = LoraValidator::new().check(&a, &b);

        assert!(report.is_compatible);
        assert_eq!(report.common_keys, 1);
        assert_eq!(report.unique_keys1, 1);
        assert_eq!(report.unique_keys2, 1);
        assert_eq!(report.lora1_format, LoraFormat::StandardLora);
    }

    #[test]
    fn test_shape_mismatch_reported() {
        let a = lora(&[("x.lora_down.weight", &[4, 8])]);
        let b = lora(&[("x.lora_down.weight", &[8, 8])]);

        let report = LoraValidator::new().check(&a, &b);

        assert!(!report.is_compatible);
        assert_eq!(
            report.issues,
            vec![CompatibilityIssue::ShapeMismatch {
                key: "x.lora_down.weight".to_string(),
                lora1: vec![4, 8],
                lora2: vec![8, 8],
            }]
        );
    }

    #[test]
    fn test_format_and_disjoint_issues() {
        let a = lora(&[("x.lora_down.weight", &[4, 8])]);
        let b = lora(&[("y.lora_A.weight", &[4, 8])]);

        let report = LoraValidator::new().check(&a, &b);

        assert!(!report.is_compatible);
        assert_eq!(report.issues.len(), 2);
        assert!(report.issues.contains(&CompatibilityIssue::NoCommonKeys));
    }

    #[test]
    fn test_dtype_warning() {
        let a = lora(&[("w.weight", &[2])]);
        let mut b = WeightMapping::new();
        b.insert(
            "w.weight",
            Tensor::zeros(2, DType::F16, &Device::Cpu).unwrap(),
        );

        let report = LoraValidator::new().check(&a, &b);
        assert!(report.is_compatible);
        assert!(report.has_warnings());

        assert!(LoraValidator::new().ensure_mergeable(&a, &b).is_ok());
        assert!(matches!(
            LoraValidator::new()
                .with_dtype_check(true)
                .ensure_mergeable(&a, &b),
            Err(MergeError::IncompatibleShape { .. })
        ));
    }

    #[test]
    fn test_ensure_mergeable_reports_first_sorted_key() {
        let a = lora(&[("b.weight", &[2]), ("a.weight", &[2])]);
        let b = lora(&[("b.weight", &[3]), ("a.weight", &[3])]);

        match LoraValidator::new().ensure_mergeable(&a, &b) {
            Err(MergeError::IncompatibleShape { key, left, right }) => {
                assert_eq!(key, "a.weight");
                assert_eq!(left.shape, vec![2]);
                assert_eq!(right.shape, vec![3]);
            }
            other => panic!("expected shape error, got {other:?}"),
        }
    }
}
