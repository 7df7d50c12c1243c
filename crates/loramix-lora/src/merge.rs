//! LoRA merging
//!
//! Combines tensor-keyed weight mappings under per-input strengths:
//!
//! ```text
//! merged[k] = Σ strength_i * lora_i[k]     (over inputs that have k)
//! ```
//!
//! The output key set is always the union of the input key sets. A key held by
//! one input alone is scaled by that input's strength, so a zero strength turns
//! it into a zero tensor rather than dropping it.

use crate::concat;
use crate::error::{MergeError, Result};
use crate::method::{MergeMethod, ZeroSumPolicy};
use crate::strength::Strength;
use crate::validator::LoraValidator;
use crate::weights::{TensorSpec, WeightMapping};
use candle_core::{DType, Tensor};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use tracing::{debug, info, warn};

/// Merge configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeOptions {
    /// Combination method
    pub method: MergeMethod,
    /// Reject shared keys whose shapes differ instead of zero-padding them
    pub check_compatibility: bool,
    /// With `check_compatibility`, also reject differing dtypes
    pub check_dtype: bool,
    /// Reject strengths outside [-100, 100]
    pub enforce_strength_range: bool,
    /// Weighted-average behavior when all strengths are zero
    pub zero_sum: ZeroSumPolicy,
    /// Merge ineligible factor families linearly instead of failing
    pub concat_fallback: bool,
}

impl Default for MergeOptions {
    fn default() -> Self {
        Self {
            method: MergeMethod::Linear,
            check_compatibility: false,
            check_dtype: false,
            enforce_strength_range: true,
            zero_sum: ZeroSumPolicy::Zeros,
            concat_fallback: true,
        }
    }
}

impl MergeOptions {
    /// Options for a given method, everything else default
    pub fn with_method(method: MergeMethod) -> Self {
        Self {
            method,
            ..Default::default()
        }
    }

    /// Validator matching the dtype setting
    pub(crate) fn validator(&self) -> LoraValidator {
        LoraValidator::new().with_dtype_check(self.check_dtype)
    }
}

/// LoRA merger
#[derive(Debug, Clone, Default)]
pub struct Merger {
    options: MergeOptions,
}

impl Merger {
    /// Create a new merger
    pub fn new(options: MergeOptions) -> Self {
        Self { options }
    }

    /// Get configuration
    pub fn options(&self) -> &MergeOptions {
        &self.options
    }

    /// Merge two LoRAs
    pub fn merge(
        &self,
        lora1: &WeightMapping,
        strength1: Strength,
        lora2: &WeightMapping,
        strength2: Strength,
    ) -> Result<WeightMapping> {
        self.merge_many(&[(lora1, strength1), (lora2, strength2)])
    }

    /// Merge any number of LoRAs. Inputs are never modified.
    pub fn merge_many(&self, inputs: &[(&WeightMapping, Strength)]) -> Result<WeightMapping> {
        if self.options.enforce_strength_range {
            for (_, strength) in inputs {
                strength.validate()?;
            }
        }

        let raw: Vec<(&WeightMapping, f64)> =
            inputs.iter().map(|(w, s)| (*w, s.value())).collect();

        // Concatenation checks the keys it merges linearly itself
        if self.options.check_compatibility && self.options.method != MergeMethod::Concatenation
        {
            self.check_inputs(&raw)?;
        }

        info!(
            method = %self.options.method,
            inputs = inputs.len(),
            keys = union_keys(&raw).len(),
            "merging LoRAs"
        );

        let merged = match self.options.method {
            MergeMethod::Linear => linear(&raw)?,
            MergeMethod::WeightedAverage => {
                let weights = normalized_strengths(
                    &raw.iter().map(|(_, s)| *s).collect::<Vec<_>>(),
                    self.options.zero_sum,
                );
                debug!(?weights, "normalized strengths");
                let scaled: Vec<(&WeightMapping, f64)> = raw
                    .iter()
                    .zip(weights)
                    .map(|((w, _), s)| (*w, s))
                    .collect();
                linear(&scaled)?
            }
            MergeMethod::Concatenation => concat::concatenate(&raw, &self.options)?,
        };

        debug!(tensors = merged.len(), "merge complete");
        Ok(merged)
    }

    /// Compare every shared key against its first holder, in sorted key order
    fn check_inputs(&self, inputs: &[(&WeightMapping, f64)]) -> Result<()> {
        let validator = self.options.validator();
        if let [(lora1, _), (lora2, _)] = inputs {
            return validator.ensure_mergeable(lora1, lora2);
        }
        for key in union_keys(inputs) {
            ensure_key_compatible(&validator, key, inputs)?;
        }
        Ok(())
    }
}

/// Sorted union of keys over all inputs
pub(crate) fn union_keys<'a>(inputs: &[(&'a WeightMapping, f64)]) -> BTreeSet<&'a str> {
    inputs.iter().flat_map(|(w, _)| w.keys()).collect()
}

/// Fail if the inputs holding `key` disagree on its shape
pub(crate) fn ensure_key_compatible(
    validator: &LoraValidator,
    key: &str,
    inputs: &[(&WeightMapping, f64)],
) -> Result<()> {
    let mut holders = inputs.iter().filter_map(|(w, _)| w.get(key));
    if let Some(first) = holders.next() {
        for other in holders {
            validator.ensure_same(key, first, other)?;
        }
    }
    Ok(())
}

/// Strengths divided by the sum of their magnitudes
pub fn normalized_strengths(strengths: &[f64], policy: ZeroSumPolicy) -> Vec<f64> {
    let total: f64 = strengths.iter().map(|s| s.abs()).sum();
    if total == 0.0 {
        return match policy {
            ZeroSumPolicy::Zeros => vec![0.0; strengths.len()],
            ZeroSumPolicy::Uniform => vec![1.0 / strengths.len() as f64; strengths.len()],
        };
    }
    strengths.iter().map(|s| s / total).collect()
}

/// Strength-weighted sum over the key union
pub(crate) fn linear(inputs: &[(&WeightMapping, f64)]) -> Result<WeightMapping> {
    let mut merged = WeightMapping::new();
    for key in union_keys(inputs) {
        merged.insert(key, combine_key(key, inputs)?);
    }
    Ok(merged)
}

/// Strength-weighted sum of every input's tensor under `key`
pub(crate) fn combine_key(key: &str, inputs: &[(&WeightMapping, f64)]) -> Result<Tensor> {
    let (tensors, strengths): (Vec<Tensor>, Vec<f64>) = inputs
        .iter()
        .filter_map(|(w, s)| w.get(key).map(|t| (t.clone(), *s)))
        .unzip();

    let tensors = align_shapes(key, promote(tensors)?)?;

    let mut parts = tensors.iter().zip(&strengths);
    let Some((first, s0)) = parts.next() else {
        return Err(MergeError::Tensor(candle_core::Error::Msg(format!(
            "no tensors contributed to '{key}'"
        ))));
    };

    let mut acc = first.affine(*s0, 0.0)?;
    for (tensor, s) in parts {
        acc = (acc + tensor.affine(*s, 0.0)?)?;
    }
    Ok(acc)
}

/// Common dtype for mixed inputs: F64 if any input is F64, otherwise F32
pub(crate) fn common_dtype(dtypes: impl IntoIterator<Item = DType>) -> Option<DType> {
    let dtypes: Vec<DType> = dtypes.into_iter().collect();
    let first = *dtypes.first()?;
    if dtypes.iter().all(|d| *d == first) {
        Some(first)
    } else if dtypes.contains(&DType::F64) {
        Some(DType::F64)
    } else {
        Some(DType::F32)
    }
}

/// Convert tensors to their common dtype
pub(crate) fn promote(tensors: Vec<Tensor>) -> Result<Vec<Tensor>> {
    let Some(target) = common_dtype(tensors.iter().map(Tensor::dtype)) else {
        return Ok(tensors);
    };
    tensors
        .into_iter()
        .map(|t| {
            if t.dtype() == target {
                Ok(t)
            } else {
                Ok(t.to_dtype(target)?)
            }
        })
        .collect()
}

/// Zero-pad same-rank tensors to their elementwise maximum shape
fn align_shapes(key: &str, tensors: Vec<Tensor>) -> Result<Vec<Tensor>> {
    let Some(first) = tensors.first() else {
        return Ok(tensors);
    };
    let first_dims = first.dims().to_vec();
    if tensors.iter().all(|t| t.dims() == first_dims.as_slice()) {
        return Ok(tensors);
    }

    if let Some(other) = tensors.iter().find(|t| t.rank() != first_dims.len()) {
        return Err(MergeError::IncompatibleShape {
            key: key.to_string(),
            left: TensorSpec::of(first),
            right: TensorSpec::of(other),
        });
    }

    let target: Vec<usize> = (0..first_dims.len())
        .map(|d| tensors.iter().map(|t| t.dims()[d]).max().unwrap_or(0))
        .collect();
    warn!(key, ?target, "zero-padding mismatched tensors");

    tensors.into_iter().map(|t| pad_to(t, &target)).collect()
}

fn pad_to(mut tensor: Tensor, target: &[usize]) -> Result<Tensor> {
    for (dim, &size) in target.iter().enumerate() {
        let current = tensor.dims()[dim];
        if current < size {
            tensor = tensor.pad_with_zeros(dim, 0, size - current)?;
        }
    }
    Ok(tensor)
}
