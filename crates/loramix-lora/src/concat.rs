//! Concatenation merge for rank-decomposed layers
//!
//! A LoRA layer stores `ΔW = scale * up @ down` with `down: [r, in]` and
//! `up: [out, r]`. Stacking the factors of several LoRAs along the rank axis
//! gives a single layer whose product is the sum of the individual deltas:
//!
//! ```text
//! down' = [√|s₁|·down₁ ; √|s₂|·down₂]          (dim 0)
//! up'   = [sign(s₁)√|s₁|·up₁ , sign(s₂)√|s₂|·up₂]  (dim 1)
//! s_i   = strength_i * alpha_i / r_i
//! ```
//!
//! The merged `alpha` equals the stacked rank so consumers apply a scale of 1.

use crate::error::{MergeError, Result};
use crate::format::FactorFamily;
use crate::merge::{self, MergeOptions};
use crate::weights::{TensorSpec, WeightMapping};
use candle_core::{DType, Tensor};
use std::collections::HashSet;
use tracing::{debug, warn};

/// Outcome of stacking one factor family
enum Stacking {
    /// Factors stacked successfully
    Stacked {
        down: Tensor,
        up: Tensor,
        alpha: Option<Tensor>,
        rank: usize,
    },
    /// No input contributes (all strengths zero)
    Empty,
    /// Family cannot be stacked
    Ineligible { reason: String },
}

/// Merge by stacking factor families, linearly merging everything else
pub(crate) fn concatenate(
    inputs: &[(&WeightMapping, f64)],
    options: &MergeOptions,
) -> Result<WeightMapping> {
    let keys = merge::union_keys(inputs);
    let families = FactorFamily::collect(keys.iter().copied());
    let validator = options.check_compatibility.then(|| options.validator());

    if families.is_empty() {
        if !options.concat_fallback {
            return Err(MergeError::UnsupportedMergeMethod {
                method: options.method.to_string(),
                key: "*".to_string(),
                reason: "no rank-decomposed layers found".to_string(),
            });
        }
        warn!("no LoRA factor pairs found, falling back to linear merge");
    }

    let mut merged = WeightMapping::new();
    let mut consumed: HashSet<String> = HashSet::new();

    for family in &families {
        match stack_family(family, inputs)? {
            Stacking::Stacked {
                down,
                up,
                alpha,
                rank,
            } => {
                debug!(prefix = %family.prefix, rank, "stacked factors");
                let [down_key, up_key, alpha_key] = family.keys();
                merged.insert(down_key.clone(), down);
                merged.insert(up_key.clone(), up);
                if let Some(alpha) = alpha {
                    merged.insert(alpha_key.clone(), alpha);
                    consumed.insert(alpha_key);
                }
                consumed.extend([down_key, up_key]);
            }
            Stacking::Empty => {}
            Stacking::Ineligible { reason } => {
                if let Some(validator) = &validator {
                    for key in family.keys() {
                        merge::ensure_key_compatible(validator, &key, inputs)?;
                    }
                }
                let down_key = family.pattern().down_key(&family.prefix);
                if !options.concat_fallback {
                    return Err(MergeError::UnsupportedMergeMethod {
                        method: options.method.to_string(),
                        key: down_key,
                        reason,
                    });
                }
                warn!(prefix = %family.prefix, %reason, "merging family linearly");
            }
        }
    }

    for key in keys {
        if consumed.contains(key) {
            continue;
        }
        if let Some(validator) = &validator {
            merge::ensure_key_compatible(validator, key, inputs)?;
        }
        merged.insert(key, merge::combine_key(key, inputs)?);
    }

    Ok(merged)
}

fn stack_family(family: &FactorFamily, inputs: &[(&WeightMapping, f64)]) -> Result<Stacking> {
    let [down_key, up_key, alpha_key] = family.keys();

    let mut downs = Vec::new();
    let mut ups = Vec::new();
    let mut rank = 0;
    let mut features: Option<(usize, usize)> = None;
    let mut has_alpha = false;

    for (lora, strength) in inputs {
        let (down, up) = match (lora.get(&down_key), lora.get(&up_key)) {
            (None, None) => continue,
            (Some(down), Some(up)) => (down, up),
            _ => {
                return Ok(Stacking::Ineligible {
                    reason: "only one of the down/up factors is present".to_string(),
                })
            }
        };
        has_alpha |= lora.contains_key(&alpha_key);

        if *strength == 0.0 {
            continue;
        }

        if down.rank() != 2 || up.rank() != 2 {
            return Ok(Stacking::Ineligible {
                reason: format!(
                    "factors must be 2-D, got {} and {}",
                    TensorSpec::of(down),
                    TensorSpec::of(up)
                ),
            });
        }

        let (r, in_features) = down.dims2()?;
        let (out_features, r_up) = up.dims2()?;
        if r == 0 || r != r_up {
            return Ok(Stacking::Ineligible {
                reason: format!("down rank {r} does not match up rank {r_up}"),
            });
        }

        match features {
            Some((i, o)) if i != in_features || o != out_features => {
                return Ok(Stacking::Ineligible {
                    reason: format!(
                        "layer is {i}->{o} in one LoRA and {in_features}->{out_features} in another"
                    ),
                });
            }
            Some(_) => {}
            None => features = Some((in_features, out_features)),
        }

        let scaling = match lora.get(&alpha_key) {
            Some(alpha) => match scalar_value(alpha)? {
                Some(alpha) => alpha / r as f64,
                None => {
                    return Ok(Stacking::Ineligible {
                        reason: "alpha tensor is empty".to_string(),
                    })
                }
            },
            None => 1.0,
        };

        let s = strength * scaling;
        if s == 0.0 {
            continue;
        }
        let root = s.abs().sqrt();

        downs.push(down.affine(root, 0.0)?);
        ups.push(up.affine(root * s.signum(), 0.0)?);
        rank += r;
    }

    if downs.is_empty() {
        return Ok(Stacking::Empty);
    }

    let downs = merge::promote(downs)?;
    let ups = merge::promote(ups)?;
    let down = Tensor::cat(&downs, 0)?;
    let up = Tensor::cat(&ups, 1)?;

    let alpha = if has_alpha {
        Some(Tensor::new(rank as f32, down.device())?)
    } else {
        None
    };

    Ok(Stacking::Stacked {
        down,
        up,
        alpha,
        rank,
    })
}

/// First element of a tensor as f64
fn scalar_value(tensor: &Tensor) -> Result<Option<f64>> {
    let values = tensor.to_dtype(DType::F64)?.flatten_all()?.to_vec1::<f64>()?;
    Ok(values.first().copied())
}
