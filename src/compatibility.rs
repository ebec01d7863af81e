use crate::error::{Error, Result};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Label compatibility `mu(l, l')` of a pairwise term. Positive entries penalize a label pair,
/// negative entries reward it.
#[derive(Clone, PartialEq, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Compatibility {
    /// `mu(l, l') = [l != l']`.
    Potts,
    /// `mu(l, l) = v[l]`, zero off the diagonal.
    Diagonal(Vec<f32>),
    /// Full `labels` x `labels` matrix (row-major). It is symmetrized before use.
    Matrix { labels: usize, values: Vec<f32> },
}

impl Compatibility {
    pub(crate) fn validate(&self, labels: usize) -> Result<()> {
        match self {
            Compatibility::Potts => Ok(()),
            Compatibility::Diagonal(v) => {
                if v.len() != labels {
                    return Err(Error::model(format!(
                        "diagonal compatibility has {} entries for {labels} labels",
                        v.len()
                    )));
                }
                if v.iter().any(|x| !x.is_finite()) {
                    return Err(Error::model("diagonal compatibility is not finite"));
                }
                Ok(())
            }
            Compatibility::Matrix {
                labels: m,
                values,
            } => {
                if *m != labels || values.len() != labels * labels {
                    return Err(Error::model(format!(
                        "compatibility matrix is {m}x{m} with {} values for {labels} labels",
                        values.len()
                    )));
                }
                if values.iter().any(|x| !x.is_finite()) {
                    return Err(Error::model("compatibility matrix is not finite"));
                }
                Ok(())
            }
        }
    }

    /// Symmetrized copy used by the engine.
    pub(crate) fn prepared(&self) -> Compatibility {
        match self {
            Compatibility::Matrix { labels, values } => {
                let l = *labels;
                let values = (0..l * l)
                    .map(|idx| {
                        let (i, j) = (idx / l, idx % l);
                        0.5 * (values[i * l + j] + values[j * l + i])
                    })
                    .collect();
                Compatibility::Matrix { labels: l, values }
            }
            other => other.clone(),
        }
    }

    /// Mean-field message of one site: `out[l] = sum_l' mu(l, l') * filtered[l']`.
    ///
    /// Potts is applied in its shift-equivalent form `-filtered[l]`. It differs from the full
    /// form by a per-site constant, which cancels out in the softmax.
    #[inline]
    pub(crate) fn apply(&self, filtered: &[f32], out: &mut [f32]) {
        debug_assert_eq!(filtered.len(), out.len());
        match self {
            Compatibility::Potts => {
                for (o, f) in out.iter_mut().zip(filtered) {
                    *o = -f;
                }
            }
            Compatibility::Diagonal(v) => {
                for ((o, f), d) in out.iter_mut().zip(filtered).zip(v) {
                    *o = d * f;
                }
            }
            Compatibility::Matrix { labels, values } => {
                for (l, o) in out.iter_mut().enumerate() {
                    *o = values[l * labels..(l + 1) * labels]
                        .iter()
                        .zip(filtered)
                        .map(|(m, f)| m * f)
                        .sum();
                }
            }
        }
    }

    /// Largest `|mu(l, l')|` as seen by `apply()`.
    pub(crate) fn max_abs(&self) -> f32 {
        match self {
            Compatibility::Potts => 1.0,
            Compatibility::Diagonal(v) => v.iter().fold(0f32, |a, b| a.max(b.abs())),
            Compatibility::Matrix { values, .. } => values.iter().fold(0f32, |a, b| a.max(b.abs())),
        }
    }

    /// Value of `mu(l, l')` in its full (unshifted) form.
    #[inline]
    pub fn penalty(&self, l: usize, l2: usize) -> f32 {
        match self {
            Compatibility::Potts => (l != l2) as u8 as f32,
            Compatibility::Diagonal(v) => {
                if l == l2 {
                    v[l]
                } else {
                    0.0
                }
            }
            Compatibility::Matrix { labels, values } => values[l * labels + l2],
        }
    }
}
