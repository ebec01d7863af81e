use crate::compatibility::Compatibility;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use std::ops::Range;

/// Probabilities are clamped to this value before taking the logarithm, so a zero probability
/// becomes a large but finite cost.
pub const PROB_EPSILON: f32 = 1e-5;

/// Changes between parallelization schemas of the mean-field iterations.
///
/// Both strategies produce bit-identical results, reductions are always done in kernel order.
#[derive(Clone, PartialEq, Debug, Copy)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ThreadingStrategy {
    /// No threading - used for correctness checks and very small images.
    SingleThread,
    /// Every kernel is filtered in its own rayon task and the lattice passes (elevation, blur,
    /// slice) are split across the thread pool. The filtered messages are joined before the
    /// softmax, so iteration `i + 1` never starts before iteration `i` is complete.
    KernelParallel,
}

/// Normalization of a pairwise kernel.
///
/// The lattice filter does not integrate to one, every site gets its own normalization factor
/// computed by filtering a constant signal.
#[derive(Clone, PartialEq, Debug, Copy)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Normalization {
    /// One factor for every site, the inverse of the mean filter response. Applied after the
    /// filter.
    Mean,
    /// Normalize the signal before filtering.
    Before,
    /// Normalize the filtered signal.
    After,
    /// Split the normalization by `1 / sqrt(norm)` before and after the filter. Keeps the
    /// kernel symmetric.
    Symmetric,
}

/// Features a kernel is computed on.
#[derive(Clone, PartialEq, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum KernelKind {
    /// Position only (smoothness kernel).
    Gaussian,
    /// Position and color/intensity (appearance kernel). One standard deviation per image
    /// channel, the channel values come from the image passed to the engine.
    Bilateral { color_stddev: Vec<f32> },
}

/// One pairwise term of the CRF energy: `weight * compatibility(l_i, l_j) * k(f_i, f_j)`, where
/// `k` is a Gaussian with the configured standard deviations.
#[derive(Clone, PartialEq, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Kernel {
    pub kind: KernelKind,
    /// Standard deviation for every spatial axis (x, y for 2D; x, y, z for 3D).
    pub spatial_stddev: Vec<f32>,
    pub weight: f32,
    pub compatibility: Compatibility,
    pub normalization: Normalization,
}

impl Kernel {
    /// Spatial-only Gaussian kernel with Potts compatibility.
    pub fn gaussian(spatial_stddev: &[f32], weight: f32) -> Self {
        Self {
            kind: KernelKind::Gaussian,
            spatial_stddev: spatial_stddev.to_vec(),
            weight,
            compatibility: Compatibility::Potts,
            normalization: Normalization::Symmetric,
        }
    }

    /// Bilateral kernel with Potts compatibility.
    pub fn bilateral(spatial_stddev: &[f32], color_stddev: &[f32], weight: f32) -> Self {
        Self {
            kind: KernelKind::Bilateral {
                color_stddev: color_stddev.to_vec(),
            },
            spatial_stddev: spatial_stddev.to_vec(),
            weight,
            compatibility: Compatibility::Potts,
            normalization: Normalization::Symmetric,
        }
    }

    pub fn with_compatibility(mut self, compatibility: Compatibility) -> Self {
        self.compatibility = compatibility;
        self
    }

    pub fn with_normalization(mut self, normalization: Normalization) -> Self {
        self.normalization = normalization;
        self
    }
}

/// Main config for the dense CRF engines.
///
/// There is no convergence check, `iterations` is the whole budget of the mean-field loop.
#[derive(Clone, PartialEq, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CrfConfig {
    /// Number of mean-field iterations. Must be at least 1.
    pub iterations: u16,
    /// Pairwise kernels. Kernels with zero weight are validated but not filtered.
    pub kernels: Vec<Kernel>,
    pub threading: ThreadingStrategy,
}

impl Default for CrfConfig {
    fn default() -> Self {
        Self {
            iterations: 5,
            kernels: Vec::new(),
            threading: ThreadingStrategy::KernelParallel,
        }
    }
}

/// Parameters of the grid graph built by `maxflow2d()`/`maxflow3d()`.
#[derive(Clone, PartialEq, Debug, Copy)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MaxflowParams {
    /// Weight of the boundary (pairwise) term relative to the region (unary) term.
    pub lambda: f32,
    /// Intensity difference at which neighbouring pixels are considered to lie on an edge.
    pub sigma: f32,
}

impl Default for MaxflowParams {
    fn default() -> Self {
        Self {
            lambda: 5.0,
            sigma: 3.0,
        }
    }
}

/// Borrowed interleaved image or volume: `channels` values per pixel/voxel, pixels in row-major
/// order (slices of a volume one after another).
#[derive(Clone, Copy, Debug)]
pub struct GridImage<'a, P> {
    pub data: &'a [P],
    pub channels: usize,
}

impl<'a, P: Copy + Into<f32>> GridImage<'a, P> {
    pub fn new(data: &'a [P], channels: usize) -> Self {
        Self { data, channels }
    }

    #[inline(always)]
    pub fn pixel(&self, site: usize) -> &'a [P] {
        &self.data[site * self.channels..(site + 1) * self.channels]
    }

    /// Squared Euclidean distance between two pixels over all channels.
    #[inline]
    pub fn squared_distance(&self, p: usize, q: usize) -> f32 {
        self.pixel(p)
            .iter()
            .zip(self.pixel(q))
            .map(|(a, b)| {
                let d: f32 = (*a).into() - (*b).into();
                d * d
            })
            .sum()
    }

    pub(crate) fn sites(&self) -> usize {
        if self.channels == 0 {
            0
        } else {
            self.data.len() / self.channels
        }
    }
}

/// Converts a probability map (`[site][label]`, any layout) into unary costs `-ln(p)`.
pub fn unary_from_probabilities(prob: &[f32]) -> Vec<f32> {
    prob.iter().map(|p| -p.max(PROB_EPSILON).ln()).collect()
}

pub(crate) fn split_length_to_ranges(length: usize, splits: usize) -> Vec<Range<usize>> {
    let chunk_size = length / splits;
    let rem = length % splits;
    (0..splits)
        .scan((rem, 0usize), |(r, acc), _split| {
            let mut size = chunk_size;
            if *r > 0 {
                *r -= 1;
                size += 1;
            }
            let out = (*acc, *acc + size);
            *acc += size;
            Some(out.0..out.1)
        })
        .filter(|r| !r.is_empty())
        .collect()
}
