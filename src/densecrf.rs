use crate::arrays::Array2D;
use crate::common::{CrfConfig, GridImage, Kernel, KernelKind, Normalization, ThreadingStrategy};
use crate::compatibility::Compatibility;
use crate::error::{Error, Result};
use crate::permutohedral::Permutohedral;
use log::{debug, trace};
use multiversion::multiversion;
use rayon::current_num_threads;
use rayon::prelude::*;
use std::time::Instant;

/// Mean-field marginals, one row of `labels` probabilities per site.
#[derive(Debug, Clone)]
pub struct Beliefs {
    pub probabilities: Array2D<f32>,
}

impl Beliefs {
    pub fn sites(&self) -> usize {
        self.probabilities.height
    }

    pub fn labels(&self) -> usize {
        self.probabilities.width
    }

    #[inline]
    pub fn get(&self, site: usize) -> &[f32] {
        self.probabilities.get_row(site)
    }

    /// Most probable label of every site. Ties go to the lowest label index.
    pub fn map_labels(&self) -> Vec<u16> {
        self.probabilities
            .rows()
            .map(|row| {
                let mut best = 0;
                for (l, p) in row.iter().enumerate().skip(1) {
                    if *p > row[best] {
                        best = l;
                    }
                }
                best as u16
            })
            .collect()
    }
}

/// Removes feature columns with the same value at every site. A constant dimension adds nothing
/// to any pairwise distance, and it would only make the lattice sparser.
fn drop_constant_columns(features: &Array2D<f32>) -> Array2D<f32> {
    if features.height == 0 {
        return features.clone();
    }
    let first = features.get_row(0);
    let kept: Vec<usize> = (0..features.width)
        .filter(|&c| features.rows().any(|row| row[c] != first[c]))
        .collect();
    if kept.len() == features.width {
        return features.clone();
    }
    debug!(
        "dropping {} constant feature dimension(s)",
        features.width - kept.len()
    );
    Array2D::from_fn(kept.len(), features.height, |x, y| features[(kept[x], y)])
}

/// One pairwise kernel with its lattice and per-site normalization.
struct PairwiseTerm {
    lattice: Permutohedral,
    norm: Vec<f32>,
    weight: f32,
    compatibility: Compatibility,
    normalization: Normalization,
    /// Upper bound of `|message|` over all sites and labels for any beliefs.
    message_bound: f64,
}

impl PairwiseTerm {
    fn new(
        features: &Array2D<f32>,
        weight: f32,
        compatibility: &Compatibility,
        normalization: Normalization,
        threading: ThreadingStrategy,
    ) -> Self {
        let features = drop_constant_columns(features);
        let lattice = Permutohedral::new(&features, threading);
        let sites = features.height;
        let ones = vec![1f32; sites];
        let mut norm = lattice.compute(&ones, 1, threading);
        match normalization {
            Normalization::Mean => {
                let mean = sites as f32 / norm.iter().sum::<f32>();
                norm.fill(mean);
            }
            Normalization::Symmetric => {
                norm.iter_mut().for_each(|n| *n = 1.0 / (*n + 1e-20).sqrt())
            }
            Normalization::Before | Normalization::After => {
                norm.iter_mut().for_each(|n| *n = 1.0 / (*n + 1e-20))
            }
        }
        let mut term = Self {
            lattice,
            norm,
            weight,
            compatibility: compatibility.prepared(),
            normalization,
            message_bound: 0.0,
        };
        // beliefs are non-negative and sum to one, so filter(Q) never exceeds filter(1)
        let filtered_ones = term.filter(&ones, 1, threading);
        let max_filtered = filtered_ones.iter().fold(0f32, |a, b| a.max(b.abs())) as f64;
        term.message_bound =
            (weight.abs() as f64).max(1.0) * term.compatibility.max_abs() as f64 * max_filtered;
        term
    }

    /// Normalized Gaussian filter of a `sites x value_size` signal.
    fn filter(&self, input: &[f32], value_size: usize, threading: ThreadingStrategy) -> Vec<f32> {
        let (pre, post) = match self.normalization {
            Normalization::Symmetric => (true, true),
            Normalization::Before => (true, false),
            Normalization::After | Normalization::Mean => (false, true),
        };
        let mut out = if pre {
            let scaled: Vec<f32> = input
                .chunks_exact(value_size)
                .zip(&self.norm)
                .flat_map(|(row, s)| row.iter().map(move |v| v * s))
                .collect();
            self.lattice.compute(&scaled, value_size, threading)
        } else {
            self.lattice.compute(input, value_size, threading)
        };
        if post {
            out.chunks_exact_mut(value_size)
                .zip(&self.norm)
                .for_each(|(row, s)| row.iter_mut().for_each(|v| *v *= s));
        }
        out
    }

    /// `weight * mu(filter(Q))` for every site.
    fn message(&self, q: &[f32], labels: usize, threading: ThreadingStrategy) -> Vec<f32> {
        let filtered = self.filter(q, labels, threading);
        let mut out = vec![0f32; filtered.len()];
        for (f, o) in filtered
            .chunks_exact(labels)
            .zip(out.chunks_exact_mut(labels))
        {
            self.compatibility.apply(f, o);
            o.iter_mut().for_each(|v| *v *= self.weight);
        }
        out
    }
}

/// Fully connected CRF model over `sites` sites and `labels` labels.
///
/// Energy of a labelling `x`:
/// `E(x) = sum_i U(i, x_i) + sum_k w_k sum_{i<j} mu_k(x_i, x_j) exp(-|f^k_i - f^k_j|^2 / 2)`,
/// with the kernel features `f^k` already divided by the bandwidths. Mean field refines
/// `Q(i, l) ~ exp(-U(i, l) - sum_k w_k (mu_k * filter_k(Q))(i, l))`, the Gaussian filter runs on
/// a permutohedral lattice (Krähenbühl, Koltun, 2011).
pub struct DenseCrf {
    sites: usize,
    labels: usize,
    unary: Option<Array2D<f32>>,
    pairwise: Vec<PairwiseTerm>,
    threading: ThreadingStrategy,
}

impl DenseCrf {
    pub fn new(sites: usize, labels: usize) -> Result<Self> {
        if labels < 2 {
            return Err(Error::model(format!("at least 2 labels needed, got {labels}")));
        }
        if labels > u16::MAX as usize + 1 {
            return Err(Error::model(format!("too many labels: {labels}")));
        }
        if sites == 0 {
            return Err(Error::model("model has no sites"));
        }
        Ok(Self {
            sites,
            labels,
            unary: None,
            pairwise: Vec::new(),
            threading: ThreadingStrategy::KernelParallel,
        })
    }

    pub fn with_threading(mut self, threading: ThreadingStrategy) -> Self {
        self.threading = threading;
        self
    }

    pub fn sites(&self) -> usize {
        self.sites
    }

    pub fn labels(&self) -> usize {
        self.labels
    }

    /// Sets the unary costs (`sites x labels`, row-major). Lower cost means more likely.
    pub fn set_unary(&mut self, unary: &[f32]) -> Result<()> {
        if unary.len() != self.sites * self.labels {
            return Err(Error::model(format!(
                "unary has {} values, expected {} sites x {} labels",
                unary.len(),
                self.sites,
                self.labels
            )));
        }
        if let Some(i) = unary.iter().position(|u| !u.is_finite()) {
            return Err(Error::model(format!(
                "unary cost of site {} is not finite",
                i / self.labels
            )));
        }
        self.unary = Some(Array2D::from_slice(unary, self.labels, self.sites)?);
        Ok(())
    }

    /// Adds a pairwise kernel. `features` has one row per site with the feature vector already
    /// divided by the bandwidths. The lattice is built here and reused by every inference.
    pub fn add_pairwise(
        &mut self,
        features: &Array2D<f32>,
        weight: f32,
        compatibility: Compatibility,
        normalization: Normalization,
    ) -> Result<()> {
        if features.height != self.sites {
            return Err(Error::model(format!(
                "kernel features have {} rows for {} sites",
                features.height, self.sites
            )));
        }
        if features.as_slice().iter().any(|f| !f.is_finite()) {
            return Err(Error::model("kernel features are not finite"));
        }
        if !weight.is_finite() {
            return Err(Error::model(format!("kernel weight {weight} is not finite")));
        }
        compatibility.validate(self.labels)?;
        self.pairwise.push(PairwiseTerm::new(
            features,
            weight,
            &compatibility,
            normalization,
            self.threading,
        ));
        Ok(())
    }

    fn unary(&self) -> Result<&Array2D<f32>> {
        self.unary
            .as_ref()
            .ok_or_else(|| Error::model("unary costs not set"))
    }

    /// Initial beliefs `softmax(-unary)`.
    ///
    /// Fails with `NumericOverflow` when a mean-field score could leave the `f32` range.
    pub fn start_inference(&self) -> Result<MeanField<'_>> {
        let unary = self.unary()?;
        let max_unary = unary.as_slice().iter().fold(0f32, |a, b| a.max(b.abs())) as f64;
        let score_bound = self
            .pairwise
            .iter()
            .filter(|t| t.weight != 0.0)
            .fold(max_unary, |a, t| a + t.message_bound);
        if score_bound >= f32::MAX as f64 {
            return Err(Error::overflow(format!(
                "mean-field scores may reach {score_bound:e}, beyond the f32 range"
            )));
        }
        trace!("mean-field score bound {score_bound:e}");
        let mut q: Vec<f32> = unary.as_slice().iter().map(|u| -u).collect();
        exp_normalize_rows(&mut q, self.labels, self.threading);
        Ok(MeanField {
            crf: self,
            q,
            iteration: 0,
        })
    }

    /// Runs `iterations` mean-field updates and returns the final marginals.
    pub fn inference(&self, iterations: u16) -> Result<Beliefs> {
        if iterations < 1 {
            return Err(Error::model("at least one mean-field iteration needed"));
        }
        let t0 = Instant::now();
        let mut mean_field = self.start_inference()?;
        for _ in 0..iterations {
            mean_field.step();
        }
        debug!(
            "mean field: {} sites, {} labels, {} kernels, {iterations} iterations took {:?}",
            self.sites,
            self.labels,
            self.pairwise.len(),
            t0.elapsed()
        );
        Ok(mean_field.into_beliefs())
    }

    /// Maximum posterior marginal labelling after `iterations` updates.
    pub fn map(&self, iterations: u16) -> Result<Vec<u16>> {
        Ok(self.inference(iterations)?.map_labels())
    }

    /// Gibbs energy of a labelling. The pairwise part goes through the lattice, so it is exact
    /// only up to the filter approximation.
    pub fn energy(&self, labels: &[u16]) -> Result<f32> {
        let unary = self.unary()?;
        if labels.len() != self.sites {
            return Err(Error::model(format!(
                "labelling has {} sites, expected {}",
                labels.len(),
                self.sites
            )));
        }
        if let Some(l) = labels.iter().find(|l| **l as usize >= self.labels) {
            return Err(Error::model(format!("label {l} out of range")));
        }
        let mut energy: f32 = labels
            .iter()
            .zip(unary.rows())
            .map(|(l, row)| row[*l as usize])
            .sum();
        let mut one_hot = vec![0f32; self.sites * self.labels];
        for (i, l) in labels.iter().enumerate() {
            one_hot[i * self.labels + *l as usize] = 1.0;
        }
        for term in self.pairwise.iter().filter(|t| t.weight != 0.0) {
            let filtered = term.filter(&one_hot, self.labels, self.threading);
            let pairwise: f32 = labels
                .iter()
                .zip(filtered.chunks_exact(self.labels))
                .map(|(l, f)| {
                    f.iter()
                        .enumerate()
                        .map(|(l2, v)| term.compatibility.penalty(*l as usize, l2) * v)
                        .sum::<f32>()
                })
                .sum();
            energy += 0.5 * term.weight * pairwise;
        }
        Ok(energy)
    }

    /// KL divergence between `beliefs` and the model distribution, up to the log partition
    /// constant.
    pub fn kl_divergence(&self, beliefs: &Beliefs) -> Result<f64> {
        let unary = self.unary()?;
        if beliefs.sites() != self.sites || beliefs.labels() != self.labels {
            return Err(Error::model(format!(
                "beliefs are {}x{}, expected {}x{}",
                beliefs.sites(),
                beliefs.labels(),
                self.sites,
                self.labels
            )));
        }
        let q = beliefs.probabilities.as_slice();
        let mut kl: f64 = q
            .iter()
            .zip(unary.as_slice())
            .map(|(p, u)| {
                let p = *p as f64;
                p * p.max(1e-20).ln() + *u as f64 * p
            })
            .sum();
        for term in self.pairwise.iter().filter(|t| t.weight != 0.0) {
            let message = term.message(q, self.labels, self.threading);
            kl += q
                .iter()
                .zip(&message)
                .map(|(p, m)| *p as f64 * *m as f64)
                .sum::<f64>();
        }
        Ok(kl)
    }
}

/// Running mean-field inference. Every `step()` is one full parallel update of all sites.
pub struct MeanField<'a> {
    crf: &'a DenseCrf,
    q: Vec<f32>,
    iteration: u16,
}

impl MeanField<'_> {
    pub fn iteration(&self) -> u16 {
        self.iteration
    }

    /// Current marginals (`sites x labels`).
    pub fn probabilities(&self) -> &[f32] {
        &self.q
    }

    pub fn step(&mut self) {
        let crf = self.crf;
        let labels = crf.labels;
        let threading = crf.threading;
        let q = &self.q;
        let active: Vec<&PairwiseTerm> = crf.pairwise.iter().filter(|t| t.weight != 0.0).collect();
        // all kernels see the same Q, the messages are summed in kernel order afterwards
        let messages: Vec<Vec<f32>> = match threading {
            ThreadingStrategy::SingleThread => active
                .iter()
                .map(|t| t.message(q, labels, threading))
                .collect(),
            ThreadingStrategy::KernelParallel => active
                .par_iter()
                .map(|t| t.message(q, labels, threading))
                .collect(),
        };
        let mut scores: Vec<f32> = match &crf.unary {
            Some(unary) => unary.as_slice().iter().map(|u| -u).collect(),
            None => vec![0f32; q.len()],
        };
        for message in &messages {
            scores.iter_mut().zip(message).for_each(|(s, m)| *s -= m);
        }
        exp_normalize_rows(&mut scores, labels, threading);
        self.q = scores;
        self.iteration += 1;
        trace!("mean field iteration {} done", self.iteration);
    }

    pub fn into_beliefs(self) -> Beliefs {
        Beliefs {
            probabilities: Array2D::from_fn(self.crf.labels, self.crf.sites, |l, i| {
                self.q[i * self.crf.labels + l]
            }),
        }
    }
}

/// Row-wise softmax in place.
fn exp_normalize_rows(scores: &mut [f32], labels: usize, threading: ThreadingStrategy) {
    let rows = scores.len() / labels;
    let num_threads = match threading {
        ThreadingStrategy::SingleThread => 1,
        ThreadingStrategy::KernelParallel => current_num_threads(),
    };
    let chunk = rows.div_ceil(num_threads).max(1) * labels;
    if num_threads == 1 {
        exp_normalize(scores, labels);
    } else {
        scores
            .par_chunks_mut(chunk)
            .for_each(|rows| exp_normalize(rows, labels));
    }
}

#[multiversion(targets = "simd")]
fn exp_normalize(scores: &mut [f32], labels: usize) {
    for row in scores.chunks_exact_mut(labels) {
        let max = row.iter().fold(f32::NEG_INFINITY, |a, b| a.max(*b));
        let mut sum = 0f32;
        for v in row.iter_mut() {
            *v = (*v - max).exp();
            sum += *v;
        }
        let inv = 1.0 / sum;
        row.iter_mut().for_each(|v| *v *= inv);
    }
}

/// Checks that a bandwidth vector has `expected` entries, all finite and positive.
pub(crate) fn validate_bandwidths(what: &str, stddev: &[f32], expected: usize) -> Result<()> {
    if stddev.len() != expected {
        return Err(Error::model(format!(
            "{what} has {} standard deviations, expected {expected}",
            stddev.len()
        )));
    }
    if let Some(s) = stddev.iter().find(|s| !(s.is_finite() && **s > 0.0)) {
        return Err(Error::model(format!(
            "{what} standard deviation {s} must be finite and positive"
        )));
    }
    Ok(())
}

/// Feature matrix of `kernel` on a regular grid with `dims` = `[width, height]` or
/// `[width, height, depth]`. Site `s` sits at `x = s % width`, `y = (s / width) % height`,
/// `z = s / (width * height)`.
pub(crate) fn grid_features<P: Copy + Into<f32>>(
    kernel: &Kernel,
    dims: &[usize],
    image: &GridImage<'_, P>,
) -> Result<Array2D<f32>> {
    validate_bandwidths("spatial kernel", &kernel.spatial_stddev, dims.len())?;
    let sites: usize = dims.iter().product();
    let inv_spatial: Vec<f32> = kernel.spatial_stddev.iter().map(|s| 1.0 / s).collect();
    let coordinate = |site: usize, axis: usize| -> f32 {
        let stride: usize = dims[..axis].iter().product();
        ((site / stride) % dims[axis]) as f32
    };
    match &kernel.kind {
        KernelKind::Gaussian => Ok(Array2D::from_fn(dims.len(), sites, |axis, site| {
            coordinate(site, axis) * inv_spatial[axis]
        })),
        KernelKind::Bilateral { color_stddev } => {
            validate_bandwidths("color kernel", color_stddev, image.channels)?;
            if image.sites() != sites || image.data.len() != sites * image.channels {
                return Err(Error::model(format!(
                    "image has {} values, expected {sites} sites x {} channels",
                    image.data.len(),
                    image.channels
                )));
            }
            let inv_color: Vec<f32> = color_stddev.iter().map(|s| 1.0 / s).collect();
            let spatial = dims.len();
            Ok(Array2D::from_fn(spatial + image.channels, sites, |c, site| {
                if c < spatial {
                    coordinate(site, c) * inv_spatial[c]
                } else {
                    let v: f32 = image.pixel(site)[c - spatial].into();
                    v * inv_color[c - spatial]
                }
            }))
        }
    }
}

/// Builds the model for a regular grid and runs the configured inference.
pub(crate) fn infer_on_grid<P: Copy + Into<f32>>(
    dims: &[usize],
    labels: usize,
    unary: &[f32],
    image: &GridImage<'_, P>,
    config: &CrfConfig,
) -> Result<Beliefs> {
    if config.iterations < 1 {
        return Err(Error::model("at least one mean-field iteration needed"));
    }
    let sites: usize = dims.iter().product();
    let mut crf = DenseCrf::new(sites, labels)?.with_threading(config.threading);
    crf.set_unary(unary)?;
    // validate every kernel before building any lattice
    let features = config
        .kernels
        .iter()
        .map(|kernel| {
            kernel.compatibility.validate(labels)?;
            grid_features(kernel, dims, image)
        })
        .collect::<Result<Vec<_>>>()?;
    for (kernel, features) in config.kernels.iter().zip(&features) {
        crf.add_pairwise(
            features,
            kernel.weight,
            kernel.compatibility.clone(),
            kernel.normalization,
        )?;
    }
    crf.inference(config.iterations)
}

#[cfg(test)]
mod tests {
    use super::{drop_constant_columns, Beliefs, DenseCrf, PairwiseTerm};
    use crate::arrays::Array2D;
    use crate::common::{Normalization, ThreadingStrategy};
    use crate::compatibility::Compatibility;
    use crate::error::Error;
    use approx::assert_abs_diff_eq;

    fn noisy_unary(sites: usize, labels: usize) -> Vec<f32> {
        (0..sites * labels)
            .map(|i| ((i * 7919 + 13) % 97) as f32 / 30.0)
            .collect()
    }

    fn line_features(sites: usize, stddev: f32) -> Array2D<f32> {
        Array2D::from_fn(1, sites, |_, y| y as f32 / stddev)
    }

    #[test]
    fn probabilities_sum_to_one_test() {
        let mut crf = DenseCrf::new(40, 3).unwrap();
        crf.set_unary(&noisy_unary(40, 3)).unwrap();
        crf.add_pairwise(
            &line_features(40, 3.0),
            5.0,
            Compatibility::Potts,
            Normalization::Symmetric,
        )
        .unwrap();
        crf.add_pairwise(
            &line_features(40, 1.0),
            2.0,
            Compatibility::Diagonal(vec![-1.0, -1.0, -1.0]),
            Normalization::After,
        )
        .unwrap();
        let mut mean_field = crf.start_inference().unwrap();
        for it in 1..=6 {
            mean_field.step();
            assert_eq!(mean_field.iteration(), it);
            for row in mean_field.probabilities().chunks_exact(3) {
                assert_abs_diff_eq!(row.iter().sum::<f32>(), 1.0, epsilon = 1e-5);
                assert!(row.iter().all(|p| *p >= 0.0));
            }
        }
    }

    #[test]
    fn zero_weight_map_equals_unary_argmin_test() {
        let unary = noisy_unary(30, 4);
        let mut crf = DenseCrf::new(30, 4).unwrap();
        crf.set_unary(&unary).unwrap();
        crf.add_pairwise(
            &line_features(30, 2.0),
            0.0,
            Compatibility::Potts,
            Normalization::Symmetric,
        )
        .unwrap();
        let labels = crf.map(5).unwrap();
        for (site, l) in labels.iter().enumerate() {
            let row = &unary[site * 4..site * 4 + 4];
            let mut argmin = 0;
            for (k, u) in row.iter().enumerate() {
                if *u < row[argmin] {
                    argmin = k;
                }
            }
            assert_eq!(*l as usize, argmin);
        }
    }

    #[test]
    fn smoothing_flips_outlier_test() {
        // label 0 everywhere except a weak outlier in the middle
        let mut unary = vec![0f32; 21 * 2];
        for i in 0..21 {
            unary[i * 2 + 1] = 1.0;
        }
        unary[10 * 2] = 0.3;
        unary[10 * 2 + 1] = 0.0;
        let mut crf = DenseCrf::new(21, 2).unwrap();
        crf.set_unary(&unary).unwrap();
        assert_eq!(crf.map(1).unwrap()[10], 1);
        crf.add_pairwise(
            &line_features(21, 2.0),
            3.0,
            Compatibility::Potts,
            Normalization::Symmetric,
        )
        .unwrap();
        let labels = crf.map(5).unwrap();
        assert!(labels.iter().all(|l| *l == 0), "{labels:?}");
    }

    #[test]
    fn threading_bit_identical_test() {
        let features = Array2D::from_fn(3, 200, |x, y| ((y * 13 + x * 29) % 17) as f32 * 0.4);
        let unary = noisy_unary(200, 3);
        let run = |threading| {
            let mut crf = DenseCrf::new(200, 3).unwrap().with_threading(threading);
            crf.set_unary(&unary).unwrap();
            crf.add_pairwise(&features, 3.0, Compatibility::Potts, Normalization::Symmetric)
                .unwrap();
            crf.add_pairwise(
                &line_features(200, 4.0),
                1.5,
                Compatibility::Potts,
                Normalization::Mean,
            )
            .unwrap();
            crf.inference(4).unwrap().probabilities.as_slice().to_vec()
        };
        let single = run(ThreadingStrategy::SingleThread);
        assert_eq!(single, run(ThreadingStrategy::SingleThread));
        assert_eq!(single, run(ThreadingStrategy::KernelParallel));
    }

    #[test]
    fn energy_test() {
        // both sites at the same position: the filter is an exact sum
        let mut crf = DenseCrf::new(2, 2).unwrap();
        crf.set_unary(&[0.0; 4]).unwrap();
        crf.add_pairwise(
            &Array2D::from_fn(2, 2, |_, _| 1.0),
            2.0,
            Compatibility::Potts,
            Normalization::Symmetric,
        )
        .unwrap();
        assert_abs_diff_eq!(crf.energy(&[0, 0]).unwrap(), 0.0, epsilon = 1e-6);
        assert_abs_diff_eq!(crf.energy(&[0, 1]).unwrap(), 1.0, epsilon = 1e-5);
        assert!(crf.energy(&[0, 2]).is_err());
        assert!(crf.energy(&[0]).is_err());
    }

    #[test]
    fn kl_divergence_without_pairwise_test() {
        let mut crf = DenseCrf::new(1, 2).unwrap();
        crf.set_unary(&[0.0, 1.0]).unwrap();
        let beliefs = Beliefs {
            probabilities: Array2D::from_slice(&[0.5, 0.5], 2, 1).unwrap(),
        };
        let expected = 0.5f64.ln() + 0.5;
        assert_abs_diff_eq!(crf.kl_divergence(&beliefs).unwrap(), expected, epsilon = 1e-6);
        // the mean-field fixed point minimizes the free energy
        let fixed_point = crf.inference(1).unwrap();
        assert!(crf.kl_divergence(&fixed_point).unwrap() < expected);
    }

    #[test]
    fn map_tie_break_test() {
        let beliefs = Beliefs {
            probabilities: Array2D::from_slice(&[0.5, 0.5, 0.2, 0.4, 0.4], 5, 1).unwrap(),
        };
        assert_eq!(beliefs.map_labels(), vec![0]);
        let beliefs = Beliefs {
            probabilities: Array2D::from_slice(&[0.2, 0.4, 0.4], 3, 1).unwrap(),
        };
        assert_eq!(beliefs.map_labels(), vec![1]);
    }

    #[test]
    fn drop_constant_columns_test() {
        let features = Array2D::from_fn(3, 4, |x, y| if x == 1 { 7.0 } else { (x + y) as f32 });
        let reduced = drop_constant_columns(&features);
        assert_eq!(reduced.width, 2);
        assert_eq!(reduced.get_row(3), &[3.0, 5.0]);
    }

    #[test]
    fn normalization_placement_test() {
        let features = Array2D::from_fn(1, 12, |_, y| (y * y) as f32 / 20.0);
        let signal: Vec<f32> = (0..12).map(|i| ((i * 5) % 7) as f32).collect();
        let threading = ThreadingStrategy::SingleThread;
        let term = |normalization| {
            PairwiseTerm::new(&features, 1.0, &Compatibility::Potts, normalization, threading)
        };
        let before = term(Normalization::Before);
        let scaled: Vec<f32> = signal.iter().zip(&before.norm).map(|(v, n)| v * n).collect();
        assert_eq!(
            before.filter(&signal, 1, threading),
            before.lattice.compute(&scaled, 1, threading)
        );
        let after = term(Normalization::After);
        let expected: Vec<f32> = after
            .lattice
            .compute(&signal, 1, threading)
            .iter()
            .zip(&after.norm)
            .map(|(v, n)| v * n)
            .collect();
        assert_eq!(after.filter(&signal, 1, threading), expected);
        // sparse features: the per-site factors differ, the mean one is shared
        assert!(after.norm.iter().any(|n| *n != after.norm[0]));
        let mean = term(Normalization::Mean);
        assert!(mean.norm.iter().all(|n| *n == mean.norm[0]));
        let total: f32 = after.norm.iter().map(|n| 1.0 / n).sum();
        assert_abs_diff_eq!(mean.norm[0], 12.0 / total, epsilon = 1e-4);
    }

    #[test]
    fn huge_costs_overflow_test() {
        let mut crf = DenseCrf::new(4, 2).unwrap();
        crf.set_unary(&[3e38; 8]).unwrap();
        crf.add_pairwise(
            &line_features(4, 1.0),
            1e38,
            Compatibility::Diagonal(vec![10.0, 10.0]),
            Normalization::Symmetric,
        )
        .unwrap();
        assert!(matches!(crf.inference(1), Err(Error::NumericOverflow(_))));
        assert!(matches!(crf.start_inference(), Err(Error::NumericOverflow(_))));
        // the same costs without pairwise terms stay in range
        let mut crf = DenseCrf::new(4, 2).unwrap();
        crf.set_unary(&[3e38, 0.0, 0.0, 3e38, 3e38, 0.0, 0.0, 3e38]).unwrap();
        assert_eq!(crf.map(1).unwrap(), vec![1, 0, 1, 0]);
    }

    #[test]
    fn large_finite_costs_stay_finite_test() {
        let mut crf = DenseCrf::new(6, 2).unwrap();
        let unary: Vec<f32> = (0..12).map(|i| if i % 3 == 0 { 1e30 } else { -1e30 }).collect();
        crf.set_unary(&unary).unwrap();
        crf.add_pairwise(
            &line_features(6, 1.0),
            1e20,
            Compatibility::Potts,
            Normalization::Mean,
        )
        .unwrap();
        let beliefs = crf.inference(3).unwrap();
        assert!(beliefs.probabilities.as_slice().iter().all(|p| p.is_finite()));
    }

    #[test]
    fn invalid_model_test() {
        assert!(matches!(DenseCrf::new(10, 1), Err(Error::InvalidModel(_))));
        assert!(DenseCrf::new(0, 2).is_err());
        let mut crf = DenseCrf::new(4, 2).unwrap();
        assert!(crf.start_inference().is_err());
        assert!(crf.set_unary(&[0.0; 7]).is_err());
        assert!(crf.set_unary(&[0.0, 1.0, f32::NAN, 0.0, 0.0, 0.0, 0.0, 0.0]).is_err());
        crf.set_unary(&[0.0; 8]).unwrap();
        assert!(crf
            .add_pairwise(
                &line_features(5, 1.0),
                1.0,
                Compatibility::Potts,
                Normalization::Symmetric
            )
            .is_err());
        assert!(crf
            .add_pairwise(
                &line_features(4, 1.0),
                1.0,
                Compatibility::Diagonal(vec![1.0; 3]),
                Normalization::Symmetric
            )
            .is_err());
        assert!(matches!(crf.inference(0), Err(Error::InvalidModel(_))));
    }
}
