use crate::arrays::Array2D;
use crate::common::ThreadingStrategy;
use assume::assume;
use log::debug;
use multiversion::multiversion;
use rayon::current_num_threads;
use rayon::prelude::*;
use std::collections::HashMap;
use std::time::Instant;

/// Sparse lattice: integer vertex keys (the first `d` coordinates, the last one is implied by
/// the zero sum) mapped to dense vertex indices in insertion order.
struct LatticeHash {
    dim: usize,
    index: HashMap<Box<[i32]>, u32>,
    keys: Vec<i32>,
}

impl LatticeHash {
    fn with_capacity(dim: usize, capacity: usize) -> Self {
        Self {
            dim,
            index: HashMap::with_capacity(capacity),
            keys: Vec::with_capacity(capacity * dim),
        }
    }

    fn len(&self) -> usize {
        self.keys.len() / self.dim
    }

    fn find_or_insert(&mut self, key: &[i32]) -> u32 {
        if let Some(&vertex) = self.index.get(key) {
            return vertex;
        }
        let vertex = self.len() as u32;
        self.keys.extend_from_slice(key);
        self.index.insert(key.into(), vertex);
        vertex
    }

    fn find(&self, key: &[i32]) -> Option<u32> {
        self.index.get(key).copied()
    }

    fn key(&self, vertex: usize) -> &[i32] {
        &self.keys[vertex * self.dim..(vertex + 1) * self.dim]
    }
}

/// Per-site scratch buffers of the elevation step.
struct Elevation {
    elevated: Vec<f32>,
    rem0: Vec<i32>,
    rank: Vec<i32>,
    barycentric: Vec<f32>,
}

impl Elevation {
    fn new(dim: usize) -> Self {
        Self {
            elevated: vec![0.0; dim + 1],
            rem0: vec![0; dim + 1],
            rank: vec![0; dim + 1],
            barycentric: vec![0.0; dim + 2],
        }
    }

    /// Finds the simplex enclosing `feature`. Writes the keys of its `d + 1` vertices (`d`
    /// coordinates each) and the barycentric weights.
    fn locate(
        &mut self,
        feature: &[f32],
        scale_factor: &[f32],
        canonical: &[i32],
        keys: &mut [i32],
        weights: &mut [f32],
    ) {
        let d = feature.len();
        let d1 = d + 1;
        let Self {
            elevated,
            rem0,
            rank,
            barycentric,
        } = self;

        // elevate the feature onto the hyperplane
        let mut sm = 0f32;
        for j in (1..=d).rev() {
            let cf = feature[j - 1] * scale_factor[j - 1];
            elevated[j] = sm - j as f32 * cf;
            sm += cf;
        }
        elevated[0] = sm;

        // closest 0-colored lattice point
        let down_factor = 1.0 / d1 as f32;
        let up_factor = d1 as f32;
        let mut sum: i32 = 0;
        for i in 0..d1 {
            let v = down_factor * elevated[i];
            let up = v.ceil() * up_factor;
            let down = v.floor() * up_factor;
            let nearest = if up - elevated[i] < elevated[i] - down {
                up
            } else {
                down
            };
            let rounded = nearest as i32;
            rem0[i] = rounded;
            sum += rounded / d1 as i32;
        }

        // rank of each coordinate of the remainder in the sorted order
        rank.fill(0);
        for i in 0..d {
            let di = elevated[i] - rem0[i] as f32;
            for j in i + 1..d1 {
                if di < elevated[j] - rem0[j] as f32 {
                    rank[i] += 1;
                } else {
                    rank[j] += 1;
                }
            }
        }

        // bring the point back onto the plane if the rounding moved it off
        for i in 0..d1 {
            rank[i] += sum;
            if rank[i] < 0 {
                rank[i] += d1 as i32;
                rem0[i] += d1 as i32;
            } else if rank[i] > d as i32 {
                rank[i] -= d1 as i32;
                rem0[i] -= d1 as i32;
            }
        }

        barycentric.fill(0.0);
        for i in 0..d1 {
            let v = (elevated[i] - rem0[i] as f32) * down_factor;
            let r = d - rank[i] as usize;
            barycentric[r] += v;
            barycentric[r + 1] -= v;
        }
        // wrap around
        barycentric[0] += 1.0 + barycentric[d1];

        for remainder in 0..d1 {
            let key = &mut keys[remainder * d..(remainder + 1) * d];
            for (i, k) in key.iter_mut().enumerate() {
                *k = rem0[i] + canonical[remainder * d1 + rank[i] as usize];
            }
            weights[remainder] = barycentric[remainder];
        }
    }
}

/// Permutohedral lattice built for one set of features (Adams, Baek, Davis, 2010). Reusable for
/// any number of `compute()` calls.
///
/// A signal is splatted onto the enclosing simplex vertices, blurred with `[1/2, 1, 1/2]` along
/// each of the `d + 1` lattice axes and sliced back. This approximates filtering with
/// `exp(-|f_i - f_j|^2 / 2)` in `O(N d^2)`, with an error that grows when the features are much
/// denser or sparser than the lattice spacing.
pub struct Permutohedral {
    sites: usize,
    dim: usize,
    vertices: usize,
    /// Vertex of every (site, remainder) pair, shifted by one. Vertex 0 is an always-zero
    /// vertex standing in for lattice points which do not exist.
    offset: Vec<u32>,
    barycentric: Vec<f32>,
    /// `[n1, n2]` neighbours of every vertex along every axis (`(d + 1) x vertices`), shifted by
    /// one like `offset`.
    blur_neighbours: Vec<[u32; 2]>,
}

impl Permutohedral {
    /// Builds the lattice. `features` has one row per site and one column per feature
    /// dimension, already divided by the kernel bandwidths.
    pub fn new(features: &Array2D<f32>, threading: ThreadingStrategy) -> Self {
        let t0 = Instant::now();
        let n = features.height;
        let d = features.width;
        if d == 0 || n == 0 {
            return Self {
                sites: n,
                dim: d,
                vertices: 0,
                offset: Vec::new(),
                barycentric: Vec::new(),
                blur_neighbours: Vec::new(),
            };
        }
        let d1 = d + 1;

        // expected standard deviation of the filter (p.6 in Adams et al.)
        let inv_std_dev = (2.0f32 / 3.0).sqrt() * d1 as f32;
        // diagonal part of the elevation matrix E (p.5 in Adams et al.)
        let scale_factor: Vec<f32> = (0..d)
            .map(|i| 1.0 / (((i + 2) * (i + 1)) as f32).sqrt() * inv_std_dev)
            .collect();
        // canonical simplex
        let canonical: Vec<i32> = (0..d1 * d1)
            .map(|idx| {
                let (i, j) = (idx / d1, idx % d1);
                if j <= d - i {
                    i as i32
                } else {
                    i as i32 - d1 as i32
                }
            })
            .collect();

        let mut keys = vec![0i32; n * d1 * d];
        let mut barycentric = vec![0f32; n * d1];
        let locate =
            |elevation: &mut Elevation, (site, (k, w)): (usize, (&mut [i32], &mut [f32]))| {
                elevation.locate(features.get_row(site), &scale_factor, &canonical, k, w)
            };
        match threading {
            ThreadingStrategy::SingleThread => {
                let mut elevation = Elevation::new(d);
                keys.chunks_mut(d1 * d)
                    .zip(barycentric.chunks_mut(d1))
                    .enumerate()
                    .for_each(|item| locate(&mut elevation, item));
            }
            ThreadingStrategy::KernelParallel => {
                keys.par_chunks_mut(d1 * d)
                    .zip(barycentric.par_chunks_mut(d1))
                    .enumerate()
                    .for_each_init(|| Elevation::new(d), locate);
            }
        }

        // vertex numbering must not depend on thread scheduling
        let mut hash = LatticeHash::with_capacity(d, n);
        let offset: Vec<u32> = keys
            .chunks_exact(d)
            .map(|key| hash.find_or_insert(key) + 1)
            .collect();
        let vertices = hash.len();

        let mut blur_neighbours = vec![[0u32; 2]; d1 * vertices];
        let neighbours_of = |(n1, n2): &mut (Vec<i32>, Vec<i32>),
                             (idx, out): (usize, &mut [u32; 2])| {
            let (axis, vertex) = (idx / vertices, idx % vertices);
            let key = hash.key(vertex);
            for k in 0..d {
                n1[k] = key[k] - 1;
                n2[k] = key[k] + 1;
            }
            if axis < d {
                n1[axis] = key[axis] + d as i32;
                n2[axis] = key[axis] - d as i32;
            }
            *out = [
                hash.find(n1).map_or(0, |v| v + 1),
                hash.find(n2).map_or(0, |v| v + 1),
            ];
        };
        let scratch = || (vec![0i32; d], vec![0i32; d]);
        match threading {
            ThreadingStrategy::SingleThread => {
                let mut buffers = scratch();
                blur_neighbours
                    .iter_mut()
                    .enumerate()
                    .for_each(|item| neighbours_of(&mut buffers, item));
            }
            ThreadingStrategy::KernelParallel => {
                blur_neighbours
                    .par_iter_mut()
                    .enumerate()
                    .for_each_init(scratch, neighbours_of);
            }
        }

        debug!(
            "permutohedral lattice: {n} sites, {d} dims, {vertices} vertices, took {:?}",
            t0.elapsed()
        );
        Self {
            sites: n,
            dim: d,
            vertices,
            offset,
            barycentric,
            blur_neighbours,
        }
    }

    pub fn sites(&self) -> usize {
        self.sites
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Number of lattice vertices, at most `(d + 1) * sites`.
    pub fn vertices(&self) -> usize {
        self.vertices
    }

    /// Filters `input` (`sites x value_size`, row-major) and returns the filtered signal.
    pub fn compute(
        &self,
        input: &[f32],
        value_size: usize,
        threading: ThreadingStrategy,
    ) -> Vec<f32> {
        assert_eq!(input.len(), self.sites * value_size);
        let vs = value_size;
        if self.dim == 0 {
            // every pair of sites is at distance zero
            let mut total = vec![0f32; vs];
            for row in input.chunks_exact(vs) {
                total.iter_mut().zip(row).for_each(|(t, v)| *t += v);
            }
            return (0..self.sites).flat_map(|_| total.iter().copied()).collect();
        }
        let d1 = self.dim + 1;
        let num_threads = match threading {
            ThreadingStrategy::SingleThread => 1,
            ThreadingStrategy::KernelParallel => current_num_threads(),
        };

        let mut values = vec![0f32; (self.vertices + 1) * vs];
        splat(&mut values, input, &self.offset, &self.barycentric, d1, vs);

        let mut new_values = vec![0f32; (self.vertices + 1) * vs];
        let vertex_chunk = self.vertices.div_ceil(num_threads).max(1);
        for axis in 0..d1 {
            let neighbours = &self.blur_neighbours[axis * self.vertices..(axis + 1) * self.vertices];
            let old = &values;
            let blur = |(chunk_no, out): (usize, &mut [f32])| {
                let first = chunk_no * vertex_chunk;
                blur_range(out, old, &neighbours[first..first + out.len() / vs], first, vs)
            };
            if num_threads == 1 {
                new_values[vs..]
                    .chunks_mut(vertex_chunk * vs)
                    .enumerate()
                    .for_each(blur);
            } else {
                new_values[vs..]
                    .par_chunks_mut(vertex_chunk * vs)
                    .enumerate()
                    .for_each(blur);
            }
            std::mem::swap(&mut values, &mut new_values);
        }

        // the lattice blur is wider than the target Gaussian by this factor
        let alpha = 1.0 / (1.0 + 2f32.powi(-(self.dim as i32)));
        let mut out = vec![0f32; self.sites * vs];
        let site_chunk = self.sites.div_ceil(num_threads).max(1);
        let values = &values;
        let slice_chunk = |(chunk_no, out): (usize, &mut [f32])| {
            let first = chunk_no * site_chunk;
            let last = first + out.len() / vs;
            slice(
                out,
                values,
                &self.offset[first * d1..last * d1],
                &self.barycentric[first * d1..last * d1],
                d1,
                vs,
                alpha,
            )
        };
        if num_threads == 1 {
            out.chunks_mut(site_chunk * vs)
                .enumerate()
                .for_each(slice_chunk);
        } else {
            out.par_chunks_mut(site_chunk * vs)
                .enumerate()
                .for_each(slice_chunk);
        }
        out
    }
}

#[multiversion(targets = "simd")]
fn splat(
    values: &mut [f32],
    input: &[f32],
    offset: &[u32],
    barycentric: &[f32],
    vertices_per_site: usize,
    value_size: usize,
) {
    for ((site_offset, site_weight), signal) in offset
        .chunks_exact(vertices_per_site)
        .zip(barycentric.chunks_exact(vertices_per_site))
        .zip(input.chunks_exact(value_size))
    {
        for (o, w) in site_offset.iter().zip(site_weight) {
            let o = *o as usize * value_size;
            assume!(unsafe: o + value_size <= values.len());
            values[o..o + value_size]
                .iter_mut()
                .zip(signal)
                .for_each(|(v, s)| *v += w * s);
        }
    }
}

/// Blurs vertices `first..first + out.len() / value_size` along one axis.
#[multiversion(targets = "simd")]
fn blur_range(
    out: &mut [f32],
    values: &[f32],
    neighbours: &[[u32; 2]],
    first: usize,
    value_size: usize,
) {
    for (i, (new_val, [n1, n2])) in out.chunks_exact_mut(value_size).zip(neighbours).enumerate() {
        let o = (first + i + 1) * value_size;
        let n1 = *n1 as usize * value_size;
        let n2 = *n2 as usize * value_size;
        assume!(unsafe: o + value_size <= values.len());
        assume!(unsafe: n1 + value_size <= values.len());
        assume!(unsafe: n2 + value_size <= values.len());
        for k in 0..value_size {
            new_val[k] = values[o + k] + 0.5 * (values[n1 + k] + values[n2 + k]);
        }
    }
}

#[multiversion(targets = "simd")]
fn slice(
    out: &mut [f32],
    values: &[f32],
    offset: &[u32],
    barycentric: &[f32],
    vertices_per_site: usize,
    value_size: usize,
    alpha: f32,
) {
    for ((site_out, site_offset), site_weight) in out
        .chunks_exact_mut(value_size)
        .zip(offset.chunks_exact(vertices_per_site))
        .zip(barycentric.chunks_exact(vertices_per_site))
    {
        for (o, w) in site_offset.iter().zip(site_weight) {
            let o = *o as usize * value_size;
            assume!(unsafe: o + value_size <= values.len());
            site_out
                .iter_mut()
                .zip(&values[o..o + value_size])
                .for_each(|(r, v)| *r += w * v * alpha);
        }
    }
}
