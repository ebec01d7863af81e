use crate::arrays::{Array2D, Array3D};
use crate::capacity::Capacity;
use crate::common::{split_length_to_ranges, GridImage, MaxflowParams, PROB_EPSILON};
use crate::error::{Error, Result};
use crate::graph::Graph;
use log::debug;
use rayon::current_num_threads;
use rayon::prelude::*;
use std::time::Instant;

/// Two arcs between `from` and `to`: `cap` in the forward and `rev_cap` in the backward
/// direction.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Edge<T> {
    pub from: usize,
    pub to: usize,
    pub cap: T,
    pub rev_cap: T,
}

/// Result of a minimum cut.
#[derive(Clone, Debug)]
pub struct Cut<T: Capacity> {
    /// `1` for nodes on the source side, `0` for the sink side.
    pub labels: Vec<u8>,
    /// Maximum flow, equal to the capacity of the cut.
    pub flow: T::Flow,
}

/// Computes the minimum s-t cut.
///
/// `terminals[i] = [cap_source, cap_sink]`: `cap_source` is the cost of putting node `i` on the
/// sink side, `cap_sink` the cost of the source side.
pub fn solve<T: Capacity>(terminals: &[[T; 2]], edges: &[Edge<T>]) -> Result<Cut<T>> {
    if terminals.is_empty() {
        return Err(Error::graph("graph has no nodes"));
    }
    let mut graph = Graph::new(terminals.len(), edges.len());
    for (i, [cap_source, cap_sink]) in terminals.iter().enumerate() {
        graph.add_tweights(i, *cap_source, *cap_sink)?;
    }
    for edge in edges {
        graph.add_edge(edge.from, edge.to, edge.cap, edge.rev_cap)?;
    }
    let flow = graph.maxflow()?;
    Ok(Cut {
        labels: graph.labels(),
        flow,
    })
}

#[derive(Clone, Copy, Debug)]
struct GridShape {
    width: usize,
    height: usize,
    depth: usize,
}

impl GridShape {
    fn len(&self) -> usize {
        self.width * self.height * self.depth
    }

    /// Forward neighbours of `site`: `+x`, `+y`, `+z` (if inside the grid).
    #[inline]
    fn forward_neighbours(&self, site: usize) -> [Option<usize>; 3] {
        let x = site % self.width;
        let y = (site / self.width) % self.height;
        let z = site / (self.width * self.height);
        [
            (x + 1 < self.width).then_some(site + 1),
            (y + 1 < self.height).then_some(site + self.width),
            (z + 1 < self.depth).then_some(site + self.width * self.height),
        ]
    }
}

fn validate_grid<P>(
    image: &GridImage<'_, P>,
    prob: &[f32],
    seeds: Option<&[u8]>,
    shape: GridShape,
    params: &MaxflowParams,
) -> Result<()> {
    let n = shape.len();
    if n == 0 {
        return Err(Error::graph("grid has no nodes"));
    }
    if image.channels == 0 || image.data.len() != n * image.channels {
        return Err(Error::graph(format!(
            "image has {} values, expected {n} pixels x {} channels",
            image.data.len(),
            image.channels
        )));
    }
    if prob.len() != n * 2 {
        return Err(Error::graph(format!(
            "probability map has {} values, expected {n} x 2",
            prob.len()
        )));
    }
    if prob.iter().any(|p| !(0.0..=1.0).contains(p)) {
        return Err(Error::graph("probabilities must lie in [0, 1]"));
    }
    if let Some(seeds) = seeds {
        if seeds.len() != n * 2 {
            return Err(Error::graph(format!(
                "seed map has {} values, expected {n} x 2",
                seeds.len()
            )));
        }
        if let Some(site) = seeds.chunks_exact(2).position(|s| s[0] != 0 && s[1] != 0) {
            return Err(Error::graph(format!(
                "node {site} is seeded as both foreground and background"
            )));
        }
    }
    if !(params.lambda.is_finite() && params.lambda >= 0.0) {
        return Err(Error::graph(format!("invalid lambda {}", params.lambda)));
    }
    if !(params.sigma.is_finite() && params.sigma > 0.0) {
        return Err(Error::graph(format!("invalid sigma {}", params.sigma)));
    }
    Ok(())
}

/// Boundary weights `lambda * exp(-||I_p - I_q||^2 / (2 sigma^2))` towards the forward
/// neighbours of every site, computed in parallel row ranges.
fn boundary_weights<P: Copy + Into<f32> + Sync>(
    image: &GridImage<'_, P>,
    shape: GridShape,
    params: &MaxflowParams,
) -> Vec<[f32; 3]> {
    let inv_two_sigma_sq = 1.0 / (2.0 * params.sigma * params.sigma);
    split_length_to_ranges(shape.len(), current_num_threads())
        .into_par_iter()
        .map(|range| {
            range
                .map(|p| {
                    shape.forward_neighbours(p).map(|q| match q {
                        Some(q) => {
                            params.lambda * (-image.squared_distance(p, q) * inv_two_sigma_sq).exp()
                        }
                        None => 0.0,
                    })
                })
                .collect::<Vec<_>>()
        })
        .collect::<Vec<_>>()
        .concat()
}

fn grid_maxflow<P: Copy + Into<f32> + Sync>(
    image: GridImage<'_, P>,
    prob: &[f32],
    seeds: Option<&[u8]>,
    shape: GridShape,
    params: &MaxflowParams,
) -> Result<Vec<u8>> {
    validate_grid(&image, prob, seeds, shape, params)?;
    let t0 = Instant::now();
    let n = shape.len();
    let weights = boundary_weights(&image, shape, params);

    let mut graph: Graph<f32> = Graph::new(n, 3 * n);
    let mut boundary_sum = vec![0f32; n];
    for (p, w) in weights.iter().enumerate() {
        for (q, w) in shape.forward_neighbours(p).into_iter().zip(w) {
            if let Some(q) = q {
                graph.add_edge(p, q, *w, *w)?;
                boundary_sum[p] += w;
                boundary_sum[q] += w;
            }
        }
    }

    // a seed must never be cut off from its terminal
    let hard = 1.0 + boundary_sum.iter().fold(0f32, |acc, s| acc.max(*s));
    for (p, pr) in prob.chunks_exact(2).enumerate() {
        let seed = seeds.map(|s| (s[2 * p] != 0, s[2 * p + 1] != 0));
        let (cap_source, cap_sink) = match seed {
            Some((true, _)) => (hard, 0.0),
            Some((_, true)) => (0.0, hard),
            _ => (
                -pr[0].max(PROB_EPSILON).ln(),
                -pr[1].max(PROB_EPSILON).ln(),
            ),
        };
        graph.add_tweights(p, cap_source.max(0.0), cap_sink.max(0.0))?;
    }
    let flow = graph.maxflow()?;
    debug!(
        "grid maxflow {}x{}x{}: flow {flow}, took {:?}",
        shape.width,
        shape.height,
        shape.depth,
        t0.elapsed()
    );
    Ok(graph.labels())
}

/// Binary segmentation of a 2D image.
///
/// `prob` holds `[background, foreground]` probabilities per pixel. Returns `1` for foreground.
pub fn maxflow2d<P: Copy + Into<f32> + Sync>(
    image: GridImage<'_, P>,
    prob: &[f32],
    width: usize,
    height: usize,
    params: &MaxflowParams,
) -> Result<Array2D<u8>> {
    let shape = GridShape {
        width,
        height,
        depth: 1,
    };
    let labels = grid_maxflow(image, prob, None, shape, params)?;
    Array2D::from_slice(&labels, width, height)
}

/// Like `maxflow2d()`, `seeds` holds `[foreground, background]` marks per pixel (non-zero is a
/// seed). Seeded pixels keep their label regardless of the probabilities.
pub fn interactive_maxflow2d<P: Copy + Into<f32> + Sync>(
    image: GridImage<'_, P>,
    prob: &[f32],
    seeds: &[u8],
    width: usize,
    height: usize,
    params: &MaxflowParams,
) -> Result<Array2D<u8>> {
    let shape = GridShape {
        width,
        height,
        depth: 1,
    };
    let labels = grid_maxflow(image, prob, Some(seeds), shape, params)?;
    Array2D::from_slice(&labels, width, height)
}

/// Binary segmentation of a volume (6-connected).
pub fn maxflow3d<P: Copy + Into<f32> + Sync>(
    image: GridImage<'_, P>,
    prob: &[f32],
    width: usize,
    height: usize,
    depth: usize,
    params: &MaxflowParams,
) -> Result<Array3D<u8>> {
    let shape = GridShape {
        width,
        height,
        depth,
    };
    let labels = grid_maxflow(image, prob, None, shape, params)?;
    Array3D::from_slice(&labels, width, height, depth)
}

/// Like `maxflow3d()` with `[foreground, background]` seed marks per voxel.
pub fn interactive_maxflow3d<P: Copy + Into<f32> + Sync>(
    image: GridImage<'_, P>,
    prob: &[f32],
    seeds: &[u8],
    width: usize,
    height: usize,
    depth: usize,
    params: &MaxflowParams,
) -> Result<Array3D<u8>> {
    let shape = GridShape {
        width,
        height,
        depth,
    };
    let labels = grid_maxflow(image, prob, Some(seeds), shape, params)?;
    Array3D::from_slice(&labels, width, height, depth)
}
