//! Energy minimization for image and volume segmentation in Rust.
//!
//! This crate provides two independent engines:
//!
//! - `graph`/`maxflow`: exact binary segmentation by minimum cut. The max-flow solver is the
//!   Boykov-Kolmogorov augmenting path algorithm, which reuses its search trees between
//!   augmentations and is very fast on the grid graphs typical for vision. `maxflow2d()` and
//!   `maxflow3d()` build a 4-/6-connected grid graph from an image and a foreground probability
//!   map, the interactive variants additionally take user seeds.
//! - `densecrf`/`densecrf2d`/`densecrf3d`: approximate multi-label segmentation with a fully
//!   connected CRF. Pairwise terms are Gaussian in position and color/intensity, mean-field
//!   inference filters the beliefs on a permutohedral lattice.
//!
//! The following example refines a probability map of a packed RGB24 image (default for image
//! crate) with a dense CRF and then with a graph cut:
//!
//! ```rust
//! use simple_crf_rust::common::{GridImage, MaxflowParams};
//! use simple_crf_rust::densecrf2d::{densecrf2d, CrfParams2D};
//! use simple_crf_rust::maxflow::maxflow2d;
//!
//! fn main() {
//!     let (width, height) = (32, 24);
//!     // a bright square on a dark background
//!     let img = image::RgbImage::from_fn(width as u32, height as u32, |x, y| {
//!         if (8..24).contains(&x) && (6..18).contains(&y) {
//!             image::Rgb([220, 200, 190])
//!         } else {
//!             image::Rgb([20, 30, 40])
//!         }
//!     });
//!     // [background, foreground] probability of every pixel
//!     let prob: Vec<f32> = img
//!         .pixels()
//!         .flat_map(|p| if p[0] > 128 { [0.3, 0.7] } else { [0.8, 0.2] })
//!         .collect();
//!     let params = CrfParams2D::default();
//!     let labels = densecrf2d(img.as_raw(), 3, &prob, width, height, &params).unwrap();
//!     assert_eq!(labels[(16, 12)], 1);
//!
//!     let labels = maxflow2d(
//!         GridImage::new(img.as_raw(), 3),
//!         &prob,
//!         width,
//!         height,
//!         &MaxflowParams::default(),
//!     )
//!     .unwrap();
//!     assert_eq!(labels[(0, 0)], 0);
//! }
//! ```
//!
//! All inputs are flat row-major slices with explicit dimensions, there is no image I/O. Every
//! call validates its inputs before doing any work and returns `Error` instead of a partial
//! result.
//!
//! It's strongly recommended to use this in release build. The lattice and the softmax use
//! `multiversion` for SIMD dispatch, and the lattice uses `assume!` macro to avoid boundary checks
//! in hot-loops in release builds.
//!
//! Note: mean-field results are bit-identical between runs and between threading strategies, the
//! lattice vertex numbering is always built sequentially.
//!

pub mod arrays;
pub mod capacity;
pub mod common;
pub mod compatibility;
pub mod densecrf;
pub mod densecrf2d;
pub mod densecrf3d;
pub mod error;
pub mod graph;
pub mod maxflow;
pub mod permutohedral;

pub use error::{Error, Result};
