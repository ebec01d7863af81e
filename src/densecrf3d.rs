use crate::arrays::Array3D;
use crate::common::{unary_from_probabilities, CrfConfig, GridImage, Kernel};
use crate::densecrf::{infer_on_grid, Beliefs};
use crate::densecrf2d::labels_of;
use crate::error::Result;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Dense CRF over a `width` x `height` x `depth` voxel grid.
///
/// Voxel `(x, y, z)` is site `(z * height + y) * width + x`, the volume may have any number of
/// modalities. A volume with `depth == 1` gives exactly the 2D result.
#[derive(Clone, Copy, Debug)]
pub struct DenseCrf3D {
    pub width: usize,
    pub height: usize,
    pub depth: usize,
    pub labels: usize,
}

impl DenseCrf3D {
    pub fn new(width: usize, height: usize, depth: usize, labels: usize) -> Self {
        Self {
            width,
            height,
            depth,
            labels,
        }
    }

    /// Mean-field marginals. Kernels need 3 spatial standard deviations (x, y, z).
    pub fn infer<P: Copy + Into<f32>>(
        &self,
        unary: &[f32],
        volume: GridImage<'_, P>,
        config: &CrfConfig,
    ) -> Result<Beliefs> {
        infer_on_grid(
            &[self.width, self.height, self.depth],
            self.labels,
            unary,
            &volume,
            config,
        )
    }

    pub fn segment<P: Copy + Into<f32>>(
        &self,
        unary: &[f32],
        volume: GridImage<'_, P>,
        config: &CrfConfig,
    ) -> Result<Array3D<u16>> {
        let labels = self.infer(unary, volume, config)?.map_labels();
        Array3D::from_slice(&labels, self.width, self.height, self.depth)
    }
}

/// Parameters of the two-kernel 3D setup. Row (`r`) is the y axis, column (`c`) the x axis.
#[derive(Clone, PartialEq, Debug)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CrfParams3D {
    pub iterations: u16,
    /// Weight of the spatial kernel.
    pub pos_w: f32,
    pub pos_r_std: f32,
    pub pos_c_std: f32,
    pub pos_z_std: f32,
    /// Weight of the bilateral kernel.
    pub bilateral_w: f32,
    pub bilateral_r_std: f32,
    pub bilateral_c_std: f32,
    pub bilateral_z_std: f32,
    /// One standard deviation per modality.
    pub modality_stddev: Vec<f32>,
}

impl Default for CrfParams3D {
    fn default() -> Self {
        Self {
            iterations: 5,
            pos_w: 2.0,
            pos_r_std: 5.0,
            pos_c_std: 5.0,
            pos_z_std: 5.0,
            bilateral_w: 3.0,
            bilateral_r_std: 5.0,
            bilateral_c_std: 5.0,
            bilateral_z_std: 5.0,
            modality_stddev: vec![5.0],
        }
    }
}

impl CrfParams3D {
    pub fn config(&self) -> CrfConfig {
        CrfConfig {
            iterations: self.iterations,
            kernels: vec![
                Kernel::gaussian(&[self.pos_c_std, self.pos_r_std, self.pos_z_std], self.pos_w),
                Kernel::bilateral(
                    &[
                        self.bilateral_c_std,
                        self.bilateral_r_std,
                        self.bilateral_z_std,
                    ],
                    &self.modality_stddev,
                    self.bilateral_w,
                ),
            ],
            ..Default::default()
        }
    }
}

/// Refines a probability map of a volume with `modalities` interleaved channels and returns the
/// label of every voxel.
pub fn densecrf3d<P: Copy + Into<f32>>(
    volume: &[P],
    modalities: usize,
    prob: &[f32],
    width: usize,
    height: usize,
    depth: usize,
    params: &CrfParams3D,
) -> Result<Array3D<u16>> {
    let labels = labels_of(prob, width * height * depth)?;
    let unary = unary_from_probabilities(prob);
    DenseCrf3D::new(width, height, depth, labels).segment(
        &unary,
        GridImage::new(volume, modalities),
        &params.config(),
    )
}
