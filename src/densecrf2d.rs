use crate::arrays::Array2D;
use crate::common::{unary_from_probabilities, CrfConfig, GridImage, Kernel};
use crate::densecrf::{infer_on_grid, Beliefs};
use crate::error::{Error, Result};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Dense CRF over a `width` x `height` pixel grid. Every pixel is a site, a Gaussian kernel sees
/// the pixel position and a bilateral kernel the position and the pixel channels.
#[derive(Clone, Copy, Debug)]
pub struct DenseCrf2D {
    pub width: usize,
    pub height: usize,
    pub labels: usize,
}

impl DenseCrf2D {
    pub fn new(width: usize, height: usize, labels: usize) -> Self {
        Self {
            width,
            height,
            labels,
        }
    }

    /// Mean-field marginals for `unary` (`width * height` rows of `labels` costs).
    ///
    /// `image` is only read by bilateral kernels. Kernels must have 2 spatial standard deviations
    /// (x, y) and bilateral kernels one color standard deviation per image channel.
    pub fn infer<P: Copy + Into<f32>>(
        &self,
        unary: &[f32],
        image: GridImage<'_, P>,
        config: &CrfConfig,
    ) -> Result<Beliefs> {
        infer_on_grid(
            &[self.width, self.height],
            self.labels,
            unary,
            &image,
            config,
        )
    }

    /// MAP labelling of the image.
    pub fn segment<P: Copy + Into<f32>>(
        &self,
        unary: &[f32],
        image: GridImage<'_, P>,
        config: &CrfConfig,
    ) -> Result<Array2D<u16>> {
        let labels = self.infer(unary, image, config)?.map_labels();
        Array2D::from_slice(&labels, self.width, self.height)
    }
}

/// The classic two-kernel setup.
///
/// Energy: `w1 * exp(-|p_i - p_j|^2 / 2 alpha^2 - |I_i - I_j|^2 / 2 beta^2) +
/// w2 * exp(-|p_i - p_j|^2 / 2 gamma^2)`, both with Potts compatibility.
#[derive(Clone, PartialEq, Debug, Copy)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CrfParams2D {
    /// Weight of the bilateral term.
    pub w1: f32,
    /// Spatial standard deviation of the bilateral term.
    pub alpha: f32,
    /// Color standard deviation of the bilateral term.
    pub beta: f32,
    /// Weight of the spatial term.
    pub w2: f32,
    /// Spatial standard deviation of the spatial term.
    pub gamma: f32,
    pub iterations: u16,
}

impl Default for CrfParams2D {
    fn default() -> Self {
        Self {
            w1: 10.0,
            alpha: 80.0,
            beta: 13.0,
            w2: 3.0,
            gamma: 3.0,
            iterations: 5,
        }
    }
}

impl CrfParams2D {
    /// Kernel configuration for an image with `channels` channels.
    pub fn config(&self, channels: usize) -> CrfConfig {
        CrfConfig {
            iterations: self.iterations,
            kernels: vec![
                Kernel::gaussian(&[self.gamma, self.gamma], self.w2),
                Kernel::bilateral(&[self.alpha, self.alpha], &vec![self.beta; channels], self.w1),
            ],
            ..Default::default()
        }
    }
}

/// Number of labels of a probability map over `sites` sites.
pub(crate) fn labels_of(prob: &[f32], sites: usize) -> Result<usize> {
    if sites == 0 || prob.len() % sites != 0 {
        return Err(Error::model(format!(
            "probability map has {} values, not a multiple of {sites} sites",
            prob.len()
        )));
    }
    Ok(prob.len() / sites)
}

/// Refines a probability map (`width * height` rows of per-label probabilities) of an
/// interleaved image with `channels` channels and returns the label of every pixel.
///
/// ```rust
/// use simple_crf_rust::common::GridImage;
/// use simple_crf_rust::densecrf2d::{densecrf2d, CrfParams2D};
///
/// let (width, height) = (8, 4);
/// // grayscale image: dark left half, bright right half
/// let image: Vec<u8> = (0..width * height)
///     .map(|i| if i % width < width / 2 { 20 } else { 200 })
///     .collect();
/// // [background, foreground] probability of every pixel
/// let prob: Vec<f32> = (0..width * height)
///     .flat_map(|i| if i % width < width / 2 { [0.7, 0.3] } else { [0.4, 0.6] })
///     .collect();
/// let labels = densecrf2d(&image, 1, &prob, width, height, &CrfParams2D::default()).unwrap();
/// assert_eq!(labels[(0, 0)], 0);
/// assert_eq!(labels[(7, 3)], 1);
/// ```
pub fn densecrf2d<P: Copy + Into<f32>>(
    image: &[P],
    channels: usize,
    prob: &[f32],
    width: usize,
    height: usize,
    params: &CrfParams2D,
) -> Result<Array2D<u16>> {
    let labels = labels_of(prob, width * height)?;
    let unary = unary_from_probabilities(prob);
    DenseCrf2D::new(width, height, labels).segment(
        &unary,
        GridImage::new(image, channels),
        &params.config(channels),
    )
}

#[cfg(test)]
pub(crate) mod tests {
    use super::{densecrf2d, CrfParams2D, DenseCrf2D};
    use crate::common::{unary_from_probabilities, CrfConfig, GridImage, Kernel};
    use crate::compatibility::Compatibility;
    use crate::error::Error;
    use image::{Rgb, RgbImage};

    /// Dark left half, bright right half, with deterministic pixel noise.
    pub(crate) fn two_region_image(width: u32, height: u32) -> RgbImage {
        RgbImage::from_fn(width, height, |x, y| {
            let noise = ((x * 31 + y * 17) % 11) as u8;
            if x < width / 2 {
                Rgb([30 + noise, 40 + noise, 35 + noise])
            } else {
                Rgb([210 + noise, 200 + noise, 220 - noise])
            }
        })
    }

    /// `[background, foreground]` probabilities that are right on most pixels and wrong on
    /// every 7th.
    pub(crate) fn noisy_probabilities(width: usize, height: usize) -> Vec<f32> {
        (0..width * height)
            .flat_map(|i| {
                let foreground = i % width >= width / 2;
                let flipped = i % 7 == 3;
                let p_fg = match (foreground, flipped) {
                    (true, false) => 0.65,
                    (false, false) => 0.35,
                    (true, true) => 0.4,
                    (false, true) => 0.6,
                };
                [1.0 - p_fg, p_fg]
            })
            .collect()
    }

    fn agreement(labels: &[u16], width: usize) -> usize {
        labels
            .iter()
            .enumerate()
            .filter(|(i, l)| (**l == 1) == (i % width >= width / 2))
            .count()
    }

    #[test]
    fn stronger_pairwise_more_agreement_test() {
        let (width, height) = (24usize, 16usize);
        let image = two_region_image(width as u32, height as u32);
        let prob = noisy_probabilities(width, height);
        let unary_only = CrfParams2D {
            w1: 0.0,
            w2: 0.0,
            ..Default::default()
        };
        let baseline = densecrf2d(image.as_raw(), 3, &prob, width, height, &unary_only).unwrap();
        let smoothed = densecrf2d(
            image.as_raw(),
            3,
            &prob,
            width,
            height,
            &CrfParams2D::default(),
        )
        .unwrap();
        let baseline = agreement(baseline.as_slice(), width);
        let smoothed = agreement(smoothed.as_slice(), width);
        assert!(baseline < width * height);
        assert!(smoothed > baseline, "{smoothed} <= {baseline}");
        assert!(smoothed * 100 >= width * height * 95, "{smoothed}");
    }

    #[test]
    fn segment_shape_test() {
        let (width, height) = (12usize, 5usize);
        let image = two_region_image(width as u32, height as u32);
        let prob = noisy_probabilities(width, height);
        let crf = DenseCrf2D::new(width, height, 2);
        let config = CrfParams2D::default().config(3);
        let beliefs = crf
            .infer(
                &unary_from_probabilities(&prob),
                GridImage::new(image.as_raw(), 3),
                &config,
            )
            .unwrap();
        assert_eq!(beliefs.sites(), width * height);
        assert_eq!(beliefs.labels(), 2);
        let labels = crf
            .segment(
                &unary_from_probabilities(&prob),
                GridImage::new(image.as_raw(), 3),
                &config,
            )
            .unwrap();
        assert_eq!((labels.width, labels.height), (width, height));
        assert_eq!(labels.as_slice(), beliefs.map_labels().as_slice());
    }

    #[test]
    fn invalid_configuration_test() {
        let (width, height) = (6usize, 4usize);
        let image = two_region_image(width as u32, height as u32);
        let unary = unary_from_probabilities(&noisy_probabilities(width, height));
        let crf = DenseCrf2D::new(width, height, 2);
        let img = GridImage::new(image.as_raw(), 3);
        let config = |kernel: Kernel| CrfConfig {
            kernels: vec![kernel],
            ..Default::default()
        };
        // one spatial stddev too many
        let res = crf.infer(&unary, img, &config(Kernel::gaussian(&[3.0, 3.0, 3.0], 1.0)));
        assert!(matches!(res, Err(Error::InvalidModel(_))));
        // color stddevs do not match the channels
        let res = crf.infer(&unary, img, &config(Kernel::bilateral(&[3.0, 3.0], &[13.0], 1.0)));
        assert!(res.is_err());
        // non-positive bandwidth
        let res = crf.infer(&unary, img, &config(Kernel::gaussian(&[0.0, 3.0], 1.0)));
        assert!(res.is_err());
        // image smaller than the grid
        let small = GridImage::new(&image.as_raw()[..30], 3);
        let res = crf.infer(
            &unary,
            small,
            &config(Kernel::bilateral(&[3.0, 3.0], &[13.0; 3], 1.0)),
        );
        assert!(res.is_err());
        let res = crf.infer(
            &unary,
            img,
            &CrfConfig {
                iterations: 0,
                ..Default::default()
            },
        );
        assert!(res.is_err());
        // a broken compatibility in the last kernel fails before any lattice is built
        let res = crf.infer(
            &unary,
            img,
            &CrfConfig {
                kernels: vec![
                    Kernel::gaussian(&[3.0, 3.0], 1.0),
                    Kernel::bilateral(&[3.0, 3.0], &[13.0; 3], 1.0)
                        .with_compatibility(Compatibility::Diagonal(vec![1.0; 3])),
                ],
                ..Default::default()
            },
        );
        assert!(matches!(res, Err(Error::InvalidModel(_))));
        // probability map with a partial row
        let res = densecrf2d(image.as_raw(), 3, &[0.5; 47], width, height, &Default::default());
        assert!(res.is_err());
    }
}
