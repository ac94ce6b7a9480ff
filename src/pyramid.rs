// pyramid.rs — Gaussian image pyramid for coarse-to-fine tracking.
//
// Each level is the previous level blurred with a Gaussian and subsampled
// by 2. The KLT tracker starts at the coarsest level so that displacements
// of tens of pixels at full resolution shrink to a few pixels there.

use crate::convolution::{convolve_separable, gaussian_kernel_1d};
use crate::image::{Image, Pixel};

/// Levels stop shrinking below this size; such levels carry no usable
/// texture for a tracking window.
const MIN_LEVEL_SIZE: usize = 8;

/// A Gaussian image pyramid.
///
/// `levels[0]` is the original resolution (converted to f32),
/// `levels[n]` is approximately `(width / 2^n, height / 2^n)`.
#[derive(Debug, Clone)]
pub struct Pyramid {
    pub levels: Vec<Image<f32>>,
}

impl Pyramid {
    /// Build up to `num_levels` levels. Fewer levels are produced when the
    /// image becomes smaller than a few pixels on either side.
    ///
    /// # Panics
    /// Panics if `num_levels` is zero.
    pub fn build<T: Pixel>(src: &Image<T>, num_levels: usize, sigma: f32) -> Self {
        assert!(num_levels >= 1, "pyramid must have at least 1 level");

        let half_size = (3.0 * sigma).ceil().max(1.0) as usize;
        let kernel = gaussian_kernel_1d(half_size, sigma);

        let mut levels = Vec::with_capacity(num_levels);
        let mut current = src.map(T::to_f32);
        while levels.len() + 1 < num_levels
            && current.width() / 2 >= MIN_LEVEL_SIZE
            && current.height() / 2 >= MIN_LEVEL_SIZE
        {
            let blurred = convolve_separable(&current, &kernel, &kernel);
            let next = downsample_2x(&blurred);
            levels.push(current);
            current = next;
        }
        levels.push(current);

        Pyramid { levels }
    }

    pub fn num_levels(&self) -> usize {
        self.levels.len()
    }

    pub fn level(&self, level: usize) -> &Image<f32> {
        &self.levels[level]
    }

    /// Full-resolution level.
    pub fn base(&self) -> &Image<f32> {
        &self.levels[0]
    }
}

/// Keep every other pixel: `dst(x, y) = src(2x, 2y)`.
fn downsample_2x(src: &Image<f32>) -> Image<f32> {
    Image::from_fn(src.width() / 2, src.height() / 2, |x, y| src.get(x * 2, y * 2))
}
