// gradient.rs — Sobel image gradients.
//
// Feeds the structure tensor of the corner detector. Both kernels are
// separable, so they reuse convolve_separable and inherit its clamped
// borders:
//   Ix: row [-1, 0, 1], col [1, 2, 1]
//   Iy: row [ 1, 2, 1], col [-1, 0, 1]

use crate::convolution::convolve_separable;
use crate::image::{Image, Pixel};

const SOBEL_DERIV: [f32; 3] = [-1.0, 0.0, 1.0];
const SOBEL_SMOOTH: [f32; 3] = [1.0, 2.0, 1.0];

/// Horizontal gradient Ix (positive when intensity grows to the right).
pub fn sobel_x<T: Pixel>(src: &Image<T>) -> Image<f32> {
    convolve_separable(src, &SOBEL_DERIV, &SOBEL_SMOOTH)
}

/// Vertical gradient Iy (positive when intensity grows downward).
pub fn sobel_y<T: Pixel>(src: &Image<T>) -> Image<f32> {
    convolve_separable(src, &SOBEL_SMOOTH, &SOBEL_DERIV)
}

/// Both gradients, in (Ix, Iy) order.
pub fn sobel_xy<T: Pixel>(src: &Image<T>) -> (Image<f32>, Image<f32>) {
    (sobel_x(src), sobel_y(src))
}
