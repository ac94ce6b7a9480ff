// convolution.rs — Separable 1D convolution for Image<T>.
//
// A 2D kernel K = k_col * k_row^T is applied as a horizontal pass followed
// by a vertical pass, O(2k) per pixel instead of O(k²). Used by the pyramid
// (Gaussian blur), the Sobel gradients, and the structure-tensor window of
// the corner detector.
//
// BORDER HANDLING: clamp (replicate edge pixels).

use crate::image::{Image, Pixel};

/// Convolve each row of `src` with a centered 1D kernel.
///
/// # Panics
/// Panics if the kernel is empty or has even length.
pub fn convolve_rows<T: Pixel>(src: &Image<T>, kernel: &[f32]) -> Image<f32> {
    check_kernel(kernel);
    let half = (kernel.len() / 2) as isize;
    Image::from_fn(src.width(), src.height(), |x, y| {
        kernel
            .iter()
            .enumerate()
            .map(|(ki, &kv)| {
                let sx = x as isize + ki as isize - half;
                src.get_clamped(sx, y as isize).to_f32() * kv
            })
            .sum()
    })
}

/// Convolve each column of `src` with a centered 1D kernel.
pub fn convolve_cols(src: &Image<f32>, kernel: &[f32]) -> Image<f32> {
    check_kernel(kernel);
    let half = (kernel.len() / 2) as isize;
    Image::from_fn(src.width(), src.height(), |x, y| {
        kernel
            .iter()
            .enumerate()
            .map(|(ki, &kv)| {
                let sy = y as isize + ki as isize - half;
                src.get_clamped(x as isize, sy) * kv
            })
            .sum()
    })
}

/// Full separable 2D convolution: horizontal pass then vertical pass.
///
/// For a Gaussian blur with kernel g, call `convolve_separable(&img, &g, &g)`.
pub fn convolve_separable<T: Pixel>(
    src: &Image<T>,
    kernel_row: &[f32],
    kernel_col: &[f32],
) -> Image<f32> {
    let intermediate = convolve_rows(src, kernel_row);
    convolve_cols(&intermediate, kernel_col)
}

/// 1D Gaussian kernel of length `2 * half_size + 1`, normalized to sum 1.
///
/// # Examples
/// ```
/// let k = rudolf_vo::convolution::gaussian_kernel_1d(2, 1.0);
/// assert_eq!(k.len(), 5);
/// assert!((k.iter().sum::<f32>() - 1.0).abs() < 1e-6);
/// ```
pub fn gaussian_kernel_1d(half_size: usize, sigma: f32) -> Vec<f32> {
    assert!(sigma > 0.0, "sigma must be positive");
    let two_sigma_sq = 2.0 * sigma * sigma;
    let mut kernel: Vec<f32> = (0..=2 * half_size)
        .map(|i| {
            let x = i as f32 - half_size as f32;
            (-x * x / two_sigma_sq).exp()
        })
        .collect();
    let sum: f32 = kernel.iter().sum();
    for v in &mut kernel {
        *v /= sum;
    }
    kernel
}

/// Unnormalized box kernel of `size` ones (sums the window).
///
/// # Panics
/// Panics if `size` is even or zero.
pub fn box_kernel_1d(size: usize) -> Vec<f32> {
    assert!(size % 2 == 1, "box kernel size must be odd (got {size})");
    vec![1.0; size]
}

fn check_kernel(kernel: &[f32]) {
    assert!(!kernel.is_empty(), "kernel must not be empty");
    assert!(kernel.len() % 2 == 1, "kernel length must be odd (got {})", kernel.len());
}
