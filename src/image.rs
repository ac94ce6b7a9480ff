// image.rs — Runtime-sized grayscale image container.
//
// Every stage of the odometry frontend works on `Image<T>`:
//   - frames arrive as `Image<u8>` (8-bit luma from the frame source)
//   - the pyramid, gradients and KLT patches work on `Image<f32>`
//
// Layout is row-major and tightly packed (index = y * width + x). There is
// no row padding: frames are produced on the CPU and never handed to a
// device buffer, so stride always equals width.

use std::fmt;
use std::ops::Index;

/// Trait for types that can serve as pixel values in an Image.
pub trait Pixel: Copy + Default + Send + Sync + PartialOrd + 'static {
    /// Raw value as f32 (no normalization: a u8 of 200 becomes 200.0).
    fn to_f32(self) -> f32;

    /// Construct a pixel from an f32, clamping and rounding as needed.
    fn from_f32(v: f32) -> Self;
}

impl Pixel for u8 {
    #[inline]
    fn to_f32(self) -> f32 {
        self as f32
    }

    #[inline]
    fn from_f32(v: f32) -> Self {
        v.clamp(0.0, 255.0).round() as u8
    }
}

impl Pixel for f32 {
    #[inline]
    fn to_f32(self) -> f32 {
        self
    }

    #[inline]
    fn from_f32(v: f32) -> Self {
        v
    }
}

/// A 2D image with runtime dimensions, generic over pixel type `T`.
#[derive(Clone, PartialEq)]
pub struct Image<T: Pixel> {
    data: Vec<T>,
    width: usize,
    height: usize,
}

impl<T: Pixel> Image<T> {
    /// Create a zero-filled image.
    pub fn new(width: usize, height: usize) -> Self {
        Image {
            data: vec![T::default(); width * height],
            width,
            height,
        }
    }

    /// Wrap an existing row-major buffer.
    ///
    /// # Panics
    /// Panics if `data.len() != width * height`.
    pub fn from_vec(width: usize, height: usize, data: Vec<T>) -> Self {
        assert_eq!(
            data.len(),
            width * height,
            "buffer length {} does not match {}x{}",
            data.len(),
            width,
            height
        );
        Image { data, width, height }
    }

    /// Build an image by evaluating `f(x, y)` at every pixel.
    pub fn from_fn(width: usize, height: usize, mut f: impl FnMut(usize, usize) -> T) -> Self {
        let mut data = Vec::with_capacity(width * height);
        for y in 0..height {
            for x in 0..width {
                data.push(f(x, y));
            }
        }
        Image { data, width, height }
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    /// True when the image has no pixels.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Read a pixel. Panics when (x, y) is outside the image.
    #[inline]
    pub fn get(&self, x: usize, y: usize) -> T {
        self.data[self.offset(x, y)]
    }

    /// Write a pixel. Panics when (x, y) is outside the image.
    #[inline]
    pub fn set(&mut self, x: usize, y: usize, value: T) {
        let idx = self.offset(x, y);
        self.data[idx] = value;
    }

    /// Read a pixel with coordinates clamped to the nearest edge.
    #[inline]
    pub fn get_clamped(&self, x: isize, y: isize) -> T {
        let cx = x.clamp(0, self.width as isize - 1) as usize;
        let cy = y.clamp(0, self.height as isize - 1) as usize;
        self.data[cy * self.width + cx]
    }

    /// Whether a sub-pixel position lies inside `[0, width) x [0, height)`.
    #[inline]
    pub fn contains(&self, x: f32, y: f32) -> bool {
        x >= 0.0 && y >= 0.0 && x < self.width as f32 && y < self.height as f32
    }

    /// One row as a slice.
    pub fn row(&self, y: usize) -> &[T] {
        let start = y * self.width;
        &self.data[start..start + self.width]
    }

    /// Iterate over `(x, y, value)` in row-major order.
    pub fn pixels(&self) -> impl Iterator<Item = (usize, usize, T)> + '_ {
        let w = self.width;
        self.data
            .iter()
            .enumerate()
            .map(move |(i, &v)| (i % w, i / w, v))
    }

    /// Apply `f` to every pixel, producing a new image.
    pub fn map<U: Pixel>(&self, f: impl Fn(T) -> U) -> Image<U> {
        Image {
            data: self.data.iter().map(|&v| f(v)).collect(),
            width: self.width,
            height: self.height,
        }
    }

    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    #[inline]
    fn offset(&self, x: usize, y: usize) -> usize {
        assert!(
            x < self.width && y < self.height,
            "pixel ({x}, {y}) out of bounds for {}x{} image",
            self.width,
            self.height
        );
        y * self.width + x
    }
}

impl<T: Pixel> Index<(usize, usize)> for Image<T> {
    type Output = T;

    fn index(&self, (x, y): (usize, usize)) -> &T {
        &self.data[self.offset(x, y)]
    }
}

impl<T: Pixel> fmt::Debug for Image<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Image")
            .field("width", &self.width)
            .field("height", &self.height)
            .finish()
    }
}

/// Bilinear sample at sub-pixel (x, y), clamping to the image border.
///
/// Positions outside the image read the nearest edge pixel, so KLT windows
/// that slide past the border degrade (flat gradients) instead of panicking.
pub fn interpolate_bilinear(img: &Image<f32>, x: f32, y: f32) -> f32 {
    assert!(!img.is_empty(), "cannot interpolate on an empty image");

    let max_x = (img.width() - 1) as f32;
    let max_y = (img.height() - 1) as f32;
    let x = x.clamp(0.0, max_x);
    let y = y.clamp(0.0, max_y);

    let x0 = x.floor() as usize;
    let y0 = y.floor() as usize;
    let fx = x - x0 as f32;
    let fy = y - y0 as f32;
    let x1 = (x0 + 1).min(img.width() - 1);
    let y1 = (y0 + 1).min(img.height() - 1);

    let p00 = img.get(x0, y0);
    let p10 = img.get(x1, y0);
    let p01 = img.get(x0, y1);
    let p11 = img.get(x1, y1);

    (1.0 - fx) * (1.0 - fy) * p00 + fx * (1.0 - fy) * p10 + (1.0 - fx) * fy * p01 + fx * fy * p11
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_fn_row_major() {
        let img = Image::<u8>::from_fn(4, 3, |x, y| (y * 4 + x) as u8);
        assert_eq!(img.as_slice(), &[0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11]);
        assert_eq!(img.row(2), &[8, 9, 10, 11]);
        assert_eq!(img[(3, 1)], 7);
    }

    #[test]
    fn test_get_clamped_replicates_edges() {
        let img = Image::<u8>::from_fn(3, 3, |x, y| (10 * y + x) as u8);
        assert_eq!(img.get_clamped(-5, -5), 0);
        assert_eq!(img.get_clamped(10, 1), 12);
        assert_eq!(img.get_clamped(1, 10), 21);
    }

    #[test]
    #[should_panic(expected = "out of bounds")]
    fn test_get_out_of_bounds_panics() {
        let img: Image<u8> = Image::new(4, 4);
        img.get(4, 0);
    }

    #[test]
    fn test_bilinear_midpoint() {
        let img = Image::<f32>::from_vec(2, 2, vec![0.0, 10.0, 20.0, 30.0]);
        assert!((interpolate_bilinear(&img, 0.5, 0.5) - 15.0).abs() < 1e-6);
        assert!((interpolate_bilinear(&img, 1.0, 0.0) - 10.0).abs() < 1e-6);
    }

    #[test]
    fn test_bilinear_clamps_outside() {
        let img = Image::<f32>::from_vec(2, 2, vec![0.0, 10.0, 20.0, 30.0]);
        assert_eq!(interpolate_bilinear(&img, -3.0, -3.0), 0.0);
        assert_eq!(interpolate_bilinear(&img, 9.0, 9.0), 30.0);
    }

    #[test]
    fn test_contains() {
        let img: Image<u8> = Image::new(10, 5);
        assert!(img.contains(0.0, 0.0));
        assert!(img.contains(9.9, 4.9));
        assert!(!img.contains(10.0, 2.0));
        assert!(!img.contains(-0.1, 2.0));
    }
}
