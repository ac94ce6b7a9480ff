// source.rs — Frames and where they come from.
//
// The pipeline pulls frames one at a time through `FrameSource`. The
// source yields `Ok(None)` at end of sequence; whether that is a normal
// stop or a premature one is decided by the run driver, which knows the
// configured frame count.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use log::debug;

use crate::error::{OdometryError, Result};
use crate::image::Image;
use crate::pyramid::Pyramid;

/// A grayscale image with its position in the sequence.
#[derive(Debug, Clone)]
pub struct Frame {
    pub index: usize,
    pub image: Image<u8>,
}

impl Frame {
    pub fn new(index: usize, image: Image<u8>) -> Self {
        Frame { index, image }
    }

    /// Build the tracking pyramid once, so the frame can serve as both
    /// "current" and, on the next call, "previous".
    pub fn prepare(self, pyramid_levels: usize, sigma: f32) -> PreparedFrame {
        let pyramid = Pyramid::build(&self.image, pyramid_levels, sigma);
        PreparedFrame {
            index: self.index,
            image: self.image,
            pyramid,
        }
    }
}

/// A frame together with its Gaussian pyramid.
#[derive(Debug, Clone)]
pub struct PreparedFrame {
    pub index: usize,
    pub image: Image<u8>,
    pub pyramid: Pyramid,
}

impl PreparedFrame {
    pub fn width(&self) -> usize {
        self.image.width()
    }

    pub fn height(&self) -> usize {
        self.image.height()
    }
}

/// Supplies frames in strictly increasing index order.
pub trait FrameSource {
    /// Next frame, `Ok(None)` once the sequence is exhausted.
    fn next_frame(&mut self) -> Result<Option<Frame>>;
}

/// Numbered PNG files `<dir>/000000.png`, `<dir>/000001.png`, …
///
/// This is the KITTI odometry `image_0/` layout.
pub struct ImageSequence {
    dir: PathBuf,
    next_index: usize,
}

impl ImageSequence {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        ImageSequence {
            dir: dir.into(),
            next_index: 0,
        }
    }

    /// Start at a later frame of the sequence.
    pub fn starting_at(mut self, index: usize) -> Self {
        self.next_index = index;
        self
    }

    pub fn frame_path(&self, index: usize) -> PathBuf {
        self.dir.join(format!("{index:06}.png"))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl FrameSource for ImageSequence {
    fn next_frame(&mut self) -> Result<Option<Frame>> {
        let index = self.next_index;
        let path = self.frame_path(index);
        if !path.exists() {
            debug!("no frame at {}", path.display());
            return Ok(None);
        }

        let decoded = ::image::open(&path).map_err(|e| OdometryError::FrameUnavailable {
            index,
            reason: format!("{}: {e}", path.display()),
        })?;
        let gray = decoded.to_luma8();
        let (w, h) = (gray.width() as usize, gray.height() as usize);

        self.next_index += 1;
        Ok(Some(Frame::new(index, Image::from_vec(w, h, gray.into_raw()))))
    }
}

/// Replays frames held in memory.
#[derive(Debug, Default)]
pub struct MemorySource {
    frames: VecDeque<Frame>,
}

impl MemorySource {
    /// Frames are numbered 0, 1, 2, … in the given order.
    pub fn from_images(images: impl IntoIterator<Item = Image<u8>>) -> Self {
        MemorySource {
            frames: images
                .into_iter()
                .enumerate()
                .map(|(i, img)| Frame::new(i, img))
                .collect(),
        }
    }

    pub fn remaining(&self) -> usize {
        self.frames.len()
    }
}

impl FrameSource for MemorySource {
    fn next_frame(&mut self) -> Result<Option<Frame>> {
        Ok(self.frames.pop_front())
    }
}
