// THEORY:
// A `BinaryMask` is the output of color thresholding: one bit per pixel,
// set where the pixel's color falls inside the target ranges. The raw mask
// is noisy (isolated speckles, pinholes inside the target), so it is cleaned
// with two morphological passes before regions are extracted:
//
// - close (dilate, then erode) fills small holes and joins near fragments
// - open (erode, then dilate) removes specks smaller than the kernel
//
// Storage is a `GrayImage` (0 or 255) so the passes are imageproc's
// distance-transform morphology. Under the L∞ norm a radius of `k` is a
// square window of side `2k + 1`. Pixels outside the frame are ignored.

use image::{GrayImage, Luma};
use imageproc::distance_transform::Norm;
use imageproc::morphology;

const ON: Luma<u8> = Luma([255]);
const OFF: Luma<u8> = Luma([0]);

/// A per-pixel foreground mask.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryMask {
    image: GrayImage,
}

impl BinaryMask {
    /// An all-background mask.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            image: GrayImage::new(width, height),
        }
    }

    /// Builds a mask from a per-pixel predicate.
    pub fn from_fn(width: u32, height: u32, mut f: impl FnMut(u32, u32) -> bool) -> Self {
        Self {
            image: GrayImage::from_fn(width, height, |x, y| if f(x, y) { ON } else { OFF }),
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn get(&self, x: u32, y: u32) -> bool {
        self.image.get_pixel(x, y)[0] != 0
    }

    pub fn set(&mut self, x: u32, y: u32, value: bool) {
        self.image.put_pixel(x, y, if value { ON } else { OFF });
    }

    /// Number of foreground pixels.
    pub fn count(&self) -> usize {
        self.image.as_raw().iter().filter(|v| **v != 0).count()
    }

    /// The mask as a 0/255 grayscale image.
    pub fn as_image(&self) -> &GrayImage {
        &self.image
    }

    /// Grows foreground by a square `kernel_size` window.
    pub fn dilate(&self, kernel_size: usize) -> Self {
        self.apply(kernel_size, morphology::dilate)
    }

    /// Shrinks foreground by a square `kernel_size` window.
    pub fn erode(&self, kernel_size: usize) -> Self {
        self.apply(kernel_size, morphology::erode)
    }

    /// Dilate then erode.
    pub fn close(&self, kernel_size: usize) -> Self {
        self.apply(kernel_size, morphology::close)
    }

    /// Erode then dilate.
    pub fn open(&self, kernel_size: usize) -> Self {
        self.apply(kernel_size, morphology::open)
    }

    fn apply(&self, kernel_size: usize, pass: fn(&GrayImage, Norm, u8) -> GrayImage) -> Self {
        let radius = (kernel_size / 2).min(u8::MAX as usize) as u8;
        if radius == 0 || self.image.is_empty() {
            return self.clone();
        }
        Self {
            image: pass(&self.image, Norm::LInf, radius),
        }
    }
}
