// THEORY:
// The `FrameProcessor` is the per-frame detection stage. It owns no memory of
// previous frames; it only turns one captured `Frame` into the set of regions
// that look like the target.
//
// Stages, in order:
// 1.  **Smoothing**: Gaussian blur to suppress sensor noise before thresholding.
// 2.  **Color Threshold**: every blurred pixel is converted to HSV and tested
//     against the union of the configured ranges, producing a `BinaryMask`.
// 3.  **Morphology**: close, then open, with a square kernel. Close first so
//     pinholes inside the target are filled before open strips away specks.
// 4.  **Region Extraction**: 8-connected components of the cleaned mask, in
//     raster order, each with its pixel count and raw moments.
//
// An empty result is the normal "nothing red in view" outcome, not an error.

use crate::core_modules::blob_detector::blob_detector;
use crate::core_modules::candidate::TargetCandidate;
use crate::core_modules::frame::Frame;
use crate::core_modules::mask::BinaryMask;
use crate::core_modules::pixel::ColorThreshold;

/// Output of one detection pass.
#[derive(Debug, Clone)]
pub struct Detection {
    /// The cleaned mask the candidates were extracted from.
    pub mask: BinaryMask,
    pub candidates: Vec<TargetCandidate>,
}

#[derive(Debug, Clone)]
pub struct FrameProcessor {
    threshold: ColorThreshold,
    blur_kernel: usize,
    morph_kernel: usize,
}

impl FrameProcessor {
    pub fn new(threshold: ColorThreshold, blur_kernel: usize, morph_kernel: usize) -> Self {
        Self {
            threshold,
            blur_kernel,
            morph_kernel,
        }
    }

    pub fn threshold(&self) -> &ColorThreshold {
        &self.threshold
    }

    /// The raw color mask of `frame`, before morphology.
    pub fn color_mask(&self, frame: &Frame) -> BinaryMask {
        let blurred = frame.gaussian_blur(self.blur_kernel);
        let mut mask = BinaryMask::new(frame.width(), frame.height());
        for (x, y, bgr) in blurred.pixels() {
            if self.threshold.matches_bgr(bgr) {
                mask.set(x, y, true);
            }
        }
        mask
    }

    pub fn process(&self, frame: &Frame) -> Detection {
        let mask = self
            .color_mask(frame)
            .close(self.morph_kernel)
            .open(self.morph_kernel);
        let candidates = blob_detector::find_candidates(&mask);
        Detection { mask, candidates }
    }
}

impl Default for FrameProcessor {
    fn default() -> Self {
        Self::new(ColorThreshold::default(), 7, 5)
    }
}
