// THEORY:
// The `Frame` module is the raw input of the tracking pipeline: one captured
// image, stored as interleaved BGR bytes. Like `Chunk` in a block-based
// pipeline, it is a "dumb" data container that knows a few summary operations
// on its own data (center point, per-pixel access, smoothing) and nothing
// about targets or tracking.
//
// A frame is immutable once captured. Smoothing (imageproc's Gaussian filter)
// returns a new frame rather than editing in place, so the processing cycle
// that owns the capture can keep the original for display while the detector
// works on the blurred copy.

use crate::error::FrameError;

const CHANNELS: usize = 3;

/// A point in pixel coordinates. Signed, so offsets from the center fit too.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PixelPoint {
    pub x: i32,
    pub y: i32,
}

impl PixelPoint {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }
}

/// A captured image in BGR8 layout, row-major, no padding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl Frame {
    /// Wraps a BGR buffer, checking that it covers exactly `width * height` pixels.
    pub fn from_bgr(width: u32, height: u32, data: Vec<u8>) -> Result<Self, FrameError> {
        if width == 0 || height == 0 {
            return Err(FrameError::Empty { width, height });
        }
        let expected = width as usize * height as usize * CHANNELS;
        if data.len() != expected {
            return Err(FrameError::SizeMismatch {
                width,
                height,
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// A frame filled with one BGR color.
    pub fn filled(width: u32, height: u32, bgr: [u8; 3]) -> Result<Self, FrameError> {
        let pixels = width as usize * height as usize;
        let data = bgr.iter().copied().cycle().take(pixels * CHANNELS).collect();
        Self::from_bgr(width, height, data)
    }

    /// Converts an RGB image (as decoded from disk) into BGR channel order.
    pub fn from_rgb_image(image: &image::RgbImage) -> Result<Self, FrameError> {
        let data = image
            .pixels()
            .flat_map(|pixel| [pixel[2], pixel[1], pixel[0]])
            .collect();
        Self::from_bgr(image.width(), image.height(), data)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// The frame center, rounded down as integer pixel coordinates.
    pub fn center(&self) -> PixelPoint {
        PixelPoint::new((self.width / 2) as i32, (self.height / 2) as i32)
    }

    /// The BGR triple at `(x, y)`.
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 3] {
        let offset = (y as usize * self.width as usize + x as usize) * CHANNELS;
        [self.data[offset], self.data[offset + 1], self.data[offset + 2]]
    }

    pub fn set_pixel(&mut self, x: u32, y: u32, bgr: [u8; 3]) {
        let offset = (y as usize * self.width as usize + x as usize) * CHANNELS;
        self.data[offset..offset + CHANNELS].copy_from_slice(&bgr);
    }

    /// Iterates over `(x, y, bgr)` in raster order.
    pub fn pixels(&self) -> impl Iterator<Item = (u32, u32, [u8; 3])> + '_ {
        let width = self.width;
        self.data
            .chunks_exact(CHANNELS)
            .enumerate()
            .map(move |(i, px)| {
                let i = i as u32;
                (i % width, i / width, [px[0], px[1], px[2]])
            })
    }

    /// Gaussian smoothing with a square `kernel_size` window, sigma derived
    /// from the window size. A kernel size of 0 or 1 is a no-op.
    pub fn gaussian_blur(&self, kernel_size: usize) -> Frame {
        if kernel_size <= 1 {
            return self.clone();
        }
        // Channel order is irrelevant to the filter, so BGR rides in an RgbImage.
        let Some(image) = image::RgbImage::from_raw(self.width, self.height, self.data.clone())
        else {
            return self.clone();
        };
        let blurred = imageproc::filter::gaussian_blur_f32(&image, blur_sigma(kernel_size));
        Frame {
            width: self.width,
            height: self.height,
            data: blurred.into_raw(),
        }
    }
}

/// Sigma for a `size`-wide Gaussian window. Even sizes count as the next odd size.
fn blur_sigma(size: usize) -> f32 {
    let size = size | 1;
    0.3 * ((size as f32 - 1.0) * 0.5 - 1.0) + 0.8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_buffers_of_the_wrong_size() {
        let err = Frame::from_bgr(4, 4, vec![0; 10]).unwrap_err();
        assert_eq!(
            err,
            FrameError::SizeMismatch {
                width: 4,
                height: 4,
                expected: 48,
                actual: 10
            }
        );
        assert!(matches!(
            Frame::from_bgr(0, 4, Vec::new()),
            Err(FrameError::Empty { .. })
        ));
    }

    #[test]
    fn center_rounds_down() {
        let frame = Frame::filled(641, 480, [0, 0, 0]).expect("frame");
        assert_eq!(frame.center(), PixelPoint::new(320, 240));
    }

    #[test]
    fn rgb_images_are_swapped_to_bgr() {
        let image = image::RgbImage::from_pixel(2, 2, image::Rgb([255, 10, 0]));
        let frame = Frame::from_rgb_image(&image).expect("frame");
        assert_eq!(frame.pixel(1, 1), [0, 10, 255]);
    }

    #[test]
    fn sigma_follows_the_window_size() {
        assert!((blur_sigma(7) - 1.4).abs() < 1e-6);
        assert!((blur_sigma(3) - 0.8).abs() < 1e-6);
        assert_eq!(blur_sigma(6), blur_sigma(7));
    }

    #[test]
    fn blur_keeps_flat_frames_flat() {
        let frame = Frame::filled(9, 6, [10, 20, 200]).expect("frame");
        let blurred = frame.gaussian_blur(7);
        for (_, _, [b, g, r]) in blurred.pixels() {
            assert!(b.abs_diff(10) <= 1 && g.abs_diff(20) <= 1 && r.abs_diff(200) <= 1);
        }
        assert_eq!(frame.gaussian_blur(1), frame);
    }

    #[test]
    fn blur_spreads_a_single_bright_pixel() {
        let mut frame = Frame::filled(9, 9, [0, 0, 0]).expect("frame");
        frame.set_pixel(4, 4, [0, 0, 255]);
        let blurred = frame.gaussian_blur(7);
        let center = blurred.pixel(4, 4)[2];
        let neighbour = blurred.pixel(5, 4)[2];
        assert!(center < 255);
        assert!(neighbour > 0);
        assert!(center > neighbour);
        assert_eq!(blurred.pixel(4, 4)[0], 0);
    }
}
