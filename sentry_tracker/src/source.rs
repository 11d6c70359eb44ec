//! Frame sources feeding the capture loop.

use std::f32::consts::TAU;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};

use sentry_vision::Frame;
use sentry_vision::pipeline::PixelPoint;

const BACKGROUND: [u8; 3] = [96, 104, 100];
const TARGET: [u8; 3] = [30, 30, 210];

/// Anything that can hand the capture loop one BGR frame per cycle.
pub trait FrameSource {
    fn next_frame(&mut self) -> Result<Frame>;
}

/// Loops forever over the images in a directory, in file name order.
pub struct ImageSequence {
    paths: Vec<PathBuf>,
    next: usize,
}

impl ImageSequence {
    pub fn open(dir: &Path) -> Result<Self> {
        let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)
            .with_context(|| format!("Failed to read frame directory {}", dir.display()))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.extension()
                    .and_then(|ext| ext.to_str())
                    .map(|ext| matches!(ext.to_ascii_lowercase().as_str(), "png" | "jpg" | "jpeg"))
                    .unwrap_or(false)
            })
            .collect();
        paths.sort();

        if paths.is_empty() {
            bail!("No PNG or JPEG frames found in {}", dir.display());
        }
        Ok(Self { paths, next: 0 })
    }

    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> usize {
        self.paths.len()
    }
}

impl FrameSource for ImageSequence {
    fn next_frame(&mut self) -> Result<Frame> {
        let path = &self.paths[self.next];
        self.next = (self.next + 1) % self.paths.len();
        let image = image::open(path)
            .with_context(|| format!("Failed to decode {}", path.display()))?
            .to_rgb8();
        Ok(Frame::from_rgb_image(&image)?)
    }
}

/// A red disc circling the frame center, for running without a camera.
pub struct SyntheticTarget {
    width: u32,
    height: u32,
    radius: i32,
    period: u32,
    tick: u32,
}

impl SyntheticTarget {
    pub fn new(width: u32, height: u32) -> Self {
        let radius = (width.min(height) / 12).max(4) as i32;
        Self {
            width,
            height,
            radius,
            period: 240,
            tick: 0,
        }
    }

    /// Where the disc is drawn on the next frame.
    pub fn position(&self) -> PixelPoint {
        let angle = TAU * self.tick as f32 / self.period as f32;
        let cx = self.width as f32 / 2.0;
        let cy = self.height as f32 / 2.0;
        PixelPoint::new(
            (cx + 0.35 * self.width as f32 * angle.cos()) as i32,
            (cy + 0.30 * self.height as f32 * angle.sin()) as i32,
        )
    }

    fn render(&self, center: PixelPoint) -> Result<Frame> {
        let mut frame = Frame::filled(self.width, self.height, BACKGROUND)?;
        let r = self.radius;
        for dy in -r..=r {
            for dx in -r..=r {
                if dx * dx + dy * dy > r * r {
                    continue;
                }
                let (x, y) = (center.x + dx, center.y + dy);
                if x >= 0 && y >= 0 && (x as u32) < self.width && (y as u32) < self.height {
                    frame.set_pixel(x as u32, y as u32, TARGET);
                }
            }
        }
        Ok(frame)
    }
}

impl FrameSource for SyntheticTarget {
    fn next_frame(&mut self) -> Result<Frame> {
        let frame = self.render(self.position())?;
        self.tick = (self.tick + 1) % self.period;
        Ok(frame)
    }
}
