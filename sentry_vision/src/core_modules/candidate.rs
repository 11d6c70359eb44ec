use crate::core_modules::frame::PixelPoint;
use crate::core_modules::moment::RawMoments;

/// Inclusive pixel bounds of a region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundingBox {
    pub min_x: u32,
    pub min_y: u32,
    pub max_x: u32,
    pub max_y: u32,
}

impl BoundingBox {
    pub fn at(x: u32, y: u32) -> Self {
        Self {
            min_x: x,
            min_y: y,
            max_x: x,
            max_y: y,
        }
    }

    pub fn include(&mut self, x: u32, y: u32) {
        self.min_x = self.min_x.min(x);
        self.min_y = self.min_y.min(y);
        self.max_x = self.max_x.max(x);
        self.max_y = self.max_y.max(y);
    }

    pub fn width(&self) -> u32 {
        self.max_x - self.min_x + 1
    }

    pub fn height(&self) -> u32 {
        self.max_y - self.min_y + 1
    }
}

/// A connected region of target-colored pixels found in one frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetCandidate {
    /// Position in extraction order; 0 is the region whose first pixel comes
    /// first in raster order.
    pub id: usize,
    /// The first pixel of the region in raster order.
    pub seed: PixelPoint,
    /// Number of pixels in the region.
    pub area: u64,
    pub bounding_box: BoundingBox,
    pub moments: RawMoments,
}

impl TargetCandidate {
    pub fn centroid(&self) -> Option<PixelPoint> {
        self.moments.centroid()
    }
}
