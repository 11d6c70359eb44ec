// THEORY:
// Raw image moments are the running sums that summarise a region's shape:
// `m00` is the pixel count, `m10` and `m01` are the sums of x and y over the
// region. The centroid is `(m10 / m00, m01 / m00)`. Sums are accumulated as
// integers while a region grows, so the result does not depend on the order
// in which pixels are visited.

use crate::core_modules::frame::PixelPoint;

/// Zeroth and first order moments of a binary region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RawMoments {
    pub m00: u64,
    pub m10: u64,
    pub m01: u64,
}

impl RawMoments {
    /// Adds one foreground pixel.
    pub fn accumulate(&mut self, x: u32, y: u32) {
        self.m00 += 1;
        self.m10 += x as u64;
        self.m01 += y as u64;
    }

    /// Centroid truncated to integer pixels, or `None` for an empty region.
    pub fn centroid(&self) -> Option<PixelPoint> {
        if self.m00 == 0 {
            return None;
        }
        Some(PixelPoint::new(
            (self.m10 / self.m00) as i32,
            (self.m01 / self.m00) as i32,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_region_has_no_centroid() {
        assert_eq!(RawMoments::default().centroid(), None);
    }

    #[test]
    fn centroid_truncates_toward_zero() {
        let mut moments = RawMoments::default();
        moments.accumulate(10, 4);
        moments.accumulate(11, 5);
        assert_eq!(moments.m00, 2);
        assert_eq!(moments.centroid(), Some(PixelPoint::new(10, 4)));
    }
}
