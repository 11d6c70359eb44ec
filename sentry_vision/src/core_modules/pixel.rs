// THEORY (single-pixel color heuristics):
// The `pixel` module holds the only color math the tracker needs: converting a
// BGR pixel to hue/saturation/value and testing it against a threshold range.
// Like every 1D heuristic, it looks at one pixel with no knowledge of its
// neighbours; smoothing and morphology live in `frame` and `mask`.
//
// Conventions follow the 8-bit camera pipeline that the thresholds were tuned
// against:
// - hue is stored in half-degrees, 0..180, so a full turn fits in a byte
// - saturation and value are 0..=255
// - an achromatic pixel (max == min) has hue 0 and saturation 0
//
// Red sits on both ends of the hue circle. A single range cannot express it,
// so a `ColorThreshold` is a union of ranges; the default has one band just
// above 0 and one just below the wrap at 180.

use serde::{Deserialize, Serialize};

/// Number of hue steps in a full turn of the color wheel.
pub const HUE_STEPS: u8 = 180;

/// A pixel in hue/saturation/value form, 8-bit conventions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hsv {
    /// Hue in half-degrees (0..180).
    pub h: u8,
    /// Saturation (0..=255).
    pub s: u8,
    /// Value, the brightest channel (0..=255).
    pub v: u8,
}

impl Hsv {
    /// Converts one BGR pixel.
    pub fn from_bgr(blue: u8, green: u8, red: u8) -> Self {
        let (b, g, r) = (blue as f32, green as f32, red as f32);
        let max = r.max(g).max(b);
        let min = r.min(g).min(b);
        let chroma = max - min;

        let s = if max > 0.0 {
            (255.0 * chroma / max).round()
        } else {
            0.0
        };

        let h = if chroma == 0.0 {
            0.0
        } else {
            let degrees = if max == r {
                60.0 * (g - b) / chroma
            } else if max == g {
                120.0 + 60.0 * (b - r) / chroma
            } else {
                240.0 + 60.0 * (r - g) / chroma
            };
            let degrees = if degrees < 0.0 { degrees + 360.0 } else { degrees };
            let half = (degrees / 2.0).round();
            if half >= HUE_STEPS as f32 { half - HUE_STEPS as f32 } else { half }
        };

        Self {
            h: h as u8,
            s: s as u8,
            v: max as u8,
        }
    }
}

/// An inclusive box in HSV space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HsvRange {
    /// Lower bound as `[h, s, v]`.
    pub lower: [u8; 3],
    /// Upper bound as `[h, s, v]`.
    pub upper: [u8; 3],
}

impl HsvRange {
    pub const fn new(lower: [u8; 3], upper: [u8; 3]) -> Self {
        Self { lower, upper }
    }

    pub fn contains(&self, hsv: Hsv) -> bool {
        let channels = [hsv.h, hsv.s, hsv.v];
        channels
            .iter()
            .zip(self.lower.iter().zip(self.upper.iter()))
            .all(|(value, (low, high))| low <= value && value <= high)
    }
}

/// Low red band, just above hue 0.
pub const RED_LOW: HsvRange = HsvRange::new([0, 100, 70], [10, 255, 255]);
/// High red band, just below the hue wrap.
pub const RED_HIGH: HsvRange = HsvRange::new([170, 170, 120], [180, 255, 255]);

/// A union of HSV ranges; a pixel matches if any range contains it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColorThreshold {
    ranges: Vec<HsvRange>,
}

impl ColorThreshold {
    pub fn new(ranges: Vec<HsvRange>) -> Self {
        Self { ranges }
    }

    pub fn ranges(&self) -> &[HsvRange] {
        &self.ranges
    }

    pub fn matches(&self, hsv: Hsv) -> bool {
        self.ranges.iter().any(|range| range.contains(hsv))
    }

    pub fn matches_bgr(&self, bgr: [u8; 3]) -> bool {
        self.matches(Hsv::from_bgr(bgr[0], bgr[1], bgr[2]))
    }
}

impl Default for ColorThreshold {
    fn default() -> Self {
        Self::new(vec![RED_LOW, RED_HIGH])
    }
}
