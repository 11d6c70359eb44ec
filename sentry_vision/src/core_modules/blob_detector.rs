// THEORY:
// The `BlobDetector` is the spatial grouping step of the pipeline. It turns a
// cleaned `BinaryMask` into a list of `TargetCandidate`s, one per 8-connected
// region of foreground pixels.
//
// Algorithm:
// 1.  **Raster Scan (Seeding)**: Pixels are visited top-to-bottom, left-to-right.
//     The first unvisited foreground pixel found becomes the seed of a new region,
//     so candidates come out ordered by the raster position of their first pixel.
// 2.  **Region Growing**: From the seed, an explicit stack grows the region over
//     all 8 neighbours (diagonals included). A `visited` grid guarantees each
//     pixel belongs to exactly one region.
// 3.  **Data Aggregation**: While growing, the region's pixel count, raw moments
//     and bounding box are accumulated. Nothing else about the pixels is kept.
// 4.  **Stateless Utility**: `find_candidates` has no memory of previous frames.
//     Choosing among candidates is the tracker's job.

use crate::core_modules::candidate::{BoundingBox, TargetCandidate};
use crate::core_modules::frame::PixelPoint;
use crate::core_modules::mask::BinaryMask;
use crate::core_modules::moment::RawMoments;

pub mod blob_detector {
    use super::*;

    const NEIGHBOURS: [(i32, i32); 8] = [
        (-1, -1),
        (0, -1),
        (1, -1),
        (-1, 0),
        (1, 0),
        (-1, 1),
        (0, 1),
        (1, 1),
    ];

    /// Extracts every 8-connected foreground region of `mask`, in raster order
    /// of each region's first pixel.
    pub fn find_candidates(mask: &BinaryMask) -> Vec<TargetCandidate> {
        let (width, height) = (mask.width(), mask.height());
        let mut visited = vec![false; width as usize * height as usize];
        let mut candidates = Vec::new();

        for y in 0..height {
            for x in 0..width {
                let index = (y * width + x) as usize;
                if visited[index] || !mask.get(x, y) {
                    continue;
                }
                let id = candidates.len();
                candidates.push(grow_region(mask, &mut visited, x, y, id));
            }
        }

        candidates
    }

    fn grow_region(
        mask: &BinaryMask,
        visited: &mut [bool],
        seed_x: u32,
        seed_y: u32,
        id: usize,
    ) -> TargetCandidate {
        let width = mask.width() as i32;
        let height = mask.height() as i32;
        let mut moments = RawMoments::default();
        let mut bounding_box = BoundingBox::at(seed_x, seed_y);
        let mut stack = vec![(seed_x, seed_y)];
        visited[(seed_y as i32 * width + seed_x as i32) as usize] = true;

        while let Some((x, y)) = stack.pop() {
            moments.accumulate(x, y);
            bounding_box.include(x, y);

            for (dx, dy) in NEIGHBOURS {
                let nx = x as i32 + dx;
                let ny = y as i32 + dy;
                if nx < 0 || nx >= width || ny < 0 || ny >= height {
                    continue;
                }
                let index = (ny * width + nx) as usize;
                if !visited[index] && mask.get(nx as u32, ny as u32) {
                    visited[index] = true;
                    stack.push((nx as u32, ny as u32));
                }
            }
        }

        TargetCandidate {
            id,
            seed: PixelPoint::new(seed_x as i32, seed_y as i32),
            area: moments.m00,
            bounding_box,
            moments,
        }
    }
}
