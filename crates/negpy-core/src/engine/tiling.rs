//! Tile planning for large exports.
//!
//! Outputs whose long edge exceeds the dispatch cap are processed as tiles
//! with replicated-edge halos. Every tile carries its own global offset so
//! coordinate-sensitive stages reconstruct full-image coordinates exactly;
//! halos are discarded when tiles are copied into the contiguous output.

use crate::stages::params::SpotRecord;

/// Default tile edge for tiled export.
pub const DEFAULT_TILE_SIZE: u32 = 2048;
/// Default halo; covers every neighborhood kernel in the pipeline.
pub const DEFAULT_HALO: u32 = 32;

/// One tile of the transform-output plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tile {
    /// Owned (halo-free) region origin in full coordinates.
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    /// Padded region origin; may be negative at image edges, where reads
    /// clamp and replicate.
    pub padded_x: i32,
    pub padded_y: i32,
    pub padded_width: u32,
    pub padded_height: u32,
}

impl Tile {
    /// Offset of the owned region within the padded tile.
    pub fn interior_origin(&self) -> [i32; 2] {
        [
            self.x as i32 - self.padded_x,
            self.y as i32 - self.padded_y,
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TilePlan {
    pub tile_size: u32,
    pub halo: u32,
    pub tiles: Vec<Tile>,
}

impl TilePlan {
    /// Single tile covering the whole plane, no halo. The untiled render is
    /// just this degenerate plan, so both paths share one code path.
    pub fn single(width: u32, height: u32) -> Self {
        Self {
            tile_size: width.max(height),
            halo: 0,
            tiles: vec![Tile {
                x: 0,
                y: 0,
                width,
                height,
                padded_x: 0,
                padded_y: 0,
                padded_width: width,
                padded_height: height,
            }],
        }
    }

    /// Grid plan over a `width x height` plane.
    pub fn grid(width: u32, height: u32, tile_size: u32, halo: u32) -> Self {
        let tile_size = tile_size.max(64);
        let mut tiles = Vec::new();
        let mut y = 0u32;
        while y < height {
            let th = tile_size.min(height - y);
            let mut x = 0u32;
            while x < width {
                let tw = tile_size.min(width - x);
                tiles.push(Tile {
                    x,
                    y,
                    width: tw,
                    height: th,
                    padded_x: x as i32 - halo as i32,
                    padded_y: y as i32 - halo as i32,
                    padded_width: tw + 2 * halo,
                    padded_height: th + 2 * halo,
                });
                x += tile_size;
            }
            y += tile_size;
        }
        Self {
            tile_size,
            halo,
            tiles,
        }
    }

    /// Plan a render: a single dispatch when the plane fits under the cap,
    /// a halo grid otherwise.
    pub fn for_dims(width: u32, height: u32, max_edge: u32, halo: u32) -> Self {
        if width.max(height) <= max_edge {
            Self::single(width, height)
        } else {
            Self::grid(width, height, max_edge, halo)
        }
    }

    /// Shrink the tile size (out-of-memory retry path). Returns None once
    /// the tiles are too small to be useful.
    pub fn halved(&self, width: u32, height: u32) -> Option<Self> {
        let next = self.tile_size / 2;
        if next < 256 {
            return None;
        }
        Some(Self::grid(width, height, next, self.halo))
    }
}

/// Halo needed so manual-spot ring samples stay inside the padded tile: a
/// healed pixel can read up to two radii plus the local-minimum window away.
pub fn halo_for_spots(spots: &[SpotRecord], base: u32) -> u32 {
    let spot_reach = spots
        .iter()
        .map(|s| (2.0 * s.radius).ceil() as u32 + 2)
        .max()
        .unwrap_or(0);
    base.max(spot_reach).min(256)
}
