//! Screen-space tile grid used to bucket splats

use ash::vk;

use crate::foundation::math::div_ceil;

/// Edge length of a square tile in pixels
pub const TILE_SIZE: u32 = 16;

/// Number of tiles covering the presentation extent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TileGrid {
    /// Tiles per row
    pub tiles_x: u32,
    /// Tiles per column
    pub tiles_y: u32,
}

impl TileGrid {
    /// Grid for an extent, partial tiles at the right and bottom edges included
    pub const fn from_extent(extent: vk::Extent2D) -> Self {
        Self {
            tiles_x: div_ceil(extent.width, TILE_SIZE),
            tiles_y: div_ceil(extent.height, TILE_SIZE),
        }
    }

    /// Total tile count
    pub const fn tile_count(&self) -> u32 {
        self.tiles_x * self.tiles_y
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extent(width: u32, height: u32) -> vk::Extent2D {
        vk::Extent2D { width, height }
    }

    #[test]
    fn test_exact_multiple() {
        let grid = TileGrid::from_extent(extent(1600, 896));
        assert_eq!(grid, TileGrid { tiles_x: 100, tiles_y: 56 });
    }

    #[test]
    fn test_rounds_up_partial_tiles() {
        let grid = TileGrid::from_extent(extent(1600, 900));
        assert_eq!(grid.tiles_y, 57);
        let grid = TileGrid::from_extent(extent(1, 17));
        assert_eq!(grid, TileGrid { tiles_x: 1, tiles_y: 2 });
        assert_eq!(grid.tile_count(), 2);
    }

    #[test]
    fn test_minimized_extent_has_no_tiles() {
        let grid = TileGrid::from_extent(extent(0, 0));
        assert_eq!(grid.tile_count(), 0);
    }
}
