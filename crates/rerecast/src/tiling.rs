//! Splits the input into a grid of tiles that are built independently.

use std::time::Instant;

use glam::Vec3A;
use thiserror::Error;
use tracing::{debug, error, info};

use crate::{
    Aabb2d, Aabb3d, NavmeshBuilder, NavmeshConfigBuilder, NavmeshError, NavmeshParams,
    NavmeshSet, NavmeshTile, TriMesh,
    math::{ilog2, next_pow2},
    pipeline::{NavmeshMeshes, build_meshes},
};

/// Polygon references are split between the tile index and the polygon index within the tile.
const TILE_AND_POLYGON_BITS: u32 = 22;
/// The most bits a tile index may use.
const MAX_TILE_BITS: u32 = 14;
/// The salt every freshly built tile starts with.
const INITIAL_SALT: u32 = 1;

/// How polygon references are packed for a grid of tiles.
///
/// A reference is `salt | tile index | polygon index`, from the most to the least significant bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileLayout {
    /// The number of tiles along the x-axis.
    pub tiles_x: u32,
    /// The number of tiles along the z-axis.
    pub tiles_z: u32,
    /// The number of bits used for the tile index.
    pub tile_bits: u32,
    /// The number of bits used for the polygon index.
    pub polygon_bits: u32,
    /// The number of bits used for the salt.
    pub salt_bits: u32,
}

impl TileLayout {
    /// Lays out tiles of `tile_size` cells over a grid of `grid_width` by `grid_height` cells.
    pub fn new(grid_width: u32, grid_height: u32, tile_size: u32) -> Self {
        let tile_size = tile_size.max(1);
        Self::from_tile_counts(
            grid_width.div_ceil(tile_size),
            grid_height.div_ceil(tile_size),
        )
    }

    /// Lays out a grid with the given number of tiles per axis.
    pub fn from_tile_counts(tiles_x: u32, tiles_z: u32) -> Self {
        let tile_bits = ilog2(next_pow2(tiles_x.saturating_mul(tiles_z))).min(MAX_TILE_BITS);
        let polygon_bits = TILE_AND_POLYGON_BITS - tile_bits;
        let salt_bits = (32 - tile_bits - polygon_bits).min(31);
        Self {
            tiles_x,
            tiles_z,
            tile_bits,
            polygon_bits,
            salt_bits,
        }
    }

    /// The number of tiles that can be addressed.
    pub fn max_tiles(&self) -> u32 {
        1 << self.tile_bits
    }

    /// The number of polygons a single tile may contain.
    pub fn max_polygons_per_tile(&self) -> u32 {
        1 << self.polygon_bits
    }

    /// Checks that a tile of `polygon_count` polygons can be stored at `tile_index`.
    pub fn admit(&self, tile_index: u32, polygon_count: usize) -> Result<(), TileRejection> {
        let max_polygons = self.max_polygons_per_tile();
        if polygon_count as u64 > max_polygons as u64 {
            return Err(TileRejection::TooManyPolygons {
                polygon_count,
                max_polygons,
            });
        }
        if tile_index >= self.max_tiles() {
            return Err(TileRejection::TooManyTiles {
                max_tiles: self.max_tiles(),
            });
        }
        Ok(())
    }

    /// The reference of the first polygon of the tile stored at `tile_index`.
    pub fn tile_reference(&self, tile_index: u32) -> u32 {
        (INITIAL_SALT << (self.polygon_bits + self.tile_bits)) | (tile_index << self.polygon_bits)
    }
}

/// Why a built tile was left out of the navmesh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TileRejection {
    /// The tile's polygons cannot all be addressed.
    #[error("{polygon_count} polygons, but at most {max_polygons} fit into a tile")]
    TooManyPolygons {
        /// The number of polygons in the tile.
        polygon_count: usize,
        /// See [`TileLayout::max_polygons_per_tile`].
        max_polygons: u32,
    },
    /// Every tile index is already taken.
    #[error("all {max_tiles} addressable tiles are taken")]
    TooManyTiles {
        /// See [`TileLayout::max_tiles`].
        max_tiles: u32,
    },
}

/// Builds a navmesh as a grid of tiles.
///
/// Each tile only rasterizes the triangles that overlap it, plus a border
/// so that neighboring tiles agree on their shared edges.
#[derive(Debug, Clone)]
pub struct TiledNavmeshBuilder {
    /// The build parameters. [`NavmeshConfigBuilder::tile_size`] sets the tile size.
    pub config: NavmeshConfigBuilder,
}

impl Default for TiledNavmeshBuilder {
    fn default() -> Self {
        Self::new(NavmeshConfigBuilder::default())
    }
}

impl TiledNavmeshBuilder {
    /// Creates a builder with the given parameters.
    pub fn new(config: NavmeshConfigBuilder) -> Self {
        Self {
            config: NavmeshConfigBuilder {
                tiling: true,
                ..config
            },
        }
    }
}

impl NavmeshBuilder for TiledNavmeshBuilder {
    fn config(&self) -> &NavmeshConfigBuilder {
        &self.config
    }

    fn config_mut(&mut self) -> &mut NavmeshConfigBuilder {
        &mut self.config
    }

    fn build(&self, mut trimesh: TriMesh) -> Result<NavmeshSet, NavmeshError> {
        let start = Instant::now();
        let aabb = trimesh.compute_aabb().ok_or(NavmeshError::EmptyTrimesh)?;
        let mut builder = NavmeshConfigBuilder {
            aabb,
            tiling: true,
            ..self.config.clone()
        };
        // Settings files can request tiles of zero cells.
        builder.tile_size = builder.tile_size.max(1);
        builder.validate()?;
        let cell_size = builder.cell_size;
        let tile_size = builder.tile_size;
        let extent = aabb.extent();
        let grid_width = (extent.x / cell_size + 0.5) as u32;
        let grid_height = (extent.z / cell_size + 0.5) as u32;
        let layout = TileLayout::new(grid_width, grid_height, tile_size as u32);
        let tile_world_size = tile_size as f32 * cell_size;
        info!(
            "Building tiled navmesh: {} x {} tiles of {tile_size} cells, {} tile bits, {} polygon bits",
            layout.tiles_x, layout.tiles_z, layout.tile_bits, layout.polygon_bits
        );

        trimesh.mark_walkable_triangles(builder.agent_max_slope);

        let mut set = NavmeshSet {
            params: NavmeshParams {
                origin: aabb.min,
                tile_width: tile_world_size,
                tile_height: tile_world_size,
                max_tiles: layout.max_tiles(),
                max_polygons_per_tile: layout.max_polygons_per_tile(),
            },
            tiles: Vec::new(),
        };

        for z in 0..layout.tiles_z {
            for x in 0..layout.tiles_x {
                let tile_min = aabb.min
                    + Vec3A::new(x as f32 * tile_world_size, 0.0, z as f32 * tile_world_size);
                let tile_aabb = Aabb3d {
                    min: tile_min,
                    max: Vec3A::new(
                        tile_min.x + tile_world_size,
                        aabb.max.y,
                        tile_min.z + tile_world_size,
                    ),
                };
                let Some(meshes) = build_tile(&trimesh, &builder, tile_aabb)? else {
                    debug!("Tile ({x}, {z}) is empty, skipping");
                    continue;
                };
                let tile_index = set.tiles.len() as u32;
                if let Err(rejection) = layout.admit(tile_index, meshes.polygon.polygon_count()) {
                    error!("Skipping tile ({x}, {z}): {rejection}");
                    continue;
                }
                set.tiles.push(NavmeshTile {
                    x: x as i32,
                    z: z as i32,
                    reference: layout.tile_reference(tile_index),
                    polygon: meshes.polygon,
                    detail: meshes.detail,
                });
            }
        }

        info!(
            "Tiled navmesh done in {:.2?}: {} tiles, {} polygons",
            start.elapsed(),
            set.tiles.len(),
            set.polygon_count()
        );
        Ok(set)
    }
}

/// Builds the tile covering `tile_aabb`. Returns `None` if the tile has no polygons.
fn build_tile(
    trimesh: &TriMesh,
    builder: &NavmeshConfigBuilder,
    tile_aabb: Aabb3d,
) -> Result<Option<NavmeshMeshes>, NavmeshError> {
    let mut config = NavmeshConfigBuilder {
        aabb: tile_aabb,
        ..builder.clone()
    }
    .build();
    let pad = config.border_size as f32 * config.cell_size;
    config.aabb.min.x -= pad;
    config.aabb.min.z -= pad;
    config.aabb.max.x += pad;
    config.aabb.max.z += pad;

    let tile_trimesh = trimesh.triangles_overlapping(&Aabb2d::from(config.aabb));
    if tile_trimesh.indices.is_empty() {
        return Ok(None);
    }
    let meshes = build_meshes(&tile_trimesh, &config)?;
    if meshes.polygon.polygon_count() == 0 {
        return Ok(None);
    }
    Ok(Some(meshes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::flat_trimesh;

    #[test]
    fn single_tile_uses_all_bits_for_polygons() {
        let layout = TileLayout::from_tile_counts(1, 1);
        assert_eq!(layout.tile_bits, 0);
        assert_eq!(layout.polygon_bits, 22);
        assert_eq!(layout.salt_bits, 10);
        assert_eq!(layout.max_tiles(), 1);
        assert_eq!(layout.tile_reference(0), 1 << 22);
    }

    #[test]
    fn tile_bits_round_up_to_a_power_of_two() {
        // 100 x 100 cells in tiles of 32 is a 4 x 4 grid.
        let layout = TileLayout::new(100, 100, 32);
        assert_eq!((layout.tiles_x, layout.tiles_z), (4, 4));
        assert_eq!(layout.tile_bits, 4);
        assert_eq!(layout.polygon_bits, 18);

        // 3 x 2 tiles round up to 8.
        let layout = TileLayout::from_tile_counts(3, 2);
        assert_eq!(layout.tile_bits, 3);
        assert_eq!(layout.polygon_bits, 19);
        assert_eq!(layout.max_polygons_per_tile(), 1 << 19);
        assert_eq!(layout.tile_reference(5), (1 << 22) | (5 << 19));
    }

    #[test]
    fn tile_bits_are_capped() {
        let layout = TileLayout::from_tile_counts(1000, 1000);
        assert_eq!(layout.tile_bits, 14);
        assert_eq!(layout.polygon_bits, 8);
        assert_eq!(layout.salt_bits, 10);
    }

    #[test]
    fn tiles_over_capacity_are_rejected() {
        // 14 tile bits leave 8 bits, so 256 polygons per tile.
        let layout = TileLayout::from_tile_counts(1000, 1000);
        assert_eq!(layout.admit(0, 256), Ok(()));
        assert_eq!(
            layout.admit(0, 257),
            Err(TileRejection::TooManyPolygons {
                polygon_count: 257,
                max_polygons: 256,
            })
        );
        assert_eq!(layout.admit(16_383, 1), Ok(()));
        assert_eq!(
            layout.admit(16_384, 1),
            Err(TileRejection::TooManyTiles { max_tiles: 16_384 })
        );

        let single = TileLayout::from_tile_counts(1, 1);
        assert_eq!(
            single.admit(1, 1),
            Err(TileRejection::TooManyTiles { max_tiles: 1 })
        );
    }

    #[test]
    fn oversized_tile_size_is_an_error() {
        let builder = TiledNavmeshBuilder::new(NavmeshConfigBuilder {
            tile_size: u16::MAX,
            ..Default::default()
        });
        assert!(matches!(
            builder.build(flat_trimesh(9.6, 0.0)),
            Err(NavmeshError::Config(_))
        ));
    }

    #[test]
    fn flat_floor_is_split_into_tiles() {
        let builder = TiledNavmeshBuilder::new(NavmeshConfigBuilder {
            tile_size: 16,
            ..Default::default()
        });
        let set = builder.build(flat_trimesh(9.6, 0.0)).unwrap();

        // 9.6 / 0.3 = 32 cells, so 2 x 2 tiles.
        assert_eq!(set.params.max_tiles, 4);
        assert_eq!(set.tiles.len(), 4);
        let layout = TileLayout::from_tile_counts(2, 2);
        for (i, tile) in set.tiles.iter().enumerate() {
            assert_eq!(tile.reference, layout.tile_reference(i as u32));
            assert!(tile.polygon.polygon_count() > 0);
        }
    }
}
