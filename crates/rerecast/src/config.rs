use thiserror::Error;

use crate::{Aabb3d, BuildContoursFlags, ConvexVolume};

/// Voxel-space parameters for one run of the build pipeline.
///
/// Build one from world-space agent dimensions with [`NavmeshConfigBuilder`].
/// Unless noted otherwise, lengths are in voxels: [`cell_size`](Self::cell_size) on the
/// xz-plane and [`cell_height`](Self::cell_height) along y.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct NavmeshConfig {
    /// Number of cells along x, including the border.
    pub width: u16,

    /// Number of cells along z, including the border.
    pub height: u16,

    /// Cells per tile side. Ignored by solo builds.
    pub tile_size: u16,

    /// Cells of padding on each side of a tile.
    ///
    /// Tiles are built with this much extra geometry on each side so that
    /// neighboring tiles line up. Solo builds use no border.
    pub border_size: u16,

    /// Cell size on the xz-plane, in world units.
    ///
    /// Half or a third of the agent radius is a reasonable start.
    /// Halving it roughly quadruples the build time.
    pub cell_size: f32,

    /// Cell size along y, in world units. Usually half of [`cell_size`](Self::cell_size).
    pub cell_height: f32,

    /// World-space bounds of the field, border included.
    pub aabb: Aabb3d,

    /// Steepest walkable slope in radians. Must be below a right angle.
    pub walkable_slope_angle: f32,

    /// Minimum clearance above a floor for an agent to stand on it. At least 3.
    pub walkable_height: u16,

    /// Highest ledge an agent can step up or down.
    pub walkable_climb: u16,

    /// How far the walkable area is shrunk away from walls.
    pub walkable_radius: u16,

    /// Longest allowed contour edge on the mesh border. Zero disables splitting.
    pub max_edge_len: u16,

    /// How far a simplified contour may stray from the raw one.
    ///
    /// Values between 1.1 and 1.5 work well.
    pub max_simplification_error: f32,

    /// Regions with fewer spans than this are removed.
    pub min_region_area: u16,

    /// Regions with fewer spans than this are merged with a neighbor if possible.
    pub merge_region_area: u16,

    /// Upper bound on the corners of a polygon. At least 3.
    pub max_vertices_per_polygon: u16,

    /// Spacing of the height samples in the detail mesh, in world units.
    /// Zero disables sampling.
    pub detail_sample_dist: f32,

    /// How far the detail mesh may deviate from the heightfield, in world units.
    pub detail_sample_max_error: f32,

    /// How the walkable area is partitioned into regions.
    pub partition_type: PartitionType,

    /// Flags controlling the [`ContourSet`](crate::ContourSet) generation process.
    pub contour_flags: BuildContoursFlags,

    /// Convex volumes that stamp their area type onto the spans inside them.
    pub area_volumes: Vec<ConvexVolume>,
}

/// The algorithm used to partition the walkable surface into regions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub enum PartitionType {
    /// Builds a distance field and floods it from its maxima.
    /// Produces the nicest tessellation, but is the slowest and can create holes.
    #[default]
    Watershed,
    /// Sweeps the field row by row. Fast, never creates holes or overlaps, but makes long thin polygons.
    Monotone,
    /// Partitions into non-overlapping layers. A middle ground that works well for tiles.
    Layers,
}

impl TryFrom<i32> for PartitionType {
    type Error = i32;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Watershed),
            1 => Ok(Self::Monotone),
            2 => Ok(Self::Layers),
            other => Err(other),
        }
    }
}

/// World-space build settings that [`build`](Self::build) turns into a [`NavmeshConfig`].
///
/// The defaults suit a human-sized agent.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct NavmeshConfigBuilder {
    /// See [`NavmeshConfig::cell_size`].
    pub cell_size: f32,
    /// See [`NavmeshConfig::cell_height`].
    pub cell_height: f32,
    /// Agent height in world units, preferably with some headroom.
    pub agent_height: f32,
    /// Agent radius in world units.
    pub agent_radius: f32,
    /// The highest step the agent can climb. `[Limit: >= 0] [Units: wu]`
    pub agent_max_climb: f32,
    /// The steepest walkable slope. `[Units: Radians]`
    pub agent_max_slope: f32,
    /// Side length of the smallest region that is kept. `[Units: vx]`
    pub region_min_size: f32,
    /// Side length below which regions are merged into neighbors. `[Units: vx]`
    pub region_merge_size: f32,
    /// The maximum contour edge length. `[Units: wu]`
    pub edge_max_len: f32,
    /// The maximum contour simplification error. `[Units: vx]`
    pub edge_max_error: f32,
    /// The maximum number of vertices per polygon.
    pub verts_per_poly: f32,
    /// The detail mesh sample distance as a multiple of the cell size. Below 0.9 disables sampling.
    pub detail_sample_dist: f32,
    /// The detail mesh max error as a multiple of the cell height.
    pub detail_sample_max_error: f32,
    /// The side length of a tile. `[Units: vx]`
    pub tile_size: u16,
    /// The AABB of the input geometry. `[Units: wu]`
    pub aabb: Aabb3d,
    /// How regions are built.
    pub partition_type: PartitionType,
    /// Flags for contour generation.
    pub contour_flags: BuildContoursFlags,
    /// Whether the config is for a single tile of a tiled build.
    pub tiling: bool,
    /// Volumes that mark areas with specific area types.
    pub area_volumes: Vec<ConvexVolume>,
}

impl Default for NavmeshConfigBuilder {
    fn default() -> Self {
        Self {
            cell_size: 0.3,
            cell_height: 0.2,
            agent_height: 2.0,
            agent_radius: 0.6,
            agent_max_climb: 0.9,
            agent_max_slope: 45.0_f32.to_radians(),
            region_min_size: 8.0,
            region_merge_size: 20.0,
            edge_max_len: 12.0,
            edge_max_error: 1.3,
            verts_per_poly: 6.0,
            detail_sample_dist: 6.0,
            detail_sample_max_error: 1.0,
            tile_size: 32,
            aabb: Aabb3d::default(),
            partition_type: PartitionType::default(),
            contour_flags: BuildContoursFlags::default(),
            tiling: false,
            area_volumes: Vec::new(),
        }
    }
}

impl NavmeshConfigBuilder {
    /// Rejects settings that cannot be turned into a usable voxel grid.
    ///
    /// # Errors
    ///
    /// Returns an error if a cell dimension is not a positive number, or if a tile
    /// together with its border is wider than a heightfield can be.
    pub fn validate(&self) -> Result<(), NavmeshConfigError> {
        for (name, value) in [
            ("cell size", self.cell_size),
            ("cell height", self.cell_height),
        ] {
            if !(value > 0.0 && value.is_finite()) {
                return Err(NavmeshConfigError::InvalidCellDimension { name, value });
            }
        }
        if self.tiling {
            let border = ((self.agent_radius / self.cell_size).ceil() as u32).saturating_add(3);
            let side = (self.tile_size as u32).saturating_add(border.saturating_mul(2));
            if side > u16::MAX as u32 {
                return Err(NavmeshConfigError::TileTooLarge {
                    tile_size: self.tile_size,
                    side,
                });
            }
        }
        Ok(())
    }

    /// Converts the settings to voxel units.
    ///
    /// Values that do not fit saturate. Call [`validate`](Self::validate) first to reject them.
    pub fn build(self) -> NavmeshConfig {
        let (cs, ch) = (self.cell_size, self.cell_height);
        let walkable_radius = (self.agent_radius / cs).ceil() as u16;
        // Tiles need enough padding for the erosion and the neighbor lookups.
        let border_size = if self.tiling {
            walkable_radius.saturating_add(3)
        } else {
            0
        };
        let (width, height) = if self.tiling {
            let size = self.tile_size.saturating_add(border_size.saturating_mul(2));
            (size, size)
        } else {
            let cells = self.aabb.extent() / cs + 0.5;
            (cells.x as u16, cells.z as u16)
        };
        let area = |side: f32| (side * side) as u16;
        NavmeshConfig {
            width,
            height,
            border_size,
            walkable_radius,
            walkable_height: (self.agent_height / ch).ceil() as u16,
            walkable_climb: (self.agent_max_climb / ch).floor() as u16,
            walkable_slope_angle: self.agent_max_slope,
            max_edge_len: (self.edge_max_len / cs) as u16,
            max_simplification_error: self.edge_max_error,
            min_region_area: area(self.region_min_size),
            merge_region_area: area(self.region_merge_size),
            max_vertices_per_polygon: self.verts_per_poly as u16,
            detail_sample_dist: if self.detail_sample_dist < 0.9 {
                0.0
            } else {
                cs * self.detail_sample_dist
            },
            detail_sample_max_error: ch * self.detail_sample_max_error,
            tile_size: self.tile_size,
            cell_size: cs,
            cell_height: ch,
            aabb: self.aabb,
            partition_type: self.partition_type,
            contour_flags: self.contour_flags,
            area_volumes: self.area_volumes,
        }
    }
}

/// Settings rejected by [`NavmeshConfigBuilder::validate`].
#[derive(Debug, Error)]
pub enum NavmeshConfigError {
    /// A cell dimension is zero, negative or not a number.
    #[error("The {name} must be a positive number, but is {value}")]
    InvalidCellDimension {
        /// Which dimension is invalid.
        name: &'static str,
        /// The rejected value.
        value: f32,
    },
    /// A tile with its border on both sides does not fit into a heightfield.
    #[error("Tiles of {tile_size} cells are {side} cells wide with their border, but at most 65535 fit")]
    TileTooLarge {
        /// The requested tile size.
        tile_size: u16,
        /// The tile size plus the border on both sides.
        side: u32,
    },
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use glam::Vec3A;

    use super::*;

    #[test]
    fn derives_voxel_units() {
        let config = NavmeshConfigBuilder {
            aabb: Aabb3d {
                min: Vec3A::ZERO,
                max: Vec3A::new(30.0, 5.0, 15.0),
            },
            ..Default::default()
        }
        .build();
        assert_eq!(config.width, 100);
        assert_eq!(config.height, 50);
        assert_eq!(config.border_size, 0);
        assert_eq!(config.walkable_height, 10);
        assert_eq!(config.walkable_climb, 4);
        assert_eq!(config.walkable_radius, 2);
        assert_eq!(config.max_edge_len, 40);
        assert_eq!(config.min_region_area, 64);
        assert_eq!(config.merge_region_area, 400);
        assert_eq!(config.max_vertices_per_polygon, 6);
        assert_relative_eq!(config.detail_sample_dist, 1.8, epsilon = 1e-5);
        assert_relative_eq!(config.detail_sample_max_error, 0.2, epsilon = 1e-5);
    }

    #[test]
    fn tiles_get_a_border() {
        let config = NavmeshConfigBuilder {
            tiling: true,
            ..Default::default()
        }
        .build();
        assert_eq!(config.border_size, 5);
        assert_eq!(config.width, 32 + 10);
        assert_eq!(config.height, 32 + 10);
    }

    #[test]
    fn small_detail_sample_distance_disables_sampling() {
        let config = NavmeshConfigBuilder {
            detail_sample_dist: 0.5,
            ..Default::default()
        }
        .build();
        assert_eq!(config.detail_sample_dist, 0.0);
    }

    #[test]
    fn cell_dimensions_must_be_positive() {
        assert!(NavmeshConfigBuilder::default().validate().is_ok());
        for (cell_size, cell_height) in [
            (0.0, 0.2),
            (0.3, -1.0),
            (f32::NAN, 0.2),
            (0.3, f32::INFINITY),
        ] {
            let builder = NavmeshConfigBuilder {
                cell_size,
                cell_height,
                ..Default::default()
            };
            assert!(
                matches!(
                    builder.validate(),
                    Err(NavmeshConfigError::InvalidCellDimension { .. })
                ),
                "{cell_size} x {cell_height}"
            );
        }
    }

    #[test]
    fn oversized_tiles_are_rejected_instead_of_wrapping() {
        let builder = NavmeshConfigBuilder {
            tiling: true,
            tile_size: u16::MAX,
            ..Default::default()
        };
        assert!(matches!(
            builder.validate(),
            Err(NavmeshConfigError::TileTooLarge { side: 65545, .. })
        ));
        let config = builder.build();
        assert_eq!(config.width, u16::MAX);

        // The same tile size is fine for a solo build, which has no border.
        let solo = NavmeshConfigBuilder {
            tile_size: u16::MAX,
            ..Default::default()
        };
        assert!(solo.validate().is_ok());
    }

    #[test]
    fn partition_type_from_integer() {
        assert_eq!(PartitionType::try_from(0), Ok(PartitionType::Watershed));
        assert_eq!(PartitionType::try_from(1), Ok(PartitionType::Monotone));
        assert_eq!(PartitionType::try_from(2), Ok(PartitionType::Layers));
        assert_eq!(PartitionType::try_from(3), Err(3));
    }
}
