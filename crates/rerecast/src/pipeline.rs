//! Runs the full Recast pipeline from a [`TriMesh`] to a polygon mesh and its detail mesh.

use std::time::Instant;

use thiserror::Error;
use tracing::{debug, info};

use crate::{
    CompactHeightfieldError, DetailNavmesh, DetailNavmeshError, HeightfieldBuilder,
    HeightfieldBuilderError, NavmeshConfig, NavmeshConfigBuilder, NavmeshConfigError, NavmeshSet,
    PartitionType,
    PolygonMeshError, PolygonNavmesh, RasterizationError, RegionBuildError, TriMesh,
    TriMeshError,
};

/// The polygon flag set on every polygon with a walkable area.
pub const POLYGON_FLAG_WALK: u16 = 1;

/// A polygon mesh together with the detail mesh that refines its heights.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct NavmeshMeshes {
    /// The navigable polygons.
    pub polygon: PolygonNavmesh,
    /// The height detail of each polygon.
    pub detail: DetailNavmesh,
}

/// Builds a navmesh out of a triangle soup.
///
/// The two implementations are [`SoloNavmeshBuilder`] and [`TiledNavmeshBuilder`](crate::TiledNavmeshBuilder).
pub trait NavmeshBuilder {
    /// The parameters the next build will use.
    fn config(&self) -> &NavmeshConfigBuilder;

    /// Mutable access to the parameters, e.g. to apply user overrides.
    fn config_mut(&mut self) -> &mut NavmeshConfigBuilder;

    /// Builds the navmesh for `trimesh`.
    ///
    /// Walkable triangles are marked by the builder, so all triangles can start as
    /// [`AreaType::NOT_WALKABLE`](crate::AreaType::NOT_WALKABLE).
    fn build(&self, trimesh: TriMesh) -> Result<NavmeshSet, NavmeshError>;
}

/// Builds a single navmesh covering the whole input.
#[derive(Debug, Clone, Default)]
pub struct SoloNavmeshBuilder {
    /// The build parameters.
    pub config: NavmeshConfigBuilder,
}

impl SoloNavmeshBuilder {
    /// Creates a builder with the given parameters.
    pub fn new(config: NavmeshConfigBuilder) -> Self {
        Self { config }
    }
}

impl NavmeshBuilder for SoloNavmeshBuilder {
    fn config(&self) -> &NavmeshConfigBuilder {
        &self.config
    }

    fn config_mut(&mut self) -> &mut NavmeshConfigBuilder {
        &mut self.config
    }

    fn build(&self, mut trimesh: TriMesh) -> Result<NavmeshSet, NavmeshError> {
        let start = Instant::now();
        let aabb = trimesh.compute_aabb().ok_or(NavmeshError::EmptyTrimesh)?;
        let builder = NavmeshConfigBuilder {
            aabb,
            tiling: false,
            ..self.config.clone()
        };
        builder.validate()?;
        let config = builder.build();
        info!(
            "Building solo navmesh: {} x {} cells, {} vertices, {} triangles",
            config.width,
            config.height,
            trimesh.vertices.len(),
            trimesh.indices.len()
        );

        trimesh.mark_walkable_triangles(config.walkable_slope_angle);
        let meshes = build_meshes(&trimesh, &config)?;
        let set = NavmeshSet::solo(&config, meshes);
        info!(
            "Solo navmesh done in {:.2?}: {} polygons",
            start.elapsed(),
            set.polygon_count()
        );
        Ok(set)
    }
}

/// Runs every stage of the pipeline over the area described by `config`.
///
/// The walkable triangles of `trimesh` must already be marked, see [`TriMesh::mark_walkable_triangles`].
/// Every polygon with a walkable area gets [`POLYGON_FLAG_WALK`].
pub fn build_meshes(
    trimesh: &TriMesh,
    config: &NavmeshConfig,
) -> Result<NavmeshMeshes, NavmeshError> {
    let stage = Instant::now();
    let mut heightfield = HeightfieldBuilder {
        aabb: config.aabb,
        cell_size: config.cell_size,
        cell_height: config.cell_height,
    }
    .build()?;
    heightfield.rasterize_triangles(trimesh, config.walkable_climb)?;
    debug!("Rasterized triangles in {:.2?}", stage.elapsed());

    // Remove unwanted overhangs caused by the conservative rasterization
    // as well as spans where the character cannot possibly stand.
    let stage = Instant::now();
    heightfield.filter_low_hanging_walkable_obstacles(config.walkable_climb);
    heightfield.filter_ledge_spans(config.walkable_height, config.walkable_climb);
    heightfield.filter_walkable_low_height_spans(config.walkable_height);
    debug!("Filtered spans in {:.2?}", stage.elapsed());

    let stage = Instant::now();
    let mut compact_heightfield =
        heightfield.into_compact(config.walkable_height, config.walkable_climb)?;
    compact_heightfield.erode_walkable_area(config.walkable_radius);
    for volume in &config.area_volumes {
        compact_heightfield.mark_convex_poly_area(volume.clone());
    }
    debug!("Built compact heightfield in {:.2?}", stage.elapsed());

    let stage = Instant::now();
    match config.partition_type {
        PartitionType::Watershed => {
            compact_heightfield.build_distance_field();
            compact_heightfield.build_regions(
                config.border_size,
                config.min_region_area,
                config.merge_region_area,
            )?;
        }
        PartitionType::Monotone => compact_heightfield.build_regions_monotone(
            config.border_size,
            config.min_region_area,
            config.merge_region_area,
        )?,
        PartitionType::Layers => {
            compact_heightfield.build_layer_regions(config.border_size, config.min_region_area)?
        }
    }
    debug!(
        "Built {} regions with {:?} partitioning in {:.2?}",
        compact_heightfield.max_region.bits(),
        config.partition_type,
        stage.elapsed()
    );

    let stage = Instant::now();
    let contours = compact_heightfield.build_contours(
        config.max_simplification_error,
        config.max_edge_len,
        config.contour_flags,
    );
    debug!(
        "Traced {} contours in {:.2?}",
        contours.contours.len(),
        stage.elapsed()
    );

    let stage = Instant::now();
    let mut polygon = contours.into_polygon_mesh(config.max_vertices_per_polygon)?;
    for (flags, area) in polygon.flags.iter_mut().zip(&polygon.areas) {
        if area.is_walkable() {
            *flags = POLYGON_FLAG_WALK;
        }
    }
    debug!(
        "Built {} polygons in {:.2?}",
        polygon.polygon_count(),
        stage.elapsed()
    );

    let stage = Instant::now();
    let detail = DetailNavmesh::new(
        &polygon,
        &compact_heightfield,
        config.detail_sample_dist,
        config.detail_sample_max_error,
    )?;
    debug!(
        "Built detail mesh with {} triangles in {:.2?}",
        detail.triangles.len(),
        stage.elapsed()
    );

    Ok(NavmeshMeshes { polygon, detail })
}

/// Errors that can occur while building a navmesh.
#[derive(Error, Debug)]
pub enum NavmeshError {
    /// The input has no vertices, so there is nothing to build.
    #[error("Cannot build a navmesh from an empty trimesh")]
    EmptyTrimesh,
    /// See [`NavmeshConfigError`].
    #[error("Invalid build settings: {0}")]
    Config(#[from] NavmeshConfigError),
    /// See [`TriMeshError`].
    #[error("Failed to assemble the input geometry: {0}")]
    TriMesh(#[from] TriMeshError),
    /// See [`HeightfieldBuilderError`].
    #[error("Failed to build heightfield: {0}")]
    Heightfield(#[from] HeightfieldBuilderError),
    /// See [`RasterizationError`].
    #[error("Failed to rasterize triangles: {0}")]
    Rasterization(#[from] RasterizationError),
    /// See [`CompactHeightfieldError`].
    #[error("Failed to build compact heightfield: {0}")]
    CompactHeightfield(#[from] CompactHeightfieldError),
    /// See [`RegionBuildError`].
    #[error("Failed to build regions: {0}")]
    Regions(#[from] RegionBuildError),
    /// See [`PolygonMeshError`].
    #[error("Failed to build polygon mesh: {0}")]
    PolygonMesh(#[from] PolygonMeshError),
    /// See [`DetailNavmeshError`].
    #[error("Failed to build detail mesh: {0}")]
    DetailMesh(#[from] DetailNavmeshError),
}

#[cfg(test)]
mod tests {
    use crate::test_utils::flat_trimesh;

    use super::*;

    #[test]
    fn flat_floor_is_walkable() {
        let mut trimesh = flat_trimesh(10.0, 1.0);
        let builder = NavmeshConfigBuilder {
            aabb: trimesh.compute_aabb().unwrap(),
            ..Default::default()
        };
        let config = builder.build();
        trimesh.mark_walkable_triangles(config.walkable_slope_angle);
        let meshes = build_meshes(&trimesh, &config).unwrap();

        assert!(meshes.polygon.polygon_count() > 0);
        assert!(
            meshes
                .polygon
                .flags
                .iter()
                .all(|flags| *flags == POLYGON_FLAG_WALK)
        );
        assert_eq!(meshes.detail.meshes.len(), meshes.polygon.polygon_count());
    }

    #[test]
    fn every_partition_type_produces_polygons() {
        for partition_type in [
            PartitionType::Watershed,
            PartitionType::Monotone,
            PartitionType::Layers,
        ] {
            let builder = SoloNavmeshBuilder::new(NavmeshConfigBuilder {
                partition_type,
                ..Default::default()
            });
            let set = builder.build(flat_trimesh(10.0, 0.0)).unwrap();
            assert_eq!(set.tiles.len(), 1, "{partition_type:?}");
            assert!(set.polygon_count() > 0, "{partition_type:?}");
        }
    }

    #[test]
    fn zero_cell_height_is_an_error() {
        let builder = SoloNavmeshBuilder::new(NavmeshConfigBuilder {
            cell_height: 0.0,
            ..Default::default()
        });
        let result = builder.build(flat_trimesh(10.0, 0.0));
        assert!(matches!(
            result,
            Err(NavmeshError::Config(
                NavmeshConfigError::InvalidCellDimension { .. }
            ))
        ));
    }

    #[test]
    fn empty_trimesh_is_an_error() {
        let builder = SoloNavmeshBuilder::default();
        let result = builder.build(TriMesh::default());
        assert!(matches!(result, Err(NavmeshError::EmptyTrimesh)));
    }
}
