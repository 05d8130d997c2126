#![doc = include_str!("../../../readme.md")]

mod compact_cell;
mod compact_heightfield;
mod compact_span;
mod config;
mod contours;
mod detail_mesh;
mod erosion;
mod heightfield;
mod mark_convex_poly_area;
pub(crate) mod math;
mod monotone_build_regions;
mod navmesh_set;
mod pipeline;
mod poly_mesh;
mod pre_filter;
mod rasterize;
mod region;
mod region_merging;
mod span;
#[cfg(test)]
mod test_utils;
mod tiling;
mod trimesh;
mod watershed_build_regions;
mod watershed_distance_field;

pub use compact_cell::CompactCell;
pub use compact_heightfield::{CompactHeightfield, CompactHeightfieldError};
pub use compact_span::CompactSpan;
pub use config::{NavmeshConfig, NavmeshConfigBuilder, NavmeshConfigError, PartitionType};
pub use contours::{BuildContoursFlags, Contour, ContourSet, RegionVertexId};
pub use detail_mesh::{DetailNavmesh, DetailNavmeshError, SubMesh};
pub use heightfield::{
    Heightfield, HeightfieldBuilder, HeightfieldBuilderError, SpanInsertionError,
};
pub use mark_convex_poly_area::ConvexVolume;
pub use math::{Aabb2d, Aabb3d};
#[cfg(feature = "serialize")]
pub use navmesh_set::NavmeshFileError;
pub use navmesh_set::{NavmeshParams, NavmeshSet, NavmeshTile};
pub use pipeline::{
    NavmeshBuilder, NavmeshError, NavmeshMeshes, POLYGON_FLAG_WALK, SoloNavmeshBuilder,
    build_meshes,
};
pub use poly_mesh::{PolygonMeshError, PolygonNavmesh, RC_MESH_NULL_IDX};
pub use rasterize::RasterizationError;
pub use region::RegionId;
pub use span::{AreaType, Span, SpanKey, Spans};
pub use tiling::{TileLayout, TileRejection, TiledNavmeshBuilder};
pub use trimesh::{TriMesh, TriMeshError};
pub use watershed_build_regions::RegionBuildError;
