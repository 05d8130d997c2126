//! Builds navmeshes from procedural geometry and checks their shape.

use glam::{UVec3, Vec2, Vec3A};
use rerecast::{
    AreaType, ConvexVolume, NavmeshBuilder as _, NavmeshConfigBuilder, NavmeshSet,
    POLYGON_FLAG_WALK, SoloNavmeshBuilder, TileLayout, TiledNavmeshBuilder, TriMesh,
};

/// A square floor at height `y` covering `min..max` on the x- and z-axes.
fn floor(min: f32, max: f32, y: f32) -> TriMesh {
    rectangle(Vec2::splat(min), Vec2::splat(max), y)
}

/// A floor at height `y` between the xz-corners `min` and `max`.
fn rectangle(min: Vec2, max: Vec2, y: f32) -> TriMesh {
    TriMesh {
        vertices: vec![
            Vec3A::new(min.x, y, min.y),
            Vec3A::new(max.x, y, min.y),
            Vec3A::new(max.x, y, max.y),
            Vec3A::new(min.x, y, max.y),
        ],
        indices: vec![UVec3::new(0, 2, 1), UVec3::new(0, 3, 2)],
        area_types: vec![AreaType::NOT_WALKABLE; 2],
    }
}

fn detail_vertices(set: &NavmeshSet) -> impl Iterator<Item = Vec3A> + '_ {
    set.tiles
        .iter()
        .flat_map(|tile| tile.detail.vertices.iter().copied())
}

#[test]
fn flat_plane_builds_navmesh_on_the_plane() {
    let config = NavmeshConfigBuilder::default();
    let cell_height = config.cell_height;
    let set = SoloNavmeshBuilder::new(config)
        .build(floor(0.0, 12.0, 1.5))
        .unwrap();

    assert_eq!(set.tiles.len(), 1);
    let tile = &set.tiles[0];
    assert!(tile.polygon.polygon_count() > 0);
    assert_eq!(tile.detail.meshes.len(), tile.polygon.polygon_count());
    assert!(tile.polygon.flags.iter().all(|f| *f == POLYGON_FLAG_WALK));

    for vertex in detail_vertices(&set) {
        assert!(
            (vertex.y - 1.5).abs() <= 3.0 * cell_height,
            "vertex {vertex} is not on the plane"
        );
        assert!((-0.01..=12.01).contains(&vertex.x), "{vertex}");
        assert!((-0.01..=12.01).contains(&vertex.z), "{vertex}");
    }
}

#[test]
fn polygon_neighbors_are_symmetric() {
    let set = SoloNavmeshBuilder::default()
        .build(floor(0.0, 15.0, 0.0))
        .unwrap();
    let mesh = &set.tiles[0].polygon;
    for i in 0..mesh.polygon_count() {
        for &neighbor in mesh.neighbors(i) {
            if neighbor & 0x8000 != 0 || neighbor == rerecast::RC_MESH_NULL_IDX {
                continue;
            }
            assert!(
                mesh.neighbors(neighbor as usize).contains(&(i as u16)),
                "polygon {i} lists {neighbor} as a neighbor, but not vice versa"
            );
        }
    }
}

#[test]
fn separate_levels_stay_separate() {
    let mut trimesh = floor(0.0, 10.0, 0.0);
    trimesh.extend(floor(20.0, 30.0, 5.0)).unwrap();
    let set = SoloNavmeshBuilder::default().build(trimesh).unwrap();

    let (low, high): (Vec<_>, Vec<_>) = detail_vertices(&set).partition(|v| v.y < 2.5);
    assert!(!low.is_empty());
    assert!(!high.is_empty());
    assert!(low.iter().all(|v| v.x <= 10.01));
    assert!(high.iter().all(|v| v.x >= 19.99));
}

#[test]
fn steep_geometry_is_not_walkable() {
    let trimesh = TriMesh {
        vertices: vec![
            Vec3A::new(0.0, 0.0, 0.0),
            Vec3A::new(0.0, 10.0, 10.0),
            Vec3A::new(10.0, 10.0, 10.0),
            Vec3A::new(10.0, 0.0, 0.0),
        ],
        indices: vec![UVec3::new(0, 1, 2), UVec3::new(0, 2, 3)],
        area_types: vec![AreaType::NOT_WALKABLE; 2],
    };
    let set = SoloNavmeshBuilder::new(NavmeshConfigBuilder {
        agent_max_slope: 30.0_f32.to_radians(),
        ..Default::default()
    })
    .build(trimesh)
    .unwrap();
    assert_eq!(set.polygon_count(), 0);
}

#[test]
fn area_volumes_tag_polygons() {
    let marked = AreaType(7);
    let set = SoloNavmeshBuilder::new(NavmeshConfigBuilder {
        area_volumes: vec![ConvexVolume {
            vertices: vec![
                Vec2::new(-1.0, -1.0),
                Vec2::new(-1.0, 13.0),
                Vec2::new(6.0, 13.0),
                Vec2::new(6.0, -1.0),
            ],
            min_y: -1.0,
            max_y: 1.0,
            area: marked,
        }],
        ..Default::default()
    })
    .build(floor(0.0, 12.0, 0.0))
    .unwrap();

    let areas = &set.tiles[0].polygon.areas;
    assert!(areas.contains(&marked));
    assert!(areas.contains(&AreaType::DEFAULT_WALKABLE));
}

#[test]
fn tiled_build_covers_the_plane() {
    let set = TiledNavmeshBuilder::new(NavmeshConfigBuilder {
        tile_size: 16,
        ..Default::default()
    })
    .build(floor(0.0, 19.2, 0.0))
    .unwrap();

    // 19.2 / 0.3 = 64 cells, so 4 x 4 tiles of 16 cells.
    assert_eq!(set.tiles.len(), 16);
    let tile_size = set.params.tile_width;
    let mut references: Vec<_> = set.tiles.iter().map(|tile| tile.reference).collect();
    references.dedup();
    assert_eq!(references.len(), 16);

    for tile in &set.tiles {
        let min_x = tile.x as f32 * tile_size - 0.01;
        let max_x = (tile.x + 1) as f32 * tile_size + 0.01;
        let min_z = tile.z as f32 * tile_size - 0.01;
        let max_z = (tile.z + 1) as f32 * tile_size + 0.01;
        for vertex in &tile.detail.vertices {
            assert!((min_x..=max_x).contains(&vertex.x), "{vertex} outside tile");
            assert!((min_z..=max_z).contains(&vertex.z), "{vertex} outside tile");
        }
    }
}

#[test]
fn tiles_without_geometry_are_skipped() {
    // Two islands at the ends of a 4 x 1 grid of 6 unit tiles.
    let mut islands = rectangle(Vec2::ZERO, Vec2::new(3.6, 6.0), 0.0);
    islands
        .extend(rectangle(Vec2::new(20.4, 0.0), Vec2::new(24.0, 6.0), 0.0))
        .unwrap();
    let set = TiledNavmeshBuilder::new(NavmeshConfigBuilder {
        tile_size: 20,
        ..Default::default()
    })
    .build(islands)
    .unwrap();

    let coordinates: Vec<_> = set.tiles.iter().map(|tile| (tile.x, tile.z)).collect();
    assert_eq!(coordinates, [(0, 0), (3, 0)]);
    // The references stay contiguous across the skipped tiles.
    let layout = TileLayout::from_tile_counts(4, 1);
    assert_eq!(set.params.max_tiles, layout.max_tiles());
    assert_eq!(set.tiles[0].reference, layout.tile_reference(0));
    assert_eq!(set.tiles[1].reference, layout.tile_reference(1));
}

#[test]
fn floors_beyond_the_span_height_limit_still_build() {
    // 2000 units is far above the 13 bit span limit at the default cell height.
    let mut floors = floor(0.0, 12.0, 0.0);
    floors.extend(floor(0.0, 12.0, 2000.0)).unwrap();
    let set = SoloNavmeshBuilder::default().build(floors).unwrap();
    assert!(set.polygon_count() > 0);
    assert!(detail_vertices(&set).any(|vertex| vertex.y.abs() <= 1.0));
}
