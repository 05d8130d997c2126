//! The finished navmesh: a set of tiles, and its on-disk format.

use glam::Vec3A;

use crate::{
    DetailNavmesh, NavmeshConfig, PolygonNavmesh, pipeline::NavmeshMeshes, tiling::TileLayout,
};

/// Describes how the tiles of a [`NavmeshSet`] are placed in the world.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct NavmeshParams {
    /// The world space origin of the tile grid.
    pub origin: Vec3A,
    /// The width of a tile along the x-axis. `[Units: wu]`
    pub tile_width: f32,
    /// The height of a tile along the z-axis. `[Units: wu]`
    pub tile_height: f32,
    /// The number of tiles a tile reference can address.
    pub max_tiles: u32,
    /// The number of polygons a single tile may contain.
    pub max_polygons_per_tile: u32,
}

/// A single tile of a [`NavmeshSet`].
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct NavmeshTile {
    /// The tile's column in the grid.
    pub x: i32,
    /// The tile's row in the grid.
    pub z: i32,
    /// The reference of the tile's first polygon. See [`TileLayout::tile_reference`].
    pub reference: u32,
    /// The navigable polygons of the tile.
    pub polygon: PolygonNavmesh,
    /// The height detail of the tile's polygons.
    pub detail: DetailNavmesh,
}

/// A built navmesh, made up of one or more tiles.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serialize", derive(serde::Serialize, serde::Deserialize))]
pub struct NavmeshSet {
    /// How the tiles are laid out.
    pub params: NavmeshParams,
    /// The tiles that contain polygons. Empty tiles are not stored.
    pub tiles: Vec<NavmeshTile>,
}

impl NavmeshSet {
    /// Wraps the result of a solo build into a set with a single tile at `(0, 0)`.
    pub fn solo(config: &NavmeshConfig, meshes: NavmeshMeshes) -> Self {
        let layout = TileLayout::from_tile_counts(1, 1);
        let extent = config.aabb.extent();
        Self {
            params: NavmeshParams {
                origin: config.aabb.min,
                tile_width: extent.x,
                tile_height: extent.z,
                max_tiles: layout.max_tiles(),
                max_polygons_per_tile: meshes.polygon.polygon_count() as u32,
            },
            tiles: vec![NavmeshTile {
                x: 0,
                z: 0,
                reference: layout.tile_reference(0),
                polygon: meshes.polygon,
                detail: meshes.detail,
            }],
        }
    }

    /// The number of polygons across all tiles.
    pub fn polygon_count(&self) -> usize {
        self.tiles
            .iter()
            .map(|tile| tile.polygon.polygon_count())
            .sum()
    }
}

#[cfg(feature = "serialize")]
pub use file::NavmeshFileError;

#[cfg(feature = "serialize")]
mod file {
    use std::{
        fs::File,
        io::{self, BufReader, BufWriter, Read, Write},
        path::Path,
    };

    use thiserror::Error;

    use super::NavmeshSet;

    const MAGIC: [u8; 4] = *b"MSET";
    const VERSION: u32 = 1;

    impl NavmeshSet {
        /// Writes the navmesh to `writer`.
        ///
        /// The format is the magic `MSET`, a little endian `u32` version and a bincode payload.
        pub fn write_to(&self, mut writer: impl Write) -> Result<(), NavmeshFileError> {
            writer.write_all(&MAGIC)?;
            writer.write_all(&VERSION.to_le_bytes())?;
            bincode::serde::encode_into_std_write(self, &mut writer, bincode::config::standard())?;
            writer.flush()?;
            Ok(())
        }

        /// Reads a navmesh written by [`NavmeshSet::write_to`].
        pub fn read_from(mut reader: impl Read) -> Result<Self, NavmeshFileError> {
            let mut magic = [0; 4];
            reader.read_exact(&mut magic)?;
            if magic != MAGIC {
                return Err(NavmeshFileError::BadMagic(magic));
            }
            let mut version = [0; 4];
            reader.read_exact(&mut version)?;
            let version = u32::from_le_bytes(version);
            if version != VERSION {
                return Err(NavmeshFileError::UnsupportedVersion(version));
            }
            let set =
                bincode::serde::decode_from_std_read(&mut reader, bincode::config::standard())?;
            Ok(set)
        }

        /// Saves the navmesh to a file, replacing it if it exists.
        pub fn save(&self, path: impl AsRef<Path>) -> Result<(), NavmeshFileError> {
            let file = File::create(path)?;
            self.write_to(BufWriter::new(file))
        }

        /// Loads a navmesh saved with [`NavmeshSet::save`].
        pub fn load(path: impl AsRef<Path>) -> Result<Self, NavmeshFileError> {
            let file = File::open(path)?;
            Self::read_from(BufReader::new(file))
        }
    }

    /// Errors that can occur when saving or loading a [`NavmeshSet`].
    #[derive(Error, Debug)]
    pub enum NavmeshFileError {
        /// Reading or writing the underlying file failed.
        #[error("I/O error: {0}")]
        Io(#[from] io::Error),
        /// The file does not start with `MSET`.
        #[error("Not a navmesh file, found magic {0:?}")]
        BadMagic([u8; 4]),
        /// The file was written by an incompatible version.
        #[error("Unsupported navmesh file version {0}, expected {VERSION}")]
        UnsupportedVersion(u32),
        /// The payload could not be encoded.
        #[error("Failed to encode navmesh: {0}")]
        Encode(#[from] bincode::error::EncodeError),
        /// The payload could not be decoded.
        #[error("Failed to decode navmesh: {0}")]
        Decode(#[from] bincode::error::DecodeError),
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use crate::{NavmeshBuilder as _, SoloNavmeshBuilder, test_utils::flat_trimesh};

        #[test]
        fn round_trip_preserves_tiles() {
            let set = SoloNavmeshBuilder::default()
                .build(flat_trimesh(6.0, 2.0))
                .unwrap();
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("floor.nav");
            set.save(&path).unwrap();

            let bytes = std::fs::read(&path).unwrap();
            assert_eq!(&bytes[..4], b"MSET");
            assert_eq!(&bytes[4..8], &1_u32.to_le_bytes());

            let loaded = NavmeshSet::load(&path).unwrap();
            assert_eq!(loaded, set);
        }

        #[test]
        fn rejects_bad_magic() {
            let result = NavmeshSet::read_from(&b"MESH\x01\x00\x00\x00"[..]);
            assert!(matches!(result, Err(NavmeshFileError::BadMagic(magic)) if &magic == b"MESH"));
        }

        #[test]
        fn rejects_unknown_version() {
            let result = NavmeshSet::read_from(&b"MSET\x02\x00\x00\x00"[..]);
            assert!(matches!(
                result,
                Err(NavmeshFileError::UnsupportedVersion(2))
            ));
        }
    }
}
