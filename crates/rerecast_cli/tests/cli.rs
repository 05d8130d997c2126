//! Runs the `rerecast` binary end to end on small OBJ files.

use std::{fs, path::Path, process::Command};

use rerecast::NavmeshSet;

const FLOOR_OBJ: &str = "\
o floor
v 0 0 0
v 12 0 0
v 12 0 12
v 0 0 12
f 1 4 3 2
";

fn rerecast() -> Command {
    Command::new(env!("CARGO_BIN_EXE_rerecast"))
}

fn write_floor(dir: &Path) -> std::path::PathBuf {
    let path = dir.join("floor.obj");
    fs::write(&path, FLOOR_OBJ).unwrap();
    path
}

#[test]
fn missing_arguments_fail_with_255() {
    let output = rerecast().output().expect("run binary");
    assert_eq!(output.status.code(), Some(255));
    assert!(String::from_utf8_lossy(&output.stderr).contains("Usage"));
}

#[test]
fn help_succeeds() {
    let output = rerecast().arg("--help").output().expect("run binary");
    assert!(output.status.success());
}

#[test]
fn builds_solo_navmesh() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_floor(dir.path());
    let output_path = dir.path().join("floor.nav");

    let output = rerecast()
        .arg(&input)
        .arg(&output_path)
        .output()
        .expect("run binary");
    assert!(
        output.status.success(),
        "{}",
        String::from_utf8_lossy(&output.stderr)
    );

    let navmesh = NavmeshSet::load(&output_path).unwrap();
    assert_eq!(navmesh.tiles.len(), 1);
    assert!(navmesh.polygon_count() > 0);
}

#[test]
fn settings_select_tiled_build() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_floor(dir.path());
    let settings = dir.path().join("settings.txt");
    fs::write(
        &settings,
        "# tiles of 20 cells\ntiled = 1\ntileSize=20\ncellSize=0.3\nunknownKey=3\n",
    )
    .unwrap();
    let output_path = dir.path().join("floor.nav");

    let status = rerecast()
        .arg(&input)
        .arg(&output_path)
        .arg(&settings)
        .status()
        .expect("run binary");
    assert!(status.success());

    // 12 / 0.3 = 40 cells, so 2 x 2 tiles.
    let navmesh = NavmeshSet::load(&output_path).unwrap();
    assert_eq!(navmesh.tiles.len(), 4);
    assert_eq!(navmesh.params.max_tiles, 4);
}

#[test]
fn unreadable_geometry_fails_with_255() {
    let dir = tempfile::tempdir().unwrap();
    let output = rerecast()
        .arg(dir.path().join("missing.obj"))
        .arg(dir.path().join("out.nav"))
        .output()
        .expect("run binary");
    assert_eq!(output.status.code(), Some(255));
    assert!(String::from_utf8_lossy(&output.stderr).contains("missing.obj"));
}

#[test]
fn unreadable_settings_fail_with_255() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_floor(dir.path());
    let status = rerecast()
        .arg(&input)
        .arg(dir.path().join("out.nav"))
        .arg(dir.path().join("missing.txt"))
        .status()
        .expect("run binary");
    assert_eq!(status.code(), Some(255));
}

#[test]
fn oversized_tiles_fail_with_255() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_floor(dir.path());
    let settings = dir.path().join("settings.txt");
    fs::write(&settings, "tiled=1\ntileSize=65535\n").unwrap();

    let output = rerecast()
        .arg(&input)
        .arg(dir.path().join("out.nav"))
        .arg(&settings)
        .output()
        .expect("run binary");
    assert_eq!(output.status.code(), Some(255));
    assert!(String::from_utf8_lossy(&output.stderr).contains("Invalid build settings"));
}

#[test]
fn out_of_range_settings_fall_back_to_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_floor(dir.path());
    let settings = dir.path().join("settings.txt");
    fs::write(&settings, "tiled=1\ntileSize=70000\ncellSize=0\ncellHeight=0\n").unwrap();
    let output_path = dir.path().join("floor.nav");

    let output = rerecast()
        .arg(&input)
        .arg(&output_path)
        .arg(&settings)
        .output()
        .expect("run binary");
    assert!(
        output.status.success(),
        "{}",
        String::from_utf8_lossy(&output.stderr)
    );
    // The default 32 cell tiles cover the 40 x 40 cell floor with 2 x 2 tiles.
    let navmesh = NavmeshSet::load(&output_path).unwrap();
    assert_eq!(navmesh.params.max_tiles, 4);
}
