use std::{path::PathBuf, process::ExitCode};

use anyhow::Context as _;
use clap::{ArgAction, Parser, ValueHint};
use rerecast::{NavmeshBuilder, SoloNavmeshBuilder, TiledNavmeshBuilder};
use tracing::{Level, info};

use crate::{input_geometry, settings::BuildSettings};

/// The exit code for every failure. `-1` as seen by the shell.
const FAILURE: u8 = 255;

/// Builds a navmesh from a Wavefront OBJ file.
#[derive(Parser, Debug, Clone)]
#[command(name = "rerecast", version, about, long_about = None)]
pub struct Args {
    /// The triangle soup to build the navmesh from
    #[arg(value_name = "INPUT_OBJ", value_hint = ValueHint::FilePath)]
    pub input: PathBuf,

    /// Where to write the navmesh
    #[arg(value_name = "OUTPUT_NAV", value_hint = ValueHint::FilePath)]
    pub output: PathBuf,

    /// A `key=value` file overriding the default build settings
    #[arg(value_name = "SETTINGS", value_hint = ValueHint::FilePath)]
    pub settings: Option<PathBuf>,

    /// Verbose logging, repeat for more
    #[arg(long = "verbose", short = 'v', action = ArgAction::Count)]
    pub verbose: u8,
}

/// Runs the CLI application and maps the outcome to an exit code.
pub fn run() -> ExitCode {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(err) => {
            // Help and version go to stdout and are not failures.
            let _ = err.print();
            return if err.use_stderr() {
                ExitCode::from(FAILURE)
            } else {
                ExitCode::SUCCESS
            };
        }
    };
    init_logging(args.verbose);

    match run_with_args(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:?}");
            ExitCode::from(FAILURE)
        }
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => Level::INFO,
        1 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(level)
        .with_target(false)
        .init();
}

fn run_with_args(args: &Args) -> anyhow::Result<()> {
    let settings = match &args.settings {
        Some(path) => BuildSettings::load(path)
            .with_context(|| format!("Failed to read settings file {}", path.display()))?,
        None => BuildSettings::default(),
    };

    let trimesh = input_geometry::load_obj(&args.input)
        .with_context(|| format!("Failed to load geometry from {}", args.input.display()))?;

    let mut builder: Box<dyn NavmeshBuilder> = if settings.is_tiled() {
        Box::new(TiledNavmeshBuilder::default())
    } else {
        Box::new(SoloNavmeshBuilder::default())
    };
    settings.apply_to(builder.config_mut());

    let navmesh = builder.build(trimesh).context("Failed to build navmesh")?;
    navmesh
        .save(&args.output)
        .with_context(|| format!("Failed to save navmesh to {}", args.output.display()))?;
    info!(
        "Saved {} tiles with {} polygons to {}",
        navmesh.tiles.len(),
        navmesh.polygon_count(),
        args.output.display()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory as _;

    use super::*;

    #[test]
    fn verify_command() {
        Args::command().debug_assert();
    }

    #[test]
    fn settings_are_optional() {
        let args = Args::try_parse_from(["rerecast", "in.obj", "out.nav"]).unwrap();
        assert_eq!(args.settings, None);
        assert_eq!(args.verbose, 0);

        let args =
            Args::try_parse_from(["rerecast", "-vv", "in.obj", "out.nav", "settings.txt"]).unwrap();
        assert_eq!(args.settings, Some(PathBuf::from("settings.txt")));
        assert_eq!(args.verbose, 2);
    }

    #[test]
    fn output_is_required() {
        assert!(Args::try_parse_from(["rerecast", "in.obj"]).is_err());
    }
}
