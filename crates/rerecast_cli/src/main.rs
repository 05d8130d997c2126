//! Command-line navmesh builder: `rerecast <input.obj> <output.nav> [settings]`.

use std::process::ExitCode;

mod cli;
mod input_geometry;
mod settings;

fn main() -> ExitCode {
    cli::run()
}
