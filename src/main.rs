//! # labrun command-line entry point
//!
//! ```text
//! main()
//!   │
//!   ├─> Parse CLI arguments (clap)
//!   ├─> Initialise logging (console + rolling files)
//!   └─> Execute the command
//! ```
//!
//! ```bash
//! labrun run --config config.json
//! labrun predict --model model/2019-01-23_23-19-56.871484 --input dummy_data.csv
//! ```

#![expect(clippy::print_stdout)] // Allow println! in main binary

mod cli;

use anyhow::Result;
use clap::Parser as _;

fn main() -> Result<()> {
    let cli = cli::Cli::parse();
    labrun::logging::init(cli.log_dir.as_deref())?;

    if let Err(err) = cli::run_command(cli.command) {
        tracing::error!("{err:#}");
        return Err(err);
    }
    Ok(())
}
