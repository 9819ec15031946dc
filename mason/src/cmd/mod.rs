mod configure;
mod internal;

use crate::diagnostics::DiagResult;
use clap::Parser;
use configure::Configure;
use env_logger::Builder;
use internal::InternalCommand;
use log::LevelFilter;

const DEFAULT_LEVEL_FILTER: LevelFilter = LevelFilter::Info;

/// A tool that configures Meson-style build trees.
#[derive(Debug, Parser)]
#[clap(about, long_about = None, version)]
pub struct Args {
    /// Set the logging level. One of [off|error|warn|info|debug|trace]. You
    /// can also leave this unset and use the RUST_LOG env variable. See
    /// https://github.com/rust-cli/env_logger/
    #[clap(long = "log-level", global = true)]
    pub log_level: Option<LevelFilter>,

    #[clap(subcommand)]
    pub subcommand: Subcommand,
}

#[derive(Debug, Parser)]
pub enum Subcommand {
    /// Read a build description and produce the back-end manifest.
    Configure(Configure),

    /// Helper entry points invoked by generated build rules.
    #[clap(subcommand, hide = true)]
    Internal(InternalCommand),
}

/// Entrypoint for the command line program.
pub fn run(args: Args) -> DiagResult<()> {
    match args.subcommand {
        Subcommand::Configure(configure) => configure.run(),
        Subcommand::Internal(internal) => internal.run(),
    }
}

/// Use `level` if present, or else use `RUST_LOG` if present, or else use
/// a default.
pub fn init_logger(level: Option<LevelFilter>) {
    match (std::env::var(env_logger::DEFAULT_FILTER_ENV).ok(), level) {
        (Some(_), None) => {
            // RUST_LOG exists and level does not; use the environment
            // variable.
            Builder::from_default_env().init();
        }
        _ => {
            // Use provided log level or default for this crate only.
            Builder::new()
                .filter(
                    Some(env!("CARGO_CRATE_NAME")),
                    level.unwrap_or(DEFAULT_LEVEL_FILTER),
                )
                .init();
        }
    }
}
