use clap::Parser;
use mason::cmd::{self, Args};
use std::process;

/// Diagnostics carry their own exit codes: 1 for configuration errors,
/// 2 for internal errors. Print the formatted message instead of the
/// Debug form a returned Result would produce.
fn main() {
    let args = Args::parse();
    cmd::init_logger(args.log_level);
    if let Err(e) = cmd::run(args) {
        eprintln!("{}", e);
        process::exit(e.exit_code());
    }
}
