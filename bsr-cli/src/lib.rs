//! bbl state resource
//!
//! Implements the `check`, `in` and `out` verbs that let a pipeline treat the
//! provisioning tool's state file as a versioned resource. The binaries in
//! `src/bin` are thin wrappers around the `run_*` adapters.

pub mod commands;
pub mod error;
pub mod provisioner;

pub use commands::{check, get, put, run_check, run_in, run_out};
pub use error::{ResourceError, ResourceResult};
pub use provisioner::{BblProvisioner, ProvisionError, Provisioner};

/// Log to stderr, `info` unless `RUST_LOG` says otherwise
///
/// stdout is reserved for the JSON response.
pub fn init_logging() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();
}

/// Print a fatal error and exit with status 1
pub fn exit_with_error(error: ResourceError) -> ! {
    use colored::Colorize;

    eprintln!("{} {}", "Error:".red().bold(), error);
    std::process::exit(1);
}
