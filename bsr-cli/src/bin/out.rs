use std::path::PathBuf;

use bsr_cli::BblProvisioner;
use clap::Parser;

#[derive(Parser)]
#[command(name = "out")]
#[command(about = "Run a bbl command and publish the resulting state", long_about = None)]
struct Cli {
    /// Working directory bbl runs in
    working_directory: PathBuf,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    bsr_cli::init_logging();

    let provisioner = BblProvisioner::from_env();
    let result = bsr_cli::run_out(
        std::io::stdin().lock(),
        std::io::stdout().lock(),
        &cli.working_directory,
        &provisioner,
    )
    .await;

    if let Err(e) = result {
        bsr_cli::exit_with_error(e);
    }
}
