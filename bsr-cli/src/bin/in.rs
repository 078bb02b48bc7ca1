use std::path::PathBuf;

use clap::Parser;

#[derive(Parser)]
#[command(name = "in")]
#[command(about = "Fetch a stored bbl state version into a directory", long_about = None)]
struct Cli {
    /// Directory to write bbl-state.json into
    target_directory: PathBuf,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    bsr_cli::init_logging();

    let result = bsr_cli::run_in(
        std::io::stdin().lock(),
        std::io::stdout().lock(),
        &cli.target_directory,
    )
    .await;

    if let Err(e) = result {
        bsr_cli::exit_with_error(e);
    }
}
