use clap::Parser;

#[derive(Parser)]
#[command(name = "check")]
#[command(about = "List stored bbl state versions newer than the given one", long_about = None)]
struct Cli {}

#[tokio::main]
async fn main() {
    Cli::parse();
    bsr_cli::init_logging();

    let result = bsr_cli::run_check(std::io::stdin().lock(), std::io::stdout().lock()).await;

    if let Err(e) = result {
        bsr_cli::exit_with_error(e);
    }
}
