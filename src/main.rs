use clap::Parser;
use tracing_subscriber::EnvFilter;

use tvctl::cli::Cli;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // Logs go to stderr so command output on stdout stays scriptable.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("tvctl=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    if let Err(err) = tvctl::cli::run(cli).await {
        eprintln!("ERROR: {err:#}");
        std::process::exit(1);
    }
}
