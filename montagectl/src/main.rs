use clap::Parser;
use tracing_subscriber::EnvFilter;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();
    let cli = montagectl::Cli::parse();
    if let Err(err) = montagectl::run(cli).await {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}
