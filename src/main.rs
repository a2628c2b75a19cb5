use clap::Parser;
use groundbench_lib::cli::Cli;
use groundbench_lib::config::load_config;
use groundbench_lib::errors::BenchResult;

#[tokio::main]
async fn main() -> BenchResult<()> {
    // Load .env before anything reads the environment
    let _ = dotenvy::dotenv();
    groundbench_lib::init_tracing();

    let args = Cli::parse();
    let config = load_config(args.config.as_deref())?;
    args.action.execute(config).await
}
