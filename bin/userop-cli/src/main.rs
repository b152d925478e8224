mod config;
mod scenarios;
mod send;
mod tools;

use clap::Parser;
use config::{Cli, Commands};
use userop_core::logger::init_logger;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_logger(&cli.global.log_level, cli.global.log_format);

    match cli.command {
        Commands::Send(args) => send::run(&cli.global, args).await,
        Commands::Delegate(args) => send::run_delegated(&cli.global, args).await,
        Commands::Selectors(args) => tools::selectors(&args),
        Commands::Authorize(args) => tools::authorize(&cli.global, &args).await,
        Commands::Hash(args) => tools::hash(&cli.global, &args),
        Commands::Scenarios(args) => scenarios::run(&cli.global, args).await,
    }
}
