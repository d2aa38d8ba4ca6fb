use std::sync::Arc;

use anyhow::Result;
use exprun::{
    cli::{Cli, Commands},
    config::Config,
    handlers,
    llm::{LlmClient, Oracle},
};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    // Load config
    let cfg = Config::load();
    init_logging(&cfg, args.verbose);

    // One oracle handle for the whole process; model: CLI overrides config
    let mut client = LlmClient::from_config(&cfg)?;
    if let Some(model) = args.model.clone() {
        client = client.with_model(model);
    }
    let oracle: Arc<dyn Oracle> = Arc::new(client);

    match args.command {
        Commands::Run(run_args) => handlers::run::run(run_args, &cfg, oracle).await,
        Commands::Plot(plot_args) => handlers::plot::run(plot_args, &cfg, oracle).await,
    }
}

fn init_logging(cfg: &Config, verbose: u8) {
    let filter = match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(cfg.get("LOG_LEVEL").unwrap_or_else(|| "warn".into()))
        }),
        1 => EnvFilter::new("info"),
        _ => EnvFilter::new("debug"),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
