use anyhow::{Context, Result};
use clap::Parser;

use repoctx::cli::CliApp;
use repoctx::cli_types::{Cli, Commands};
use repoctx::config::AppConfig;
use repoctx::logging::{self, LoggingOptions};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let _logging = logging::init(&LoggingOptions {
        verbose: cli.verbose,
        json: cli.json_logs,
        log_dir: cli.log_dir.clone(),
    });

    if let Err(e) = run(cli).await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = AppConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    if let Some(format) = cli.format {
        config.output.format = format.into();
    }

    let colors = !cli.no_color && config.output.colors;
    let app = CliApp::new(config, cli.verbose, colors);

    match cli.command {
        Commands::Structure(args) => app.structure(args).await,
        Commands::Pack(args) => app.pack(args).await,
        Commands::Search(args) => app.search(args).await,
        Commands::Config => app.show_config(),
    }
}
