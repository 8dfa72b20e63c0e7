//! seroscreen - Main Entry Point

use clap::Parser;
use seroscreen::cli::{cmd_evaluate, cmd_info, cmd_predict, cmd_serve, cmd_train, Cli, Commands};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "seroscreen=info".into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Train { data, config, model, seed, trees, db, report } => {
            cmd_train(
                &data,
                config.as_deref(),
                model.as_deref(),
                seed,
                trees,
                db.as_deref(),
                report.as_deref(),
            )?;
        }
        Commands::Evaluate { data, model, report } => {
            cmd_evaluate(&data, &model, report.as_deref())?;
        }
        Commands::Predict { model, data, output } => {
            cmd_predict(&model, &data, output.as_deref())?;
        }
        Commands::Info { model, data } => {
            cmd_info(model.as_deref(), data.as_deref())?;
        }
        Commands::Serve { port, host, model, data_dir } => {
            cmd_serve(&host, port, model.as_deref(), data_dir.as_deref()).await?;
        }
    }

    Ok(())
}
