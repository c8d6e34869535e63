//! exoserve - Main Entry Point

use clap::Parser;
use exoserve::cli::{cmd_describe, cmd_inspect, cmd_predict, cmd_serve, Cli, Commands, RegistryArgs};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "exoserve=info,tower_http=info".into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Serve { port, host, uploads_dir, registry }) => {
            cmd_serve(host, port, uploads_dir, &registry).await?;
        }
        Some(Commands::Predict { dataset, model, features, set, registry }) => {
            cmd_predict(&dataset, &model, features.as_deref(), &set, &registry)?;
        }
        Some(Commands::Describe { csv, target, feature_columns }) => {
            cmd_describe(&csv, &target, feature_columns.as_deref())?;
        }
        Some(Commands::Inspect { dataset, model, registry }) => {
            cmd_inspect(&dataset, &model, &registry)?;
        }
        None => {
            cmd_serve(None, None, None, &RegistryArgs::default()).await?;
        }
    }

    Ok(())
}
