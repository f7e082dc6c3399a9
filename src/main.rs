//! prognos - offline tooling entry point

use clap::Parser;
use prognos::cli::{cmd_migrate, cmd_models, cmd_predict, cmd_train, Cli, Commands};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "prognos=info".into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Train { data, model_dir } => cmd_train(&data, &model_dir),
        Commands::Migrate { model_dir } => cmd_migrate(&model_dir),
        Commands::Models { model_dir } => cmd_models(&model_dir),
        Commands::Predict {
            model_dir,
            key,
            feature,
        } => cmd_predict(&model_dir, &key, &feature),
    }
}
