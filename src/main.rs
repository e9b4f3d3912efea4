//! Storycap CLI entry point

use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use storycap::cli::{
    app::{
        load_merged_config, run_clips, run_delete, run_pair, run_record, run_upload, EXIT_ERROR,
    },
    args::{Cli, Commands},
    config_cmd::handle_config_command,
    presenter::Presenter,
};
use storycap::infrastructure::XdgConfigStore;

#[tokio::main(flavor = "multi_thread", worker_threads = 2)]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut presenter = Presenter::new();

    let result = match cli.command {
        Commands::Config { action } => {
            let store = XdgConfigStore::new();
            handle_config_command(action, &store, &presenter)
                .await
                .map_err(|e| e.to_string())
        }
        Commands::Pair { action } => run_pair(action, &presenter).await,
        Commands::Record { title, device } => {
            let config = load_merged_config().await;
            run_record(&title, device.as_deref(), &config, &mut presenter).await
        }
        Commands::Clips => {
            let config = load_merged_config().await;
            run_clips(&config, &presenter).await
        }
        Commands::Upload { clip_id, endpoint } => {
            let config = load_merged_config().await;
            run_upload(&clip_id, endpoint.as_deref(), &config, &presenter).await
        }
        Commands::Delete { clip_id } => {
            let config = load_merged_config().await;
            run_delete(&clip_id, &config, &presenter).await
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            presenter.error(&message);
            ExitCode::from(EXIT_ERROR)
        }
    }
}
