use anyhow::Result;
use bbb_recording::{
    app,
    cli::{handle_combine_command, handle_fetch_command, handle_status_command, Cli, CliCommand},
};
use clap::Parser;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let log_level = if cli.verbose { "debug" } else { "info" };
    let env_filter = EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    match cli.command {
        Some(CliCommand::Version) => {
            println!("bbb-recording {}", env!("CARGO_PKG_VERSION"));
            return Ok(());
        }
        Some(CliCommand::Fetch(args)) => {
            handle_fetch_command(args).await?;
            return Ok(());
        }
        Some(CliCommand::Combine(args)) => {
            handle_combine_command(args).await?;
            return Ok(());
        }
        Some(CliCommand::Status(args)) => {
            handle_status_command(args)?;
            return Ok(());
        }
        Some(CliCommand::Serve) | None => {}
    }

    app::run_service().await
}
