use std::process::ExitCode;

use fern::colors::{Color, ColoredLevelConfig};
use log::{error, info};
use relayer_core::config::Config;
use relayer_core::orchestrator::Orchestrator;

fn setup_logging(data_dir: &str) -> Result<(), fern::InitError> {
    let colors = ColoredLevelConfig::new()
        .info(Color::Green)
        .warn(Color::Yellow)
        .error(Color::Red)
        .debug(Color::Blue)
        .trace(Color::Magenta);

    fern::Dispatch::new()
        .format(move |out, message, record| {
            out.finish(format_args!(
                "[{} {} {}] {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
                colors.color(record.level()),
                record.target(),
                message
            ))
        })
        .level(log::LevelFilter::Info)
        .chain(std::io::stdout())
        .chain(fern::DateBased::new(format!("{data_dir}/relayer."), "%Y-%m-%d.log"))
        .apply()?;
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let config = match Config::load() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("relayer: configuration error: {err}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(err) = std::fs::create_dir_all(&config.data_dir) {
        eprintln!("relayer: failed to create data dir {}: {err}", config.data_dir);
        return ExitCode::FAILURE;
    }

    if let Err(err) = setup_logging(&config.data_dir) {
        eprintln!("relayer: failed to initialize logging: {err}");
        return ExitCode::FAILURE;
    }

    info!("relayer: starting up, rpc_url={}", config.rpc_url);

    let mut orchestrator = match Orchestrator::build(&config).await {
        Ok(orchestrator) => orchestrator,
        Err(err) => {
            error!("relayer: failed to build orchestrator: {err}");
            return ExitCode::FAILURE;
        }
    };

    orchestrator.start();
    info!("relayer: indexer and syncer loops running, awaiting shutdown signal");

    if let Err(err) = tokio::signal::ctrl_c().await {
        error!("relayer: failed to listen for ctrl-c: {err}");
    }

    info!("relayer: shutdown signal received, stopping loops");
    orchestrator.stop().await;
    info!("relayer: shutdown complete");

    ExitCode::SUCCESS
}
