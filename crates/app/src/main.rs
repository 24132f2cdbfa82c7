//! Entry point for glance3d.

mod cli;

use anyhow::Result;
use clap::Parser;
use platform::RunOptions;

use crate::cli::Cli;

fn main() -> Result<()> {
    let cli = Cli::parse();

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(cli.log_filter().as_str()),
    )
    .init();

    let config = cli.scene_config();
    let (width, height) = cli.size;
    log::info!(
        "Starting glance3d. Backend: {:?}, window_size={}x{}, model={:?}, env_map={:?}",
        cli.gpu_backend,
        width,
        height,
        config.model_path,
        config.env_map
    );

    platform::run(
        config,
        RunOptions {
            width,
            height,
            backends: cli.gpu_backend,
            ..RunOptions::default()
        },
    )?;

    log::info!("Graceful shutdown. Bye!");
    Ok(())
}
