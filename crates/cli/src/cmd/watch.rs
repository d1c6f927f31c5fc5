//! Render everything, then follow changes until Ctrl-C

use anyhow::{Context, Result};
use cli_lib::{resolve, Overrides, Pipeline};
use owo_colors::OwoColorize;
use render::TiledRenderer;
use std::path::Path;
use tracing::info;

pub async fn run(config_path: Option<&Path>, overrides: &Overrides) -> Result<()> {
    let config = resolve(config_path, overrides)?;

    println!(
        "{} {} {} {}",
        "Watching".green().bold(),
        config.source_dir.display(),
        "->".dimmed(),
        config.dest_dir.display()
    );

    // The scan blocks on a full queue, keep it off the async workers
    let pipeline = tokio::task::spawn_blocking(move || -> Result<_> {
        let renderer = TiledRenderer::new(&config.dest_dir, config.output_mode());
        let mut pipeline = Pipeline::start(config, renderer)?;
        pipeline.scan()?;
        pipeline.watch()?;
        Ok(pipeline)
    })
    .await
    .context("Startup task failed")??;

    println!("{}", "Press Ctrl-C to stop".dimmed());
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    info!("Interrupted, finishing queued work");

    let stats = tokio::task::spawn_blocking(move || pipeline.shutdown())
        .await
        .context("Shutdown task failed")??;

    println!(
        "{} {} generated, {} failed, {} already up to date",
        "Stopped:".yellow(),
        stats.generated,
        stats.failed,
        stats.stale
    );
    Ok(())
}
