//! One-shot render of every map in the source directory

use anyhow::{bail, Context, Result};
use cli_lib::{resolve, Overrides, Pipeline};
use indicatif::{ProgressBar, ProgressStyle};
use owo_colors::OwoColorize;
use render::TiledRenderer;
use std::path::Path;
use std::time::Duration;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

pub async fn run(config_path: Option<&Path>, overrides: &Overrides) -> Result<()> {
    let config = resolve(config_path, overrides)?;
    let dest_dir = config.dest_dir.clone();

    let (pipeline, summary) = tokio::task::spawn_blocking(move || -> Result<_> {
        let renderer = TiledRenderer::new(&config.dest_dir, config.output_mode());
        let pipeline = Pipeline::start(config, renderer)?;
        let summary = pipeline.scan()?;
        Ok((pipeline, summary))
    })
    .await
    .context("Scan task failed")??;

    let total = summary.enqueued as u64;
    let bar = ProgressBar::new(total);
    bar.set_style(
        ProgressStyle::with_template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} maps")?
            .progress_chars("=> "),
    );

    // Every scanned record ends generated, failed or stale exactly once
    loop {
        let handled = pipeline.stats().handled();
        bar.set_position(handled.min(total));
        if handled >= total || !pipeline.is_running() {
            break;
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
    bar.finish_and_clear();

    let stats = tokio::task::spawn_blocking(move || pipeline.shutdown())
        .await
        .context("Shutdown task failed")??;

    println!(
        "{} {} of {} maps into {}",
        "Rendered".green().bold(),
        stats.generated,
        total,
        dest_dir.display()
    );

    if stats.failed > 0 {
        if let Some(last) = &stats.last_failure {
            println!("  {} {}", "last failure:".red(), last);
        }
        bail!("{} of {} maps failed to render", stats.failed, total);
    }
    Ok(())
}
