//! Show the effective configuration

use anyhow::Result;
use cli_lib::{resolve, Overrides};
use mapwatch_core::{DeferPolicy, OutputMode, WatchConfig};
use owo_colors::OwoColorize;
use std::path::Path;

pub fn run(config_path: Option<&Path>, overrides: &Overrides, example: bool) -> Result<()> {
    if example {
        print!("{}", WatchConfig::example());
        return Ok(());
    }

    let config = resolve(config_path, overrides)?;

    println!("{}", "Effective Configuration".bold());
    match config_path {
        Some(path) => println!("{}: {}\n", "Location".dimmed(), path.display().dimmed()),
        None => println!("{}\n", "Defaults, mapwatch.toml and flags".dimmed()),
    }

    println!("{}", "[paths]".yellow());
    println!("  {} = {}", "source_dir".cyan(), config.source_dir.display());
    println!("  {} = {}", "dest_dir".cyan(), config.dest_dir.display());
    println!(
        "  {} = {} {}",
        "extension".cyan(),
        config.extension,
        format!("(*.{})", config.normalized_extension()).dimmed()
    );
    println!("  {} = {}", "recursive".cyan(), config.recursive);

    println!("\n{}", "[render]".yellow());
    let mode = match config.output_mode() {
        OutputMode::Merged => "(one merged image per map)",
        OutputMode::SeparateGroups => "(one image per top-level group)",
    };
    println!(
        "  {} = {} {}",
        "separate_groups".cyan(),
        config.separate_groups,
        mode.dimmed()
    );

    println!("\n{}", "[queue]".yellow());
    println!("  {} = {}", "queue_capacity".cyan(), config.queue_capacity);
    let policy = match config.defer_policy() {
        DeferPolicy::Immediate => "(re-enqueue immediately)".to_string(),
        DeferPolicy::Backoff(delay) => format!("(re-enqueue after {:?})", delay),
    };
    println!(
        "  {} = {} {}",
        "retry_backoff_ms".cyan(),
        config.retry_backoff_ms,
        policy.dimmed()
    );

    println!("\n{}", "[ignore]".yellow());
    println!("  {} = {}", "use_ignore_file".cyan(), config.use_ignore_file);
    if config.ignore_patterns.is_empty() {
        println!("  {} = {}", "ignore_patterns".cyan(), "[]".dimmed());
    } else {
        println!("  {} =", "ignore_patterns".cyan());
        for pattern in &config.ignore_patterns {
            println!("    {}", pattern);
        }
    }

    Ok(())
}
