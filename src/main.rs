use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use epgrab::config::Config;
use epgrab::plugin::PluginRegistry;
use epgrab::update::{merge_rosters, run_cycle, UpdateContext};
use epgrab::xmltv;

#[derive(Parser)]
#[command(
    name = "epgrab",
    version,
    about = "Multi-source TV program guide grabber with XMLTV output",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log format (text, json)
    #[arg(long, global = true, default_value = "text")]
    log_format: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one full update cycle and rewrite the XMLTV document
    Grab {
        /// Configuration file path
        #[arg(short, long, default_value = "config.toml")]
        config: PathBuf,

        /// Override the output path from the config
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Ignore the existing document and re-fetch everything
        #[arg(long, default_value = "false")]
        fresh: bool,
    },

    /// Validate the configuration and list the roster
    Check {
        /// Configuration file path
        #[arg(short, long, default_value = "config.toml")]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_tracing(&cli.log_format, cli.verbose)?;

    match cli.command {
        Commands::Grab {
            config,
            output,
            fresh,
        } => grab(config, output, fresh).await?,
        Commands::Check { config } => check(config)?,
    }

    Ok(())
}

fn setup_tracing(format: &str, verbose: bool) -> Result<()> {
    let env_filter = if verbose {
        tracing_subscriber::EnvFilter::new("epgrab=debug,info")
    } else {
        tracing_subscriber::EnvFilter::new("epgrab=info,warn")
    };

    match format {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer())
                .init();
        }
    }

    Ok(())
}

async fn grab(config_path: PathBuf, output: Option<PathBuf>, fresh: bool) -> Result<()> {
    let config = Config::from_file(&config_path)?;
    config.validate().context("Invalid configuration")?;

    let output = output.unwrap_or_else(|| config.grabber.output.clone());
    let offset = config.offset();
    let now = chrono::Utc::now().with_timezone(&offset);

    let mut roster = config.roster();
    tracing::info!(channels = roster.len(), output = %output.display(), "starting grab");

    if !fresh {
        match xmltv::read(&output, offset) {
            Ok(saved) if !saved.is_empty() => {
                let (reused, dates) = merge_rosters(&mut roster, &saved, now);
                tracing::info!(
                    reused = reused,
                    dates = dates.len(),
                    "recovered previous document"
                );
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(error = %e, "could not read previous document, starting clean");
            }
        }
    }

    let ctx = UpdateContext::new(config.build_scrapers()?, PluginRegistry::new());
    let (roster, refreshed) =
        run_cycle(roster, &ctx, now, config.grabber.max_concurrent_channels).await;

    let total_programs: usize = roster.iter().map(|c| c.programs.len()).sum();
    xmltv::write(&output, &roster, &config.grabber.generator_name)
        .with_context(|| format!("Failed to write {}", output.display()))?;

    tracing::info!(
        refreshed = refreshed,
        channels = roster.len(),
        programs = total_programs,
        "grab complete"
    );
    Ok(())
}

fn check(config_path: PathBuf) -> Result<()> {
    let config = Config::from_file(&config_path)?;
    config.validate().context("Invalid configuration")?;

    let registry = config.build_scrapers()?;
    println!("config ok: {} channels, {} scrapers", config.channels.len(), registry.len());
    for channel in config.roster() {
        let scrapers: Vec<&str> = channel
            .meta
            .scrapers
            .iter()
            .map(|b| b.name.as_str())
            .collect();
        let missing: Vec<&str> = scrapers
            .iter()
            .copied()
            .filter(|name| !registry.contains(name))
            .collect();
        println!(
            "  {} ({}) refresh={} recap={} preview={} scrapers={}",
            channel.id,
            channel.meta.names.join(", "),
            channel
                .meta
                .refresh
                .map(|p| format!("{p:?}").to_lowercase())
                .unwrap_or_else(|| "static".into()),
            channel.meta.recap.unwrap_or(0),
            channel.meta.preview.unwrap_or(0),
            scrapers.join(","),
        );
        if !missing.is_empty() {
            println!("    warning: unregistered scrapers: {}", missing.join(", "));
        }
    }
    Ok(())
}
