//! `matchcast` CLI - Browse live events and play their streams

mod cmd;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use matchcast::{Config, StreamHub};

#[derive(Parser)]
#[command(name = "matchcast")]
#[command(about = "Live event aggregator with proxy fallback and HLS playback")]
#[command(version)]
struct Cli {
    /// Config file (default: ~/.config/matchcast/config.toml)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Refresh sources once and list events
    Events {
        /// Print the snapshot as JSON
        #[arg(long)]
        json: bool,

        /// Only show live events
        #[arg(long)]
        live: bool,
    },

    /// Keep refreshing and print the event list on every change
    Watch {
        /// Only show live events
        #[arg(long)]
        live: bool,
    },

    /// Print the playable URL for an event's stream
    Stream {
        /// Event id as shown by `events`
        event_id: String,

        /// Stream variant (primary, ad-free)
        #[arg(long)]
        variant: Option<String>,
    },

    /// Play an event or a stream URL in an external player
    Play {
        /// Event id or an http(s) stream URL
        target: String,

        /// Stream variant (primary, ad-free)
        #[arg(long)]
        variant: Option<String>,

        /// Player binary (default: first of mpv, vlc, ffplay, mplayer)
        #[arg(long)]
        player: Option<String>,
    },

    /// Check which proxy backends are reachable
    Proxies,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();

    let mut config =
        Config::load(cli.config.as_deref()).context("failed to load configuration")?;
    if let Commands::Play {
        player: Some(player),
        ..
    } = &cli.command
    {
        config.playback.player = Some(player.clone());
    }

    let hub = StreamHub::from_config(&config).context("failed to initialize")?;

    match cli.command {
        Commands::Events { json, live } => cmd::events::cmd_events(&hub, json, live).await?,
        Commands::Watch { live } => cmd::events::cmd_watch(hub, live).await?,
        Commands::Stream { event_id, variant } => {
            cmd::play::cmd_stream(&hub, &event_id, variant.as_deref()).await?;
        }
        Commands::Play {
            target, variant, ..
        } => cmd::play::cmd_play(&hub, &target, variant.as_deref()).await?,
        Commands::Proxies => cmd::proxies::cmd_proxies(&hub).await,
    }

    Ok(())
}
