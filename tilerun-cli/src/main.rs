mod commands;
mod config;

use clap::{Parser, Subcommand};
use config::CliConfig;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "tilerun")]
#[command(about = "Tilerun - provably fair grid runs")]
#[command(version)]
struct Cli {
    /// Data directory for the game database and config
    #[arg(short, long, global = true)]
    data_dir: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Play a full game against the local operator
    Play {
        /// Player identity
        #[arg(short, long)]
        player: Option<String>,
        /// Grid width (5, 6 or 7)
        #[arg(short, long)]
        width: Option<usize>,
        /// Bet amount
        #[arg(short, long)]
        bet: Option<u64>,
        /// Comma-separated tiles to reveal; moves greedily forward if omitted
        #[arg(long)]
        path: Option<String>,
    },
    /// Continue an active game with more reveals
    Move {
        /// Game ID
        game_id: u64,
        /// Comma-separated tiles to reveal
        path: String,
        /// Player identity
        #[arg(short, long)]
        player: Option<String>,
    },
    /// Refund games whose randomness never arrived
    Refund,
    /// Show a game as the player sees it
    Show {
        /// Game ID
        game_id: u64,
    },
    /// List stored games
    List {
        /// Only games of this player
        #[arg(short, long)]
        player: Option<String>,
    },
    /// Re-derive a completed game and check its claimed outcome
    Verify {
        /// Game ID
        game_id: u64,
    },
    /// Write the outcome submission of a completed game as JSON
    Export {
        /// Game ID
        game_id: u64,
        /// Output file (stdout if omitted)
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// Verify an exported outcome submission
    VerifyFile {
        /// Path to the JSON submission
        path: PathBuf,
    },
    /// Derive and print a map from raw inputs
    Map {
        /// VRF output (hex)
        #[arg(long)]
        vrf: String,
        /// Operator salt (hex)
        #[arg(long)]
        salt: String,
        /// Game ID
        #[arg(long)]
        game_id: u64,
        /// Grid width (5, 6 or 7)
        #[arg(short, long, default_value_t = 5)]
        width: usize,
        /// Bet amount used to size rewards
        #[arg(short, long, default_value_t = 1000)]
        bet: u64,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(format!(
            "tilerun_cli={},tilerun_core={},tilerun_fair={}",
            log_level, log_level, log_level
        )))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Get data directory
    let data_dir = cli.data_dir.unwrap_or_else(|| {
        dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("tilerun")
    });

    // Ensure data directory exists
    tokio::fs::create_dir_all(&data_dir).await?;

    let config = CliConfig::load(&data_dir)?;

    let result = match cli.command {
        Commands::Play {
            player,
            width,
            bet,
            path,
        } => {
            let player = player.unwrap_or_else(|| config.player.clone());
            let width = width.unwrap_or(config.default_width);
            let bet = bet.unwrap_or(config.default_bet);
            commands::play(&data_dir, &config, &player, width, bet, path.as_deref()).await
        }
        Commands::Move {
            game_id,
            path,
            player,
        } => {
            let player = player.unwrap_or_else(|| config.player.clone());
            commands::move_token(&data_dir, &config, game_id, &player, &path).await
        }
        Commands::Refund => commands::refund_stale(&data_dir, &config).await,
        Commands::Show { game_id } => commands::show_game(&data_dir, &config, game_id).await,
        Commands::List { player } => {
            commands::list_games(&data_dir, &config, player.as_deref()).await
        }
        Commands::Verify { game_id } => commands::verify_game(&data_dir, &config, game_id).await,
        Commands::Export { game_id, out } => {
            commands::export_game(&data_dir, &config, game_id, out.as_deref()).await
        }
        Commands::VerifyFile { path } => commands::verify_file(&config, &path),
        Commands::Map {
            vrf,
            salt,
            game_id,
            width,
            bet,
        } => commands::show_map(&config, &vrf, &salt, game_id, width, bet),
    };

    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        for hint in commands::error_hints(&e) {
            eprintln!("{}", hint);
        }
        std::process::exit(1);
    }

    Ok(())
}
