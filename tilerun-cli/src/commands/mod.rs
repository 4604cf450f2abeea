use crate::config::CliConfig;
use anyhow::{anyhow, bail, Context, Result};
use chrono::Utc;
use comfy_table::{presets::UTF8_FULL, Table};
use std::path::Path;
use std::sync::Arc;
use tilerun_core::{
    GameId, GameService, GameView, LedgerSnapshot, LocalRandomness, PlayerId, SettlementStatus,
    Storage, TilerunError, VerifyingLedger,
};
use tilerun_fair::{
    ClaimedTile, FinalSeed, GameMap, GameParameters, Grid, OperatorSalt, OutcomeSubmission,
    TileIndex, Verifier, VrfOutput,
};

const DB_FILE: &str = "games.db";
const LEDGER_FILE: &str = "ledger.json";

async fn open_service(
    data_dir: &Path,
    config: &CliConfig,
) -> Result<(GameService, Arc<LocalRandomness>, Arc<VerifyingLedger>)> {
    let storage = Arc::new(Storage::new(&data_dir.join(DB_FILE)).await?);
    let randomness = Arc::new(LocalRandomness::new());
    let ledger = Arc::new(load_ledger(data_dir, config)?);
    let service = GameService::new(
        config.operator.clone(),
        storage,
        randomness.clone(),
        ledger.clone(),
    )
    .await?;
    Ok((service, randomness, ledger))
}

/// The local settlement ledger, kept next to the game database between runs.
fn load_ledger(data_dir: &Path, config: &CliConfig) -> Result<VerifyingLedger> {
    let max_nonce_attempts = config.operator.max_nonce_attempts;
    let path = data_dir.join(LEDGER_FILE);
    if !path.exists() {
        return Ok(VerifyingLedger::new(max_nonce_attempts));
    }

    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let snapshot: LedgerSnapshot = serde_json::from_str(&content)
        .with_context(|| format!("Invalid ledger in {}", path.display()))?;
    Ok(VerifyingLedger::from_snapshot(max_nonce_attempts, snapshot))
}

fn save_ledger(data_dir: &Path, ledger: &VerifyingLedger) -> Result<()> {
    let path = data_dir.join(LEDGER_FILE);
    let json = serde_json::to_string_pretty(&ledger.snapshot())?;
    std::fs::write(&path, json).with_context(|| format!("Failed to write {}", path.display()))
}

fn parse_path(path: &str) -> Result<Vec<TileIndex>> {
    path.split(',')
        .map(str::trim)
        .filter(|tile| !tile.is_empty())
        .map(|tile| {
            tile.parse::<TileIndex>()
                .with_context(|| format!("Invalid tile index '{}'", tile))
        })
        .collect()
}

/// Without knowledge of the map, head straight for the top row.
fn next_greedy_move(view: &GameView) -> Option<TileIndex> {
    let grid = view.params.grid();
    view.legal_moves
        .iter()
        .copied()
        .max_by_key(|&tile| (grid.progress(tile), std::cmp::Reverse(tile)))
}

pub async fn play(
    data_dir: &Path,
    config: &CliConfig,
    player: &str,
    width: usize,
    bet: u64,
    path: Option<&str>,
) -> Result<()> {
    let (service, randomness, ledger) = open_service(data_dir, config).await?;
    let player = PlayerId::new(player);
    let mut planned = path.map(parse_path).transpose()?.unwrap_or_default().into_iter();

    let commitment = service.commit_salt(&player)?;
    println!("Salt commitment: {}", commitment);

    let game_id = service.place_bet(&player, width, bet).await?;
    println!("Game {} opened: {}x{} grid, bet {}", game_id, width, width, bet);

    for fulfilment in randomness.take_fulfilments() {
        service
            .fulfill_randomness(fulfilment.request_id, fulfilment.output)
            .await?;
    }
    save_ledger(data_dir, &ledger)?;

    loop {
        let view = service.player_view(game_id).await?;
        if view.phase.is_terminal() {
            break;
        }

        let tile = match planned.next() {
            Some(tile) => tile,
            None if path.is_some() => {
                println!("Path ended before the game did; game {} is still active", game_id);
                println!("Continue with: tilerun move {} <tiles>", game_id);
                return Ok(());
            }
            None => next_greedy_move(&view)
                .ok_or_else(|| anyhow!("No legal move in active game {}", game_id))?,
        };

        let result = service.reveal_tile(game_id, &player, tile).await?;
        println!(
            "  reveal {:>2} -> {:<14} collected {}",
            tile,
            describe_claim(&result.claim),
            result.collected_reward
        );
        if result.stranded {
            println!("  no legal moves left");
        }
    }

    let view = service.player_view(game_id).await?;
    println!();
    print!("{}", render_view(&view));
    println!();
    println!("Outcome: {:?}", view.outcome);
    println!("Collected: {}", view.collected_reward);
    println!("Payout: {}", view.payout);

    let receipt = service.settle(game_id).await?;
    save_ledger(data_dir, &ledger)?;
    match receipt.status {
        SettlementStatus::Accepted { payout } => {
            println!("Settlement verified the game independently, paid {}", payout)
        }
        SettlementStatus::Rejected { reason } => println!("Settlement rejected: {}", reason),
    }

    println!();
    println!("Check it yourself:");
    println!("tilerun verify {}", game_id);

    Ok(())
}

pub async fn move_token(
    data_dir: &Path,
    config: &CliConfig,
    game_id: u64,
    player: &str,
    path: &str,
) -> Result<()> {
    let (service, _, ledger) = open_service(data_dir, config).await?;
    let player = PlayerId::new(player);
    let game_id = GameId(game_id);

    for tile in parse_path(path)? {
        let result = service.reveal_tile(game_id, &player, tile).await?;
        println!(
            "  reveal {:>2} -> {:<14} collected {}",
            tile,
            describe_claim(&result.claim),
            result.collected_reward
        );
        if result.terminal {
            break;
        }
    }

    let view = service.player_view(game_id).await?;
    println!();
    print!("{}", render_view(&view));

    if view.phase.is_terminal() {
        println!();
        println!("Outcome: {:?}, payout {}", view.outcome, view.payout);
        let receipt = service.settle(game_id).await?;
        save_ledger(data_dir, &ledger)?;
        println!("Settlement: {:?}", receipt.status);
    } else {
        println!("Legal moves: {:?}", view.legal_moves);
    }

    Ok(())
}

pub async fn refund_stale(data_dir: &Path, config: &CliConfig) -> Result<()> {
    let (service, _, _) = open_service(data_dir, config).await?;
    let refunded = service.refund_stale(Utc::now()).await?;

    if refunded.is_empty() {
        println!("No overdue games.");
    } else {
        for game_id in refunded {
            println!("Refunded game {}", game_id);
        }
    }

    Ok(())
}

pub async fn show_game(data_dir: &Path, config: &CliConfig, game_id: u64) -> Result<()> {
    let (service, _, _) = open_service(data_dir, config).await?;
    let view = service.player_view(GameId(game_id)).await?;

    println!("Game {}", view.game_id);
    println!("  Player: {}", view.player);
    println!("  Phase: {}", view.phase.as_str());
    println!(
        "  Grid: {}x{}, bet {}",
        view.params.grid_width, view.params.grid_width, view.params.bet_amount
    );
    println!("  Commitment: {}", view.commitment);
    println!("  Outcome: {:?}", view.outcome);
    println!("  Collected: {}", view.collected_reward);
    println!("  Payout: {}", view.payout);
    if let Some(salt) = &view.revealed_salt {
        println!("  Salt: {}", salt.to_hex());
    }
    if let Some(vrf) = &view.vrf_output {
        println!("  VRF output: {}", vrf.to_hex());
    }
    if let Some(nonce) = view.map_nonce {
        println!("  Map nonce: {}", nonce);
    }
    if let Some(receipt) = &view.settlement {
        println!("  Settlement: {:?}", receipt.status);
    }
    println!();
    print!("{}", render_view(&view));

    Ok(())
}

pub async fn list_games(data_dir: &Path, config: &CliConfig, player: Option<&str>) -> Result<()> {
    let (service, _, _) = open_service(data_dir, config).await?;
    let player = player.map(PlayerId::new);
    let games = service.list_games(player.as_ref()).await?;

    if games.is_empty() {
        println!("No games found.");
        println!("Start one with: tilerun play");
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec![
        "Game", "Player", "Grid", "Bet", "Phase", "Outcome", "Payout", "Created",
    ]);

    for game in games {
        table.add_row(vec![
            game.game_id.to_string(),
            game.player.to_string(),
            format!("{}x{}", game.params.grid_width, game.params.grid_width),
            game.params.bet_amount.to_string(),
            game.phase.as_str().to_string(),
            format!("{:?}", game.outcome),
            game.payout.to_string(),
            game.created_at.format("%Y-%m-%d %H:%M:%S").to_string(),
        ]);
    }

    println!("{}", table);
    Ok(())
}

pub async fn verify_game(data_dir: &Path, config: &CliConfig, game_id: u64) -> Result<()> {
    let (service, _, _) = open_service(data_dir, config).await?;
    let submission = service.submission(GameId(game_id)).await?;
    report_verification(config, &submission)
}

pub async fn export_game(
    data_dir: &Path,
    config: &CliConfig,
    game_id: u64,
    out: Option<&Path>,
) -> Result<()> {
    let (service, _, _) = open_service(data_dir, config).await?;
    let submission = service.submission(GameId(game_id)).await?;
    let json = serde_json::to_string_pretty(&submission)?;

    match out {
        Some(path) => {
            std::fs::write(path, json)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            println!("Exported game {} to {}", game_id, path.display());
        }
        None => println!("{}", json),
    }

    Ok(())
}

pub fn verify_file(config: &CliConfig, path: &Path) -> Result<()> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let submission: OutcomeSubmission =
        serde_json::from_str(&content).context("Not an outcome submission")?;
    report_verification(config, &submission)
}

fn report_verification(config: &CliConfig, submission: &OutcomeSubmission) -> Result<()> {
    let verifier = Verifier::new(config.operator.max_nonce_attempts);
    match verifier.verify(submission) {
        Ok(verified) => {
            println!("Game {} verified", verified.game_id);
            println!("  Outcome: {:?}", verified.outcome);
            println!("  Collected: {}", verified.collected_reward);
            println!("  Payout: {}", verified.payout);
            println!("  Map nonce: {}", verified.map.map_nonce);
            println!();
            print!("{}", verified.map.render());
            Ok(())
        }
        Err(e) => {
            tracing::error!("Verification of game {} failed: {}", submission.game_id, e);
            bail!("game {} is void: {}", submission.game_id, e)
        }
    }
}

pub fn show_map(
    config: &CliConfig,
    vrf: &str,
    salt: &str,
    game_id: u64,
    width: usize,
    bet: u64,
) -> Result<()> {
    let vrf = VrfOutput::from_hex(vrf).context("VRF output must be 32 bytes of hex")?;
    let salt = OperatorSalt::from_hex(salt).context("Salt must be 32 bytes of hex")?;
    let params = GameParameters::standard(width, bet, config.operator.house_fee_bps)?;

    let seed = FinalSeed::derive(vrf.as_bytes(), salt.as_bytes(), game_id);
    let map = GameMap::generate(&seed, game_id, &params, config.operator.max_nonce_attempts)?;

    println!("Final seed: {}", hex::encode(seed.as_bytes()));
    println!("Salt commitment: {}", salt.commit());
    println!("Start: {}  Finish: {}  Nonce: {}", map.start, map.finish, map.map_nonce);
    println!();
    print!("{}", map.render());
    println!();

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["Tile", "Tier", "Amount"]);
    for (tile, reward) in &map.rewards {
        table.add_row(vec![
            tile.to_string(),
            reward.tier.label().to_string(),
            reward.amount.to_string(),
        ]);
    }
    println!("{}", table);
    println!("Total rewards on map: {}", map.total_reward());

    Ok(())
}

/// Follow-up suggestions for errors the player can act on.
pub fn error_hints(error: &anyhow::Error) -> Vec<String> {
    match error.downcast_ref::<TilerunError>() {
        Some(TilerunError::CommitmentPending(player)) => vec![format!(
            "Player {} already holds an unused salt commitment; bet with it or wait for it to expire",
            player
        )],
        Some(TilerunError::CommitmentMissing(_)) => {
            vec!["Start a game with 'tilerun play', which commits a salt before the bet".to_string()]
        }
        Some(TilerunError::ActiveGameExists { game_id, .. }) => vec![
            format!("Continue it with: tilerun move {} <tiles>", game_id),
            "If its randomness never arrived: tilerun refund".to_string(),
        ],
        Some(TilerunError::GameNotFound(_)) => {
            vec!["Use 'tilerun list' to see stored games".to_string()]
        }
        Some(TilerunError::NotGameOwner { game_id, .. }) => vec![format!(
            "Pass the owner with --player; 'tilerun show {}' names them",
            game_id
        )],
        Some(TilerunError::SettlementRejected { game_id, .. }) => {
            vec![format!("Check the outcome with: tilerun verify {}", game_id)]
        }
        _ => Vec::new(),
    }
}

fn describe_claim(claim: &ClaimedTile) -> String {
    match claim {
        ClaimedTile::Start => "start".to_string(),
        ClaimedTile::Safe => "safe".to_string(),
        ClaimedTile::Reward { amount } => format!("reward +{}", amount),
        ClaimedTile::Trap => "TRAP".to_string(),
        ClaimedTile::Finish => "FINISH".to_string(),
    }
}

/// Revealed tiles only; everything else stays hidden.
fn render_view(view: &GameView) -> String {
    let grid: Grid = view.params.grid();
    let width = grid.width();
    let mut out = String::new();
    for row in 0..width {
        for col in 0..width {
            let tile = grid.tile(row, col);
            let symbol = match view.revealed.iter().find(|claim| claim.tile == tile) {
                _ if view.token == Some(tile) && !view.phase.is_terminal() => '@',
                Some(claim) => match claim.claim {
                    ClaimedTile::Start => 'S',
                    ClaimedTile::Safe => '.',
                    ClaimedTile::Reward { .. } => '$',
                    ClaimedTile::Trap => 'X',
                    ClaimedTile::Finish => 'F',
                },
                None => '?',
            };
            out.push(symbol);
            if col + 1 < width {
                out.push(' ');
            }
        }
        out.push('\n');
    }
    out
}
