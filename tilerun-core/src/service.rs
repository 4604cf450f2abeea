//! Operator-side game service.
//!
//! Holds every live game behind its own async mutex, so concurrent calls for
//! one game are applied strictly in arrival order while different games
//! proceed independently. The hidden [`GameMap`] lives only here; the player
//! channel sees [`GameView`]s.

use crate::config::OperatorConfig;
use crate::coordinator::Coordinator;
use crate::error::{Result, TilerunError};
use crate::settlement::{SettlementLayer, SettlementReceipt, SettlementStatus};
use crate::storage::{GameStore, Storage};
use crate::types::{GameId, GameRecord, GameView, PlayerId};
use crate::vrf::RandomnessSource;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tilerun_fair::{
    FinalSeed, GameMap, GameParameters, GamePhase, GameState, MoveError, MoveResult, OperatorSalt,
    OutcomeSubmission, SaltCommitment, TileIndex, VrfOutput,
};
use uuid::Uuid;

struct LiveGame {
    record: GameRecord,
    map: Option<GameMap>,
}

pub struct GameService {
    config: OperatorConfig,
    storage: Arc<Storage>,
    randomness: Arc<dyn RandomnessSource>,
    settlement: Arc<dyn SettlementLayer>,
    coordinator: Mutex<Coordinator>,
    games: RwLock<HashMap<GameId, Arc<tokio::sync::Mutex<LiveGame>>>>,
    next_game_id: AtomicU64,
}

impl GameService {
    pub async fn new(
        config: OperatorConfig,
        storage: Arc<Storage>,
        randomness: Arc<dyn RandomnessSource>,
        settlement: Arc<dyn SettlementLayer>,
    ) -> Result<Self> {
        config.validate()?;
        let next_game_id = GameStore::new(&storage).next_game_id().await?;
        let coordinator = Coordinator::new(config.commitment_ttl_chrono()?);

        tracing::info!(
            "Game service ready (fee {} bps, next game {})",
            config.house_fee_bps,
            next_game_id
        );

        let service = Self {
            config,
            storage,
            randomness,
            settlement,
            coordinator: Mutex::new(coordinator),
            games: RwLock::new(HashMap::new()),
            next_game_id: AtomicU64::new(next_game_id.0),
        };
        service.restore_games().await?;
        Ok(service)
    }

    /// Reload games that were still in flight when the service last stopped.
    /// Active maps are re-derived from the stored randomness and salt.
    async fn restore_games(&self) -> Result<()> {
        let records = GameStore::new(&self.storage).list_games(None).await?;
        let mut restored = 0;

        for record in records.into_iter().filter(|record| !record.phase().is_terminal()) {
            let game_id = record.game_id;
            let map = match (record.phase(), record.vrf_output) {
                (GamePhase::Active, Some(output)) => {
                    let seed =
                        FinalSeed::derive(output.as_bytes(), record.salt.as_bytes(), game_id.0);
                    let map = GameMap::generate(
                        &seed,
                        game_id.0,
                        &record.params,
                        self.config.max_nonce_attempts,
                    )?;
                    if record.map_nonce != Some(map.map_nonce) {
                        return Err(TilerunError::internal(format!(
                            "stored nonce of game {} does not match its derivation",
                            game_id
                        )));
                    }
                    Some(map)
                }
                _ => None,
            };

            let pending_request = record
                .request_id
                .filter(|_| record.phase() == GamePhase::AwaitingRandomness);
            self.coordinator
                .lock()
                .restore(&record.player, game_id, record.salt, pending_request);
            self.games.write().insert(
                game_id,
                Arc::new(tokio::sync::Mutex::new(LiveGame { record, map })),
            );
            restored += 1;
        }

        if restored > 0 {
            tracing::info!("Restored {} in-flight games", restored);
        }
        Ok(())
    }

    pub fn config(&self) -> &OperatorConfig {
        &self.config
    }

    /// Publish a fresh salt commitment for `player`'s next game.
    pub fn commit_salt(&self, player: &PlayerId) -> Result<SaltCommitment> {
        self.coordinator.lock().commit(player, Utc::now())
    }

    /// Consume the player's commitment, open a game and request randomness.
    ///
    /// The settlement layer records the commitment and terms before any
    /// randomness is requested. If either step fails the game is kept in
    /// `AwaitingRandomness` so it can be refunded.
    pub async fn place_bet(
        &self,
        player: &PlayerId,
        grid_width: usize,
        bet_amount: u64,
    ) -> Result<GameId> {
        let params = GameParameters::standard(grid_width, bet_amount, self.config.house_fee_bps)?;
        let now = Utc::now();
        let (game_id, pending) = {
            let mut coordinator = self.coordinator.lock();
            let game_id = GameId(self.next_game_id.load(Ordering::SeqCst));
            let pending = coordinator.consume(player, game_id, now)?;
            self.next_game_id.fetch_add(1, Ordering::SeqCst);
            (game_id, pending)
        };

        let record = GameRecord {
            game_id,
            player: player.clone(),
            params,
            commitment: pending.commitment,
            salt: pending.salt,
            committed_at: pending.sequence,
            request_id: None,
            randomness_requested_at: None,
            vrf_output: None,
            state: GameState::new(params),
            map_nonce: None,
            claim_log: None,
            settlement: None,
            created_at: now,
            updated_at: now,
        };

        let entry = Arc::new(tokio::sync::Mutex::new(LiveGame { record, map: None }));
        self.games.write().insert(game_id, entry.clone());

        let mut game = entry.lock().await;
        self.persist(&mut game.record).await?;

        if let Err(e) = self
            .settlement
            .register_game(game_id, game.record.commitment, params, game.record.committed_at)
            .await
        {
            tracing::error!("Settlement layer refused game {}: {}", game_id, e);
            return Err(e);
        }

        tracing::info!(
            "Player {} bet {} on a {}x{} grid (game {})",
            player,
            bet_amount,
            grid_width,
            grid_width,
            game_id
        );

        let request_id = match self.randomness.request_randomness(game_id).await {
            Ok(request_id) => request_id,
            Err(e) => {
                tracing::warn!("Randomness request for game {} failed: {}", game_id, e);
                return Err(e);
            }
        };

        let requested_at = self.coordinator.lock().record_request(request_id, game_id);
        game.record.request_id = Some(request_id);
        game.record.randomness_requested_at = Some(requested_at);
        self.persist(&mut game.record).await?;

        Ok(game_id)
    }

    /// Randomness callback: derive the map and open the game for moves.
    pub async fn fulfill_randomness(&self, request_id: Uuid, output: VrfOutput) -> Result<GameId> {
        let game_id = self.coordinator.lock().resolve_request(request_id)?;
        let entry = self.entry(game_id)?;
        let mut game = entry.lock().await;

        if game.record.phase() != GamePhase::AwaitingRandomness {
            return Err(TilerunError::invalid_phase(format!(
                "game {} is {}, not awaiting randomness",
                game_id,
                game.record.phase().as_str()
            )));
        }

        let seed = FinalSeed::derive(output.as_bytes(), game.record.salt.as_bytes(), game_id.0);
        let map = match GameMap::generate(
            &seed,
            game_id.0,
            &game.record.params,
            self.config.max_nonce_attempts,
        ) {
            Ok(map) => map,
            Err(e) => {
                tracing::error!("Map generation failed for game {}: {}", game_id, e);
                return Err(e.into());
            }
        };

        let requested_at = game.record.randomness_requested_at.ok_or_else(|| {
            TilerunError::internal(format!("game {} has no randomness request", game_id))
        })?;
        self.settlement
            .record_randomness(game_id, output, requested_at)
            .await?;

        game.record.state.activate(&map)?;
        game.record.vrf_output = Some(output);
        game.record.map_nonce = Some(map.map_nonce);
        game.map = Some(map);
        self.persist(&mut game.record).await?;

        tracing::info!("Game {} is active", game_id);
        Ok(game_id)
    }

    /// Reveal one tile for the owning player.
    pub async fn reveal_tile(
        &self,
        game_id: GameId,
        player: &PlayerId,
        tile: TileIndex,
    ) -> Result<MoveResult> {
        let entry = self
            .live_entry(game_id, |_| MoveError::WrongPhase.into())
            .await?;
        let mut game = entry.lock().await;

        if &game.record.player != player {
            return Err(TilerunError::NotGameOwner {
                player: player.clone(),
                game_id,
            });
        }

        let LiveGame { record, map } = &mut *game;
        let map = map.as_ref().ok_or_else(|| {
            TilerunError::invalid_phase(format!("game {} has no map yet", game_id))
        })?;

        let result = match record.state.apply_move(map, tile) {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!("Rejected move to {} in game {}: {}", tile, game_id, e);
                return Err(e.into());
            }
        };

        tracing::debug!("Game {} revealed tile {} as {:?}", game_id, tile, result.claim);

        if result.terminal {
            record.claim_log = record.state.claim_log(map);
            self.coordinator.lock().release(player, game_id);
            tracing::info!(
                "Game {} finished: {:?}, collected {}, payout {}{}",
                game_id,
                record.state.outcome(),
                record.state.collected_reward(),
                record.state.payout(),
                if result.stranded { " (no legal moves)" } else { "" }
            );
        }

        self.persist(record).await?;
        Ok(result)
    }

    /// Disclose the operator salt of a completed game.
    pub async fn reveal_salt(&self, game_id: GameId) -> Result<OperatorSalt> {
        let record = self.record(game_id).await?;
        match self.coordinator.lock().reveal(game_id, record.phase()) {
            // Settled games and games from an earlier process are no longer in the coordinator.
            Err(TilerunError::GameNotFound(_)) if record.phase() == GamePhase::Completed => {
                Ok(record.salt)
            }
            other => other,
        }
    }

    /// Everything a settlement layer needs to check the game on its own.
    pub async fn submission(&self, game_id: GameId) -> Result<OutcomeSubmission> {
        let record = self.record(game_id).await?;
        let revealed_salt = self.reveal_salt(game_id).await?;

        let missing = |what: &str| TilerunError::internal(format!("game {} has no {}", game_id, what));
        Ok(OutcomeSubmission {
            game_id: game_id.0,
            params: record.params,
            commitment: record.commitment,
            revealed_salt,
            vrf_output: record.vrf_output.ok_or_else(|| missing("randomness"))?,
            timeline: record.timeline().ok_or_else(|| missing("randomness request"))?,
            claim_log: record.claim_log.ok_or_else(|| missing("claim log"))?,
        })
    }

    /// Hand the outcome to the settlement layer. A game settles once; later
    /// calls return the stored receipt.
    pub async fn settle(&self, game_id: GameId) -> Result<SettlementReceipt> {
        let receipt = match self.record(game_id).await?.settlement {
            Some(receipt) => receipt,
            None => {
                let submission = self.submission(game_id).await?;
                let receipt = self.settlement.submit_outcome(&submission).await?;
                self.update_record(game_id, |record| record.settlement = Some(receipt.clone()))
                    .await?;
                receipt
            }
        };
        self.retire(game_id);

        match &receipt.status {
            SettlementStatus::Accepted { .. } => Ok(receipt),
            SettlementStatus::Rejected { reason } => Err(TilerunError::SettlementRejected {
                game_id,
                reason: reason.clone(),
            }),
        }
    }

    pub async fn player_view(&self, game_id: GameId) -> Result<GameView> {
        Ok(GameView::from(&self.record(game_id).await?))
    }

    /// Operator-only view of the hidden map. Never route this to a player.
    /// `None` before randomness arrives and after the game is retired.
    pub async fn operator_map(&self, game_id: GameId) -> Result<Option<GameMap>> {
        let live = self.games.read().get(&game_id).cloned();
        match live {
            Some(entry) => Ok(entry.lock().await.map.clone()),
            None => {
                self.record(game_id).await?;
                Ok(None)
            }
        }
    }

    /// Games currently held in memory.
    pub fn live_games(&self) -> usize {
        self.games.read().len()
    }

    pub async fn list_games(&self, player: Option<&PlayerId>) -> Result<Vec<GameView>> {
        let records = GameStore::new(&self.storage).list_games(player).await?;
        Ok(records.iter().map(GameView::from).collect())
    }

    /// Refund a game that is still waiting for randomness.
    pub async fn refund_game(&self, game_id: GameId) -> Result<()> {
        let entry = self
            .live_entry(game_id, |record| {
                TilerunError::invalid_phase(format!(
                    "game {} is {}, only games awaiting randomness can be refunded",
                    game_id,
                    record.phase().as_str()
                ))
            })
            .await?;
        let mut game = entry.lock().await;
        self.refund_locked(&mut game).await
    }

    /// Refund every game whose randomness is overdue at `now`.
    pub async fn refund_stale(&self, now: DateTime<Utc>) -> Result<Vec<GameId>> {
        let timeout = self.config.randomness_timeout_chrono()?;
        let entries: Vec<_> = self.games.read().values().cloned().collect();

        let mut refunded = Vec::new();
        for entry in entries {
            let mut game = entry.lock().await;
            if game.record.phase() == GamePhase::AwaitingRandomness
                && game.record.created_at + timeout <= now
            {
                self.refund_locked(&mut game).await?;
                refunded.push(game.record.game_id);
            }
        }

        refunded.sort();
        Ok(refunded)
    }

    pub fn sweep_expired_commitments(&self, now: DateTime<Utc>) -> Vec<PlayerId> {
        self.coordinator.lock().sweep_expired(now)
    }

    async fn refund_locked(&self, game: &mut LiveGame) -> Result<()> {
        let game_id = game.record.game_id;
        game.record.state.refund().map_err(|_| {
            TilerunError::invalid_phase(format!(
                "game {} is {}, only games awaiting randomness can be refunded",
                game_id,
                game.record.phase().as_str()
            ))
        })?;

        self.coordinator.lock().release(&game.record.player, game_id);
        self.persist(&mut game.record).await?;
        self.retire(game_id);
        tracing::warn!(
            "Refunded game {} ({} to player {})",
            game_id,
            game.record.params.bet_amount,
            game.record.player
        );
        Ok(())
    }

    /// Drop a finished game from memory; reads fall back to storage.
    fn retire(&self, game_id: GameId) {
        self.games.write().remove(&game_id);
        self.coordinator.lock().forget(game_id);
        tracing::debug!("Retired game {} from memory", game_id);
    }

    /// The in-memory entry of a game. Settled and refunded games are only
    /// kept in storage; for those `finished` builds the error.
    async fn live_entry(
        &self,
        game_id: GameId,
        finished: impl FnOnce(&GameRecord) -> TilerunError,
    ) -> Result<Arc<tokio::sync::Mutex<LiveGame>>> {
        let live = self.games.read().get(&game_id).cloned();
        match live {
            Some(entry) => Ok(entry),
            None => {
                let record = self.record(game_id).await?;
                if record.phase().is_terminal() {
                    Err(finished(&record))
                } else {
                    Err(TilerunError::GameNotFound(game_id))
                }
            }
        }
    }

    fn entry(&self, game_id: GameId) -> Result<Arc<tokio::sync::Mutex<LiveGame>>> {
        self.games
            .read()
            .get(&game_id)
            .cloned()
            .ok_or(TilerunError::GameNotFound(game_id))
    }

    async fn record(&self, game_id: GameId) -> Result<GameRecord> {
        let entry = self.games.read().get(&game_id).cloned();
        match entry {
            Some(entry) => Ok(entry.lock().await.record.clone()),
            None => GameStore::new(&self.storage)
                .load_game(game_id)
                .await?
                .ok_or(TilerunError::GameNotFound(game_id)),
        }
    }

    async fn update_record(
        &self,
        game_id: GameId,
        update: impl FnOnce(&mut GameRecord),
    ) -> Result<()> {
        let entry = self.games.read().get(&game_id).cloned();
        match entry {
            Some(entry) => {
                let mut game = entry.lock().await;
                update(&mut game.record);
                self.persist(&mut game.record).await
            }
            None => {
                let mut record = GameStore::new(&self.storage)
                    .load_game(game_id)
                    .await?
                    .ok_or(TilerunError::GameNotFound(game_id))?;
                update(&mut record);
                self.persist(&mut record).await
            }
        }
    }

    async fn persist(&self, record: &mut GameRecord) -> Result<()> {
        record.updated_at = Utc::now();
        GameStore::new(&self.storage).save_game(record).await
    }
}
