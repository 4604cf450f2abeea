use crate::error::Result;
use crate::storage::Storage;
use crate::types::{GameId, GameRecord, PlayerId};
use rusqlite::{params, OptionalExtension};

pub struct GameStore<'a> {
    storage: &'a Storage,
}

impl<'a> GameStore<'a> {
    pub fn new(storage: &'a Storage) -> Self {
        Self { storage }
    }

    pub async fn save_game(&self, record: &GameRecord) -> Result<()> {
        let conn = self.storage.get_connection().await;
        let json = serde_json::to_string(record)?;

        conn.execute(
            "INSERT OR REPLACE INTO games
             (game_id, player, phase, grid_width, bet_amount, payout, record, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                record.game_id.0 as i64,
                record.player.as_str(),
                record.phase().as_str(),
                record.params.grid_width as i64,
                record.params.bet_amount as i64,
                record.state.payout() as i64,
                json,
                record.created_at.timestamp(),
                record.updated_at.timestamp(),
            ],
        )?;

        Ok(())
    }

    pub async fn load_game(&self, game_id: GameId) -> Result<Option<GameRecord>> {
        let conn = self.storage.get_connection().await;

        let json: Option<String> = conn
            .query_row(
                "SELECT record FROM games WHERE game_id = ?1",
                params![game_id.0 as i64],
                |row| row.get(0),
            )
            .optional()?;

        match json {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    /// Newest first, optionally restricted to one player.
    pub async fn list_games(&self, player: Option<&PlayerId>) -> Result<Vec<GameRecord>> {
        let conn = self.storage.get_connection().await;

        let rows: Vec<String> = match player {
            Some(player) => {
                let mut stmt = conn.prepare(
                    "SELECT record FROM games WHERE player = ?1 ORDER BY game_id DESC",
                )?;
                let iter = stmt.query_map(params![player.as_str()], |row| row.get(0))?;
                iter.collect::<rusqlite::Result<_>>()?
            }
            None => {
                let mut stmt = conn.prepare("SELECT record FROM games ORDER BY game_id DESC")?;
                let iter = stmt.query_map([], |row| row.get(0))?;
                iter.collect::<rusqlite::Result<_>>()?
            }
        };

        let mut games = Vec::with_capacity(rows.len());
        for json in rows {
            games.push(serde_json::from_str(&json)?);
        }

        Ok(games)
    }

    pub async fn next_game_id(&self) -> Result<GameId> {
        let conn = self.storage.get_connection().await;

        let max: i64 = conn.query_row(
            "SELECT COALESCE(MAX(game_id), 0) FROM games",
            [],
            |row| row.get(0),
        )?;

        Ok(GameId(max as u64 + 1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tempfile::tempdir;
    use tilerun_fair::{GameParameters, GamePhase, GameState, OperatorSalt};

    fn record(game_id: u64, player: &str) -> GameRecord {
        let params = GameParameters::standard(5, 1000, 500).unwrap();
        let salt = OperatorSalt::from_bytes([0x22; 32]);
        GameRecord {
            game_id: GameId(game_id),
            player: PlayerId::new(player),
            params,
            commitment: salt.commit(),
            salt,
            committed_at: 1,
            request_id: None,
            randomness_requested_at: Some(2),
            vrf_output: None,
            state: GameState::new(params),
            map_nonce: None,
            claim_log: None,
            settlement: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_save_load_and_list() {
        let temp_dir = tempdir().unwrap();
        let storage = Storage::new(&temp_dir.path().join("games.db")).await.unwrap();
        let store = GameStore::new(&storage);

        assert_eq!(store.next_game_id().await.unwrap(), GameId(1));
        assert!(store.load_game(GameId(1)).await.unwrap().is_none());

        store.save_game(&record(1, "alice")).await.unwrap();
        store.save_game(&record(2, "bob")).await.unwrap();
        store.save_game(&record(3, "alice")).await.unwrap();

        let loaded = store.load_game(GameId(2)).await.unwrap().unwrap();
        assert_eq!(loaded.player, PlayerId::new("bob"));
        assert_eq!(loaded.phase(), GamePhase::AwaitingRandomness);
        assert_eq!(loaded.commitment, loaded.salt.commit());

        let alice: Vec<_> = store
            .list_games(Some(&PlayerId::new("alice")))
            .await
            .unwrap()
            .into_iter()
            .map(|record| record.game_id)
            .collect();
        assert_eq!(alice, vec![GameId(3), GameId(1)]);
        assert_eq!(store.list_games(None).await.unwrap().len(), 3);
        assert_eq!(store.next_game_id().await.unwrap(), GameId(4));
    }

    #[tokio::test]
    async fn test_save_replaces_existing_row() {
        let temp_dir = tempdir().unwrap();
        let storage = Storage::new(&temp_dir.path().join("games.db")).await.unwrap();
        let store = GameStore::new(&storage);

        let mut game = record(1, "alice");
        store.save_game(&game).await.unwrap();
        game.state.refund().unwrap();
        store.save_game(&game).await.unwrap();

        let loaded = store.load_game(GameId(1)).await.unwrap().unwrap();
        assert_eq!(loaded.phase(), GamePhase::Refunded);
        assert_eq!(store.list_games(None).await.unwrap().len(), 1);
    }
}
