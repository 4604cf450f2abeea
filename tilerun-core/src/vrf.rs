//! Randomness sources. The real deployment talks to an external VRF; the
//! local source stands in for it in the CLI and in tests.

use crate::error::Result;
use crate::types::GameId;
use async_trait::async_trait;
use parking_lot::Mutex;
use rand::RngCore;
use tilerun_fair::VrfOutput;
use uuid::Uuid;

#[async_trait]
pub trait RandomnessSource: Send + Sync {
    /// Ask for a random value bound to `game_id`. The value arrives later
    /// through `GameService::fulfill_randomness` under the returned id.
    async fn request_randomness(&self, game_id: GameId) -> Result<Uuid>;
}

#[derive(Debug, Clone)]
pub struct Fulfilment {
    pub request_id: Uuid,
    pub game_id: GameId,
    pub output: VrfOutput,
}

/// Queues requests and fills them from the thread RNG when drained.
#[derive(Debug, Default)]
pub struct LocalRandomness {
    pending: Mutex<Vec<(Uuid, GameId)>>,
}

impl LocalRandomness {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().len()
    }

    /// Produce outputs for every outstanding request, oldest first.
    pub fn take_fulfilments(&self) -> Vec<Fulfilment> {
        let drained: Vec<(Uuid, GameId)> = self.pending.lock().drain(..).collect();
        let mut rng = rand::thread_rng();

        drained
            .into_iter()
            .map(|(request_id, game_id)| {
                let mut bytes = [0u8; 32];
                rng.fill_bytes(&mut bytes);
                Fulfilment {
                    request_id,
                    game_id,
                    output: VrfOutput::from_bytes(bytes),
                }
            })
            .collect()
    }
}

#[async_trait]
impl RandomnessSource for LocalRandomness {
    async fn request_randomness(&self, game_id: GameId) -> Result<Uuid> {
        let request_id = Uuid::new_v4();
        self.pending.lock().push((request_id, game_id));
        tracing::debug!("Queued randomness request {} for game {}", request_id, game_id);
        Ok(request_id)
    }
}
