//! Golden vectors for the map derivation.
//!
//! These values were produced by an independent implementation of the same
//! derivation rules. Any context that derives maps (operator, settlement
//! layer, standalone checker) must reproduce them exactly.

use std::collections::BTreeSet;
use tilerun_fair::{
    is_connected, FinalSeed, GameMap, GameParameters, MapGenerator, OperatorSalt, RewardTier,
    VrfOutput, DEFAULT_MAX_NONCE_ATTEMPTS,
};

struct Vector {
    vrf: u8,
    salt: u8,
    game_id: u64,
    width: usize,
    final_seed: &'static str,
    start: usize,
    finish: usize,
    traps: &'static [usize],
    nonce: u32,
    rewards: &'static [(usize, RewardTier, u64)],
}

const BET: u64 = 1000;

const VECTORS: &[Vector] = &[
    Vector {
        vrf: 0x11,
        salt: 0x22,
        game_id: 42,
        width: 5,
        final_seed: "0f0ac479437a6c8bc4eb7195bbf078e8d4dd7be991048e257fedb6823084e296",
        start: 24,
        finish: 2,
        traps: &[0, 4, 12],
        nonce: 0,
        rewards: &[
            (8, RewardTier::Half, 500),
            (16, RewardTier::Tenth, 100),
            (23, RewardTier::Fifth, 200),
        ],
    },
    Vector {
        vrf: 0x11,
        salt: 0x22,
        game_id: 7,
        width: 6,
        final_seed: "1948e967cdb5979dd388fd57e910ab0906bfa9c9b2c9a51a29c72ed00bd1b9a8",
        start: 35,
        finish: 1,
        traps: &[0, 5, 11, 12, 13],
        nonce: 0,
        rewards: &[
            (3, RewardTier::Fifth, 200),
            (4, RewardTier::Half, 500),
            (20, RewardTier::Fifth, 200),
            (29, RewardTier::Tenth, 100),
            (34, RewardTier::Half, 500),
        ],
    },
    Vector {
        vrf: 0xab,
        salt: 0xcd,
        game_id: 1,
        width: 7,
        final_seed: "6aede51980a2b66362a2eec74c44595cc21eb8ee382f3833fe2245d6a404ea74",
        start: 42,
        finish: 4,
        traps: &[5, 6, 15, 19, 31, 33, 41],
        nonce: 1,
        rewards: &[
            (2, RewardTier::Even, 1000),
            (8, RewardTier::Tenth, 100),
            (13, RewardTier::Tenth, 100),
            (20, RewardTier::Half, 500),
            (26, RewardTier::Fifth, 200),
            (36, RewardTier::Even, 1000),
            (43, RewardTier::Tenth, 100),
            (45, RewardTier::Half, 500),
        ],
    },
    Vector {
        vrf: 0x11,
        salt: 0x22,
        game_id: 48,
        width: 5,
        final_seed: "a23b4419538084deae39504014f20f0d5e6f76e7e48ccf011bb4764aceb59b55",
        start: 20,
        finish: 0,
        traps: &[6, 12, 18],
        nonce: 1,
        rewards: &[
            (8, RewardTier::Tenth, 100),
            (15, RewardTier::Tenth, 100),
            (16, RewardTier::Fifth, 200),
            (17, RewardTier::Tenth, 100),
        ],
    },
];

fn seed_for(vector: &Vector) -> FinalSeed {
    let vrf = VrfOutput::from_bytes([vector.vrf; 32]);
    let salt = OperatorSalt::from_bytes([vector.salt; 32]);
    FinalSeed::derive(vrf.as_bytes(), salt.as_bytes(), vector.game_id)
}

#[test]
fn test_final_seeds() {
    for vector in VECTORS {
        assert_eq!(
            hex::encode(seed_for(vector).as_bytes()),
            vector.final_seed,
            "game {}",
            vector.game_id
        );
    }
}

#[test]
fn test_golden_maps() {
    for vector in VECTORS {
        let params = GameParameters::standard(vector.width, BET, 500).unwrap();
        let map = GameMap::generate(
            &seed_for(vector),
            vector.game_id,
            &params,
            DEFAULT_MAX_NONCE_ATTEMPTS,
        )
        .unwrap();

        assert_eq!(map.start, vector.start, "start of game {}", vector.game_id);
        assert_eq!(map.finish, vector.finish, "finish of game {}", vector.game_id);
        assert_eq!(
            map.traps,
            vector.traps.iter().copied().collect::<BTreeSet<_>>(),
            "traps of game {}",
            vector.game_id
        );
        assert_eq!(map.map_nonce, vector.nonce, "nonce of game {}", vector.game_id);

        let rewards: Vec<_> = map
            .rewards
            .iter()
            .map(|(tile, reward)| (*tile, reward.tier, reward.amount))
            .collect();
        assert_eq!(rewards, vector.rewards, "rewards of game {}", vector.game_id);
    }
}

#[test]
fn test_scenario_a_repeatable_small_grid() {
    let vector = &VECTORS[0];
    let params = GameParameters::standard(5, BET, 500).unwrap();
    let runs: Vec<GameMap> = (0..5)
        .map(|_| {
            GameMap::generate(&seed_for(vector), vector.game_id, &params, DEFAULT_MAX_NONCE_ATTEMPTS)
                .unwrap()
        })
        .collect();
    for map in &runs {
        assert_eq!((map.start, map.finish), (24, 2));
        assert_eq!(map.traps.len(), 3);
        assert_eq!(map, &runs[0]);
    }
}

#[test]
fn test_scenario_e_retry_is_reproducible() {
    let vector = &VECTORS[3];
    let params = GameParameters::standard(5, BET, 500).unwrap();
    let seed = seed_for(vector);
    let generator = MapGenerator::new(&seed, vector.game_id, &params).unwrap();
    let (start, finish) = generator.endpoints();

    // Nonce 0 isolates the bottom-left start corner.
    let first = generator.traps_at(start, finish, 0);
    assert_eq!(first, BTreeSet::from([9, 15, 21]));
    assert!(!is_connected(params.grid(), start, finish, &first));

    let second = generator.traps_at(start, finish, 1);
    assert!(is_connected(params.grid(), start, finish, &second));

    let map = GameMap::generate(&seed, vector.game_id, &params, DEFAULT_MAX_NONCE_ATTEMPTS).unwrap();
    assert_eq!(map.map_nonce, 1);
    assert_eq!(map.traps, second);
}
