//! Fallback outcome computation.

use rand::rngs::OsRng;
use rand::{Rng, RngCore};
use sha2::{Digest, Sha256};
use vrfguard_types::{CoinSide, FallbackMethod};

/// Locally decided outcome plus how it was derived.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FallbackOutcome {
    pub side: CoinSide,
    /// Hex digest prefix for `deterministic`, so the outcome can be recomputed
    pub proof: Option<String>,
}

/// Decide the round locally.
///
/// `deterministic` is SHA-256 over `round|room|unix_millis`, low bit of the
/// first byte. It is reproducible, not verifiable randomness.
pub fn compute_outcome(
    method: FallbackMethod,
    round_id: &str,
    external_room_id: &str,
    player_choice: CoinSide,
    unix_millis: i64,
) -> FallbackOutcome {
    match method {
        FallbackMethod::Deterministic => {
            let digest = Sha256::digest(format!("{round_id}|{external_room_id}|{unix_millis}"));
            FallbackOutcome {
                side: CoinSide::from_bit(digest[0] & 1),
                proof: Some(hex::encode(&digest[..8])),
            }
        },
        FallbackMethod::ClientRandom => FallbackOutcome { side: random_side(), proof: None },
        FallbackMethod::TimeoutWin => FallbackOutcome { side: player_choice, proof: None },
    }
}

/// OS entropy when available, otherwise the thread-local generator.
fn random_side() -> CoinSide {
    let mut byte = [0_u8; 1];
    if OsRng.try_fill_bytes(&mut byte).is_ok() {
        return CoinSide::from_bit(byte[0] & 1);
    }
    tracing::warn!("OS entropy unavailable, using thread-local generator");
    CoinSide::from_bit(u8::from(rand::thread_rng().gen_bool(0.5)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_win_returns_player_choice() {
        for choice in [CoinSide::Heads, CoinSide::Tails] {
            let outcome = compute_outcome(FallbackMethod::TimeoutWin, "r", "room", choice, 0);
            assert_eq!(outcome.side, choice);
        }
    }

    #[test]
    fn test_deterministic_is_reproducible() {
        let a = compute_outcome(FallbackMethod::Deterministic, "r1", "room", CoinSide::Heads, 1_700_000_000_000);
        let b = compute_outcome(FallbackMethod::Deterministic, "r1", "room", CoinSide::Tails, 1_700_000_000_000);
        assert_eq!(a, b);
        assert_eq!(a.proof.as_ref().map(String::len), Some(16));
    }

    #[test]
    fn test_deterministic_varies_with_input() {
        let sides: std::collections::HashSet<CoinSide> = (0..64)
            .map(|ms| compute_outcome(FallbackMethod::Deterministic, "r1", "room", CoinSide::Heads, ms).side)
            .collect();
        assert_eq!(sides.len(), 2);
    }

    #[test]
    fn test_client_random_produces_both_sides() {
        let sides: std::collections::HashSet<CoinSide> = (0..200)
            .map(|_| compute_outcome(FallbackMethod::ClientRandom, "r", "room", CoinSide::Heads, 0).side)
            .collect();
        assert_eq!(sides.len(), 2);
    }
}
