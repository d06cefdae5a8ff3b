use std::fmt;

use rand::RngCore;
use sha2::{Digest, Sha256};

/// Opaque, unforgeable, stable identifier for a single watcher.
///
/// Minted by hashing a per-loop random nonce together with a monotonic
/// counter, the same way `PromiseId::promise_root` derives its root from
/// length-prefixed structured inputs. The hash, not the counter, is handed
/// out, so an id cannot be guessed or replayed across loops.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WatcherId([u8; 32]);

impl WatcherId {
    /// Derive the id for watcher `counter` minted by a loop whose identity
    /// nonce is `loop_nonce`.
    pub fn derive(loop_nonce: &[u8; 16], counter: u64) -> Self {
        let mut hasher = Sha256::new();
        hasher.update((loop_nonce.len() as u64).to_le_bytes());
        hasher.update(loop_nonce);
        hasher.update(counter.to_le_bytes());
        let digest = hasher.finalize();
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&digest);
        Self(bytes)
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for WatcherId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "WatcherId({}…)", &self.to_hex()[..8])
    }
}

impl fmt::Display for WatcherId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Generates a fresh 16-byte nonce for a new loop's watcher-id namespace.
pub fn fresh_loop_nonce() -> [u8; 16] {
    let mut nonce = [0u8; 16];
    rand::rng().fill_bytes(&mut nonce);
    nonce
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_nonce_and_counter_derive_same_id() {
        let nonce = [7u8; 16];
        assert_eq!(WatcherId::derive(&nonce, 3), WatcherId::derive(&nonce, 3));
    }

    #[test]
    fn different_counters_derive_different_ids() {
        let nonce = [7u8; 16];
        assert_ne!(WatcherId::derive(&nonce, 3), WatcherId::derive(&nonce, 4));
    }

    #[test]
    fn different_nonces_derive_different_ids() {
        assert_ne!(
            WatcherId::derive(&[1u8; 16], 0),
            WatcherId::derive(&[2u8; 16], 0)
        );
    }
}
