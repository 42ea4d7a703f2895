//! Message identifier generation.

use gridtown_core::Millis;
use rand::Rng;
use std::sync::atomic::{AtomicU64, Ordering};

/// Generates `msg_<epoch-ms>_<counter>_<salt>` identifiers.
///
/// The counter never resets, so ids are unique within one process. The
/// per-process random salt keeps two clients that mint a message in the
/// same millisecond with the same counter value from colliding.
#[derive(Debug)]
pub struct MessageIdGen {
    salt: u32,
    counter: AtomicU64,
}

impl MessageIdGen {
    /// Create a generator with a random salt.
    pub fn new() -> Self {
        Self::with_salt(rand::thread_rng().gen())
    }

    /// Create a generator with a fixed salt (tests).
    pub fn with_salt(salt: u32) -> Self {
        Self {
            salt,
            counter: AtomicU64::new(0),
        }
    }

    /// Mint the next identifier.
    pub fn next_id(&self) -> String {
        let n = self.counter.fetch_add(1, Ordering::Relaxed) + 1;
        format!("msg_{}_{}_{:08x}", Millis::now().0, n, self.salt)
    }

    /// Salt baked into every id from this generator.
    pub fn salt(&self) -> u32 {
        self.salt
    }
}

impl Default for MessageIdGen {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn ids_are_unique_within_one_generator() {
        let ids = MessageIdGen::with_salt(7);
        let minted: HashSet<String> = (0..1000).map(|_| ids.next_id()).collect();
        assert_eq!(minted.len(), 1000);
    }

    #[test]
    fn ids_carry_the_salt_suffix() {
        let ids = MessageIdGen::with_salt(0xABCD);
        assert!(ids.next_id().ends_with("_0000abcd"));
    }

    #[test]
    fn generators_with_different_salts_never_collide() {
        let a = MessageIdGen::with_salt(1);
        let b = MessageIdGen::with_salt(2);
        let mut minted = HashSet::new();
        for _ in 0..100 {
            minted.insert(a.next_id());
            minted.insert(b.next_id());
        }
        assert_eq!(minted.len(), 200);
    }
}
