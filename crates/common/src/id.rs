//! ID generation utilities.

use rand::Rng;
use ulid::Ulid;

/// Alphabet of punishment record ids.
const PUNISHMENT_ID_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Length of punishment record ids.
pub const PUNISHMENT_ID_LEN: usize = 6;

/// ID generator for entities.
#[derive(Debug, Clone, Default)]
pub struct IdGenerator {
    _private: (),
}

impl IdGenerator {
    /// Create a new ID generator.
    #[must_use]
    pub const fn new() -> Self {
        Self { _private: () }
    }

    /// Generate a new ULID-based ID.
    ///
    /// ULIDs are lexicographically sortable, which gives active-warning rows a
    /// stable tie-breaker when two share a start time.
    #[must_use]
    pub fn generate(&self) -> String {
        Ulid::new().to_string().to_lowercase()
    }

    /// Generate a short punishment record id (6 uppercase alphanumerics).
    ///
    /// Uniqueness is not guaranteed; the ledger retries on collision.
    #[must_use]
    pub fn punishment_id(&self) -> String {
        let mut rng = rand::thread_rng();
        (0..PUNISHMENT_ID_LEN)
            .map(|_| {
                let idx = rng.gen_range(0..PUNISHMENT_ID_ALPHABET.len());
                char::from(PUNISHMENT_ID_ALPHABET[idx])
            })
            .collect()
    }

    /// Whether a string has the shape of a punishment record id.
    #[must_use]
    pub fn is_punishment_id(candidate: &str) -> bool {
        candidate.len() == PUNISHMENT_ID_LEN
            && candidate.bytes().all(|b| PUNISHMENT_ID_ALPHABET.contains(&b))
    }
}
