//! Balance strategies mapping subject keys to buckets of a cycle.
//!
//! Two strategies exist and no others are planned, so they form a closed
//! enum rather than a trait:
//!
//! - [`Balancer::RoundRobin`]: hands out buckets in rotation. Perfectly even,
//!   but the bucket depends on insertion order, not on the key.
//! - [`Balancer::Hash`]: MurmurHash3 (32-bit) of the key modulo the cycle size.
//!   Stable per key, so a key can be located again for removal.

use std::fmt;
use std::io::Cursor;
use std::sync::atomic::{AtomicU64, Ordering};

/// Bucket index within a cycle, in `[0, cycle_size)`.
pub type Minute = u32;

/// Seed for the hash strategy. Changing it reshuffles every key.
const HASH_SEED: u32 = 0;

/// Strategy selector used by configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BalanceKind {
    /// Rotate through buckets in insertion order.
    #[default]
    RoundRobin,
    /// Hash the key into a bucket.
    Hash,
}

impl BalanceKind {
    /// Short name used in config files and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            BalanceKind::RoundRobin => "round_robin",
            BalanceKind::Hash => "hash",
        }
    }

    /// Parse from a config string.
    pub fn from_config_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "round_robin" | "roundrobin" => Some(BalanceKind::RoundRobin),
            "hash" | "murmur" => Some(BalanceKind::Hash),
            _ => None,
        }
    }
}

impl fmt::Display for BalanceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Maps a subject key to a bucket of a fixed-size cycle.
#[derive(Debug)]
pub enum Balancer {
    /// Returns `next mod max`, then increments `next`.
    RoundRobin {
        /// Number of keys assigned so far.
        next: AtomicU64,
        /// Cycle size.
        max: u32,
    },

    /// Returns `murmur3_32(key ++ salt) mod max`.
    Hash {
        /// Cycle size.
        max: u32,
        /// Appended to every key before hashing.
        salt: Option<String>,
    },
}

impl Balancer {
    /// Round-robin balancer over `max` buckets.
    pub fn round_robin(max: u32) -> Self {
        Self::RoundRobin {
            next: AtomicU64::new(0),
            max: max.max(1),
        }
    }

    /// Unsalted hash balancer over `max` buckets.
    pub fn hash(max: u32) -> Self {
        Self::Hash {
            max: max.max(1),
            salt: None,
        }
    }

    /// Hash balancer that appends `salt` to each key before hashing.
    pub fn hash_salted(max: u32, salt: impl Into<String>) -> Self {
        Self::Hash {
            max: max.max(1),
            salt: Some(salt.into()),
        }
    }

    /// Builds the balancer selected by `kind`.
    ///
    /// `salt` only affects the hash strategy; round-robin ignores keys.
    pub fn from_kind(kind: BalanceKind, max: u32, salt: Option<String>) -> Self {
        match (kind, salt) {
            (BalanceKind::RoundRobin, _) => Self::round_robin(max),
            (BalanceKind::Hash, Some(salt)) => Self::hash_salted(max, salt),
            (BalanceKind::Hash, None) => Self::hash(max),
        }
    }

    /// Returns the bucket for `key`.
    ///
    /// For round-robin this advances the rotation, so calling it twice with
    /// the same key yields different buckets.
    pub fn key(&self, key: &str) -> Minute {
        match self {
            Self::RoundRobin { next, max } => {
                let n = next.fetch_add(1, Ordering::Relaxed);
                (n % u64::from(*max)) as Minute
            }
            Self::Hash { max, salt } => {
                let hash = match salt {
                    Some(salt) => murmur(format!("{}{}", key, salt).as_bytes()),
                    None => murmur(key.as_bytes()),
                };
                hash % *max
            }
        }
    }

    /// Cycle size this balancer distributes over.
    pub fn max(&self) -> u32 {
        match self {
            Self::RoundRobin { max, .. } | Self::Hash { max, .. } => *max,
        }
    }

    /// Whether the same key always lands in the same bucket.
    pub fn is_deterministic(&self) -> bool {
        matches!(self, Self::Hash { .. })
    }

    /// The kind of this balancer.
    pub fn kind(&self) -> BalanceKind {
        match self {
            Self::RoundRobin { .. } => BalanceKind::RoundRobin,
            Self::Hash { .. } => BalanceKind::Hash,
        }
    }
}

fn murmur(bytes: &[u8]) -> u32 {
    // Reading from an in-memory cursor cannot fail.
    murmur3::murmur3_32(&mut Cursor::new(bytes), HASH_SEED).unwrap_or(0)
}
