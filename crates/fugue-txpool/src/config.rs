//! Pool configuration

use std::path::PathBuf;
use std::time::Duration;

use fugue_primitives::Address;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Transaction pool configuration
///
/// Durations serialize as whole milliseconds so the struct can be embedded
/// in node configuration files without losing sub-second intervals.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Addresses treated as local regardless of submission path
    #[serde(default)]
    pub locals: Vec<Address>,
    /// Disable every local-transaction exemption (price floor, eviction,
    /// journaling)
    #[serde(default)]
    pub no_locals: bool,
    /// Journal file for local transactions, disabled when `None`
    #[serde(default)]
    pub journal: Option<PathBuf>,
    /// Interval between journal compactions
    #[serde(default = "default_rejournal", with = "duration_millis")]
    pub rejournal: Duration,

    /// Minimum tip (wei per gas) for remote admission
    #[serde(default = "default_price_limit")]
    pub price_limit: u128,
    /// Minimum percentage price bump for a replacement
    #[serde(default = "default_price_bump")]
    pub price_bump: u128,

    /// Executable slots guaranteed per account
    #[serde(default = "default_account_slots")]
    pub account_slots: usize,
    /// Maximum executable slots across all accounts
    #[serde(default = "default_global_slots")]
    pub global_slots: usize,
    /// Non-executable slots permitted per account
    #[serde(default = "default_account_queue")]
    pub account_queue: usize,
    /// Maximum non-executable slots across all accounts
    #[serde(default = "default_global_queue")]
    pub global_queue: usize,

    /// How long a non-executable transaction may sit in an idle account
    #[serde(default = "default_lifetime", with = "duration_millis")]
    pub lifetime: Duration,
    /// Interval between time-eviction sweeps
    #[serde(default = "default_eviction_interval", with = "duration_millis")]
    pub eviction_interval: Duration,
}

fn default_price_limit() -> u128 {
    1
}

fn default_price_bump() -> u128 {
    10
}

fn default_account_slots() -> usize {
    16
}

fn default_global_slots() -> usize {
    4096
}

fn default_account_queue() -> usize {
    64
}

fn default_global_queue() -> usize {
    1024
}

fn default_lifetime() -> Duration {
    Duration::from_secs(3 * 3600)
}

fn default_eviction_interval() -> Duration {
    Duration::from_secs(60)
}

fn default_rejournal() -> Duration {
    Duration::from_secs(3600)
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            locals: Vec::new(),
            no_locals: false,
            journal: None,
            rejournal: default_rejournal(),
            price_limit: default_price_limit(),
            price_bump: default_price_bump(),
            account_slots: default_account_slots(),
            global_slots: default_global_slots(),
            account_queue: default_account_queue(),
            global_queue: default_global_queue(),
            lifetime: default_lifetime(),
            eviction_interval: default_eviction_interval(),
        }
    }
}

impl PoolConfig {
    /// Clamp nonsensical knobs back to their defaults, warning about each.
    pub fn sanitize(mut self) -> Self {
        if self.price_limit < 1 {
            warn!(
                "Sanitizing invalid txpool price limit: {} -> {}",
                self.price_limit,
                default_price_limit()
            );
            self.price_limit = default_price_limit();
        }
        if self.price_bump < 1 {
            warn!(
                "Sanitizing invalid txpool price bump: {} -> {}",
                self.price_bump,
                default_price_bump()
            );
            self.price_bump = default_price_bump();
        }
        if self.account_slots < 1 {
            warn!("Sanitizing zero txpool account slots -> {}", default_account_slots());
            self.account_slots = default_account_slots();
        }
        if self.global_slots < 1 {
            warn!("Sanitizing zero txpool global slots -> {}", default_global_slots());
            self.global_slots = default_global_slots();
        }
        if self.account_queue < 1 {
            warn!("Sanitizing zero txpool account queue -> {}", default_account_queue());
            self.account_queue = default_account_queue();
        }
        if self.eviction_interval.is_zero() {
            warn!("Sanitizing zero txpool eviction interval");
            self.eviction_interval = default_eviction_interval();
        }
        if self.rejournal.is_zero() {
            warn!("Sanitizing zero txpool rejournal interval");
            self.rejournal = default_rejournal();
        }
        self
    }
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PoolConfig::default();
        assert_eq!(config.price_limit, 1);
        assert_eq!(config.price_bump, 10);
        assert_eq!(config.account_slots, 16);
        assert_eq!(config.global_slots, 4096);
        assert_eq!(config.account_queue, 64);
        assert_eq!(config.global_queue, 1024);
        assert_eq!(config.lifetime, Duration::from_secs(3 * 3600));
        assert!(config.journal.is_none());
        assert!(!config.no_locals);
    }

    #[test]
    fn test_sanitize_clamps_zeroes() {
        let config = PoolConfig {
            price_limit: 0,
            price_bump: 0,
            account_slots: 0,
            global_slots: 0,
            account_queue: 0,
            eviction_interval: Duration::ZERO,
            rejournal: Duration::ZERO,
            ..Default::default()
        }
        .sanitize();

        assert_eq!(config.price_limit, 1);
        assert_eq!(config.price_bump, 10);
        assert_eq!(config.account_slots, 16);
        assert_eq!(config.global_slots, 4096);
        assert_eq!(config.account_queue, 64);
        assert!(!config.eviction_interval.is_zero());
        assert!(!config.rejournal.is_zero());
    }

    #[test]
    fn test_sanitize_keeps_valid_values() {
        let config = PoolConfig {
            price_limit: 7,
            global_queue: 2,
            lifetime: Duration::from_secs(1),
            eviction_interval: Duration::from_millis(100),
            ..Default::default()
        }
        .sanitize();

        assert_eq!(config.price_limit, 7);
        assert_eq!(config.global_queue, 2);
        assert_eq!(config.lifetime, Duration::from_secs(1));
        assert_eq!(config.eviction_interval, Duration::from_millis(100));
    }

    #[test]
    fn test_serde_roundtrip_durations_as_millis() {
        let config = PoolConfig {
            lifetime: Duration::from_secs(120),
            eviction_interval: Duration::from_millis(100),
            ..Default::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        assert!(json.contains("\"lifetime\":120000"));
        let back: PoolConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.lifetime, Duration::from_secs(120));
        // Sub-second intervals survive the round trip.
        assert_eq!(back.eviction_interval, Duration::from_millis(100));
        assert_eq!(back.global_slots, config.global_slots);
    }

    #[test]
    fn test_deserialize_empty_object_uses_defaults() {
        let config: PoolConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.price_bump, PoolConfig::default().price_bump);
    }
}
