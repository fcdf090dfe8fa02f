//! Buffer configuration and startup validation.
//!
//! Everything here fails fast: a configuration that cannot uphold the data
//! model invariants (non-integer chunks-per-prompt, overlapping health
//! bounds, zero durations) is rejected before any loop runs.

use serde::{Deserialize, Serialize};

use crate::domain::health::HealthThresholds;
use crate::domain::prompts::{PromptTable, default_prompts};

/// Default playable duration of one chunk, in seconds.
pub const DEFAULT_CHUNK_DURATION_SECS: u32 = 60;

/// Default duration one prompt plays for before rotating, in seconds.
pub const DEFAULT_PROMPT_DURATION_SECS: u32 = 3600;

/// Default sample rate of produced audio (16-bit mono PCM).
pub const DEFAULT_SAMPLE_RATE: u32 = 32_000;

/// Default silence inserted at prompt boundaries, in seconds.
pub const DEFAULT_BREAK_DURATION_SECS: u32 = 3;

/// Default consumer wait when the buffer is empty, in seconds.
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 5;

/// Strategy governing what happens to stored records after an append or a
/// consumption, selected by configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum CapacityPolicy {
    /// Never evict `Available` records; after a consumption, keep only the
    /// newest `keep_consumed` consumed records and delete older ones.
    UnboundedRetain { keep_consumed: usize },

    /// Constant storage footprint: after every append, evict the
    /// lowest-sequence record (any status) while the count exceeds
    /// `capacity`. Evicting unconsumed content destroys playable runway;
    /// with `refuse_unconsumed_eviction` the append fails loudly instead.
    FixedRolling {
        capacity: usize,
        #[serde(default)]
        refuse_unconsumed_eviction: bool,
    },

    /// Never evict; production is tracked against a weekly quota and runs in
    /// fixed-size scheduled sessions.
    QuotaAccumulate {
        weekly_target: u32,
        session_size: u32,
    },
}

impl CapacityPolicy {
    /// The hard record-count bound, if this policy has one.
    #[must_use]
    pub const fn capacity(&self) -> Option<usize> {
        match self {
            Self::FixedRolling { capacity, .. } => Some(*capacity),
            _ => None,
        }
    }
}

/// Configuration validation error. Any of these aborts startup.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("chunk duration must be positive")]
    ZeroChunkDuration,

    #[error("prompt duration {prompt_secs}s is not an exact positive multiple of chunk duration {chunk_secs}s")]
    PromptNotMultipleOfChunk { prompt_secs: u32, chunk_secs: u32 },

    #[error("prompt table is empty")]
    EmptyPromptTable,

    #[error("health thresholds must be strictly descending and nonzero")]
    NonMonotonicThresholds,

    #[error("fixed rolling capacity must be positive")]
    ZeroCapacity,

    #[error("weekly target and session size must both be positive")]
    ZeroQuota,

    #[error("retry attempt limits must be positive")]
    ZeroRetryLimit,

    #[error("sample rate must be positive")]
    ZeroSampleRate,
}

/// Buffer subsystem configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BufferConfig {
    /// Playable duration of one chunk, in seconds.
    pub chunk_duration_secs: u32,
    /// How long one prompt plays before rotating, in seconds. Must be an
    /// exact multiple of `chunk_duration_secs`.
    pub prompt_duration_secs: u32,
    /// Sample rate of produced audio; used to synthesize break silence.
    pub sample_rate: u32,
    /// Silence inserted at prompt boundaries, in seconds.
    pub break_duration_secs: u32,
    /// Consumer wait when no chunk is available, in seconds.
    pub poll_interval_secs: u64,
    /// The rotating prompt table.
    pub prompts: Vec<String>,
    /// Eviction/rotation/quota strategy.
    pub capacity: CapacityPolicy,
    /// Health ladder boundaries and cooldowns.
    pub thresholds: HealthThresholds,
    /// Consecutive synthesis failures tolerated before the producer
    /// surfaces a fatal error.
    pub max_synthesis_attempts: u32,
    /// Delivery retries for one chunk before the consumer escalates.
    pub max_delivery_attempts: u32,
    /// Initial backoff between synthesis retries, in seconds; doubles per
    /// attempt up to an internal cap.
    pub retry_backoff_secs: u64,
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            chunk_duration_secs: DEFAULT_CHUNK_DURATION_SECS,
            prompt_duration_secs: DEFAULT_PROMPT_DURATION_SECS,
            sample_rate: DEFAULT_SAMPLE_RATE,
            break_duration_secs: DEFAULT_BREAK_DURATION_SECS,
            poll_interval_secs: DEFAULT_POLL_INTERVAL_SECS,
            prompts: default_prompts(),
            capacity: CapacityPolicy::UnboundedRetain { keep_consumed: 10 },
            thresholds: HealthThresholds::default(),
            max_synthesis_attempts: 5,
            max_delivery_attempts: 3,
            retry_backoff_secs: 5,
        }
    }
}

impl BufferConfig {
    /// Chunks per prompt block. Only meaningful after [`Self::validate`].
    #[must_use]
    pub const fn chunks_per_prompt(&self) -> u64 {
        (self.prompt_duration_secs / self.chunk_duration_secs) as u64
    }

    /// Build the validated prompt rotation table.
    #[must_use]
    pub fn prompt_table(&self) -> PromptTable {
        PromptTable::new(self.prompts.clone(), self.chunks_per_prompt())
    }

    /// Check every startup invariant. Called once at the composition root
    /// before any loop runs.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chunk_duration_secs == 0 {
            return Err(ConfigError::ZeroChunkDuration);
        }
        if self.prompt_duration_secs == 0
            || self.prompt_duration_secs % self.chunk_duration_secs != 0
        {
            return Err(ConfigError::PromptNotMultipleOfChunk {
                prompt_secs: self.prompt_duration_secs,
                chunk_secs: self.chunk_duration_secs,
            });
        }
        if self.prompts.is_empty() {
            return Err(ConfigError::EmptyPromptTable);
        }
        if self.sample_rate == 0 {
            return Err(ConfigError::ZeroSampleRate);
        }
        if self.max_synthesis_attempts == 0 || self.max_delivery_attempts == 0 {
            return Err(ConfigError::ZeroRetryLimit);
        }
        self.thresholds.validate()?;
        match &self.capacity {
            CapacityPolicy::FixedRolling { capacity, .. } if *capacity == 0 => {
                return Err(ConfigError::ZeroCapacity);
            }
            CapacityPolicy::QuotaAccumulate {
                weekly_target,
                session_size,
            } if *weekly_target == 0 || *session_size == 0 => {
                return Err(ConfigError::ZeroQuota);
            }
            _ => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = BufferConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.chunks_per_prompt(), 60);
    }

    #[test]
    fn rejects_non_integer_chunks_per_prompt() {
        let config = BufferConfig {
            chunk_duration_secs: 45,
            prompt_duration_secs: 100,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::PromptNotMultipleOfChunk { .. })
        ));
    }

    #[test]
    fn rejects_zero_chunk_duration() {
        let config = BufferConfig {
            chunk_duration_secs: 0,
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::ZeroChunkDuration));
    }

    #[test]
    fn rejects_empty_prompt_table() {
        let config = BufferConfig {
            prompts: Vec::new(),
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::EmptyPromptTable));
    }

    #[test]
    fn rejects_zero_capacity() {
        let config = BufferConfig {
            capacity: CapacityPolicy::FixedRolling {
                capacity: 0,
                refuse_unconsumed_eviction: false,
            },
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::ZeroCapacity));
    }

    #[test]
    fn rejects_zero_quota() {
        let config = BufferConfig {
            capacity: CapacityPolicy::QuotaAccumulate {
                weekly_target: 240,
                session_size: 0,
            },
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::ZeroQuota));
    }

    #[test]
    fn capacity_accessor() {
        assert_eq!(
            CapacityPolicy::FixedRolling {
                capacity: 1440,
                refuse_unconsumed_eviction: false
            }
            .capacity(),
            Some(1440)
        );
        assert_eq!(
            CapacityPolicy::UnboundedRetain { keep_consumed: 10 }.capacity(),
            None
        );
    }

    #[test]
    fn config_round_trips_through_json() {
        let config = BufferConfig {
            capacity: CapacityPolicy::FixedRolling {
                capacity: 1440,
                refuse_unconsumed_eviction: true,
            },
            ..Default::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        let back: BufferConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }
}
