use crate::ConfigError;

/// Smallest supported ring size exponent (2 slots).
pub const MIN_RING_BITS: u8 = 1;

/// Largest supported ring size exponent (4G slots).
pub const MAX_RING_BITS: u8 = 32;

/// Configuration for [`RingQueue`](crate::RingQueue).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    /// Ring size as power of 2 (default: 16 = 64K slots)
    pub ring_bits: u8,
    /// Enable metrics collection (slight overhead, counters are shared)
    pub enable_metrics: bool,
}

impl Config {
    /// Creates a new configuration with custom settings.
    pub const fn new(ring_bits: u8, enable_metrics: bool) -> Self {
        Self {
            ring_bits,
            enable_metrics,
        }
    }

    /// Builds a configuration from an explicit slot count.
    ///
    /// The count must be a power of two between 2 and `1 << MAX_RING_BITS`.
    pub fn from_capacity(capacity: usize) -> Result<Self, ConfigError> {
        if capacity < 2 || !capacity.is_power_of_two() {
            return Err(ConfigError::InvalidCapacity { capacity });
        }
        let config = Self::new(capacity.trailing_zeros() as u8, false);
        config.validate()?;
        Ok(config)
    }

    /// Sets whether metrics are collected.
    pub const fn with_metrics(mut self, enable_metrics: bool) -> Self {
        self.enable_metrics = enable_metrics;
        self
    }

    /// Checks that the ring size is within the supported range.
    pub const fn validate(&self) -> Result<(), ConfigError> {
        if self.ring_bits < MIN_RING_BITS {
            return Err(ConfigError::InvalidCapacity {
                capacity: self.capacity(),
            });
        }
        if self.ring_bits > MAX_RING_BITS {
            return Err(ConfigError::RingBitsTooLarge {
                bits: self.ring_bits,
                max: MAX_RING_BITS,
            });
        }
        Ok(())
    }

    /// Returns the capacity of the ring.
    #[inline]
    pub const fn capacity(&self) -> usize {
        1 << self.ring_bits
    }

    /// Returns the mask for index wrapping.
    #[inline]
    pub const fn mask(&self) -> usize {
        self.capacity() - 1
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            ring_bits: 16, // 64K slots
            enable_metrics: false,
        }
    }
}

/// Low latency configuration (4K slots, fits in L1 cache)
pub const LOW_LATENCY_CONFIG: Config = Config::new(12, false);

/// High throughput configuration (256K slots)
pub const HIGH_THROUGHPUT_CONFIG: Config = Config::new(18, false);
