//! Tree and workload configuration.
//!
//! A [`TreeConfig`] fixes the capacities of one tree instantiation. It is
//! validated once at tree construction and persisted in the tree metadata,
//! so a reopened tree keeps the capacities it was created with.
//!
//! # Environment Variables
//!
//! - `BTREES_MAX_BUCKET_SIZE`: Max entries per bucket (default: `60`)
//! - `BTREES_MAX_BTREE_SIZE`: Max children per internal node (default: `500`)
//! - `BTREES_DUPLICATE_POLICY`: `replace` or `reject` (default: `replace`)
//! - `BTREES_CACHE_LIMIT`: Clean nodes kept cached after commit (default: `10000`)
//!
//! The workload driver additionally reads:
//!
//! - `BTREES_DATA_FILE`: Store file path (default: `./btrees.db`)
//! - `BTREES_OPERATIONS`: Number of random operations (default: `10000`)
//! - `BTREES_SEED`: RNG seed (default: `0`)

use std::path::PathBuf;
use std::str::FromStr;

/// What `set` does when the key is already present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum DuplicatePolicy {
    /// Overwrite the existing value.
    #[default]
    Replace = 0,
    /// Fail with `KeyExists`.
    Reject = 1,
}

impl TryFrom<u8> for DuplicatePolicy {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Replace),
            1 => Ok(Self::Reject),
            _ => Err(value),
        }
    }
}

impl FromStr for DuplicatePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "replace" => Ok(Self::Replace),
            "reject" => Ok(Self::Reject),
            other => Err(format!("'{other}' is not one of: replace, reject")),
        }
    }
}

/// Error returned when a configuration is invalid or cannot be loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A capacity parameter is below its minimum.
    Capacity {
        name: &'static str,
        value: usize,
        minimum: usize,
    },
    /// A capacity parameter is above its maximum.
    CapacityTooLarge {
        name: &'static str,
        value: usize,
        maximum: usize,
    },
    /// An environment variable has an invalid value.
    InvalidValue { name: String, message: String },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Capacity {
                name,
                value,
                minimum,
            } => write!(f, "invalid capacity {name}={value} (minimum {minimum})"),
            Self::CapacityTooLarge {
                name,
                value,
                maximum,
            } => write!(f, "invalid capacity {name}={value} (maximum {maximum})"),
            Self::InvalidValue { name, message } => {
                write!(f, "invalid value for {name}: {message}")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Capacities and policies of a tree.
///
/// # Invariants (after `validate`)
///
/// - `max_bucket_size >= 1`
/// - `max_btree_size >= 3`, so every non-root internal node has at least
///   two children and an underfull node always has a sibling
/// - both capacities are at most [`TreeConfig::MAX_CAPACITY`], so they fit
///   the 32-bit fields of the metadata and node records
/// - `cache_limit >= 1`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeConfig {
    /// Max entries per bucket.
    pub max_bucket_size: usize,
    /// Max children per internal node.
    pub max_btree_size: usize,
    /// Behavior of `set` on an existing key.
    pub duplicate_policy: DuplicatePolicy,
    /// Number of nodes kept cached after a commit.
    pub cache_limit: usize,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            max_bucket_size: Self::DEFAULT_MAX_BUCKET_SIZE,
            max_btree_size: Self::DEFAULT_MAX_BTREE_SIZE,
            duplicate_policy: DuplicatePolicy::Replace,
            cache_limit: Self::DEFAULT_CACHE_LIMIT,
        }
    }
}

impl TreeConfig {
    pub const DEFAULT_MAX_BUCKET_SIZE: usize = 60;
    pub const DEFAULT_MAX_BTREE_SIZE: usize = 500;
    pub const DEFAULT_CACHE_LIMIT: usize = 10_000;

    /// Largest accepted bucket size or fan-out.
    pub const MAX_CAPACITY: usize = 1 << 20;

    const MIN_BUCKET_SIZE: usize = 1;
    const MIN_BTREE_SIZE: usize = 3;

    /// Create a config with explicit capacities and default policies.
    #[must_use]
    pub fn new(max_bucket_size: usize, max_btree_size: usize) -> Self {
        Self {
            max_bucket_size,
            max_btree_size,
            ..Self::default()
        }
    }

    #[must_use]
    pub const fn with_duplicate_policy(mut self, policy: DuplicatePolicy) -> Self {
        self.duplicate_policy = policy;
        self
    }

    #[must_use]
    pub const fn with_cache_limit(mut self, cache_limit: usize) -> Self {
        self.cache_limit = cache_limit;
        self
    }

    /// Check the capacity invariants.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Capacity`] or [`ConfigError::CapacityTooLarge`]
    /// naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_bucket_size < Self::MIN_BUCKET_SIZE {
            return Err(ConfigError::Capacity {
                name: "max_bucket_size",
                value: self.max_bucket_size,
                minimum: Self::MIN_BUCKET_SIZE,
            });
        }
        if self.max_btree_size < Self::MIN_BTREE_SIZE {
            return Err(ConfigError::Capacity {
                name: "max_btree_size",
                value: self.max_btree_size,
                minimum: Self::MIN_BTREE_SIZE,
            });
        }
        for (name, value) in [
            ("max_bucket_size", self.max_bucket_size),
            ("max_btree_size", self.max_btree_size),
        ] {
            if value > Self::MAX_CAPACITY {
                return Err(ConfigError::CapacityTooLarge {
                    name,
                    value,
                    maximum: Self::MAX_CAPACITY,
                });
            }
        }
        if self.cache_limit == 0 {
            return Err(ConfigError::Capacity {
                name: "cache_limit",
                value: 0,
                minimum: 1,
            });
        }
        Ok(())
    }

    /// Fewest entries a non-root bucket may hold.
    #[must_use]
    pub const fn min_bucket_len(&self) -> usize {
        self.max_bucket_size.div_ceil(2)
    }

    /// Fewest children a non-root internal node may hold.
    #[must_use]
    pub const fn min_children(&self) -> usize {
        self.max_btree_size.div_ceil(2)
    }

    /// Load a config from environment variables, falling back to the given
    /// defaults for anything unset.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is set but does not parse, or if the
    /// resulting capacities are invalid.
    pub fn from_env_or(defaults: Self) -> Result<Self, ConfigError> {
        let config = Self {
            max_bucket_size: env_or("BTREES_MAX_BUCKET_SIZE", defaults.max_bucket_size)?,
            max_btree_size: env_or("BTREES_MAX_BTREE_SIZE", defaults.max_btree_size)?,
            duplicate_policy: env_or("BTREES_DUPLICATE_POLICY", defaults.duplicate_policy)?,
            cache_limit: env_or("BTREES_CACHE_LIMIT", defaults.cache_limit)?,
        };
        config.validate()?;
        Ok(config)
    }

    /// Load a config from environment variables over the built-in defaults.
    ///
    /// # Errors
    ///
    /// See [`TreeConfig::from_env_or`].
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_or(Self::default())
    }
}

/// Configuration of the workload driver binary.
#[derive(Debug, Clone)]
pub struct WorkloadConfig {
    /// File backing the object store.
    pub data_file: PathBuf,
    /// Number of random operations to run.
    pub operations: usize,
    /// Seed for the operation generator.
    pub seed: u64,
    /// Capacities for a newly created tree.
    pub tree: TreeConfig,
}

impl WorkloadConfig {
    pub const DEFAULT_DATA_FILE: &'static str = "./btrees.db";
    pub const DEFAULT_OPERATIONS: usize = 10_000;

    /// Load the driver configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if any variable is set but invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        let data_file = std::env::var("BTREES_DATA_FILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(Self::DEFAULT_DATA_FILE));

        Ok(Self {
            data_file,
            operations: env_or("BTREES_OPERATIONS", Self::DEFAULT_OPERATIONS)?,
            seed: env_or("BTREES_SEED", 0)?,
            tree: TreeConfig::from_env()?,
        })
    }
}

/// Parse an environment variable, returning `default` if it is not set.
fn env_or<T>(name: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(value) => value.trim().parse::<T>().map_err(|e| ConfigError::InvalidValue {
            name: name.to_string(),
            message: format!("'{value}': {e}"),
        }),
        Err(_) => Ok(default),
    }
}
