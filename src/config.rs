use std::{env, str::FromStr, time::Duration};

use log::debug;
use once_cell::sync::Lazy;

pub const DEFAULT_PAGE_SIZE: usize = 4096;

/// Default number of resident pages a buffer pool may hold.
pub const DEFAULT_POOL_CAPACITY: usize = 50;

pub const DEFAULT_LOCK_RETRIES: usize = 300;
pub const DEFAULT_LOCK_WAIT_MS: u64 = 10;
pub const DEFAULT_LOCK_SHARDS: usize = 64;

const PAGE_SIZE_ENV: &str = "PAGELOCK_PAGE_SIZE";
const POOL_CAPACITY_ENV: &str = "PAGELOCK_POOL_CAPACITY";
const LOCK_RETRIES_ENV: &str = "PAGELOCK_LOCK_RETRIES";
const LOCK_WAIT_MS_ENV: &str = "PAGELOCK_LOCK_WAIT_MS";

// The page size is shared by every component that computes offsets, so it is
// fixed for the lifetime of the process.
static PAGE_SIZE: Lazy<usize> = Lazy::new(|| {
    let size = env_or(PAGE_SIZE_ENV, DEFAULT_PAGE_SIZE);
    debug!("page size: {}", size);
    size
});

pub fn page_size() -> usize {
    *PAGE_SIZE
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(v) => v.parse().unwrap_or(default),
        Err(_) => default,
    }
}

#[derive(Debug, Clone)]
pub struct LockConfig {
    /// How many times a blocked request is re-evaluated before it is
    /// treated as a deadlock.
    pub max_retries: usize,

    /// Upper bound of a single wait between two evaluations. A release on
    /// the same shard wakes the waiter earlier.
    pub wait_interval: Duration,

    /// Number of independently locked partitions of the lock table.
    pub shards: usize,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_LOCK_RETRIES,
            wait_interval: Duration::from_millis(DEFAULT_LOCK_WAIT_MS),
            shards: DEFAULT_LOCK_SHARDS,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub pool_capacity: usize,
    pub lock: LockConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            pool_capacity: DEFAULT_POOL_CAPACITY,
            lock: LockConfig::default(),
        }
    }
}

impl Config {
    pub fn with_capacity(pool_capacity: usize) -> Self {
        Self {
            pool_capacity,
            ..Self::default()
        }
    }

    /// Start from the defaults and apply the `PAGELOCK_*` environment
    /// variables that are present and parse.
    pub fn from_env() -> Self {
        let lock = LockConfig {
            max_retries: env_or(LOCK_RETRIES_ENV, DEFAULT_LOCK_RETRIES),
            wait_interval: Duration::from_millis(env_or(
                LOCK_WAIT_MS_ENV,
                DEFAULT_LOCK_WAIT_MS,
            )),
            shards: DEFAULT_LOCK_SHARDS,
        };
        Self {
            pool_capacity: env_or(POOL_CAPACITY_ENV, DEFAULT_POOL_CAPACITY),
            lock,
        }
    }
}
