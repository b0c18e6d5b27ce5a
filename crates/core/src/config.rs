//! Prerender configuration
//!
//! Settings can be built programmatically, loaded from a TOML file, or read
//! from `PRERENDER_*` environment variables. Missing keys fall back to the
//! defaults.

use std::fs;
use std::io;
use std::path::Path;
use std::time::Duration;

use prerender_cache::ram::{DEFAULT_MAX_ITEMS, DEFAULT_MEMORY_LIMIT};
use prerender_scheduler::ideal_parallelism;
use serde::{Deserialize, Serialize};

use crate::predictor::{
    PrerenderStrategy, DEFAULT_LOOKAHEAD_RADIUS, MAX_LOOKAHEAD_RADIUS, MIN_LOOKAHEAD_RADIUS,
};

const MB: usize = 1024 * 1024;

/// Configuration for the prerender coordinator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrerenderConfig {
    /// Prediction strategy
    pub strategy: PrerenderStrategy,

    /// Worker thread count, clamped to `[1, ideal_parallelism()]`
    pub max_worker_threads: usize,

    /// Maximum number of cached pages
    pub max_cache_items: usize,

    /// Cache memory budget in bytes
    pub max_memory_bytes: usize,

    /// Initial lookahead radius for the adaptive predictor
    pub lookahead_radius: usize,

    /// Display pixel ratio multiplied into the render DPI
    pub device_pixel_ratio: f64,

    /// How long `stop()` waits for workers before detaching them
    pub shutdown_timeout_ms: u64,

    /// Period of the adaptive reading analysis
    pub adaptive_interval_ms: u64,

    /// Delay between a scroll direction change and the resulting prediction
    pub scroll_debounce_ms: u64,
}

impl Default for PrerenderConfig {
    fn default() -> Self {
        Self {
            strategy: PrerenderStrategy::default(),
            max_worker_threads: ideal_parallelism(),
            max_cache_items: DEFAULT_MAX_ITEMS,
            max_memory_bytes: DEFAULT_MEMORY_LIMIT,
            lookahead_radius: DEFAULT_LOOKAHEAD_RADIUS,
            device_pixel_ratio: 1.0,
            shutdown_timeout_ms: 3_000,
            adaptive_interval_ms: 30_000,
            scroll_debounce_ms: 100,
        }
    }
}

impl PrerenderConfig {
    /// Sets the prediction strategy.
    pub fn with_strategy(mut self, strategy: PrerenderStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Sets the worker thread count.
    pub fn with_max_worker_threads(mut self, threads: usize) -> Self {
        self.max_worker_threads = threads;
        self
    }

    /// Sets the maximum number of cached pages.
    pub fn with_max_cache_items(mut self, items: usize) -> Self {
        self.max_cache_items = items;
        self
    }

    /// Sets the cache memory budget in bytes.
    pub fn with_max_memory_bytes(mut self, bytes: usize) -> Self {
        self.max_memory_bytes = bytes;
        self
    }

    /// Sets the cache memory budget in megabytes.
    pub fn with_max_memory_mb(mut self, mb: usize) -> Self {
        self.max_memory_bytes = mb.saturating_mul(MB);
        self
    }

    /// Sets the initial lookahead radius.
    pub fn with_lookahead_radius(mut self, radius: usize) -> Self {
        self.lookahead_radius = radius;
        self
    }

    /// Sets the display pixel ratio.
    pub fn with_device_pixel_ratio(mut self, ratio: f64) -> Self {
        self.device_pixel_ratio = ratio;
        self
    }

    /// Sets the shutdown timeout.
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Sets the adaptive analysis period.
    pub fn with_adaptive_interval(mut self, interval: Duration) -> Self {
        self.adaptive_interval_ms = interval.as_millis() as u64;
        self
    }

    /// Sets the scroll debounce delay.
    pub fn with_scroll_debounce(mut self, debounce: Duration) -> Self {
        self.scroll_debounce_ms = debounce.as_millis() as u64;
        self
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }

    pub fn adaptive_interval(&self) -> Duration {
        Duration::from_millis(self.adaptive_interval_ms)
    }

    pub fn scroll_debounce(&self) -> Duration {
        Duration::from_millis(self.scroll_debounce_ms)
    }

    /// Returns the memory budget in megabytes.
    pub fn max_memory_mb(&self) -> usize {
        self.max_memory_bytes / MB
    }

    /// Worker count after clamping to `[1, ideal_parallelism()]`.
    pub fn effective_worker_threads(&self) -> usize {
        clamp_worker_threads(self.max_worker_threads)
    }

    /// Lookahead radius after clamping to the adaptive range.
    pub fn effective_lookahead_radius(&self) -> usize {
        self.lookahead_radius
            .clamp(MIN_LOOKAHEAD_RADIUS, MAX_LOOKAHEAD_RADIUS)
    }

    /// Checks values that cannot be clamped into range.
    ///
    /// # Errors
    /// Returns an error naming the first invalid key.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.device_pixel_ratio.is_finite() && self.device_pixel_ratio > 0.0) {
            return Err(ConfigError::InvalidValue("device_pixel_ratio".to_string()));
        }
        if self.max_cache_items == 0 {
            return Err(ConfigError::InvalidValue("max_cache_items".to_string()));
        }
        Ok(())
    }

    /// Loads configuration from environment variables.
    ///
    /// Environment variables:
    /// - `PRERENDER_STRATEGY`: conservative, balanced or aggressive
    /// - `PRERENDER_MAX_WORKERS`: worker thread count
    /// - `PRERENDER_MAX_CACHE_ITEMS`: maximum cached pages (default: 100)
    /// - `PRERENDER_MAX_MEMORY_MB`: cache memory budget in MB (default: 512)
    /// - `PRERENDER_LOOKAHEAD_RADIUS`: initial lookahead radius (default: 3)
    ///
    /// # Errors
    /// Returns an error if any environment variable contains an invalid value.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().merge_env()
    }

    /// Overrides fields with any `PRERENDER_*` variables that are set.
    ///
    /// # Errors
    /// Returns an error if any environment variable contains an invalid value.
    pub fn merge_env(mut self) -> Result<Self, ConfigError> {
        if let Ok(val) = std::env::var("PRERENDER_STRATEGY") {
            self.strategy = val
                .parse()
                .map_err(|_| ConfigError::InvalidValue("PRERENDER_STRATEGY".to_string()))?;
        }

        if let Some(threads) = env_usize("PRERENDER_MAX_WORKERS")? {
            self.max_worker_threads = threads;
        }

        if let Some(items) = env_usize("PRERENDER_MAX_CACHE_ITEMS")? {
            self.max_cache_items = items;
        }

        if let Some(mb) = env_usize("PRERENDER_MAX_MEMORY_MB")? {
            self.max_memory_bytes = mb.saturating_mul(MB);
        }

        if let Some(radius) = env_usize("PRERENDER_LOOKAHEAD_RADIUS")? {
            self.lookahead_radius = radius;
        }

        self.validate()?;
        Ok(self)
    }

    /// Loads configuration from a TOML file.
    ///
    /// Expected file format:
    /// ```toml
    /// strategy = "aggressive"
    /// max_worker_threads = 4
    /// max_cache_items = 200
    /// max_memory_bytes = 268435456
    /// ```
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path.as_ref())?;
        Self::from_toml(&contents)
    }

    /// Parses configuration from a TOML string.
    ///
    /// # Errors
    /// Returns an error if the string is not valid TOML for this type or
    /// holds an invalid value.
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(toml_str)?;
        config.validate()?;
        Ok(config)
    }

    /// Saves configuration to a TOML file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be written.
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        fs::write(path.as_ref(), self.to_toml()?)?;
        Ok(())
    }

    /// Converts configuration to TOML format.
    ///
    /// # Errors
    /// Returns an error if serialization fails.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string(self)?)
    }
}

/// Clamp a requested worker count to `[1, ideal_parallelism()]`.
pub fn clamp_worker_threads(threads: usize) -> usize {
    threads.clamp(1, ideal_parallelism())
}

fn env_usize(name: &str) -> Result<Option<usize>, ConfigError> {
    match std::env::var(name) {
        Ok(val) => val
            .trim()
            .parse::<usize>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue(name.to_string())),
        Err(_) => Ok(None),
    }
}

/// Errors that can occur during configuration operations.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Invalid value for a configuration parameter
    #[error("Invalid value for configuration key: {0}")]
    InvalidValue(String),

    /// I/O error reading or writing configuration file
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Malformed TOML
    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// Configuration could not be serialized
    #[error("Serialize error: {0}")]
    Serialize(#[from] toml::ser::Error),
}
