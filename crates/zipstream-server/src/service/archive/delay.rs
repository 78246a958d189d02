//! Post-chunk delay strategies.
//!
//! Delays exist to imitate an unstable client connection while testing how
//! downloads behave when interrupted. Production deployments use [`NoDelay`].

use std::fmt;
use std::time::Duration;

use rand::Rng;

/// Default upper bound of [`RandomJitter`] in whole seconds.
pub const DEFAULT_JITTER_MAX_SECS: u64 = 5;

/// Decides how long the streaming loop pauses after each written chunk.
pub trait ChunkDelay: fmt::Debug + Send + Sync + 'static {
    /// Returns the pause to apply after a chunk, if any.
    fn next_delay(&self) -> Option<Duration>;
}

/// Never pauses.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoDelay;

impl ChunkDelay for NoDelay {
    #[inline]
    fn next_delay(&self) -> Option<Duration> {
        None
    }
}

/// Pauses for a uniformly random whole number of seconds in `0..=max`.
#[derive(Debug, Clone, Copy)]
pub struct RandomJitter {
    max_secs: u64,
}

impl RandomJitter {
    /// Creates a jitter with the given inclusive upper bound.
    pub const fn new(max_secs: u64) -> Self {
        Self { max_secs }
    }

    /// Returns the inclusive upper bound in seconds.
    #[inline]
    pub const fn max_secs(&self) -> u64 {
        self.max_secs
    }
}

impl Default for RandomJitter {
    fn default() -> Self {
        Self::new(DEFAULT_JITTER_MAX_SECS)
    }
}

impl ChunkDelay for RandomJitter {
    fn next_delay(&self) -> Option<Duration> {
        let secs = rand::rng().random_range(0..=self.max_secs);
        Some(Duration::from_secs(secs))
    }
}
