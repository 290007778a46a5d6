/// The three independent tunables of the input and resolution core.
///
/// With the `serde` feature enabled this can be loaded from any serde format; missing fields
/// fall back to their defaults.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct Config {
    /// A press held at least this long counts as a hold (opens a parameter lock) instead of a tap
    pub hold_threshold_ms: u32,
    /// How long a resolved parameter tuple stays fresh. 0 disables expiry.
    pub cache_lifetime_ms: u32,
    /// Inactivity timeout of a parameter lock session. 0 disables the timeout.
    pub lock_timeout_ms: u32,
}

impl Config {
    pub const DEFAULT_HOLD_THRESHOLD_MS: u32 = 500;
    pub const DEFAULT_CACHE_LIFETIME_MS: u32 = 100;
    pub const DEFAULT_LOCK_TIMEOUT_MS: u32 = 10_000;

    pub fn with_hold_threshold(mut self, ms: u32) -> Self {
        self.hold_threshold_ms = ms;
        self
    }

    pub fn with_cache_lifetime(mut self, ms: u32) -> Self {
        self.cache_lifetime_ms = ms;
        self
    }

    pub fn with_lock_timeout(mut self, ms: u32) -> Self {
        self.lock_timeout_ms = ms;
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            hold_threshold_ms: Self::DEFAULT_HOLD_THRESHOLD_MS,
            cache_lifetime_ms: Self::DEFAULT_CACHE_LIFETIME_MS,
            lock_timeout_ms: Self::DEFAULT_LOCK_TIMEOUT_MS,
        }
    }
}
