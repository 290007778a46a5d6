//! Time sources.
//!
//! The core never asks the operating system for the time on its own. Components that need a
//! monotonic clock receive one at construction, so tests can drive time by hand through
//! [`MockClock`].

use std::cell::Cell;
use std::rc::Rc;

/// A monotonic time source
pub trait Clock {
    /// Milliseconds since some fixed origin. Must never decrease.
    fn now_ms(&self) -> u32;

    /// Microseconds since the same origin. Used to measure how long a parameter resolution took.
    fn now_us(&self) -> u64 {
        self.now_ms() as u64 * 1000
    }
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now_ms(&self) -> u32 {
        (**self).now_ms()
    }

    fn now_us(&self) -> u64 {
        (**self).now_us()
    }
}

impl<C: Clock + ?Sized> Clock for Rc<C> {
    fn now_ms(&self) -> u32 {
        (**self).now_ms()
    }

    fn now_us(&self) -> u64 {
        (**self).now_us()
    }
}

/// Wall clock backed by [`std::time::Instant`], counting from its creation
#[derive(Debug, Copy, Clone)]
pub struct SystemClock {
    origin: std::time::Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: std::time::Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_ms(&self) -> u32 {
        // wraps after ~49 days, same as a 32 bit hardware millisecond counter
        self.origin.elapsed().as_millis() as u32
    }

    fn now_us(&self) -> u64 {
        self.origin.elapsed().as_micros() as u64
    }
}

/// A clock that only moves when told to.
///
/// Interior mutability lets a single `MockClock` be shared (by reference or `Rc`) between the
/// components under test and the test itself.
#[derive(Debug, Default)]
pub struct MockClock {
    now_ms: Cell<u32>,
    // extra microseconds that elapse during each `now_us` call, to simulate slow resolutions
    us_per_read: Cell<u64>,
    us_offset: Cell<u64>,
}

impl MockClock {
    pub fn new(initial_ms: u32) -> Self {
        Self {
            now_ms: Cell::new(initial_ms),
            ..Default::default()
        }
    }

    pub fn set(&self, ms: u32) {
        self.now_ms.set(ms);
    }

    pub fn advance(&self, ms: u32) {
        self.now_ms.set(self.now_ms.get().wrapping_add(ms));
    }

    /// Makes every subsequent `now_us` read advance the microsecond counter by `us`
    pub fn set_us_per_read(&self, us: u64) {
        self.us_per_read.set(us);
    }
}

impl Clock for MockClock {
    fn now_ms(&self) -> u32 {
        self.now_ms.get()
    }

    fn now_us(&self) -> u64 {
        let offset = self.us_offset.get() + self.us_per_read.get();
        self.us_offset.set(offset);
        self.now_ms.get() as u64 * 1000 + offset
    }
}
