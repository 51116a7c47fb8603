//! This file implements the timing primitives used by pico488.
//!
//! The handshake engine never reads a hardware timer directly.  Instead it is
//! given a [`Clock`], and every blocking wait is bracketed by a
//! [`BoundedWait`], which captures its own start time and releases the
//! millisecond tick when it goes out of scope.  On target the clock is backed
//! by embassy-time, and in the unit tests by a simulated clock.

// Copyright (c) 2025 Piers Finlayson <piers@piers.rocks>
//
// GPLv3 licensed - see https://www.gnu.org/licenses/gpl-3.0.html

/// A monotonic millisecond time source, plus a microsecond busy-wait.
///
/// `now_ms()` is allowed to wrap - users must only ever compare values using
/// wrapping subtraction.
pub trait Clock {
    /// Current time in milliseconds.
    fn now_ms(&self) -> u32;

    /// Busy-wait for at least `us` microseconds.
    fn delay_us(&self, us: u32);

    /// Called when a bounded wait begins.  Clocks driven by a periodic
    /// interrupt use this to enable it.
    fn tick_enable(&self) {}

    /// Called when a bounded wait ends, on every exit path.
    fn tick_disable(&self) {}
}

/// A single timeout-bounded wait.
///
/// Created immediately before polling a bus line, so each wait gets the full
/// configured bound regardless of how long previous waits took.  The tick is
/// enabled on creation and disabled on drop.
pub struct BoundedWait<'a, C: Clock> {
    clock: &'a C,
    start: u32,
    limit_ms: u32,
}

impl<'a, C: Clock> BoundedWait<'a, C> {
    /// Arms a new wait of `limit_ms` milliseconds.
    pub fn start(clock: &'a C, limit_ms: u32) -> Self {
        clock.tick_enable();
        let start = clock.now_ms();
        Self {
            clock,
            start,
            limit_ms,
        }
    }

    /// Milliseconds elapsed since this wait was armed.
    pub fn elapsed_ms(&self) -> u32 {
        self.clock.now_ms().wrapping_sub(self.start)
    }

    /// Whether the bound has been reached.
    #[inline(always)]
    pub fn expired(&self) -> bool {
        self.elapsed_ms() >= self.limit_ms
    }
}

impl<C: Clock> Drop for BoundedWait<'_, C> {
    fn drop(&mut self) {
        self.clock.tick_disable();
    }
}

#[cfg(feature = "firmware")]
pub use embassy::{EmbassyClock, block_for, block_until};

#[cfg(feature = "firmware")]
mod embassy {
    use embassy_time::{Duration, Instant};

    use super::Clock;

    /// Block until a specific instant.  This is similar to the
    /// embassy-time::Delay::block_for function.
    ///
    /// We always inline it to reduce function call/return overhead, as this
    /// is typically used in timing critical functions
    #[inline(always)]
    pub fn block_until(expires: Instant) {
        while Instant::now() < expires {}
    }

    /// Function to block for a specific Duration.
    #[inline(always)]
    pub fn block_for(duration: Duration) {
        block_until(Instant::now() + duration);
    }

    /// [`Clock`] backed by the embassy-rp time driver.
    ///
    /// The RP time driver runs a free-running 1MHz counter, so there is no
    /// tick interrupt to gate and the tick hooks are left as no-ops.
    #[derive(Clone, Copy, Default)]
    pub struct EmbassyClock;

    impl Clock for EmbassyClock {
        fn now_ms(&self) -> u32 {
            // Truncation is intended - callers use wrapping arithmetic.
            Instant::now().as_millis() as u32
        }

        fn delay_us(&self, us: u32) {
            block_for(Duration::from_micros(us as u64));
        }
    }
}

/// Macro which yields to the scheduler for at least the specified time.  As
/// embassy will only come back to us after whatever has been scheduled has
/// paused, it could be longer than specified.
#[cfg(feature = "firmware")]
macro_rules! yield_ms {
    ($ms:expr) => {
        embassy_time::Timer::after_millis($ms).await
    };
}
#[cfg(feature = "firmware")]
pub(crate) use yield_ms;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::sim::SimClock;

    #[test]
    fn wait_expires_at_bound() {
        let clock = SimClock::new();
        let wait = BoundedWait::start(&clock, 5);
        let mut polls = 0;
        while !wait.expired() {
            polls += 1;
        }
        // Each now_ms() advances the simulated clock 1ms, so the wait expires
        // on the fifth check.
        assert_eq!(polls, 4);
    }

    #[test]
    fn zero_bound_expires_immediately() {
        let clock = SimClock::new();
        let wait = BoundedWait::start(&clock, 0);
        assert!(wait.expired());
    }

    #[test]
    fn tick_released_on_drop() {
        let clock = SimClock::new();
        {
            let _wait = BoundedWait::start(&clock, 10);
            assert!(clock.tick_running());
        }
        assert!(!clock.tick_running());
        assert_eq!(clock.tick_enables(), 1);
    }

    #[test]
    fn elapsed_survives_wrap() {
        let clock = SimClock::starting_at(u32::MAX - 1);
        let wait = BoundedWait::start(&clock, 3);
        assert!(!wait.expired());
        assert!(!wait.expired());
        assert!(wait.expired());
    }
}
