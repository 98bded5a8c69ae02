//! Time source for link deadlines

/// Monotonic millisecond clock.
///
/// The link measures every deadline against this clock and yields between
/// event drains through an `embedded_hal::delay::DelayNs`, so tests can run
/// the blocking loops on simulated time.
pub trait Clock {
    fn now_ms(&self) -> u64;
}

impl<C: Clock + ?Sized> Clock for &C {
    fn now_ms(&self) -> u64 {
        (**self).now_ms()
    }
}

#[cfg(test)]
pub mod mock {
    //! Simulated time for testing

    use super::Clock;
    use embedded_hal::delay::DelayNs;
    use std::cell::Cell;
    use std::rc::Rc;

    /// Shared simulated clock, advanced only by [`SimDelay`] or by hand
    #[derive(Debug, Clone, Default)]
    pub struct SimClock {
        nanos: Rc<Cell<u64>>,
    }

    impl SimClock {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn advance_ms(&self, ms: u64) {
            self.advance_ns(ms * 1_000_000);
        }

        fn advance_ns(&self, ns: u64) {
            self.nanos.set(self.nanos.get() + ns);
        }

        /// Delay that advances this clock instead of sleeping
        pub fn delay(&self) -> SimDelay {
            SimDelay {
                clock: self.clone(),
            }
        }
    }

    impl Clock for SimClock {
        fn now_ms(&self) -> u64 {
            self.nanos.get() / 1_000_000
        }
    }

    pub struct SimDelay {
        clock: SimClock,
    }

    impl DelayNs for SimDelay {
        fn delay_ns(&mut self, ns: u32) {
            self.clock.advance_ns(ns as u64);
        }

        fn delay_ms(&mut self, ms: u32) {
            self.clock.advance_ms(ms as u64);
        }
    }

    /// Simulated delay that runs `step` on every tick, so a second node
    /// sharing the clock makes progress while this one waits
    pub struct SteppedDelay<F: FnMut()> {
        delay: SimDelay,
        step: F,
    }

    impl<F: FnMut()> SteppedDelay<F> {
        pub fn new(clock: &SimClock, step: F) -> Self {
            Self {
                delay: clock.delay(),
                step,
            }
        }
    }

    impl<F: FnMut()> DelayNs for SteppedDelay<F> {
        fn delay_ns(&mut self, ns: u32) {
            (self.step)();
            self.delay.delay_ns(ns);
        }

        fn delay_ms(&mut self, ms: u32) {
            (self.step)();
            self.delay.delay_ms(ms);
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn test_sim_delay_advances_shared_clock() {
            let clock = SimClock::new();
            let mut delay = clock.delay();

            delay.delay_ms(5);
            delay.delay_us(1500);
            assert_eq!(clock.now_ms(), 6);
        }

        #[test]
        fn test_stepped_delay_runs_step_per_tick() {
            let clock = SimClock::new();
            let mut ticks = 0;
            let mut delay = SteppedDelay::new(&clock, || ticks += 1);

            delay.delay_ms(1);
            delay.delay_ms(1);
            drop(delay);

            assert_eq!(ticks, 2);
            assert_eq!(clock.now_ms(), 2);
        }
    }
}
