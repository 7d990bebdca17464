use std::time::{Duration, Instant};

/// Time source for job polling.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
    fn sleep(&self, duration: Duration);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

#[cfg(test)]
pub(crate) mod manual {
    use std::sync::Arc;

    use parking_lot::Mutex;

    use super::*;

    /// Clock that only moves when something sleeps on it.
    pub(crate) struct ManualClock {
        origin: Instant,
        elapsed: Mutex<Duration>,
        sleeps: Mutex<Vec<Duration>>,
    }

    impl ManualClock {
        pub(crate) fn new() -> Arc<Self> {
            Arc::new(Self {
                origin: Instant::now(),
                elapsed: Mutex::new(Duration::ZERO),
                sleeps: Mutex::new(Vec::new()),
            })
        }

        pub(crate) fn sleeps(&self) -> Vec<Duration> {
            self.sleeps.lock().clone()
        }

        pub(crate) fn elapsed(&self) -> Duration {
            *self.elapsed.lock()
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> Instant {
            self.origin + *self.elapsed.lock()
        }

        fn sleep(&self, duration: Duration) {
            *self.elapsed.lock() += duration;
            self.sleeps.lock().push(duration);
        }
    }
}
