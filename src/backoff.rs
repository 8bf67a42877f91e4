use std::time::Duration;

use rand::Rng;

/// Exponential delay schedule with jitter and a mandatory stop, used to
/// pace reconnect attempts.
///
/// `next()` doubles the delay each call up to `max`, adds up to 10% jitter,
/// and once the un-jittered delay would exceed `mandatory_stop` it instead
/// keeps returning delays clamped to `max` forever (the client never gives
/// up retrying on its own; `subscribe_timeout` is what decides permanent
/// failure, not the backoff).
pub struct Backoff {
    initial: Duration,
    max: Duration,
    mandatory_stop: Duration,
    current: Duration,
    elapsed: Duration,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration, mandatory_stop: Duration) -> Self {
        Backoff {
            initial,
            max,
            mandatory_stop,
            current: Duration::ZERO,
            elapsed: Duration::ZERO,
        }
    }

    /// Compute the next delay and advance internal state. Takes an `Rng` so
    /// tests can supply a deterministic source.
    pub fn next_with_rng(&mut self, rng: &mut impl Rng) -> Duration {
        let base = if self.current.is_zero() {
            self.initial
        } else {
            (self.current * 2).min(self.max)
        };
        self.current = base;
        self.elapsed += base;

        let capped = if self.elapsed > self.mandatory_stop { self.max } else { base };

        let jitter_max_millis = (capped.as_millis() / 10) as u64;
        let jitter = if jitter_max_millis > 0 {
            Duration::from_millis(rng.gen_range(0..=jitter_max_millis))
        } else {
            Duration::ZERO
        };
        capped + jitter
    }

    pub fn next(&mut self) -> Duration {
        self.next_with_rng(&mut rand::thread_rng())
    }

    /// Reset the schedule, e.g. after a successful `ConnectionOpened`.
    pub fn reset(&mut self) {
        self.current = Duration::ZERO;
        self.elapsed = Duration::ZERO;
    }
}
