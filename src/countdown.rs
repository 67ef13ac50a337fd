// Local bidding countdown derived from an absolute deadline.
//
// The remaining time is recomputed from the monotonic clock on every query
// instead of decrementing a counter, so a stalled tick loop (suspended task,
// slow executor) lands on the correct value the moment it resumes rather
// than drifting. The zero-signal fires exactly once per deadline.

use tokio::time::{Duration, Instant};

/// A self-correcting countdown toward an absolute deadline.
#[derive(Debug)]
pub struct Countdown {
    deadline: Option<Instant>,
    expiry_signaled: bool,
}

impl Countdown {
    /// Create a countdown with no deadline set.
    pub fn new() -> Self {
        Countdown {
            deadline: None,
            expiry_signaled: false,
        }
    }

    /// Arm the countdown: `seconds` from now. Replaces any previous deadline
    /// and cancels its pending zero-signal.
    pub fn set(&mut self, seconds: u32) {
        self.deadline = Some(Instant::now() + Duration::from_secs(u64::from(seconds)));
        self.expiry_signaled = false;
    }

    /// Disarm the countdown. Any pending zero-signal is cancelled.
    pub fn clear(&mut self) {
        self.deadline = None;
        self.expiry_signaled = false;
    }

    /// Whether a deadline is currently set (expired or not).
    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    /// Whole seconds remaining until the deadline, rounded up so a freshly
    /// armed 30s clock reads 30, not 29. Zero once the deadline has passed
    /// or when no deadline is set.
    pub fn seconds_remaining(&self) -> u32 {
        match self.deadline {
            Some(deadline) => {
                let remaining = deadline.saturating_duration_since(Instant::now());
                remaining.as_secs_f64().ceil() as u32
            }
            None => 0,
        }
    }

    /// Poll for expiry. Returns `true` exactly once per deadline, the first
    /// time it is called at or after the deadline; every later poll returns
    /// `false` until a new deadline is set.
    pub fn poll_expired(&mut self) -> bool {
        let Some(deadline) = self.deadline else {
            return false;
        };
        if self.expiry_signaled || Instant::now() < deadline {
            return false;
        }
        self.expiry_signaled = true;
        true
    }
}

impl Default for Countdown {
    fn default() -> Self {
        Self::new()
    }
}
