// Reconnection policy and cooperative cancellation

use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Default poll interval for audio devices
pub const AUDIO_RECONNECT_INTERVAL: Duration = Duration::from_millis(2000);
/// Default poll interval for MIDI ports
pub const MIDI_RECONNECT_INTERVAL: Duration = Duration::from_millis(5000);

/// How often the reconnect loop retries faulted ports
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    interval: Duration,
}

impl ReconnectPolicy {
    pub fn new(interval: Duration) -> Self {
        Self {
            // A zero interval would spin
            interval: interval.max(Duration::from_millis(1)),
        }
    }

    pub fn for_audio() -> Self {
        Self::new(AUDIO_RECONNECT_INTERVAL)
    }

    pub fn for_midi() -> Self {
        Self::new(MIDI_RECONNECT_INTERVAL)
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }
}

#[derive(Debug, Default)]
struct Flags {
    cancelled: bool,
    woken: bool,
}

#[derive(Debug, Default)]
struct TokenState {
    flags: Mutex<Flags>,
    condvar: Condvar,
}

/// Cancellation flag a worker can sleep on. Cancelling wakes it immediately;
/// `wake` ends the current sleep early without cancelling.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    state: Arc<TokenState>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    fn flags(&self) -> MutexGuard<'_, Flags> {
        self.state.flags.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn cancel(&self) {
        self.flags().cancelled = true;
        self.state.condvar.notify_all();
    }

    /// Cut the worker's current (or next) sleep short
    pub fn wake(&self) {
        self.flags().woken = true;
        self.state.condvar.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        self.flags().cancelled
    }

    /// Sleep up to `timeout` or until woken. Returns true if the token was cancelled.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut flags = self.flags();

        loop {
            if flags.cancelled {
                return true;
            }
            if flags.woken {
                flags.woken = false;
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            flags = match self.state.condvar.wait_timeout(flags, deadline - now) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
    }
}
