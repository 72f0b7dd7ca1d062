//! Shutdown coordination: the one-way stop flag and the duration timer

use std::{
    fmt,
    sync::{
        atomic::{AtomicU8, Ordering},
        Arc, Mutex, PoisonError,
    },
    time::Duration,
};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use tracing::{debug, info};

// Encoded in the flag itself, 0 means still running
const RUNNING: u8 = 0;

/// Who ended the session
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum StopReason {
    /// The configured capture duration elapsed
    Duration = 1,
    /// SIGINT/SIGTERM
    Interrupt = 2,
    /// The driver stopped delivering on its own (end of a replay file, etc.)
    DeviceFinished = 3,
    /// Something broke (sink write failure, driver error)
    Fatal = 4,
}

impl StopReason {
    fn from_u8(v: u8) -> Option<Self> {
        match v {
            1 => Some(Self::Duration),
            2 => Some(Self::Interrupt),
            3 => Some(Self::DeviceFinished),
            4 => Some(Self::Fatal),
            _ => None,
        }
    }
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Duration => "duration elapsed",
            Self::Interrupt => "interrupted",
            Self::DeviceFinished => "device finished",
            Self::Fatal => "fatal error",
        };
        f.write_str(s)
    }
}

#[derive(Debug)]
struct Shared {
    state: AtomicU8,
    // Nothing is ever sent. Dropping the sender disconnects `wake`, which releases
    // every blocked waiter at once.
    wake_tx: Mutex<Option<Sender<()>>>,
    wake: Receiver<()>,
}

/// Shared, one-way stop flag.
///
/// Clones share the same flag. Once triggered it never resets, and only the first
/// trigger's reason is kept. Ordering is relaxed: the flag gates cooperative shutdown,
/// it does not publish data.
#[derive(Clone, Debug)]
pub struct StopSignal {
    shared: Arc<Shared>,
}

impl Default for StopSignal {
    fn default() -> Self {
        let (tx, rx) = crossbeam_channel::bounded(0);
        Self {
            shared: Arc::new(Shared {
                state: AtomicU8::new(RUNNING),
                wake_tx: Mutex::new(Some(tx)),
                wake: rx,
            }),
        }
    }
}

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the flag. Returns true only for the call that actually flipped it.
    pub fn trigger(&self, reason: StopReason) -> bool {
        let flipped = self
            .shared
            .state
            .compare_exchange(RUNNING, reason as u8, Ordering::Relaxed, Ordering::Relaxed)
            .is_ok();
        if flipped {
            let mut tx = self
                .shared
                .wake_tx
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            tx.take();
        }
        flipped
    }

    pub fn is_set(&self) -> bool {
        self.shared.state.load(Ordering::Relaxed) != RUNNING
    }

    /// The reason recorded by the first trigger, if any
    pub fn reason(&self) -> Option<StopReason> {
        StopReason::from_u8(self.shared.state.load(Ordering::Relaxed))
    }

    /// Block for up to `timeout`, returning early once the flag is set.
    /// Returns whether the flag is set.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        if self.is_set() {
            return true;
        }
        match self.shared.wake.recv_timeout(timeout) {
            Err(RecvTimeoutError::Disconnected) => true,
            _ => self.is_set(),
        }
    }
}

/// Ends the session after `duration` unless something else ends it first.
///
/// Meant to run on its own (joined) thread. Returns true if the timer was the one
/// that set the flag.
pub fn duration_timer(stop: &StopSignal, duration: Duration) -> bool {
    if stop.wait_timeout(duration) {
        debug!(reason = ?stop.reason(), "Session stopped before the duration elapsed");
        return false;
    }
    let fired = stop.trigger(StopReason::Duration);
    if fired {
        info!("Capture duration of {:?} elapsed", duration);
    }
    fired
}
