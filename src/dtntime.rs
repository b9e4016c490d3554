use core::fmt;
use core::time::Duration;
use humantime::format_rfc3339_millis;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

/// Milliseconds since 2000-01-01T00:00:00Z.
pub type DtnTime = u64;

pub const SECONDS1970_TO2K: u64 = 946_684_800;
pub const MILLISECONDS1970_TO2K: u64 = SECONDS1970_TO2K * 1000;
pub const DTN_TIME_EPOCH: DtnTime = 0;

pub trait DtnTimeHelpers {
    fn unix(self) -> u64;
    fn string(self) -> String;
}

impl DtnTimeHelpers for DtnTime {
    /// Convert to unix timestamp in milliseconds.
    fn unix(self) -> u64 {
        self.saturating_add(MILLISECONDS1970_TO2K)
    }

    /// Convert to human readable rfc3339 compliant time string.
    fn string(self) -> String {
        let d = UNIX_EPOCH + Duration::from_millis(self.unix());
        format_rfc3339_millis(d).to_string()
    }
}

/// Get current time as DtnTime timestamp
pub fn dtn_time_now() -> DtnTime {
    let unix_ms = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0);
    unix_ms.saturating_sub(MILLISECONDS1970_TO2K)
}

/// Timestamp when a bundle was created, consisting of the DtnTime and a sequence number.
#[derive(
    Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default,
)]
pub struct CreationTimestamp(DtnTime, u64);

impl fmt::Display for CreationTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} {}", self.0.string(), self.1)
    }
}

impl CreationTimestamp {
    pub fn new() -> CreationTimestamp {
        Default::default()
    }
    pub fn with_time_and_seq(t: DtnTime, seqno: u64) -> CreationTimestamp {
        CreationTimestamp(t, seqno)
    }
    pub fn seqno(&self) -> u64 {
        self.1
    }
    pub fn dtntime(&self) -> DtnTime {
        self.0
    }
    /// Create a new timestamp for the current time, numbered by `counter`.
    ///
    /// # Example
    /// ```
    /// use bp7::dtntime::*;
    ///
    /// let counter = SequenceCounter::new();
    /// let time1 = CreationTimestamp::now(&counter);
    /// let time2 = CreationTimestamp::now(&counter);
    ///
    /// assert!(time1 < time2);
    /// ```
    pub fn now(counter: &SequenceCounter) -> CreationTimestamp {
        counter.next(dtn_time_now())
    }
}

#[derive(Debug, Default)]
struct CounterState {
    last_time: DtnTime,
    seq: u64,
    used: bool,
}

/// Hands out creation timestamps that are strictly increasing.
///
/// A fresh millisecond restarts the sequence at 0. Repeated or older clock
/// readings keep the last time and bump the sequence number instead, so a
/// clock that steps backwards never produces a duplicate.
#[derive(Debug, Default)]
pub struct SequenceCounter {
    state: Mutex<CounterState>,
}

impl SequenceCounter {
    pub fn new() -> SequenceCounter {
        Default::default()
    }

    pub fn next(&self, now: DtnTime) -> CreationTimestamp {
        let mut state = self
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if !state.used || now > state.last_time {
            state.last_time = now;
            state.seq = 0;
            state.used = true;
        } else {
            state.seq += 1;
        }
        CreationTimestamp(state.last_time, state.seq)
    }
}
