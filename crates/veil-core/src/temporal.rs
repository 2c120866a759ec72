//! # Temporal Types: UTC Timestamps and Clocks
//!
//! `Timestamp` is a UTC-only instant truncated to seconds. Every temporal
//! guard in the ledger (intent deadlines, batch intervals, UEI idle
//! windows, settlement response windows) compares `Timestamp`s obtained
//! from an injected [`Clock`].
//!
//! ## Security Invariant
//!
//! The matching reference time is the batch's `settle_by`: the end of its
//! response window, recorded once by the ledger at finalization. Committee
//! members never consult their own wall clock when deciding which intents
//! expired, so they cannot diverge on expiry, and no settlement accepted
//! inside the window can include an intent whose deadline has passed.

use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};

use crate::error::VeilError;

/// A UTC-only timestamp, truncated to seconds precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Current UTC time, truncated to seconds.
    pub fn now() -> Self {
        Self(truncate_to_seconds(Utc::now()))
    }

    /// From a `chrono::DateTime<Utc>`, truncating sub-seconds.
    pub fn from_utc(dt: DateTime<Utc>) -> Self {
        Self(truncate_to_seconds(dt))
    }

    /// Parse an RFC 3339 string. Only the `Z` suffix is accepted.
    pub fn parse(s: &str) -> Result<Self, VeilError> {
        if !s.ends_with('Z') {
            return Err(VeilError::Validation(format!(
                "timestamp must use Z suffix (UTC only), got: {s:?}"
            )));
        }
        let dt = DateTime::parse_from_rfc3339(s).map_err(|e| {
            VeilError::Validation(format!("invalid RFC 3339 timestamp {s:?}: {e}"))
        })?;
        Ok(Self(truncate_to_seconds(dt.with_timezone(&Utc))))
    }

    /// From a Unix epoch timestamp in seconds.
    pub fn from_epoch_secs(secs: i64) -> Result<Self, VeilError> {
        let dt = DateTime::from_timestamp(secs, 0)
            .ok_or_else(|| VeilError::Validation(format!("invalid Unix timestamp: {secs}")))?;
        Ok(Self(dt))
    }

    /// Unix epoch seconds.
    pub fn epoch_secs(&self) -> i64 {
        self.0.timestamp()
    }

    /// This instant shifted forward by `secs`, or `None` past chrono's range.
    pub fn plus_secs(&self, secs: u64) -> Option<Self> {
        let secs = i64::try_from(secs).ok()?;
        let target = self.epoch_secs().checked_add(secs)?;
        DateTime::from_timestamp(target, 0).map(Self)
    }

    /// Signed number of seconds from `earlier` to `self`.
    pub fn seconds_since(&self, earlier: Timestamp) -> i64 {
        self.epoch_secs().saturating_sub(earlier.epoch_secs())
    }

    /// Whether at least `secs` seconds separate `earlier` and `self`.
    pub fn has_elapsed(&self, earlier: Timestamp, secs: u64) -> bool {
        let elapsed = self.seconds_since(earlier);
        elapsed >= 0 && elapsed as u64 >= secs
    }

    /// Render as ISO8601 with Z suffix (e.g. `2026-01-15T12:00:00Z`).
    pub fn to_iso8601(&self) -> String {
        self.0.format("%Y-%m-%dT%H:%M:%SZ").to_string()
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_iso8601())
    }
}

fn truncate_to_seconds(dt: DateTime<Utc>) -> DateTime<Utc> {
    dt.with_nanosecond(0).unwrap_or(dt)
}

// ── Clocks ──────────────────────────────────────────────────────────

/// Source of "now" for temporal guards.
pub trait Clock: Send + Sync {
    /// The current instant.
    fn now(&self) -> Timestamp;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Timestamp::now()
    }
}

/// A clock that only moves when told to. Used by tests and the simulator.
#[derive(Debug)]
pub struct ManualClock {
    epoch_secs: AtomicI64,
}

impl ManualClock {
    /// Start at the given instant.
    pub fn new(start: Timestamp) -> Self {
        Self {
            epoch_secs: AtomicI64::new(start.epoch_secs()),
        }
    }

    /// Start at the given epoch second.
    pub fn at_epoch(secs: i64) -> Self {
        Self {
            epoch_secs: AtomicI64::new(secs),
        }
    }

    /// Jump to an absolute instant.
    pub fn set(&self, to: Timestamp) {
        self.epoch_secs.store(to.epoch_secs(), Ordering::SeqCst);
    }

    /// Move forward by `secs`.
    pub fn advance(&self, secs: u64) {
        let delta = i64::try_from(secs).unwrap_or(i64::MAX);
        let _ = self
            .epoch_secs
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |cur| {
                Some(cur.saturating_add(delta))
            });
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        let secs = self.epoch_secs.load(Ordering::SeqCst);
        Timestamp(DateTime::from_timestamp(secs, 0).unwrap_or_default())
    }
}
