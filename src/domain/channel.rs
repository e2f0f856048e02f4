//! Channel identity and lifecycle.
//!
//! A channel is the registry's record of one subscriber's live delivery
//! handle for a subject key. Every channel instance gets a fresh
//! [`ChannelId`] so that a retirement can tell "my entry" apart from a
//! replacement registered under the same key.

use std::fmt;

/// Unique identity of one channel instance.
///
/// Identifiers are never reused within a registry, so comparing ids is
/// enough to decide whether a map entry still belongs to a given subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelId(u64);

impl ChannelId {
    /// Wrap a raw identifier.
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw identifier value.
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ch-{}", self.0)
    }
}

/// Lifecycle state of a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    /// Registered and able to receive pushes
    Open,
    /// Terminated; no further events will be delivered
    Retired,
}

impl ChannelState {
    /// Returns true if the channel can still receive events.
    pub fn is_open(&self) -> bool {
        matches!(self, ChannelState::Open)
    }
}

/// Why a channel was retired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetireReason {
    /// The subscriber closed or dropped its handle
    Completed,
    /// The stream outlived its configured timeout
    TimedOut,
    /// The outer transport reported a write error
    Errored,
    /// The registry could not hand an event to the subscriber
    SendFailed,
}

impl RetireReason {
    /// Short lowercase label used in structured log fields.
    pub fn as_str(&self) -> &'static str {
        match self {
            RetireReason::Completed => "completed",
            RetireReason::TimedOut => "timed_out",
            RetireReason::Errored => "errored",
            RetireReason::SendFailed => "send_failed",
        }
    }
}

impl fmt::Display for RetireReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
