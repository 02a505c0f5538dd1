//! Transfer root lifecycle.
//!
//! A root's state is derived from the set of indexed events that mention it,
//! never stored. Classification is pure so watchers can recompute it every
//! cycle from freshly fetched records.

use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use crate::indexer::{BondedRecord, ChallengedRecord, CommittedRecord, ConfirmedRecord};
use crate::types::RootHash;

/// An indexed event concerning one transfer root
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RootEvent {
    Committed { root_hash: RootHash, committed_at: u64 },
    Bonded { root_hash: RootHash },
    Challenged { root_hash: RootHash },
    Confirmed { root_hash: RootHash },
    Settled { root_hash: RootHash },
}

impl RootEvent {
    pub fn root_hash(&self) -> RootHash {
        match self {
            RootEvent::Committed { root_hash, .. }
            | RootEvent::Bonded { root_hash }
            | RootEvent::Challenged { root_hash }
            | RootEvent::Confirmed { root_hash }
            | RootEvent::Settled { root_hash } => *root_hash,
        }
    }

    /// State implied by this event alone
    fn implied_state(&self) -> RootState {
        match self {
            RootEvent::Committed { .. } => RootState::Committed,
            RootEvent::Bonded { .. } => RootState::Bonded,
            RootEvent::Challenged { .. } => RootState::Challenged,
            RootEvent::Confirmed { .. } => RootState::Confirmed,
            RootEvent::Settled { .. } => RootState::Settled,
        }
    }
}

impl From<&CommittedRecord> for RootEvent {
    fn from(record: &CommittedRecord) -> Self {
        RootEvent::Committed {
            root_hash: record.root_hash,
            committed_at: record.committed_at(),
        }
    }
}

impl From<&BondedRecord> for RootEvent {
    fn from(record: &BondedRecord) -> Self {
        RootEvent::Bonded {
            root_hash: record.root,
        }
    }
}

impl From<&ChallengedRecord> for RootEvent {
    fn from(record: &ChallengedRecord) -> Self {
        RootEvent::Challenged {
            root_hash: record.root_hash,
        }
    }
}

impl From<&ConfirmedRecord> for RootEvent {
    fn from(record: &ConfirmedRecord) -> Self {
        RootEvent::Confirmed {
            root_hash: record.root_hash,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RootState {
    Pending,
    Committed,
    Bonded,
    Challenged,
    Confirmed,
    Settled,
    /// Committed but neither bonded nor confirmed within the stall timeout
    Stalled,
}

impl RootState {
    fn precedence(&self) -> u8 {
        match self {
            RootState::Pending => 0,
            RootState::Committed | RootState::Stalled => 1,
            RootState::Bonded => 2,
            RootState::Challenged => 3,
            RootState::Confirmed => 4,
            RootState::Settled => 5,
        }
    }

    /// No watcher acts on a root in a final state
    pub fn is_final(&self) -> bool {
        matches!(self, RootState::Confirmed | RootState::Settled)
    }
}

impl fmt::Display for RootState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RootState::Pending => "pending",
            RootState::Committed => "committed",
            RootState::Bonded => "bonded",
            RootState::Challenged => "challenged",
            RootState::Confirmed => "confirmed",
            RootState::Settled => "settled",
            RootState::Stalled => "stalled",
        };
        f.write_str(s)
    }
}

/// Watcher action due for a root
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RootAction {
    Bond,
    Alert,
}

/// Age limits that decide which action is due
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActionPolicy {
    /// Roots committed longer ago than this are no longer bonded
    pub staleness_cutoff: Duration,
}

/// Classify `root_hash` from `events`. Events for other roots are ignored and
/// the order of `events` does not matter.
pub fn classify(root_hash: RootHash, events: &[RootEvent]) -> RootState {
    events
        .iter()
        .filter(|e| e.root_hash() == root_hash)
        .map(RootEvent::implied_state)
        .max_by_key(RootState::precedence)
        .unwrap_or(RootState::Pending)
}

/// Like [`classify`], but a committed root older than `stall_timeout` at `now`
/// is reported as [`RootState::Stalled`]
pub fn classify_at(
    root_hash: RootHash,
    events: &[RootEvent],
    now: u64,
    stall_timeout: Duration,
) -> RootState {
    let state = classify(root_hash, events);
    if state != RootState::Committed {
        return state;
    }

    match committed_at(root_hash, events) {
        Some(at) if now.saturating_sub(at) >= stall_timeout.as_secs() => RootState::Stalled,
        _ => state,
    }
}

/// Earliest commit time recorded for `root_hash`
pub fn committed_at(root_hash: RootHash, events: &[RootEvent]) -> Option<u64> {
    events
        .iter()
        .filter_map(|e| match e {
            RootEvent::Committed {
                root_hash: hash,
                committed_at,
            } if *hash == root_hash => Some(*committed_at),
            _ => None,
        })
        .min()
}

pub fn due_action(state: RootState, committed_age: Duration, policy: &ActionPolicy) -> Option<RootAction> {
    match state {
        RootState::Committed if committed_age < policy.staleness_cutoff => Some(RootAction::Bond),
        RootState::Stalled => Some(RootAction::Alert),
        _ => None,
    }
}

/// Group events by root so a batch of roots can be classified in one pass
pub fn group_by_root(events: impl IntoIterator<Item = RootEvent>) -> HashMap<RootHash, Vec<RootEvent>> {
    let mut grouped: HashMap<RootHash, Vec<RootEvent>> = HashMap::new();
    for event in events {
        grouped.entry(event.root_hash()).or_default().push(event);
    }
    grouped
}
