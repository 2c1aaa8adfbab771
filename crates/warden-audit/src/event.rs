//! Audit event types.
//!
//! `AuditEvent` is a single entry in the hash chain. Each trace contributes
//! two: a `start` event carrying the pending record and a `terminal` event
//! carrying the sealed one. The JSON Lines file is a sequence of these.

use serde::{Deserialize, Serialize};

use warden_contracts::audit::AuditRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Start,
    Terminal,
}

/// A single entry in the SHA-256 hash chain.
///
/// Each event commits to the previous event via `prev_hash`, forming an
/// append-only chain. Modifying any field, including those of the embedded
/// `record`, invalidates `this_hash` and every later `prev_hash`, which
/// `verify_chain` detects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Position in the chain, starting at 0.
    pub sequence: u64,

    pub kind: EventKind,

    /// The record as of this event.
    pub record: AuditRecord,

    /// SHA-256 hash (hex) of the previous event, or `GENESIS_HASH` for the
    /// first event.
    pub prev_hash: String,

    /// SHA-256 hash (hex) over (sequence, kind, prev_hash, canonical JSON of
    /// record).
    pub this_hash: String,
}

impl AuditEvent {
    /// The `prev_hash` of the first event in every chain.
    pub const GENESIS_HASH: &'static str =
        "0000000000000000000000000000000000000000000000000000000000000000";
}
