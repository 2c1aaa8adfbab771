//! Hash-chain primitives: hashing and chain integrity verification.
//!
//! Hash input layout (bytes, in order):
//!   1. sequence as 8-byte little-endian
//!   2. kind as UTF-8 (`start` / `terminal`)
//!   3. prev_hash as UTF-8 bytes (64 ASCII hex chars)
//!   4. canonical JSON of record (serde_json, no pretty-printing)

use sha2::{Digest, Sha256};

use warden_contracts::{
    audit::AuditRecord,
    error::{WardenError, WardenResult},
};

use crate::event::{AuditEvent, EventKind};

/// Compute the SHA-256 hash for a single audit event.
///
/// Returns a lowercase 64-character hex string.
pub fn hash_event(
    sequence: u64,
    kind: EventKind,
    record: &AuditRecord,
    prev_hash: &str,
) -> WardenResult<String> {
    let record_json = serde_json::to_vec(record).map_err(|e| WardenError::AuditWriteFailed {
        reason: format!("audit record is not serializable: {e}"),
    })?;
    let kind = match kind {
        EventKind::Start => "start",
        EventKind::Terminal => "terminal",
    };

    let mut hasher = Sha256::new();
    hasher.update(sequence.to_le_bytes());
    hasher.update(kind.as_bytes());
    hasher.update(prev_hash.as_bytes());
    hasher.update(&record_json);

    Ok(hex::encode(hasher.finalize()))
}

/// The sequence number of the first event that breaks the chain, if any.
///
/// An event breaks the chain when its sequence is out of place, its
/// `prev_hash` does not equal the previous event's `this_hash` (or
/// `GENESIS_HASH` for event 0), or its `this_hash` does not match the value
/// recomputed from its own fields.
pub fn find_break(events: &[AuditEvent]) -> Option<u64> {
    let mut expected_prev = AuditEvent::GENESIS_HASH;

    for (position, event) in events.iter().enumerate() {
        if event.sequence != position as u64 || event.prev_hash != expected_prev {
            return Some(event.sequence);
        }
        match hash_event(event.sequence, event.kind, &event.record, &event.prev_hash) {
            Ok(recomputed) if recomputed == event.this_hash => {}
            _ => return Some(event.sequence),
        }
        expected_prev = &event.this_hash;
    }

    None
}

/// True when the chain is intact. An empty chain is valid.
pub fn verify_chain(events: &[AuditEvent]) -> bool {
    find_break(events).is_none()
}
