//! # warden-audit
//!
//! The WARDEN flight recorder: an append-only, SHA-256 hash-chained log of
//! every intercepted action.
//!
//! ## Overview
//!
//! Each trace is written twice: a `start` event when the kernel opens it and
//! a `terminal` event when it is sealed. Every event links to the previous
//! one via its hash, so editing any byte of the log is detected by
//! `verify_chain`, both in memory and when a log file is reopened.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use warden_audit::FlightRecorder;
//! use warden_core::traits::FlightLog;
//!
//! let recorder = FlightRecorder::open("/var/lib/warden/flight.jsonl")?;
//! let trace = recorder.start_trace(&request)?;
//! recorder.log_success(&trace, json!({ "ok": true }), 12)?;
//!
//! assert!(recorder.verify_integrity());
//! ```

pub mod chain;
pub mod event;
pub mod recorder;

pub use chain::{find_break, hash_event, verify_chain};
pub use event::{AuditEvent, EventKind};
pub use recorder::FlightRecorder;

// ── Tests ─────────────────────────────────────────────────────────────────────
