//! # warden-mute
//!
//! Closed-world capability mapping for the WARDEN runtime.
//!
//! [`MuteAgent`] implements [`warden_core::traits::CapabilityMapper`]. A
//! request whose tool is not registered, or whose arguments do not fit the
//! tool's JSON Schema, is out of scope and is answered with nothing more
//! than a mute block.
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use warden_mute::MuteAgent;
//!
//! let mute = MuteAgent::new();
//! mute.register(
//!     Capability::new("process_refund", PermissionLevel::ReadWrite)
//!         .with_schema(json!({ "type": "object", "required": ["order_id"] })),
//! )?;
//! assert!(mute.map_request("process_refund", &json!({ "order_id": "A-1" })));
//! ```

pub mod agent;

pub use agent::{CapabilityConfig, MuteAgent};

// ── Tests ─────────────────────────────────────────────────────────────────────
