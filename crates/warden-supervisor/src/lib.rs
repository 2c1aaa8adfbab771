//! # warden-supervisor
//!
//! Cross-request anomaly detection for the WARDEN runtime.
//!
//! The kernel judges one request at a time. A [`Supervisor`] watches the
//! sealed audit records as a stream and looks for patterns no single
//! request shows: call bursts, surges over an agent's own baseline, runs of
//! denials that look like policy probing.
//!
//! - [`DetectionStrategy`] implementations hold the thresholds.
//! - [`SupervisorHierarchy`] stacks supervisors; each tier consumes the
//!   anomalies of the tier below.
//! - Anomalies land in a [`ReviewQueue`]. [`Remediation`] is opt-in and
//!   audited through the flight log.
//!
//! ```rust,ignore
//! let supervisor = Supervisor::from_config(&config)?;
//! tokio::spawn(async move { supervisor.watch(recorder.subscribe()).await });
//! ```

pub mod baseline;
pub mod config;
pub mod hierarchy;
pub mod remediation;
pub mod review;
pub mod signal;
pub mod strategy;
pub mod supervisor;

pub use baseline::{Baselines, WindowStats};
pub use config::{StrategyConfig, SupervisorConfig};
pub use hierarchy::SupervisorHierarchy;
pub use remediation::{DeactivateAgent, Remediation};
pub use review::ReviewQueue;
pub use signal::{Anomaly, Signal, SignalSource};
pub use strategy::{BaselineSurge, BlockedRatio, DetectionStrategy, Finding, RateCeiling};
pub use supervisor::Supervisor;

// ── Tests ─────────────────────────────────────────────────────────────────────
