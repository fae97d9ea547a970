//! TrustGate audit trail.
//!
//! Every access decision produces exactly one [`AuditEvent`]. Events are
//! handed to an [`AuditSink`]; persistence is the sink's concern.
//!
//! - [`MemorySink`] keeps events in memory (tests, CLI dry runs)
//! - [`TracingSink`] emits structured `tracing` events under the
//!   `trustgate::audit` target

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

mod error;
mod event;
mod sink;

pub use error::{AuditError, AuditResult};
pub use event::{AttestationOutcome, AuditEvent};
pub use sink::{AUDIT_TARGET, AuditSink, MemorySink, TracingSink};
