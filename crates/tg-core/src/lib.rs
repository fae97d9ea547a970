//! TrustGate core - the trust decision model.
//!
//! This crate holds the pure, request-scoped half of the engine:
//!
//! - [`device`] - enrolled devices and the identities that use them
//! - [`compliance`] - posture reports and the weighted compliance score
//! - [`challenge`] - single-use nonces binding a device to one attestation
//! - [`policy`] - prioritized policy rules and their evaluation
//! - [`time`] - the injectable clock every time-dependent check reads
//!
//! Storage, transport and credential minting live in the outer crates.

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod challenge;
pub mod compliance;
pub mod device;
mod error;
pub mod policy;
pub mod time;

pub use challenge::{
    Challenge, ChallengeManager, ChallengeRejection, ChallengeStore, ConsumeOutcome,
    DEFAULT_CHALLENGE_TTL, IssuedChallenge, MAX_CHALLENGE_TTL, MemoryChallengeStore, spawn_sweeper,
};
pub use compliance::{
    COMPLIANCE_THRESHOLD, ComplianceResult, PostureReport, PostureSummary, score_posture,
};
pub use device::{Device, DeviceId, DeviceState, EnrollmentStatus, Identity, UserId};
pub use error::{CoreError, CoreResult, StoreError, StoreResult};
pub use policy::{
    DaySpec, DefaultVerdict, EnforceMode, EvaluationContext, EvaluatorOptions, Policy,
    PolicyAction, PolicyConditions, PolicyEvaluation, PolicyEvaluationResult, PolicyEvaluator,
    PolicyRef, PolicyRules, PolicySource, StaticPolicySource, TimeRestrictions,
    evaluate_policies,
};
pub use time::{Clock, ManualClock, SystemClock};
