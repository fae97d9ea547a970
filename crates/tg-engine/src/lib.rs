//! TrustGate engine - the access decision pipeline.
//!
//! Wires the core model, attestation checks, credential issuer and audit
//! sink into the request-level operations the transport layer calls:
//!
//! - [`TrustEngine::evaluate_access`] decides a resource request
//! - [`TrustEngine::issue_token`] / [`TrustEngine::refresh_token`] mint credentials
//! - [`TrustEngine::verify_token`] validates a credential
//! - [`TrustEngine::issue_challenge`] / [`TrustEngine::submit_posture`] drive attestation
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use tg_core::StaticPolicySource;
//! use tg_engine::{EngineConfig, MemoryDeviceRepository, TrustEngine};
//!
//! let config = EngineConfig::load(path)?;
//! tg_engine::telemetry::init_tracing(&config.logging)?;
//!
//! let policies = Arc::new(StaticPolicySource::new(config.load_policies()?));
//! let engine = TrustEngine::builder(Arc::new(MemoryDeviceRepository::new()), policies)
//!     .with_config(config)
//!     .build()?;
//! let _sweeper = engine.spawn_challenge_sweeper();
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
mod error;
pub mod pipeline;
pub mod store;
pub mod telemetry;

pub use config::{
    ChallengeConfig, CredentialsConfig, EngineConfig, LogFormat, LoggingConfig, PolicyConfig,
    load_policy_file,
};
pub use error::{EngineError, EngineResult};
pub use pipeline::{
    AccessDecision, AccessRequest, ChallengeResponse, PostureOutcome, PostureSubmission,
    TrustEngine, TrustEngineBuilder,
};
pub use store::{DeviceRepository, MemoryDeviceRepository};
