//! Single-use attestation challenges.
//!
//! A challenge is a random token bound to one device. The device signs
//! `{"challenge": token}` with its attestation key; the server consumes the
//! token exactly once. Expiry is checked on every consume, so the periodic
//! sweep only reclaims memory.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::device::DeviceId;
use crate::time::Clock;

/// Default validity window of a challenge.
pub const DEFAULT_CHALLENGE_TTL: Duration = Duration::from_secs(300);

/// Longest validity window a manager accepts.
pub const MAX_CHALLENGE_TTL: Duration = Duration::from_secs(86_400);

/// Random bytes per challenge token.
const TOKEN_BYTES: usize = 32;

// ─────────────────────────────────────────────────────────────────────────────
// Records
// ─────────────────────────────────────────────────────────────────────────────

/// A stored challenge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Challenge {
    /// Opaque random token.
    pub token: String,
    /// Device the challenge was issued to.
    pub device_id: DeviceId,
    /// Issue time.
    pub created_at: DateTime<Utc>,
    /// Last instant at which the challenge may be consumed.
    pub expires_at: DateTime<Utc>,
    /// Set once the challenge has been used.
    pub consumed: bool,
}

impl Challenge {
    /// Whether the challenge is past its window at `now`.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

/// What the caller hands to the device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuedChallenge {
    /// Token to sign.
    pub token: String,
    /// When the token stops being accepted.
    pub expires_at: DateTime<Utc>,
}

/// Result of an atomic consume attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumeOutcome {
    /// The challenge was valid and is now spent.
    Consumed,
    /// No such token.
    Unknown,
    /// The window has passed.
    Expired,
    /// The token was already used.
    AlreadyConsumed,
    /// The token belongs to another device. It is left unconsumed.
    DeviceMismatch,
}

/// Why a challenge was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum ChallengeRejection {
    /// No such token.
    #[error("Challenge not found")]
    Unknown,

    /// The window has passed.
    #[error("Challenge expired")]
    Expired,

    /// The token was already used.
    #[error("Challenge already used")]
    AlreadyConsumed,

    /// The token belongs to another device.
    #[error("Challenge issued to a different device")]
    DeviceMismatch,
}

impl ConsumeOutcome {
    /// Map to the rejection reason, if any.
    ///
    /// # Errors
    /// Returns the matching [`ChallengeRejection`] for every outcome other
    /// than [`ConsumeOutcome::Consumed`].
    pub const fn into_result(self) -> Result<(), ChallengeRejection> {
        match self {
            Self::Consumed => Ok(()),
            Self::Unknown => Err(ChallengeRejection::Unknown),
            Self::Expired => Err(ChallengeRejection::Expired),
            Self::AlreadyConsumed => Err(ChallengeRejection::AlreadyConsumed),
            Self::DeviceMismatch => Err(ChallengeRejection::DeviceMismatch),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Store
// ─────────────────────────────────────────────────────────────────────────────

/// Storage for outstanding challenges.
///
/// `consume` must check and mark in one indivisible step: two concurrent
/// consumes of the same token never both return [`ConsumeOutcome::Consumed`].
pub trait ChallengeStore: Send + Sync + fmt::Debug {
    /// Store a new challenge. Returns `false` if the token already exists.
    fn insert(&self, challenge: Challenge) -> bool;

    /// Atomically validate and spend a challenge.
    fn consume(&self, token: &str, device_id: DeviceId, now: DateTime<Utc>) -> ConsumeOutcome;

    /// Drop every expired challenge. Returns how many were removed.
    fn purge_expired(&self, now: DateTime<Utc>) -> usize;

    /// Number of stored challenges.
    fn len(&self) -> usize;

    /// Whether the store is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Process-local challenge store.
#[derive(Debug, Default)]
pub struct MemoryChallengeStore {
    entries: Mutex<HashMap<String, Challenge>>,
}

impl MemoryChallengeStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl ChallengeStore for MemoryChallengeStore {
    fn insert(&self, challenge: Challenge) -> bool {
        let mut entries = self.entries.lock();
        if entries.contains_key(&challenge.token) {
            return false;
        }
        entries.insert(challenge.token.clone(), challenge);
        true
    }

    fn consume(&self, token: &str, device_id: DeviceId, now: DateTime<Utc>) -> ConsumeOutcome {
        let mut entries = self.entries.lock();
        let Some(entry) = entries.get_mut(token) else {
            return ConsumeOutcome::Unknown;
        };
        if entry.is_expired(now) {
            return ConsumeOutcome::Expired;
        }
        if entry.consumed {
            return ConsumeOutcome::AlreadyConsumed;
        }
        if entry.device_id != device_id {
            return ConsumeOutcome::DeviceMismatch;
        }
        entry.consumed = true;
        ConsumeOutcome::Consumed
    }

    fn purge_expired(&self, now: DateTime<Utc>) -> usize {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, c| !c.is_expired(now));
        before - entries.len()
    }

    fn len(&self) -> usize {
        self.entries.lock().len()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Manager
// ─────────────────────────────────────────────────────────────────────────────

/// Issues and verifies challenges against an injected store and clock.
#[derive(Debug, Clone)]
pub struct ChallengeManager {
    store: Arc<dyn ChallengeStore>,
    clock: Arc<dyn Clock>,
    ttl: chrono::Duration,
}

impl ChallengeManager {
    /// Create a manager with the default window.
    #[must_use]
    pub fn new(store: Arc<dyn ChallengeStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            ttl: chrono::Duration::seconds(300),
        }
    }

    /// Override the validity window, capped at [`MAX_CHALLENGE_TTL`].
    #[must_use]
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        if ttl > MAX_CHALLENGE_TTL {
            warn!(
                requested_secs = ttl.as_secs(),
                max_secs = MAX_CHALLENGE_TTL.as_secs(),
                "challenge ttl capped"
            );
        }
        self.ttl = i64::try_from(ttl.min(MAX_CHALLENGE_TTL).as_secs())
            .map_or(self.ttl, chrono::Duration::seconds);
        self
    }

    /// The configured validity window.
    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl.to_std().unwrap_or(DEFAULT_CHALLENGE_TTL)
    }

    /// The underlying store.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn ChallengeStore> {
        &self.store
    }

    /// Issue a fresh challenge for `device_id`.
    pub fn issue(&self, device_id: DeviceId) -> IssuedChallenge {
        let created_at = self.clock.now();
        let expires_at = created_at
            .checked_add_signed(self.ttl)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        loop {
            let token = generate_token();
            let challenge = Challenge {
                token: token.clone(),
                device_id,
                created_at,
                expires_at,
                consumed: false,
            };
            if self.store.insert(challenge) {
                debug!(%device_id, %expires_at, "challenge issued");
                return IssuedChallenge { token, expires_at };
            }
            trace!("challenge token collision, regenerating");
        }
    }

    /// Consume `token` for `device_id`, reporting why it was rejected.
    ///
    /// # Errors
    /// Returns a [`ChallengeRejection`] when the token is unknown, expired,
    /// already used or bound to another device.
    pub fn verify_detailed(&self, token: &str, device_id: DeviceId) -> Result<(), ChallengeRejection> {
        let outcome = self.store.consume(token, device_id, self.clock.now());
        let result = outcome.into_result();
        if let Err(rejection) = &result {
            debug!(%device_id, reason = %rejection, "challenge rejected");
        }
        result
    }

    /// Consume `token` for `device_id`.
    #[must_use]
    pub fn verify(&self, token: &str, device_id: DeviceId) -> bool {
        self.verify_detailed(token, device_id).is_ok()
    }

    /// Remove expired challenges. Returns how many were removed.
    pub fn sweep(&self) -> usize {
        let removed = self.store.purge_expired(self.clock.now());
        if removed > 0 {
            debug!(removed, "expired challenges purged");
        }
        removed
    }
}

fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::thread_rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Sweep expired challenges every `interval` until the task is aborted.
///
/// Must be called from within a tokio runtime.
pub fn spawn_sweeper(manager: Arc<ChallengeManager>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            manager.sweep();
        }
    })
}
