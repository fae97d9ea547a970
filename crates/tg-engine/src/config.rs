//! Engine configuration.
//!
//! Loaded from TOML; every field has a default so an empty file is valid.
//!
//! ```toml
//! [credentials]
//! signing_key = "base64 secret, at least 32 bytes"
//! default_ttl_minutes = 15
//!
//! [challenges]
//! ttl_secs = 300
//! sweep_interval_secs = 60
//!
//! [policy]
//! default_verdict = "allow"
//! file = "policies.json"
//!
//! [logging]
//! level = "info"
//! format = "json"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tg_core::{DefaultVerdict, EvaluatorOptions, MAX_CHALLENGE_TTL, Policy};
use tg_crypto::CredentialKey;
use tg_token::MAX_TTL_MINUTES;
use tracing::warn;

use crate::{EngineError, EngineResult};

/// Top-level engine configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    /// Access credential settings.
    #[serde(default)]
    pub credentials: CredentialsConfig,
    /// Challenge settings.
    #[serde(default)]
    pub challenges: ChallengeConfig,
    /// Policy evaluation settings.
    #[serde(default)]
    pub policy: PolicyConfig,
    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// `[credentials]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CredentialsConfig {
    /// Base64 HMAC secret. When absent a per-process key is generated and
    /// credentials do not survive a restart.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signing_key: Option<String>,

    /// Lifetime of credentials when the caller requests none.
    #[serde(default = "default_ttl_minutes")]
    pub default_ttl_minutes: u32,
}

const fn default_ttl_minutes() -> u32 {
    tg_token::DEFAULT_TTL_MINUTES
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            signing_key: None,
            default_ttl_minutes: default_ttl_minutes(),
        }
    }
}

impl CredentialsConfig {
    /// Resolve the configured key, or generate an ephemeral one.
    ///
    /// # Errors
    /// Returns [`EngineError::Crypto`] if a configured key is invalid.
    pub fn signing_key(&self) -> EngineResult<CredentialKey> {
        match &self.signing_key {
            Some(encoded) => Ok(CredentialKey::from_base64(encoded)?),
            None => {
                warn!(
                    "no credential signing key configured, using an ephemeral key; \
                     credentials will not verify after a restart or on other instances"
                );
                Ok(CredentialKey::generate())
            }
        }
    }
}

/// `[challenges]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ChallengeConfig {
    /// Challenge validity window in seconds.
    #[serde(default = "default_challenge_ttl_secs")]
    pub ttl_secs: u64,

    /// Interval between expired-challenge sweeps in seconds.
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
}

const fn default_challenge_ttl_secs() -> u64 {
    300
}

const fn default_sweep_interval_secs() -> u64 {
    60
}

impl Default for ChallengeConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_challenge_ttl_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
        }
    }
}

impl ChallengeConfig {
    /// Validity window.
    #[must_use]
    pub const fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    /// Sweep interval.
    #[must_use]
    pub const fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

/// `[policy]` section.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PolicyConfig {
    /// Verdict when no applicable policy exists.
    #[serde(default)]
    pub default_verdict: DefaultVerdict,

    /// JSON file holding an array of policy documents.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
}

impl PolicyConfig {
    /// Evaluator options derived from this section.
    #[must_use]
    pub const fn evaluator_options(&self) -> EvaluatorOptions {
        EvaluatorOptions {
            default_verdict: self.default_verdict,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Plain,
    /// One JSON object per line.
    Json,
}

/// `[logging]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format.
    #[serde(default)]
    pub format: LogFormat,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

impl EngineConfig {
    /// Parse configuration from TOML text and validate it.
    ///
    /// # Errors
    /// Returns [`EngineError::InvalidConfig`] on syntax errors, unknown keys
    /// or failed validation.
    pub fn from_toml_str(text: &str) -> EngineResult<Self> {
        let config: Self = toml::from_str(text)
            .map_err(|e| EngineError::InvalidConfig(format!("Invalid TOML: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a configuration file.
    ///
    /// A relative `[policy] file` is resolved against the config file's
    /// directory.
    ///
    /// # Errors
    /// Returns [`EngineError::Read`] if the file cannot be read, otherwise as
    /// [`Self::from_toml_str`].
    pub fn load(path: &Path) -> EngineResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| EngineError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_toml_str(&text)?;
        if let (Some(file), Some(dir)) = (&config.policy.file, path.parent()) {
            if file.is_relative() {
                config.policy.file = Some(dir.join(file));
            }
        }
        Ok(config)
    }

    /// Validate the configuration.
    ///
    /// # Errors
    /// Returns [`EngineError::InvalidConfig`] describing the first problem.
    pub fn validate(&self) -> EngineResult<()> {
        let ttl = self.credentials.default_ttl_minutes;
        if ttl == 0 || ttl > MAX_TTL_MINUTES {
            return Err(EngineError::InvalidConfig(format!(
                "credentials.default_ttl_minutes must be between 1 and {MAX_TTL_MINUTES}"
            )));
        }

        if let Some(key) = &self.credentials.signing_key {
            CredentialKey::from_base64(key).map_err(|e| {
                EngineError::InvalidConfig(format!("credentials.signing_key: {e}"))
            })?;
        }

        let max_challenge_secs = MAX_CHALLENGE_TTL.as_secs();
        if self.challenges.ttl_secs == 0 || self.challenges.ttl_secs > max_challenge_secs {
            return Err(EngineError::InvalidConfig(format!(
                "challenges.ttl_secs must be between 1 and {max_challenge_secs}"
            )));
        }

        if self.challenges.sweep_interval_secs == 0 {
            return Err(EngineError::InvalidConfig(
                "challenges.sweep_interval_secs must be greater than 0".into(),
            ));
        }

        if self.logging.level.trim().is_empty() {
            return Err(EngineError::InvalidConfig(
                "logging.level cannot be empty".into(),
            ));
        }

        Ok(())
    }

    /// Load the policies named by `[policy] file`, if any.
    ///
    /// # Errors
    /// As [`load_policy_file`].
    pub fn load_policies(&self) -> EngineResult<Vec<Policy>> {
        self.policy
            .file
            .as_deref()
            .map_or_else(|| Ok(Vec::new()), load_policy_file)
    }
}

/// Read a JSON array of policy documents.
///
/// # Errors
/// Returns [`EngineError::Read`] if the file cannot be read,
/// [`EngineError::InvalidConfig`] if it is not a JSON array, and
/// [`EngineError::Policy`] if a document fails validation.
pub fn load_policy_file(path: &Path) -> EngineResult<Vec<Policy>> {
    let text = std::fs::read_to_string(path).map_err(|source| EngineError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let documents: Vec<serde_json::Value> = serde_json::from_str(&text).map_err(|e| {
        EngineError::InvalidConfig(format!(
            "{}: expected a JSON array of policies: {e}",
            path.display()
        ))
    })?;
    documents
        .into_iter()
        .map(|doc| Policy::from_json(doc).map_err(EngineError::from))
        .collect()
}
