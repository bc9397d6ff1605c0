//! Versioned protocol configuration
//!
//! A single [`ProtocolConfig`] carries every threshold, delay and ceiling.
//! Each component receives only its own section at construction time and
//! again whenever governance installs a new version; nothing reads
//! configuration from global state.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::ErrorClass;
use crate::guard::GuardConfig;
use crate::ids::{AccountId, Amount, Timestamp};

/// Basis points denominator (100%)
pub const BPS_DENOMINATOR: u32 = 10_000;

/// Error types for configuration
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

impl ConfigError {
    pub fn class(&self) -> ErrorClass {
        ErrorClass::Validation
    }
}

/// Commit-reveal timing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdmissionConfig {
    /// Seconds after commit before a reveal is accepted
    pub min_reveal_delay: Timestamp,
    /// Seconds after commit after which the commitment expires
    pub max_reveal_delay: Timestamp,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            min_reveal_delay: 60,
            max_reveal_delay: 3_600,
        }
    }
}

/// Identity registry limits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Seconds a freshly registered agent stays pending
    pub activation_delay: Timestamp,
    /// Value a registration commitment must carry (0 disables the stake)
    pub registration_stake: Amount,
    /// Lifetime cap on records per owner
    pub max_agents_per_owner: usize,
    /// Registrations allowed per owner per rate window
    pub registrations_per_window: u32,
    /// Rate window length in seconds
    pub rate_window: Timestamp,
    /// Keys accepted per registration
    pub max_keys_per_agent: usize,
    pub max_did_length: usize,
    pub max_name_length: usize,
    pub max_description_length: usize,
    pub max_endpoint_length: usize,
    pub max_capabilities_length: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            activation_delay: 3_600,
            registration_stake: 0,
            max_agents_per_owner: 100,
            registrations_per_window: 5,
            rate_window: 86_400,
            max_keys_per_agent: 10,
            max_did_length: 128,
            max_name_length: 64,
            max_description_length: 256,
            max_endpoint_length: 128,
            max_capabilities_length: 512,
        }
    }
}

/// Validation consensus parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsensusConfig {
    /// Responses required before finalization is attempted
    pub min_validators: usize,
    /// Share of responses (in bps) that must agree on an outcome
    pub consensus_threshold_bps: u32,
    /// Minimum stake escrowed by a requester
    pub min_request_stake: Amount,
    /// Minimum stake escrowed by each validator
    pub min_validator_stake: Amount,
    /// Share of the requester stake (in bps) paid to correct validators
    pub validator_reward_bps: u32,
    /// Shortest allowed distance between request time and deadline
    pub min_deadline: Timestamp,
    /// Longest allowed distance between request time and deadline
    pub max_deadline: Timestamp,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            min_validators: 3,
            consensus_threshold_bps: 6_600,
            min_request_stake: 1_000,
            min_validator_stake: 100,
            validator_reward_bps: 1_000,
            min_deadline: 3_600,
            max_deadline: 30 * 86_400,
        }
    }
}

/// Complete protocol configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolConfig {
    /// Monotonic version, bumped by every governance update
    pub version: u64,
    /// Deployment/network identifier mixed into every commitment and proof
    pub domain_id: u64,
    /// The only identity allowed to install a new configuration
    pub governor: AccountId,
    #[serde(default)]
    pub admission: AdmissionConfig,
    #[serde(default)]
    pub registry: RegistryConfig,
    #[serde(default)]
    pub consensus: ConsensusConfig,
    #[serde(default)]
    pub guard: GuardConfig,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            version: 1,
            domain_id: 1,
            governor: AccountId::from("governor"),
            admission: AdmissionConfig::default(),
            registry: RegistryConfig::default(),
            consensus: ConsensusConfig::default(),
            guard: GuardConfig::default(),
        }
    }
}

impl ProtocolConfig {
    /// Create a default configuration for the given deployment
    pub fn for_domain(domain_id: u64, governor: impl Into<AccountId>) -> Self {
        Self {
            domain_id,
            governor: governor.into(),
            ..Self::default()
        }
    }

    /// Reject incoherent combinations of values
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));

        if self.guard.ceiling == 0 {
            return invalid("guard.ceiling must be positive".into());
        }
        if self.admission.min_reveal_delay >= self.admission.max_reveal_delay {
            return invalid(format!(
                "admission.min_reveal_delay ({}) must be below max_reveal_delay ({})",
                self.admission.min_reveal_delay, self.admission.max_reveal_delay
            ));
        }

        let registry = &self.registry;
        if registry.max_keys_per_agent == 0 || registry.max_agents_per_owner == 0 {
            return invalid("registry key and agent caps must be positive".into());
        }
        if registry.registrations_per_window == 0 || registry.rate_window == 0 {
            return invalid("registry rate window must admit at least one registration".into());
        }

        let consensus = &self.consensus;
        if consensus.min_validators == 0 || consensus.min_validators > self.guard.ceiling {
            return invalid(format!(
                "consensus.min_validators ({}) must be within 1..={}",
                consensus.min_validators, self.guard.ceiling
            ));
        }
        if consensus.consensus_threshold_bps <= BPS_DENOMINATOR / 2
            || consensus.consensus_threshold_bps > BPS_DENOMINATOR
        {
            return invalid(format!(
                "consensus.consensus_threshold_bps ({}) must be within (5000, 10000]",
                consensus.consensus_threshold_bps
            ));
        }
        if consensus.validator_reward_bps > BPS_DENOMINATOR {
            return invalid("consensus.validator_reward_bps exceeds 10000".into());
        }
        if consensus.min_request_stake == 0 || consensus.min_validator_stake == 0 {
            return invalid("consensus minimum stakes must be positive".into());
        }
        if consensus.min_deadline == 0 || consensus.min_deadline > consensus.max_deadline {
            return invalid(format!(
                "consensus deadline bounds [{}, {}] are inverted or empty",
                consensus.min_deadline, consensus.max_deadline
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        ProtocolConfig::default().validate().unwrap();
    }

    #[test]
    fn test_threshold_must_be_a_majority() {
        let mut config = ProtocolConfig::default();
        config.consensus.consensus_threshold_bps = 5_000;
        assert!(config.validate().is_err());
        config.consensus.consensus_threshold_bps = 10_000;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_quorum_cannot_exceed_ceiling() {
        let mut config = ProtocolConfig::default();
        config.guard.ceiling = 2;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_reveal_window_must_be_open() {
        let mut config = ProtocolConfig::default();
        config.admission.min_reveal_delay = 3_600;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_sections_take_defaults() {
        let config: ProtocolConfig =
            serde_json::from_str(r#"{"version":1,"domain_id":5,"governor":"gov"}"#).unwrap();
        assert_eq!(config.domain_id, 5);
        assert_eq!(config.guard.ceiling, 100);
        assert_eq!(config.admission.max_reveal_delay, 3_600);
    }
}
