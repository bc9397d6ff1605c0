//! Layered protocol configuration
//!
//! Built-in defaults, then an optional file, then `SIGIL_*` environment
//! variables (`SIGIL_CONSENSUS__MIN_VALIDATORS=5`). The merged result is
//! validated before any command sees it.

use anyhow::{Context, Result};
use config::{Config, Environment, File, FileFormat};
use sigil_core::ProtocolConfig;
use std::path::Path;

/// Load the effective configuration from the process environment
pub fn load(path: Option<&Path>) -> Result<ProtocolConfig> {
    build(path, None)
}

/// Load with an explicit environment map instead of the process environment
pub fn build(path: Option<&Path>, env: Option<config::Map<String, String>>) -> Result<ProtocolConfig> {
    let defaults = serde_json::to_string(&ProtocolConfig::default())
        .context("Failed to encode default configuration")?;

    let mut builder = Config::builder().add_source(File::from_str(&defaults, FileFormat::Json));
    if let Some(path) = path {
        builder = builder.add_source(File::from(path));
    }
    let settings = builder
        .add_source(
            Environment::with_prefix("SIGIL")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true)
                .source(env),
        )
        .build()
        .with_context(|| match path {
            Some(p) => format!("Failed to read configuration from {}", p.display()),
            None => "Failed to read configuration".to_string(),
        })?;

    let config: ProtocolConfig = settings
        .try_deserialize()
        .context("Configuration does not match the protocol schema")?;
    config.validate().context("Configuration rejected")?;

    tracing::debug!(version = config.version, domain_id = config.domain_id, "configuration loaded");
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &[(&str, &str)]) -> Option<config::Map<String, String>> {
        Some(pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect())
    }

    #[test]
    fn test_defaults_without_sources() {
        let config = build(None, env(&[])).unwrap();
        assert_eq!(config, ProtocolConfig::default());
    }

    #[test]
    fn test_environment_overrides_nested_fields() {
        let config = build(
            None,
            env(&[
                ("SIGIL_DOMAIN_ID", "42"),
                ("SIGIL_GOVERNOR", "council"),
                ("SIGIL_CONSENSUS__MIN_VALIDATORS", "5"),
                ("SIGIL_ADMISSION__MIN_REVEAL_DELAY", "120"),
            ]),
        )
        .unwrap();

        assert_eq!(config.domain_id, 42);
        assert_eq!(config.governor.as_str(), "council");
        assert_eq!(config.consensus.min_validators, 5);
        assert_eq!(config.admission.min_reveal_delay, 120);
        assert_eq!(config.admission.max_reveal_delay, 3_600);
    }

    #[test]
    fn test_incoherent_override_is_rejected() {
        let err = build(None, env(&[("SIGIL_CONSENSUS__CONSENSUS_THRESHOLD_BPS", "5000")])).unwrap_err();
        assert!(format!("{:#}", err).contains("consensus_threshold_bps"));
    }
}
