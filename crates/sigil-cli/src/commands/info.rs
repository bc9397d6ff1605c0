//! Info command - Show the effective protocol configuration
//!
//! Usage:
//! ```bash
//! sigil info
//! sigil info --json
//! ```

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use sigil_core::ProtocolConfig;

/// Arguments for the info command
#[derive(Args)]
pub struct InfoArgs {
    /// Print the configuration as JSON instead of a summary
    #[arg(long)]
    json: bool,
}

/// Run the info command
pub fn run(args: InfoArgs, config: &ProtocolConfig) -> Result<()> {
    if args.json {
        let out = serde_json::to_string_pretty(config).context("Failed to encode configuration")?;
        println!("{}", out);
        return Ok(());
    }

    let version = env!("CARGO_PKG_VERSION");

    println!("{}", "Sigil - agent identity and result validation".bold().cyan());
    println!("{}", "═".repeat(50).cyan());
    println!();

    println!("{}", "Deployment:".bold());
    println!("  {} {}", "CLI Version:".dimmed(), version.green());
    println!("  {} {}", "Config Version:".dimmed(), config.version.to_string().green());
    println!("  {} {}", "Domain:".dimmed(), config.domain_id.to_string().green());
    println!("  {} {}", "Governor:".dimmed(), config.governor.as_str().green());
    println!();

    let admission = &config.admission;
    println!("{}", "Commit-Reveal:".bold());
    println!(
        "  {} {}s .. {}s after commit",
        "Reveal window:".dimmed(),
        admission.min_reveal_delay,
        admission.max_reveal_delay
    );
    println!();

    let registry = &config.registry;
    println!("{}", "Identity Registry:".bold());
    println!("  {} {}s", "Activation delay:".dimmed(), registry.activation_delay);
    println!("  {} {}", "Registration stake:".dimmed(), registry.registration_stake);
    println!(
        "  {} {} per {}s, {} lifetime",
        "Registrations:".dimmed(),
        registry.registrations_per_window,
        registry.rate_window,
        registry.max_agents_per_owner
    );
    println!("  {} {}", "Keys per agent:".dimmed(), registry.max_keys_per_agent);
    println!();

    let consensus = &config.consensus;
    println!("{}", "Validation:".bold());
    println!("  {} {}", "Quorum:".dimmed(), consensus.min_validators);
    println!("  {} {}", "Threshold:".dimmed(), percent(consensus.consensus_threshold_bps));
    println!("  {} {}", "Reward share:".dimmed(), percent(consensus.validator_reward_bps));
    println!(
        "  {} requester {}, validator {}",
        "Minimum stakes:".dimmed(),
        consensus.min_request_stake,
        consensus.min_validator_stake
    );
    println!(
        "  {} {}s .. {}s",
        "Deadline window:".dimmed(),
        consensus.min_deadline,
        consensus.max_deadline
    );
    println!("  {} {}", "Response ceiling:".dimmed(), config.guard.ceiling);
    println!();

    Ok(())
}

fn percent(bps: u32) -> String {
    format!("{}.{:02}%", bps / 100, bps % 100)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percent_formatting() {
        assert_eq!(percent(6_600), "66.00%");
        assert_eq!(percent(1_005), "10.05%");
        assert_eq!(percent(10_000), "100.00%");
    }
}
