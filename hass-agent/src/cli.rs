//! Command line interface

use std::path::PathBuf;

use clap::Parser;

use crate::config::DEFAULT_CONFIG_FILE;

/// Collects device data for Home Assistant
#[derive(Parser, Debug, Clone)]
#[command(name = "hass-agent", version, about)]
pub struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,

    /// Display more details about what's going on
    #[arg(short, long)]
    pub verbose: bool,

    /// Do not publish anything, only log what would be sent
    #[arg(long)]
    pub dry_run: bool,

    /// Run data collection once only
    #[arg(long)]
    pub once: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let args = Args::parse_from(["hass-agent"]);
        assert_eq!(args.config, PathBuf::from("config.toml"));
        assert!(!args.verbose && !args.dry_run && !args.once);
    }

    #[test]
    fn test_flags() {
        let args = Args::parse_from(["hass-agent", "-c", "/etc/hass-agent.toml", "-v", "--dry-run", "--once"]);
        assert_eq!(args.config, PathBuf::from("/etc/hass-agent.toml"));
        assert!(args.verbose);
        assert!(args.dry_run);
        assert!(args.once);
    }
}
