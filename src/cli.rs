use std::path::PathBuf;

use clap::Parser;

/// Keeps `kubectl port-forward` sessions alive across pod restarts and network loss.
#[derive(Parser, Debug)]
#[command(name = "forward-supervisor")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Targets to forward, as `NAME` or `NAME:PORT`.
    ///
    /// Without an explicit port the port comes from the merged port maps.
    /// When no target is given, every target in the port maps is forwarded.
    #[arg(value_name = "TARGET[:PORT]")]
    pub targets: Vec<String>,

    /// Namespace to list and forward in.
    #[arg(short = 'n', long = "namespace", value_name = "NAMESPACE")]
    pub namespace: Option<String>,

    /// Target to leave alone (repeatable).
    #[arg(short = 'x', long = "exclude", value_name = "NAME")]
    pub exclude: Vec<String>,

    /// Seconds between health checks.
    #[arg(long = "health-interval", value_name = "SECONDS", default_value_t = 10)]
    pub health_interval: u64,

    /// Seconds between recovery attempts.
    #[arg(long = "retry-interval", value_name = "SECONDS", default_value_t = 5)]
    pub retry_interval: u64,

    /// Consecutive failed recovery attempts before giving up on a target.
    #[arg(long = "max-retries", value_name = "N", default_value_t = 20)]
    pub max_retries: u32,

    /// Additional port map merged over the default ones.
    #[arg(short = 'c', long = "config", value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace).
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbose: u8,
}
