use clap::Subcommand;

use super::filter::FilterArgs;
use super::policy::PolicyArgs;
use super::simulate::SimulateArgs;
use super::tier::TierArgs;

#[derive(Subcommand, Clone)]
pub enum Commands {
    /// Filter a consent permission list against the catalog
    Filter(FilterArgs),

    /// Show the per-minute ceiling for an active consent count
    Tier(TierArgs),

    /// Inspect the effective gateway policy
    Policy(PolicyArgs),

    /// Run fixture-driven calls through the full access pipeline
    Simulate(SimulateArgs),
}
