use anyhow::Result;

use super::env::CliArgs;
use super::filter::cmd_filter;
use super::policy::cmd_policy;
use super::simulate::cmd_simulate;
use super::tier::cmd_tier;
use crate::cli::commands::Commands;

pub async fn dispatch(cli: &CliArgs) -> Result<()> {
    match cli.command.clone() {
        Commands::Filter(args) => cmd_filter(args, cli),
        Commands::Tier(args) => cmd_tier(args, cli),
        Commands::Policy(args) => cmd_policy(args, cli).await,
        Commands::Simulate(args) => cmd_simulate(args, cli).await,
    }
}
