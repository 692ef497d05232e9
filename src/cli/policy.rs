use anyhow::Result;
use clap::{Args, Subcommand};
use gateway_core_types::Endpoint;
use gateway_policy_center::PolicySnapshot;

use super::env::CliArgs;
use super::output::emit;
use super::runtime::load_policy;

const REDACTED: &str = "<redacted>";

#[derive(Args, Clone, Debug)]
pub struct PolicyArgs {
    #[command(subcommand)]
    pub command: PolicyCommand,
}

#[derive(Subcommand, Clone, Debug)]
pub enum PolicyCommand {
    /// Print the effective snapshot after file and environment overlays
    Show(PolicyShowArgs),
}

#[derive(Args, Clone, Debug)]
pub struct PolicyShowArgs {
    /// Include where each setting came from
    #[arg(long)]
    pub provenance: bool,
}

pub async fn cmd_policy(args: PolicyArgs, cli: &CliArgs) -> Result<()> {
    match args.command {
        PolicyCommand::Show(show_args) => {
            let mut snapshot = redacted(load_policy(cli.config.as_deref())?);
            if !show_args.provenance {
                snapshot.provenance.clear();
            }
            emit(cli.output, &snapshot, || print_summary(&snapshot, show_args.provenance))
        }
    }
}

/// The signing secret never leaves the process.
pub fn redacted(mut snapshot: PolicySnapshot) -> PolicySnapshot {
    if snapshot.pagination.signing_secret.is_some() {
        snapshot.pagination.signing_secret = Some(REDACTED.to_string());
    }
    snapshot
}

fn print_summary(snapshot: &PolicySnapshot, provenance: bool) {
    println!("Policy Revision: {}", snapshot.rev);
    println!();
    println!(
        "Rate Limits → high={} tps, medium={} tps, on backend failure: {:?}",
        snapshot.rate_limits.tps_high,
        snapshot.rate_limits.tps_medium,
        snapshot.rate_limits.failure_policy
    );
    println!(
        "Quotas → on backend failure: {:?}",
        snapshot.quotas.failure_policy
    );
    for endpoint in Endpoint::ALL {
        let category = snapshot.quotas.category_for(endpoint);
        println!(
            "  {:<18} {:?} ({} calls/month), SLA {} ms",
            endpoint.as_str(),
            category,
            category.monthly_limit(),
            snapshot.sla.threshold_ms(endpoint)
        );
    }
    let secret = if snapshot.pagination.signing_secret.is_some() {
        "configured"
    } else {
        "random per process"
    };
    println!(
        "Pagination → key_ttl={}m, secret={}, small_page_threshold={}, base_url={}",
        snapshot.pagination.key_ttl_minutes,
        secret,
        snapshot.pagination.small_page_threshold,
        snapshot.pagination.base_url
    );
    println!("Fetch → timeout_ms={}", snapshot.fetch.timeout_ms);
    println!("Security → denied_ips={}", snapshot.security.denied_ips.len());

    if provenance {
        println!();
        let mut entries: Vec<_> = snapshot.provenance.values().collect();
        entries.sort_by(|a, b| a.path.cmp(&b.path));
        for entry in entries {
            println!("  {} ← {:?}", entry.path, entry.source);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gateway_policy_center::default_snapshot;

    #[test]
    fn configured_secret_is_redacted() {
        let mut snapshot = default_snapshot();
        snapshot.pagination.signing_secret = Some("top-secret".into());
        let shown = redacted(snapshot);
        assert_eq!(shown.pagination.signing_secret.as_deref(), Some(REDACTED));
    }

    #[test]
    fn absent_secret_stays_absent() {
        let shown = redacted(default_snapshot());
        assert!(shown.pagination.signing_secret.is_none());
    }
}
