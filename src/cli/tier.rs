use std::collections::BTreeMap;

use anyhow::Result;
use clap::Args;
use gateway_core_types::Endpoint;
use gateway_policy_center::RateLimitPolicy;
use serde::Serialize;
use traffic_guard::tpm_ceiling;

use super::env::CliArgs;
use super::output::emit;
use super::runtime::load_policy;

#[derive(Args, Clone, Debug)]
pub struct TierArgs {
    /// Active consents held by the organisation
    #[arg(value_name = "CONSENTS")]
    pub consents: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TierReport {
    pub active_consents: u64,
    pub tpm_ceiling: u64,
    pub tps: BTreeMap<&'static str, u32>,
}

impl TierReport {
    pub fn new(active_consents: u64, rate_limits: &RateLimitPolicy) -> Self {
        Self {
            active_consents,
            tpm_ceiling: tpm_ceiling(active_consents),
            tps: Endpoint::ALL
                .iter()
                .map(|endpoint| (endpoint.as_str(), rate_limits.tps_for(*endpoint)))
                .collect(),
        }
    }
}

pub fn cmd_tier(args: TierArgs, cli: &CliArgs) -> Result<()> {
    let policy = load_policy(cli.config.as_deref())?;
    let report = TierReport::new(args.consents, &policy.rate_limits);
    emit(cli.output, &report, || {
        println!(
            "{} active consents -> {} calls per minute",
            report.active_consents, report.tpm_ceiling
        );
        for (endpoint, tps) in &report.tps {
            println!("  {endpoint:<18} {tps} tps");
        }
    })
}
