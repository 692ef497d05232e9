use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::Args;

use super::env::CliArgs;
use super::output::emit;
use super::runtime::{load_filter, load_policy};
use crate::fixtures::{load_fixture, run_simulation, SimulationReport, SimulationStep};

#[derive(Args, Clone, Debug)]
pub struct SimulateArgs {
    /// Fixture file describing consents, accounts and calls (YAML or JSON)
    #[arg(long, value_name = "FILE")]
    pub fixture: PathBuf,

    /// Exit non-zero when any call fails
    #[arg(long)]
    pub fail_on_error: bool,
}

pub async fn cmd_simulate(args: SimulateArgs, cli: &CliArgs) -> Result<()> {
    let policy = load_policy(cli.config.as_deref())?;
    let filter = load_filter(cli.catalog.as_deref())?;
    let fixture = load_fixture(&args.fixture)?;

    let report = run_simulation(&fixture, policy, filter).await?;
    emit(cli.output, &report, || print_report(&report))?;

    let failures = report.steps.len() - report.successes();
    if args.fail_on_error && failures > 0 {
        bail!("{failures} simulated call(s) failed");
    }
    Ok(())
}

fn print_report(report: &SimulationReport) {
    println!("Policy Revision: {}", report.policy_rev);
    for (index, step) in report.steps.iter().enumerate() {
        println!("#{:<3} {}", index + 1, describe(step));
    }
    println!(
        "{} of {} calls succeeded",
        report.successes(),
        report.steps.len()
    );
}

fn describe(step: &SimulationStep) -> String {
    let mut line = match (&step.result, &step.error) {
        (Some(result), _) => format!(
            "{:<18} 200 records={} pages={} next={}",
            step.endpoint.as_str(),
            result.data.record_count(),
            result.meta.total_pages,
            if result.links.next.is_some() { "yes" } else { "no" }
        ),
        (None, Some(error)) => format!(
            "{:<18} {} {}",
            step.endpoint.as_str(),
            error.status,
            error.code
        ),
        (None, None) => format!("{:<18} no outcome", step.endpoint.as_str()),
    };
    if let Some(audit) = &step.audit {
        if audit.quota_counted {
            line.push_str(" quota");
        }
        if audit.security.any() {
            line.push_str(&format!(" flags=[{}]", audit.security.reasons.join(",")));
        }
        if !audit.sla.compliant {
            line.push_str(" sla-breach");
        }
    }
    line
}
