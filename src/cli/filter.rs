use anyhow::Result;
use clap::Args;
use permissions_broker::FilterResult;
use serde_json::json;

use super::env::CliArgs;
use super::output::emit;
use super::runtime::load_filter;

#[derive(Args, Clone, Debug)]
pub struct FilterArgs {
    /// Permission codes as granted on the consent
    #[arg(required = true, value_name = "CODE")]
    pub codes: Vec<String>,
}

pub fn cmd_filter(args: FilterArgs, cli: &CliArgs) -> Result<()> {
    let filter = load_filter(cli.catalog.as_deref())?;
    match filter.filter(&args.codes) {
        Ok(result) => emit(cli.output, &result, || print_result(&result)),
        Err(err) => {
            let payload = json!({
                "error": err.to_string(),
                "removed": err.removed(),
                "status": err.status_hint().http_status(),
            });
            emit(cli.output, &payload, || {
                println!("Rejected (HTTP {}): {}", err.status_hint().http_status(), err);
                if !err.removed().is_empty() {
                    println!("Removed: {}", err.removed().join(", "));
                }
            })?;
            Err(err.into())
        }
    }
}

fn print_result(result: &FilterResult) {
    println!(
        "Status: {:?} (HTTP {})",
        result.status_hint,
        result.status_hint.http_status()
    );
    println!("Granted: {}", list(&result.filtered));
    if !result.expanded.is_empty() {
        println!("Expanded: {}", list(&result.expanded));
    }
    if !result.removed.is_empty() {
        println!("Removed: {}", list(&result.removed));
    }
    if !result.unrecognized.is_empty() {
        println!("Unrecognized: {}", list(&result.unrecognized));
    }
}

fn list(codes: &[String]) -> String {
    if codes.is_empty() {
        "-".to_string()
    } else {
        codes.join(", ")
    }
}
