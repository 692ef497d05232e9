use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    accounts_gateway::cli::run().await
}
