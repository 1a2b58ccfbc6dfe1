use anyhow::Context;
use clap::Args;
use serde_json::Value;
use std::time::Duration;

use crate::cli::utils::output_success;
use crate::cli::OutputFormat;

#[derive(Debug, Args)]
pub struct PingArgs {
    #[arg(long, default_value = "http://localhost:3000", help = "Base URL of the server")]
    pub url: String,
}

pub async fn handle(args: PingArgs, output_format: OutputFormat) -> anyhow::Result<()> {
    let base = url::Url::parse(&args.url).context("invalid server URL")?;
    let health = base.join("/health").context("invalid server URL")?;

    let client = reqwest::Client::builder().timeout(Duration::from_secs(5)).build()?;
    let response = client
        .get(health.clone())
        .send()
        .await
        .with_context(|| format!("cannot reach {}", health))?;
    let status = response.status();
    let body: Value = response.json().await.context("health endpoint returned invalid JSON")?;

    if !status.is_success() {
        anyhow::bail!("{} answered {}: {}", health, status, body);
    }
    output_success(output_format, &format!("{} is healthy", base), body)
}
