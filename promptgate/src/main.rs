// promptgate/src/main.rs
//
// Thin driver around the library; the core contracts live in lib.rs.
//
// Two modes:
//   check   — run one prompt through the firewall and print the decision
//   replay  — feed a JSONL file of evaluation requests through the firewall
//             in order (conversation state accumulates per identifier)
//
// Usage:
//   promptgate check "Ignore all previous instructions"
//   promptgate replay --path requests.jsonl

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::warn;
use tracing_subscriber::EnvFilter;

use promptgate::firewall::types::{Decision, GuardRequest};
use promptgate::{FirewallConfig, FirewallEvaluator};

#[derive(Parser)]
#[command(
    name    = "promptgate",
    about   = "Input guardrail firewall for LLM applications",
    version = env!("CARGO_PKG_VERSION"),
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Evaluate a single prompt and print the decision as JSON.
    Check {
        text: String,
        #[arg(long, help = "User identifier for rate/context state")]
        user: Option<String>,
    },
    /// Replay a JSONL file of evaluation requests through the firewall.
    Replay {
        #[arg(long)]
        path: PathBuf,
        #[arg(long, help = "Print allowed requests too")]
        verbose: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("promptgate=info".parse()?),
        )
        .compact()
        .init();

    let cli = Cli::parse();
    let firewall = FirewallEvaluator::new(FirewallConfig::from_env());

    match cli.command {
        Command::Check { text, user } => {
            let request = GuardRequest { input_text: text, user_id: user, ..Default::default() };
            let response = firewall.evaluate(&request).await;
            println!("{}", serde_json::to_string_pretty(&response)?);
        }

        Command::Replay { path, verbose } => {
            let file = tokio::fs::File::open(&path).await?;
            let mut lines = BufReader::new(file).lines();

            let mut total = 0usize;
            let mut blocked = 0usize;
            let mut sanitized = 0usize;
            let mut throttled = 0usize;

            while let Some(line) = lines.next_line().await? {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                let request: GuardRequest = match serde_json::from_str(line) {
                    Ok(req) => req,
                    Err(e) => {
                        warn!("parse error: {}", e);
                        continue;
                    }
                };
                let response = firewall.evaluate(&request).await;
                total += 1;
                match response.decision {
                    Decision::Blocked   => blocked += 1,
                    Decision::Sanitized => sanitized += 1,
                    Decision::Throttled => throttled += 1,
                    Decision::Allowed   => {}
                }
                if verbose || response.decision != Decision::Allowed {
                    println!(
                        "{} {} threat={} confidence={:.2} latency={:.1}ms",
                        response.evaluation_id,
                        response.decision,
                        response
                            .threat
                            .map(|t| t.to_string())
                            .unwrap_or_else(|| "-".to_string()),
                        response.confidence,
                        response.latency_ms,
                    );
                }
            }

            println!(
                "\nreplayed={total} blocked={blocked} sanitized={sanitized} throttled={throttled} \
                 allowed={}",
                total - blocked - sanitized - throttled
            );
        }
    }

    Ok(())
}
