use std::{fs, path::PathBuf, process::ExitCode, time::Duration};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use cvi_client::{
    BackoffPolicy, CancellationToken, ConversationLauncher, DEFAULT_MAX_RETRIES, GatewayClient,
    LaunchRequest, Phase, RetryController, RetryOutcome,
};
use cvi_core::{EventQuery, FileEventSink, Topic};
use time::OffsetDateTime;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "cvi", version, about = "Operator CLI for the CVI gateway")]
struct Cli {
    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Subcommand, Debug)]
enum CliCommand {
    /// Open a conversation through the gateway, retrying transient failures (Ctrl-C cancels)
    Open {
        /// Base URL of the gateway.
        #[arg(long, env = "CVI_GATEWAY_URL", default_value = "http://localhost:3000")]
        gateway: String,
        /// Vertical to launch (defaults to GENERAL on the server).
        #[arg(long)]
        vertical: Option<String>,
        /// Document tag to attach; can be repeated.
        #[arg(long = "document-tag", value_name = "TAG")]
        document_tags: Vec<String>,
        /// Memory store key for returning users.
        #[arg(long)]
        memory_key: Option<String>,
        #[arg(long, default_value_t = DEFAULT_MAX_RETRIES)]
        max_retries: u32,
        /// First backoff delay in milliseconds.
        #[arg(long, default_value_t = 1_000)]
        base_delay_ms: u64,
    },
    /// Print signature and timestamp headers for a webhook payload file
    Sign {
        #[arg(long, value_name = "PATH")]
        payload: PathBuf,
        #[arg(long, env = "TAVUS_WEBHOOK_SECRET", hide_env_values = true)]
        secret: String,
        /// Unix seconds to stamp (defaults to now).
        #[arg(long)]
        timestamp: Option<i64>,
        #[arg(long, default_value = "x-tavus-signature")]
        signature_header: String,
        #[arg(long, default_value = "x-tavus-timestamp")]
        timestamp_header: String,
    },
    /// Read the day-partitioned webhook event log
    Events {
        #[arg(long, env = "EVENTS_DIR", default_value = "diagnostics/events")]
        dir: PathBuf,
        /// conversation, video, webhook, error, info or conversion.
        #[arg(long)]
        topic: Option<Topic>,
        /// Single day to read, YYYY-MM-DD.
        #[arg(long)]
        date: Option<String>,
        #[arg(long, default_value_t = 100)]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    match cli.command {
        CliCommand::Open {
            gateway,
            vertical,
            document_tags,
            memory_key,
            max_retries,
            base_delay_ms,
        } => {
            cvi_telemetry::install("cvi-cli", env!("CARGO_PKG_VERSION"))?;
            let request = LaunchRequest {
                vertical,
                document_tags: (!document_tags.is_empty()).then_some(document_tags),
                memory_key,
            };
            let policy = BackoffPolicy {
                base: Duration::from_millis(base_delay_ms),
                ..BackoffPolicy::default()
            };
            handle_open(&gateway, request, RetryController::new(policy, max_retries)).await
        }
        CliCommand::Sign {
            payload,
            secret,
            timestamp,
            signature_header,
            timestamp_header,
        } => {
            let body = fs::read(&payload)
                .with_context(|| format!("reading payload {}", payload.display()))?;
            let timestamp =
                timestamp.unwrap_or_else(|| OffsetDateTime::now_utc().unix_timestamp());
            println!("{signature_header}: {}", security::sign(&body, &secret));
            println!("{timestamp_header}: {timestamp}");
            Ok(ExitCode::SUCCESS)
        }
        CliCommand::Events {
            dir,
            topic,
            date,
            limit,
        } => {
            let page = FileEventSink::new(&dir)
                .query(EventQuery { limit, topic, date })
                .await
                .with_context(|| format!("reading events under {}", dir.display()))?;
            println!("{}", serde_json::to_string_pretty(&page)?);
            Ok(ExitCode::SUCCESS)
        }
    }
}

async fn handle_open(
    gateway: &str,
    request: LaunchRequest,
    controller: RetryController,
) -> Result<ExitCode> {
    let client = GatewayClient::new(reqwest::Client::new(), gateway)
        .map_err(|err| anyhow::anyhow!(err.user_message()))?;
    let launcher = ConversationLauncher::new(client, controller);

    let mut states = launcher.subscribe();
    tokio::spawn(async move {
        while states.changed().await.is_ok() {
            let state = *states.borrow_and_update();
            if state.phase == Phase::Retrying {
                eprintln!(
                    "attempt {} failed, retrying in {} ms",
                    state.attempt + 1,
                    state.next_delay_ms
                );
            }
            if state.phase.is_terminal() {
                break;
            }
        }
    });

    let stop = CancellationToken::new();
    let interrupt = tokio::spawn({
        let stop = stop.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("interrupt received, cancelling");
                stop.cancel();
            }
        }
    });

    let outcome = launcher.open_until(request, &stop).await;
    interrupt.abort();

    match outcome {
        RetryOutcome::Success { value, .. } => {
            println!("{}", serde_json::to_string_pretty(&value)?);
            Ok(ExitCode::SUCCESS)
        }
        RetryOutcome::Failed {
            error, attempts, ..
        } => {
            eprintln!("{} ({attempts} attempt(s))", error.user_message());
            Ok(ExitCode::FAILURE)
        }
        RetryOutcome::Cancelled { attempts } => {
            eprintln!("cancelled after {attempts} attempt(s)");
            Ok(ExitCode::from(130))
        }
    }
}
