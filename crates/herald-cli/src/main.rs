//! herald CLI
//!
//! in-memory のアダプタと MockTransport でパイプラインを動かします。
//!
//! - `herald demo`: サンプルを何通か流し、終端状態と検索結果を JSON で出す
//! - `herald send --to <E164> --body <text> [--deny <E164>...]`: 1 通だけ送る

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::info;

use herald_core::app::{App, AppBuilder, HealthReport, NotificationService};
use herald_core::config::PipelineConfig;
use herald_core::domain::{
    CorrelationId, DeliveryRequest, PageRequest, PipelineError, SearchDocument, TransportOutcome,
    validate_submission,
};
use herald_core::impls::MockTransport;

/// How long the CLI waits for a submission to reach a terminal state.
const SETTLE_TIMEOUT: Duration = Duration::from_secs(10);

/// herald — asynchronous SMS delivery pipeline (in-memory backends).
#[derive(Parser)]
#[command(name = "herald", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a short demo: several submissions, a denylisted one, a transport failure.
    Demo,
    /// Submit one message, wait for it to be processed and print the record.
    /// Exits non-zero when the delivery ends FAILED.
    Send {
        /// Destination in E.164 format, e.g. +15551234567.
        #[arg(long)]
        to: String,
        /// Message body.
        #[arg(long)]
        body: String,
        /// Destinations to put on the denylist before submitting.
        #[arg(long)]
        deny: Vec<String>,
    },
}

#[derive(Serialize)]
struct DemoReport {
    records: Vec<DeliveryRequest>,
    rejected: Vec<Rejection>,
    search_code: Vec<SearchDocument>,
    health: HealthReport,
}

#[derive(Serialize)]
struct Rejection {
    destination: String,
    error: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    herald_core::logging::init();
    let cli = Cli::parse();

    let config = PipelineConfig::load().context("failed to load configuration")?;

    match cli.command {
        Command::Demo => handle_demo(config).await,
        Command::Send { to, body, deny } => handle_send(config, &to, &body, &deny).await,
    }
}

fn build_app(config: PipelineConfig, transport: Arc<MockTransport>) -> anyhow::Result<App> {
    AppBuilder::new()
        .with_config(config)
        .with_in_memory_backends()
        .with_transport(transport)
        .build()
        .context("failed to wire pipeline")
}

async fn handle_demo(config: PipelineConfig) -> anyhow::Result<()> {
    let transport = Arc::new(MockTransport::new());
    // 2 通目は transport 側で失敗させる
    transport.script([
        TransportOutcome::sent("MOCK_MSG_A"),
        TransportOutcome::failed("RATE_LIMIT", "Too many requests for destination"),
    ]);
    let app = build_app(config, transport)?;
    let workers = app.spawn_workers();
    let service = &app.service;

    service
        .denylist_add(&["+15550000666".to_string()])
        .await
        .context("failed to seed denylist")?;

    let samples = [
        ("+15550000101", "Your verification code is 4821"),
        ("+15550000102", "Reminder: dentist appointment tomorrow"),
        ("+15550000666", "This one is denylisted"),
        ("+15550000103", "Your code expires in 5 minutes"),
    ];

    let mut accepted = Vec::new();
    let mut rejected = Vec::new();
    for (destination, body) in samples {
        match service.submit(destination, body).await {
            Ok(submission) => {
                info!(correlation_id = %submission.correlation_id, destination, "submitted");
                accepted.push(submission.correlation_id);
            }
            Err(err @ PipelineError::DestinationBlocked(_)) => rejected.push(Rejection {
                destination: destination.to_string(),
                error: err.to_string(),
            }),
            Err(err) => return Err(err).context("submission failed"),
        }
    }

    let mut records = Vec::with_capacity(accepted.len());
    for correlation_id in &accepted {
        records.push(wait_terminal(service, correlation_id).await?);
    }
    workers.shutdown_and_join().await;

    let search_code = service
        .search_by_text("code", PageRequest::default())
        .await
        .context("search failed")?
        .items;

    let report = DemoReport {
        records,
        rejected,
        search_code,
        health: service.health().await,
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn handle_send(
    mut config: PipelineConfig,
    to: &str,
    body: &str,
    deny: &[String],
) -> anyhow::Result<()> {
    validate_submission(to, body).context("invalid submission")?;

    config.workers = 1;
    let app = build_app(config, Arc::new(MockTransport::new()))?;
    let workers = app.spawn_workers();

    if !deny.is_empty() {
        app.service
            .denylist_add(deny)
            .await
            .context("failed to update denylist")?;
    }

    let submission = match app.service.submit(to, body).await {
        Ok(submission) => submission,
        Err(err) => {
            workers.shutdown_and_join().await;
            bail!("submission rejected: {err}");
        }
    };

    let record = wait_terminal(&app.service, &submission.correlation_id).await;
    workers.shutdown_and_join().await;

    let record = record?;
    println!("{}", serde_json::to_string_pretty(&record)?);
    // FAILED は終了コードで知らせる
    match record.transport_failure() {
        Some(err) => Err(err).context("delivery failed"),
        None => Ok(()),
    }
}

/// record が終端状態になるまで待つ
async fn wait_terminal(
    service: &NotificationService,
    correlation_id: &CorrelationId,
) -> anyhow::Result<DeliveryRequest> {
    let poll = async {
        loop {
            let record = service.get_by_correlation_id(correlation_id).await?;
            if record.status().is_terminal() {
                return Ok::<_, PipelineError>(record);
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    };
    tokio::time::timeout(SETTLE_TIMEOUT, poll)
        .await
        .with_context(|| format!("{correlation_id} did not reach a terminal state"))?
        .with_context(|| format!("failed to read {correlation_id}"))
}
