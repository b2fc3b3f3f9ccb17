//! Demo binary wiring the export pipeline to an in-memory mock source and a
//! file sink, so the whole pipeline is exercisable without a real remote
//! API. Contains no business logic beyond that wiring.

use std::collections::HashMap;
use std::convert::Infallible;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};

use anyhow::{Context as _, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex as AsyncMutex;
use tower_service::Service;

use streamvault::checkpoint::CheckpointConfig;
use streamvault::concurrency::ClassLimiter;
use streamvault::controller::{AdaptiveController, ControllerConfig};
use streamvault::core::model::{ExportItem, OperationClass};
use streamvault::orchestrator::{
    Orchestrator, OrchestratorConfig, PaginatedSection, RunOutcome, Section, SectionConfig,
};
use streamvault::pagination::{PageRequest, PageResponse};
use streamvault::pipeline::{BoxError, Sink, Transform};

#[derive(Parser, Debug)]
#[command(name = "streamvault-export", about = "Export a mock paginated workspace")]
struct Args {
    /// Identifies this run; also names the checkpoint file.
    #[arg(long, default_value = "demo-export")]
    export_id: String,

    /// Directory the checkpoint and output file are written to.
    #[arg(long, default_value = "./streamvault-out")]
    output_dir: PathBuf,

    /// Number of synthetic items the mock source generates.
    #[arg(long, default_value_t = 500)]
    total_items: usize,

    /// Items returned per simulated page.
    #[arg(long, default_value_t = 50)]
    page_size: usize,
}

/// Generates `total` synthetic items across fixed-size pages, echoing
/// rate-limit-style headers on every response so the controller has real
/// signal to react to even without a live remote API.
struct MockPageSource {
    total: usize,
    page_size: usize,
    next_index: usize,
}

impl Service<PageRequest> for MockPageSource {
    type Response = PageResponse<ExportItem<String>>;
    type Error = Infallible;
    type Future = std::future::Ready<Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, _req: PageRequest) -> Self::Future {
        let start = self.next_index;
        let end = (start + self.page_size).min(self.total);
        let results = (start..end)
            .map(|n| {
                let id = format!("item-{n:06}");
                ExportItem::new(id.clone(), "item", id)
            })
            .collect();
        self.next_index = end;

        let remaining = self.total.saturating_sub(end);
        let mut headers = HashMap::new();
        headers.insert("x-ratelimit-limit".to_string(), "60".to_string());
        headers.insert("x-ratelimit-remaining".to_string(), remaining.min(59).to_string());
        headers.insert("x-ratelimit-reset".to_string(), "30".to_string());

        std::future::ready(Ok(PageResponse {
            results,
            next_cursor: if end < self.total { Some(end.to_string()) } else { None },
            headers: Some(headers),
        }))
    }
}

/// Serializes an item to one newline-delimited JSON-ish line. Stands in for
/// a real output-format encoder (spec §6 treats those as external).
struct LineTransform;

#[async_trait::async_trait]
impl Transform<String> for LineTransform {
    async fn transform(&self, item: &ExportItem<String>) -> Result<Vec<u8>, BoxError> {
        Ok(format!("{{\"id\":{:?},\"payload\":{:?}}}\n", item.id, item.payload).into_bytes())
    }
}

/// Appends every line to one file, already-idempotent: resuming and
/// re-emitting the tail of a prior run just appends duplicate lines, which
/// an idempotent sink is allowed to do.
struct FileSink {
    file: AsyncMutex<tokio::fs::File>,
}

impl FileSink {
    async fn create(path: &std::path::Path) -> Result<Self> {
        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await
            .with_context(|| format!("opening output file {}", path.display()))?;
        Ok(Self {
            file: AsyncMutex::new(file),
        })
    }
}

#[async_trait::async_trait]
impl Sink for FileSink {
    async fn write_line(&self, _section: &str, line: &[u8]) -> Result<(), BoxError> {
        let mut file = self.file.lock().await;
        file.write_all(line).await.map_err(|e| Box::new(e) as BoxError)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    tracing::info!(export_id = %args.export_id, total_items = args.total_items, "starting export");
    tokio::fs::create_dir_all(&args.output_dir)
        .await
        .with_context(|| format!("creating output directory {}", args.output_dir.display()))?;

    let source = MockPageSource {
        total: args.total_items,
        page_size: args.page_size,
        next_index: 0,
    };
    let sink = FileSink::create(&args.output_dir.join("export.jsonl")).await?;
    let section: Arc<dyn Section> = Arc::new(PaginatedSection::new(
        "items",
        OperationClass::Default,
        source,
        LineTransform,
        sink,
        SectionConfig {
            page_size: args.page_size,
            ..SectionConfig::default()
        },
    ));

    let orchestrator = Arc::new(Orchestrator::new(
        OrchestratorConfig::new(args.export_id.clone(), args.output_dir.clone()),
        AdaptiveController::new(ControllerConfig::default()),
        ClassLimiter::new(),
        CheckpointConfig::default(),
        vec![section],
    ));

    let total_items = args.total_items as u64;
    orchestrator.checkpoint().set_total_estimate(total_items);

    let bar = ProgressBar::new(total_items);
    bar.set_style(
        ProgressStyle::with_template("{bar:40.cyan/blue} {pos}/{len} {msg}")
            .expect("progress template is valid"),
    );

    let signal_orchestrator = Arc::clone(&orchestrator);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            signal_orchestrator.shutdown();
        }
    });

    let progress_orchestrator = Arc::clone(&orchestrator);
    let progress_bar = bar.clone();
    let ticks = Arc::new(AtomicUsize::new(0));
    let progress_handle = tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_millis(250));
        loop {
            interval.tick().await;
            let snapshot = progress_orchestrator.checkpoint().snapshot();
            progress_bar.set_position(snapshot.processed_count);
            let now_ms = ticks.fetch_add(250, Ordering::Relaxed) as u64;
            let estimate = progress_orchestrator.eta(now_ms);
            match estimate.eta {
                Some(remaining) => progress_bar.set_message(format!("eta {}s", remaining.as_secs())),
                None => progress_bar.set_message("eta --"),
            }
            if snapshot.processed_count >= total_items {
                break;
            }
        }
    });

    let outcome = orchestrator.run().await?;
    progress_handle.abort();
    bar.finish_and_clear();

    match outcome {
        RunOutcome::Completed => {
            tracing::info!(export_id = %args.export_id, "export complete");
            println!("export complete: {}", args.output_dir.join("export.jsonl").display());
            Ok(())
        }
        RunOutcome::Interrupted => {
            tracing::warn!(export_id = %args.export_id, "export interrupted");
            println!("export interrupted; resume by rerunning with the same --export-id");
            std::process::exit(2);
        }
    }
}
