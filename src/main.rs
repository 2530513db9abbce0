//! sitesnap server binary
//!
//! Screenshot bundling service over HTTP.

use anyhow::Context;
use clap::Parser;
use sitesnap::browser::{ChromeLauncher, SessionPool};
use sitesnap::cleanup::CleanupScheduler;
use sitesnap::pipeline::{default_launch_options, CapturePipeline, PipelineConfig};
use sitesnap::record::{HttpRecordSink, NullRecordSink, RecordSink};
use sitesnap::server::{router, AppState, ArchiveIndex};
use std::sync::Arc;

/// sitesnap screenshot bundling service
#[derive(Parser, Debug)]
#[command(name = "sitesnap")]
#[command(version)]
#[command(about = "Captures a page and its same-origin sub-pages into a zip of screenshots")]
struct Args {
    /// Port to listen on
    #[arg(short, long, env = "PORT", default_value = "8080")]
    port: u16,

    /// Host to bind to
    #[arg(short = 'H', long, default_value = "0.0.0.0")]
    host: String,

    /// Path to Chrome/Chromium executable
    #[arg(long, env = "CHROMIUM_PATH")]
    chrome_path: Option<String>,

    /// Record-store endpoint for request logging (omit to disable)
    #[arg(long, env = "RECORD_STORE_URL")]
    record_url: Option<String>,

    /// Directory for capture directories and archives
    #[arg(long, default_value = "shots")]
    shots_dir: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let filter = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    tokio::fs::create_dir_all(&args.shots_dir)
        .await
        .with_context(|| format!("creating shots directory {}", args.shots_dir))?;

    let sink: Arc<dyn RecordSink> = match &args.record_url {
        Some(url) => {
            tracing::info!("Recording requests to {}", url);
            Arc::new(HttpRecordSink::new(url.clone()))
        }
        None => {
            tracing::warn!("No record store configured, request logging disabled");
            Arc::new(NullRecordSink)
        }
    };

    let launcher = ChromeLauncher::new(default_launch_options(args.chrome_path.clone()));
    let pool = SessionPool::new(Arc::new(launcher));
    // Launch the browser up front so the first request joins an
    // in-progress launch instead of starting cold.
    pool.warm_up().await;

    let state = Arc::new(AppState {
        pipeline: CapturePipeline::new(pool, sink, PipelineConfig::new(&args.shots_dir)),
        archives: ArchiveIndex::default(),
        cleanup: CleanupScheduler::new(),
    });

    let addr = format!("{}:{}", args.host, args.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {}", addr))?;
    tracing::info!("sitesnap listening on http://{}", addr);

    let shutdown_state = state.clone();
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutting down, flushing pending cleanups");
            shutdown_state.cleanup.flush();
        })
        .await
        .context("server error")?;

    // Flushed deletions run on spawned tasks; give them a moment
    // before the runtime is torn down.
    tokio::time::sleep(std::time::Duration::from_millis(250)).await;

    Ok(())
}
