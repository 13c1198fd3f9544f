// src/main.rs

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use delve::config::CONFIG;
use delve::events::ResearchEvent;
use delve::providers::openai::OpenAiClient;
use delve::providers::tavily::TavilyClient;
use delve::{ResearchOrchestrator, ResearchRequest, SessionStatus};

#[derive(Parser, Debug)]
#[command(name = "delve", about = "Iterative web research from the command line")]
struct Args {
    /// The research question
    query: String,

    /// Maximum research iterations (clamped to [1,7])
    #[arg(long)]
    max_depth: Option<u32>,

    /// Wall-clock limit in seconds (clamped to [1,270])
    #[arg(long)]
    time_limit_secs: Option<u64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize tracing; RUST_LOG overrides the configured level
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(CONFIG.log_level.clone()));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("delve starting (model: {})", CONFIG.model);

    let tavily = Arc::new(TavilyClient::new(
        CONFIG.tavily_api_key.clone(),
        CONFIG.tavily_base_url.clone(),
        CONFIG.search_timeout(),
    )?);
    let engine = Arc::new(OpenAiClient::new(
        CONFIG.openai_api_key.clone(),
        CONFIG.openai_base_url.clone(),
        CONFIG.model.clone(),
        CONFIG.max_output_tokens,
        CONFIG.reasoning_timeout(),
    )?);

    let orchestrator = Arc::new(ResearchOrchestrator::new(
        tavily.clone(),
        tavily,
        engine,
    ));

    let mut request = ResearchRequest::new(args.query);
    if let Some(depth) = args.max_depth {
        request = request.with_max_depth(depth);
    }
    if let Some(secs) = args.time_limit_secs {
        request = request.with_time_limit(Duration::from_secs(secs));
    }

    // Ctrl-C cancels cooperatively; the session still synthesizes from
    // whatever it has gathered.
    let cancel = CancellationToken::new();
    let ctrl_c_token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\ninterrupted - wrapping up with what we have");
            ctrl_c_token.cancel();
        }
    });

    let mut events = orchestrator.stream(request, cancel);
    let mut status = SessionStatus::Active;

    while let Some(event) = events.next().await {
        match event {
            ResearchEvent::ProgressInit { estimated_total_steps } => {
                eprintln!("research started (~{} steps)", estimated_total_steps);
            }
            ResearchEvent::DepthDelta { depth } => {
                eprintln!("── iteration {} complete", depth);
            }
            ResearchEvent::ActivityDelta { kind, status, message, .. } => {
                eprintln!("[{:?}] {:?}: {}", kind, status, message);
            }
            ResearchEvent::SourceDelta { url, title } => {
                eprintln!("source: {} <{}>", title, url);
            }
            ResearchEvent::TextDelta { fragment } => {
                print!("{}", fragment);
                let _ = std::io::stdout().flush();
            }
            ResearchEvent::Finish {
                status: final_status,
                elapsed_ms,
                iterations,
                source_count,
                ..
            } => {
                println!();
                eprintln!(
                    "done ({:?}) in {:.1}s: {} iteration(s), {} source(s)",
                    final_status,
                    elapsed_ms as f64 / 1000.0,
                    iterations,
                    source_count
                );
                status = final_status;
            }
        }
    }

    if status == SessionStatus::Failed {
        std::process::exit(1);
    }
    Ok(())
}
