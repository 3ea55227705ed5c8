use std::sync::Arc;

use anyhow::Context;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use inbox_agent::config::{AppConfig, default_prompts};
use inbox_agent::llm::create_provider;
use inbox_agent::pipeline::RateLimiter;
use inbox_agent::rag::{EmbeddingProvider, HttpEmbedder};
use inbox_agent::routes::{AppState, app_routes};
use inbox_agent::store::{Database, LibSqlBackend};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env().context("Invalid configuration")?;
    let _log_guard = init_tracing(&config);

    eprintln!("📬 Inbox Agent v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Model: {}", config.llm.model);
    eprintln!("   Database: {}", config.db_path.display());
    eprintln!("   Embeddings: {}", config.embedding.url);

    // ── Database ─────────────────────────────────────────────────────────
    let db: Arc<dyn Database> = Arc::new(
        LibSqlBackend::new_local(&config.db_path)
            .await
            .with_context(|| format!("Failed to open database at {}", config.db_path.display()))?,
    );

    if db.get_prompts().await?.is_blank() {
        db.save_prompts(&default_prompts()).await?;
        eprintln!("   Prompts: seeded defaults");
    }

    // ── Model + embeddings ──────────────────────────────────────────────
    let llm = create_provider(&config.llm)?;
    let embedder: Arc<dyn EmbeddingProvider> = Arc::new(HttpEmbedder::new(
        config.embedding.url.clone(),
        config.embedding.timeout,
    )?);

    let limiter = Arc::new(RateLimiter::new(
        config.pacing.max_calls,
        config.pacing.interval,
    ));
    if limiter.is_unlimited() {
        eprintln!("   Pacing: off");
    } else {
        eprintln!(
            "   Pacing: {} calls per {:?}",
            config.pacing.max_calls, config.pacing.interval
        );
    }

    let state = AppState::new(db, llm, embedder, limiter, config.rag);
    let app = app_routes(state);

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    eprintln!("   API: http://{addr}\n");
    tracing::info!(port = config.port, "HTTP server started");

    axum::serve(listener, app).await?;
    Ok(())
}

/// Stderr logging, plus a daily-rolling file when a log directory is set.
fn init_tracing(config: &AppConfig) -> Option<WorkerGuard> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);

    let Some(log_dir) = &config.log_dir else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .init();
        return None;
    };

    let appender = tracing_appender::rolling::daily(log_dir, "inbox-agent.log");
    let (writer, guard) = tracing_appender::non_blocking(appender);
    let file_layer = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_writer(writer);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stderr_layer)
        .with(file_layer)
        .init();
    Some(guard)
}
