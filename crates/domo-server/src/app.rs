//! Process wiring: clients, worker tasks, signal-driven shutdown.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use domo_core::DomoConfig;
use domo_extractor::MemoryExtractor;
use domo_graph::checkpoint::StoreCheckpointer;
use domo_llm::OpenAiProvider;
use domo_orchestrator::{Orchestrator, OrchestratorDeps, OrchestratorSettings};
use domo_scheduler::SchedulerEngine;
use domo_state::{SecretaryDirectory, StateCache, StateStoreClient};
use domo_stream::{RedisRetryStore, StreamClient};
use domo_tools::WebSearchConfig;

pub async fn run(config: DomoConfig) -> anyhow::Result<()> {
    info!(
        stream_in = %config.redis.stream_in,
        stream_out = %config.redis.stream_out,
        consumers = config.orchestrator.consumers,
        "starting domo-server"
    );

    // Broker connections. One client per stream; the retry store shares
    // the inbound client's connection.
    let consumer_name = config.consumer_name();
    let inbound = StreamClient::connect(
        &config.redis.url,
        &config.redis.stream_in,
        &config.redis.group,
        &consumer_name,
    )
    .await?;
    inbound.ensure_group().await?;
    let outbound = inbound.for_stream(&config.redis.stream_out);
    let retries = RedisRetryStore::connect(&config.redis.url).await?;

    // State store and hot-path caches.
    let state = Arc::new(StateStoreClient::new(
        &config.statestore.base_url,
        config.statestore.timeout_secs,
    )?);
    let cache = Arc::new(StateCache::new(Arc::clone(&state)));
    let secretaries = Arc::new(SecretaryDirectory::new(Arc::clone(&state)));

    // One provider instance serves chat, embeddings, and batches.
    let provider = Arc::new(OpenAiProvider::new(
        config.llm.api_key.clone(),
        config.llm.base_url.clone(),
        config.llm.embedding_model.clone(),
    ));

    let cancel = CancellationToken::new();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let web_search = config.websearch.as_ref().map(|ws| WebSearchConfig {
        base_url: ws.base_url.clone(),
        api_key: ws.api_key.clone(),
    });

    let orchestrator = Orchestrator::new(OrchestratorDeps {
        inbound: Arc::new(inbound.clone()),
        outbound: Arc::new(outbound.clone()),
        retries: Arc::new(retries),
        state: Arc::clone(&state),
        cache: Arc::clone(&cache),
        secretaries: Arc::clone(&secretaries),
        chat: provider.clone(),
        embedder: provider.clone(),
        checkpointer: Arc::new(StoreCheckpointer::new(Arc::clone(&state))),
        settings: OrchestratorSettings {
            consumers: config.orchestrator.consumers,
            read_block_ms: config.orchestrator.read_block_ms,
            idle_reclaim_ms: config.orchestrator.idle_reclaim_ms,
            llm_timeout: Duration::from_secs(config.llm.timeout_secs),
            tool_timeout: Duration::from_secs(config.orchestrator.tool_timeout_secs),
            summary_model: config.llm.summary_model.clone(),
            stream_in_name: config.redis.stream_in.clone(),
            stream_out_name: config.redis.stream_out.clone(),
            web_search,
        },
        cancel: cancel.clone(),
    });

    let mut tasks = Vec::new();

    {
        let shutdown = shutdown_rx.clone();
        tasks.push(tokio::spawn(async move {
            orchestrator.run(shutdown).await;
        }));
    }

    {
        let shutdown = shutdown_rx.clone();
        let directory = Arc::clone(&secretaries);
        tasks.push(tokio::spawn(async move {
            directory.run_refresh(shutdown).await;
        }));
    }

    if config.scheduler.enabled {
        let engine = SchedulerEngine::new(
            Arc::clone(&state),
            Arc::new(inbound.clone()),
            config.redis.stream_in.clone(),
            Duration::from_secs(config.scheduler.tick_secs),
        );
        let shutdown = shutdown_rx.clone();
        tasks.push(tokio::spawn(async move {
            engine.run(shutdown).await;
        }));
    } else {
        info!("scheduler disabled by config");
    }

    if config.extractor.enabled {
        let extractor = MemoryExtractor::new(
            Arc::clone(&state),
            provider.clone(),
            provider.clone(),
            config.llm.summary_model.clone(),
            Duration::from_secs(config.extractor.interval_hours * 3600),
        );
        let shutdown = shutdown_rx.clone();
        tasks.push(tokio::spawn(async move {
            extractor.run(shutdown).await;
        }));
    } else {
        info!("memory extractor disabled by config");
    }

    wait_for_signal().await;
    info!("shutdown signal received, draining");
    cancel.cancel();
    let _ = shutdown_tx.send(true);

    for task in tasks {
        if let Err(e) = task.await {
            warn!(error = %e, "worker task ended abnormally");
        }
    }
    info!("domo-server stopped");
    Ok(())
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};
    let mut sigterm = signal(SignalKind::terminate()).expect("install SIGTERM handler");
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = sigterm.recv() => {}
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
