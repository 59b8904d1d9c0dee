use std::sync::Arc;

use agent_relay::agent::{AgentRegistry, ProfileAgent, RemoteAgent};
use agent_relay::api::{ApiState, task_routes};
use agent_relay::config::Config;
use agent_relay::queue::MemoryBroker;
use agent_relay::store::{LibSqlStore, MemoryStore, StatusStore};
use agent_relay::worker::WorkerController;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing; optional rolling file output next to stdout.
    let env_filter = || {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
    };
    let _log_guard = match std::env::var("AGENT_RELAY_LOG_DIR") {
        Ok(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "agent-relay.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::fmt()
                .with_env_filter(env_filter())
                .with_target(false)
                .with_writer(writer)
                .with_ansi(false)
                .init();
            Some(guard)
        }
        Err(_) => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter())
                .with_target(false)
                .init();
            None
        }
    };

    let config = Config::from_env()?;

    eprintln!("⚙️  Agent Relay v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Capacity: {} concurrent tasks", config.worker.max_concurrent_tasks);
    eprintln!(
        "   Topics: {} → {}",
        config.queue.request_topic, config.queue.result_topic
    );
    eprintln!("   API: http://0.0.0.0:{}/api/tasks", config.api.port);

    // ── Status store ─────────────────────────────────────────────────────
    let store: Arc<dyn StatusStore> = match &config.store.db_path {
        Some(path) => {
            eprintln!("   Store: libsql ({})", path.display());
            Arc::new(LibSqlStore::open(path, config.store.status_ttl).await?)
        }
        None => {
            eprintln!("   Store: in-memory");
            Arc::new(MemoryStore::new(config.store.status_ttl))
        }
    };

    // ── Broker ───────────────────────────────────────────────────────────
    let broker = Arc::new(MemoryBroker::new());
    let source = Arc::new(broker.source(&config.queue.request_topic));

    // ── Capabilities ─────────────────────────────────────────────────────
    let mut registry = AgentRegistry::new();
    registry.register(Arc::new(ProfileAgent::new(config.agents.profile_latency)));
    if let Some(endpoint) = &config.agents.remote_endpoint {
        registry.register(Arc::new(RemoteAgent::new(
            endpoint.as_str(),
            config.agents.remote_timeout,
        )?));
    }
    let mut agent_types = registry.agent_types();
    agent_types.sort_unstable();
    eprintln!("   Agents: {}\n", agent_types.join(", "));
    let registry = Arc::new(registry);

    // ── Worker ───────────────────────────────────────────────────────────
    let controller = Arc::new(WorkerController::new(
        Arc::clone(&store),
        source,
        broker.clone(),
        registry,
        config.worker.clone(),
        config.queue.clone(),
    ));
    controller.start().await?;

    // ── HTTP front door ──────────────────────────────────────────────────
    let app = task_routes(ApiState {
        store,
        sink: broker,
        request_topic: config.queue.request_topic.clone(),
    });
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.api.port)).await?;
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            tracing::error!(error = %e, "API server exited");
        }
    });

    // ── Graceful shutdown ────────────────────────────────────────────────
    tokio::signal::ctrl_c().await?;
    tracing::info!("Termination signal received");
    controller.shutdown().await?;

    Ok(())
}
