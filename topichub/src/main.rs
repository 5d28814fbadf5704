use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use topichub_core::provider::{ChannelProvider, MemoryProvider, RedisChannelProvider};
use topichub_core::registry::{QueueLifecycle, TopicRegistry};
use topichub_core::{logging, Config};

use topichub_cluster::{ReplicationConfig, ReplicationManager};

/// Topic-subscription registry server
#[derive(Debug, Parser)]
#[command(name = "topichub", about = "distributed topic-subscription registry")]
struct Args {
    /// Path to a config file (defaults to ./config.yaml if present)
    #[arg(long, env = "TOPICHUB_CONFIG_PATH")]
    config: Option<String>,

    /// Override the configured listen port
    #[arg(long)]
    port: Option<u16>,
}

/// Generate a unique node ID for this replica
fn generate_node_id() -> String {
    let host = hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| "unknown".to_string());
    format!("{host}-{}", nanoid::nanoid!(6))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => warn!(error = %e, "failed to install SIGTERM handler"),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
    info!("shutdown signal received");
}

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Load configuration
    let args = Args::parse();
    let config_path = args.config.as_deref().unwrap_or("config.yaml");
    let mut config = Config::from_file(config_path)
        .map_err(|e| anyhow::anyhow!("failed to load configuration: {e}"))?;
    if let Some(port) = args.port {
        config.server.port = port;
    }

    // 2. Validate configuration (fail fast on misconfigurations)
    if let Err(errors) = config.validate() {
        for e in &errors {
            eprintln!("Config validation error: {e}");
        }
        return Err(anyhow::anyhow!(
            "configuration validation failed with {} error(s)",
            errors.len()
        ));
    }

    // 3. Initialize logging
    logging::init_logging(&config.logging)?;
    let node_id = generate_node_id();
    info!(node_id = %node_id, zone = %config.registry.zone, "topichub server starting");

    // 4. Select the channel provider
    let redis_provider = if config.redis.url.is_empty() {
        None
    } else {
        Some(Arc::new(RedisChannelProvider::new(
            &config.redis.url,
            Duration::from_secs(config.redis.operation_timeout_seconds),
        )?))
    };
    let provider: Arc<dyn ChannelProvider> = match &redis_provider {
        Some(redis) => {
            info!(url = %config.redis.url, "using redis channel provider");
            redis.clone()
        }
        None => {
            warn!("redis not configured, using in-memory provider (single-node mode)");
            Arc::new(MemoryProvider::new())
        }
    };

    // 5. Initialize the registry core
    let lifecycle = QueueLifecycle::new(provider.clone(), config.registry.zone.clone());
    let registry = Arc::new(TopicRegistry::new(
        lifecycle,
        config.registry.identity_attempts,
    ));

    // 6. Start replication
    let replication = ReplicationManager::start(
        provider,
        registry.clone(),
        ReplicationConfig {
            node_id,
            zone: config.registry.zone.clone(),
            poll_timeout: Duration::from_secs(config.replication.poll_timeout_seconds),
            publish_queue_capacity: config.replication.publish_queue_capacity,
        },
    )
    .await?;

    // 7. Serve the RPC surface until a shutdown signal arrives
    let addr = config.http_address();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(address = %addr, "server up and running");

    let app = topichub_api::create_router(registry.clone());
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // 8. Stop background tasks
    replication.shutdown();
    if let Some(redis) = &redis_provider {
        redis.shutdown();
    }
    let metrics = registry.metrics();
    info!(
        identities = metrics.identities,
        topics = metrics.topics,
        "topichub server stopped"
    );

    Ok(())
}
