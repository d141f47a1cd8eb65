use crate::ingest;
use crate::kubernetes::ResourceSource;
use crate::rpc::{RpcServer, SERVICE_NAME};
use crate::store::ResourceStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::{info, warn};

/// The long-running cache service: ingestion tasks plus the RPC endpoint.
pub struct WatchService {
    pub store: Arc<ResourceStore>,
    pub source: Arc<dyn ResourceSource>,
    pub contexts: Vec<String>,
    pub only: String,
    pub interval: Duration,
}

impl WatchService {
    pub fn new(source: Arc<dyn ResourceSource>, contexts: Vec<String>) -> Self {
        Self {
            store: Arc::new(ResourceStore::new()),
            source,
            contexts,
            only: String::new(),
            interval: ingest::DEFAULT_POLL_INTERVAL,
        }
    }

    /// Serve until the listener fails. Never returns `Ok`.
    pub async fn run(self, listener: TcpListener) -> anyhow::Result<()> {
        for ctx in &self.contexts {
            if let Err(e) = self.source.ping(ctx).await {
                warn!(context = %ctx, error = %e, "ping failed");
            }
        }

        let _handles = ingest::spawn_all(
            self.store.clone(),
            self.source.clone(),
            &self.contexts,
            &self.only,
            self.interval,
        );

        info!(bind = %listener.local_addr()?, contexts = ?self.contexts, "started to listen");
        RpcServer::new()
            .register(SERVICE_NAME, self.store)
            .serve(listener)
            .await?;
        anyhow::bail!("watch has stopped")
    }
}
