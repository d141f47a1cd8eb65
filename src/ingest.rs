use crate::kubernetes::ResourceSource;
use crate::store::ResourceStore;
use crate::types::EventType;
use futures::stream::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Kinds with a usable change feed.
pub const WATCH_KINDS: &[&str] = &["pod"];
/// Kinds refreshed by periodic full listing.
pub const POLL_KINDS: &[&str] = &["node", "namespace"];

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(120);
pub const POLL_RETRY_DELAY: Duration = Duration::from_secs(5);

/// `only` is a comma-separated kind list; empty enables every kind.
pub fn is_enabled(kind: &str, only: &str) -> bool {
    only.trim().is_empty()
        || only
            .split(',')
            .any(|k| k.trim().eq_ignore_ascii_case(kind))
}

/// Spawn one task per (context, kind) for every enabled kind.
pub fn spawn_all(
    store: Arc<ResourceStore>,
    source: Arc<dyn ResourceSource>,
    contexts: &[String],
    only: &str,
    interval: Duration,
) -> Vec<JoinHandle<()>> {
    let mut handles = Vec::new();
    for ctx in contexts {
        for kind in WATCH_KINDS.iter().filter(|k| is_enabled(k, only)) {
            handles.push(spawn_watch_loop(
                store.clone(),
                source.clone(),
                ctx.clone(),
                kind.to_string(),
            ));
        }
        for kind in POLL_KINDS.iter().filter(|k| is_enabled(k, only)) {
            handles.push(spawn_poll_loop(
                store.clone(),
                source.clone(),
                ctx.clone(),
                kind.to_string(),
                interval,
                POLL_RETRY_DELAY,
            ));
        }
    }
    handles
}

pub fn spawn_watch_loop(
    store: Arc<ResourceStore>,
    source: Arc<dyn ResourceSource>,
    context: String,
    kind: String,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            info!(context = %context, kind = %kind, "started to watch");
            match source.watch(&context, &kind).await {
                Ok(mut stream) => {
                    while let Some(event) = stream.next().await {
                        match event {
                            Ok(event) => {
                                debug!(
                                    context = %context,
                                    name = %event.record.name,
                                    event_type = ?event.event_type,
                                    "received event"
                                );
                                match event.event_type {
                                    EventType::Added | EventType::Modified => {
                                        store.upsert(&context, event.record).await
                                    }
                                    EventType::Deleted => {
                                        store.delete(&context, &event.record).await
                                    }
                                }
                            }
                            Err(e) => {
                                warn!(context = %context, kind = %kind, error = %e, "watch stream failed");
                                break;
                            }
                        }
                    }
                    info!(context = %context, kind = %kind, "watch connection was closed, retrying");
                }
                Err(e) => {
                    warn!(context = %context, kind = %kind, error = %e, "failed to open watch, retrying");
                }
            }
            store.delete_kind(&context, &kind).await;
            tokio::task::yield_now().await;
        }
    })
}

pub fn spawn_poll_loop(
    store: Arc<ResourceStore>,
    source: Arc<dyn ResourceSource>,
    context: String,
    kind: String,
    interval: Duration,
    retry_delay: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            loop {
                match source.list(&context, &kind).await {
                    Ok(records) => {
                        let count = records.len();
                        store.replace_kind(&context, &kind, records).await;
                        let cached = store.contexts().await;
                        debug!(
                            context = %context,
                            kind = %kind,
                            count,
                            cached = ?cached,
                            "refreshed"
                        );
                        break;
                    }
                    Err(e) => {
                        warn!(context = %context, kind = %kind, error = %e, "failed to list resources");
                        tokio::time::sleep(retry_delay).await;
                    }
                }
            }
            // next refresh is a full interval after the successful one
            ticker.reset();
        }
    })
}
