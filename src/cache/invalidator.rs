use super::key::CacheKey;
use crate::core::Result;
use async_trait::async_trait;
use futures::future::join_all;
use log::{debug, warn};
use std::fmt;
use std::sync::Arc;
use tokio::sync::broadcast;

const CHANNEL_CAPACITY: usize = 64;

/// Something that holds cached selection results and can drop them.
#[async_trait]
pub trait InvalidationSink: Send + Sync {
    fn name(&self) -> &str;

    /// Drops every entry covered by `key`.
    async fn invalidate(&self, key: &CacheKey) -> Result<()>;
}

/// Fans invalidation signals out to registered sinks and subscribers.
///
/// Invalidation never fails the caller: sink errors are logged and counted.
#[derive(Clone)]
pub struct CacheInvalidator {
    sinks: Vec<Arc<dyn InvalidationSink>>,
    sender: broadcast::Sender<CacheKey>,
}

impl CacheInvalidator {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            sinks: Vec::new(),
            sender,
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn InvalidationSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn sink_count(&self) -> usize {
        self.sinks.len()
    }

    /// Receiver for every key invalidated from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<CacheKey> {
        self.sender.subscribe()
    }

    /// Invalidates `key` in all sinks concurrently.
    ///
    /// Returns the number of sinks that failed.
    pub async fn invalidate(&self, key: CacheKey) -> usize {
        let results = join_all(self.sinks.iter().map(|sink| async move {
            (sink.name().to_string(), sink.invalidate(&key).await)
        }))
        .await;

        let mut failures = 0;
        for (sink, result) in results {
            if let Err(err) = result {
                warn!("cache invalidation of {key} failed in {sink}: {err}");
                failures += 1;
            }
        }

        // No subscribers is fine.
        if self.sender.send(key).is_err() {
            debug!("no subscribers for invalidation of {key}");
        }
        failures
    }
}

impl Default for CacheInvalidator {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CacheInvalidator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sinks: Vec<&str> = self.sinks.iter().map(|sink| sink.name()).collect();
        f.debug_struct("CacheInvalidator")
            .field("sinks", &sinks)
            .field("subscribers", &self.sender.receiver_count())
            .finish()
    }
}
