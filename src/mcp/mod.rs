//! MCP Client Pool (spec §4.2). A per-tenant cache of remote tool-server
//! connections with health state, TTL eviction, and negative caching of
//! failed hosts.

mod client;

pub use client::{McpClient, McpTool};

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tokio::sync::Mutex;

use crate::error::{AgentError, ErrorKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Connecting,
    Healthy,
    Broken,
    Evicted,
}

struct CacheEntry {
    client: Arc<dyn McpClient>,
    state: State,
    last_used: Instant,
}

struct NegativeEntry {
    backoff: Duration,
    retry_after: Instant,
}

/// Builds a connected client for (context, server) on a cache miss.
#[async_trait::async_trait]
pub trait McpConnector: Send + Sync {
    async fn connect(&self, context_id: &str, server: &str) -> Result<Arc<dyn McpClient>, AgentError>;
}

/// A read-only snapshot for admin/diagnostic introspection (§9 redesign
/// flag: no more private-attribute poking, a public API instead).
pub struct PoolSnapshot {
    pub cached: Vec<(String, String, State)>,
    pub negative: Vec<(String, String, Instant)>,
}

pub struct McpClientPool {
    connector: Arc<dyn McpConnector>,
    ttl: Duration,
    negative_backoff_base: Duration,
    cache: DashMap<(String, String), CacheEntry>,
    negative: DashMap<(String, String), NegativeEntry>,
    /// Per-key locks for double-checked locking on concurrent `get`. Bounded
    /// by periodic sweep rather than growing monotonically (§4.2, §5).
    locks: DashMap<(String, String), Arc<Mutex<()>>>,
}

impl std::fmt::Debug for McpClientPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("McpClientPool")
            .field("ttl", &self.ttl)
            .field("negative_backoff_base", &self.negative_backoff_base)
            .field("cache_len", &self.cache.len())
            .field("negative_len", &self.negative.len())
            .finish()
    }
}

impl McpClientPool {
    pub fn new(connector: Arc<dyn McpConnector>, ttl: Duration, negative_backoff_base: Duration) -> Self {
        Self {
            connector,
            ttl,
            negative_backoff_base,
            cache: DashMap::new(),
            negative: DashMap::new(),
            locks: DashMap::new(),
        }
    }

    /// Returns a healthy client, connecting on demand. Concurrent callers for
    /// the same (context, server) share one connection attempt.
    pub async fn get(&self, context_id: &str, server: &str) -> Result<Arc<dyn McpClient>, AgentError> {
        let key = (context_id.to_string(), server.to_string());

        if let Some(mut entry) = self.cache.get_mut(&key) {
            if entry.state == State::Healthy && entry.last_used.elapsed() <= self.ttl {
                entry.last_used = Instant::now();
                return Ok(entry.client.clone());
            }
        }

        if let Some(neg) = self.negative.get(&key) {
            if Instant::now() < neg.retry_after {
                return Err(AgentError::new(
                    ErrorKind::McpUnavailable,
                    format!("server '{server}' is in backoff until a later retry"),
                ));
            }
        }

        let lock = self
            .locks
            .entry(key.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = lock.lock().await;

        // Re-check after acquiring the gate (double-checked locking).
        if let Some(mut entry) = self.cache.get_mut(&key) {
            if entry.state == State::Healthy && entry.last_used.elapsed() <= self.ttl {
                entry.last_used = Instant::now();
                return Ok(entry.client.clone());
            }
        }

        match self.connector.connect(context_id, server).await {
            Ok(client) => {
                self.negative.remove(&key);
                self.cache.insert(
                    key.clone(),
                    CacheEntry {
                        client: client.clone(),
                        state: State::Healthy,
                        last_used: Instant::now(),
                    },
                );
                Ok(client)
            }
            Err(e) => {
                let backoff = self
                    .negative
                    .get(&key)
                    .map(|entry| (entry.backoff * 2).min(Duration::from_secs(30 * 60)))
                    .unwrap_or(self.negative_backoff_base);
                self.negative.insert(
                    key.clone(),
                    NegativeEntry {
                        backoff,
                        retry_after: Instant::now() + backoff,
                    },
                );
                self.cache.insert(
                    key,
                    CacheEntry {
                        client: Arc::new(client::DeadClient),
                        state: State::Broken,
                        last_used: Instant::now(),
                    },
                );
                Err(e)
            }
        }
    }

    /// Cheapest available health probe; deliberately does not call
    /// `list_tools`, which is heavyweight (§4.2).
    pub async fn health_check(&self, context_id: &str, server: &str) -> bool {
        match self.get(context_id, server).await {
            Ok(client) => client.ping().await.is_ok(),
            Err(_) => false,
        }
    }

    /// Removes cache entries idle past `ttl` and sweeps the lock table so it
    /// stays bounded.
    pub fn evict_idle(&self) {
        self.cache.retain(|_, entry| entry.last_used.elapsed() <= self.ttl);
        self.locks.retain(|key, _| self.cache.contains_key(key));
    }

    pub fn snapshot(&self, context_id: &str) -> PoolSnapshot {
        let cached = self
            .cache
            .iter()
            .filter(|e| e.key().0 == context_id)
            .map(|e| (e.key().0.clone(), e.key().1.clone(), e.value().state))
            .collect();
        let negative = self
            .negative
            .iter()
            .filter(|e| e.key().0 == context_id)
            .map(|e| (e.key().0.clone(), e.key().1.clone(), e.value().retry_after))
            .collect();
        PoolSnapshot { cached, negative }
    }

    /// Closes all clients; resources must not leak (§4.2, §5 shutdown).
    pub async fn shutdown(&self) {
        let clients: Vec<Arc<dyn McpClient>> =
            self.cache.iter().map(|e| e.value().client.clone()).collect();
        for client in clients {
            let _ = client.close().await;
        }
        self.cache.clear();
        self.negative.clear();
        self.locks.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FlakyConnector {
        attempts: AtomicUsize,
        fail_first_n: usize,
    }

    #[async_trait::async_trait]
    impl McpConnector for FlakyConnector {
        async fn connect(&self, _context_id: &str, _server: &str) -> Result<Arc<dyn McpClient>, AgentError> {
            let n = self.attempts.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_first_n {
                Err(AgentError::new(ErrorKind::McpUnavailable, "connect refused"))
            } else {
                Ok(Arc::new(client::DeadClient))
            }
        }
    }

    #[tokio::test]
    async fn failed_connect_enters_negative_cache_with_backoff() {
        let connector = Arc::new(FlakyConnector {
            attempts: AtomicUsize::new(0),
            fail_first_n: 100,
        });
        let pool = McpClientPool::new(connector, Duration::from_secs(60), Duration::from_millis(10));
        assert!(pool.get("ctx-1", "srv").await.is_err());
        let snap = pool.snapshot("ctx-1");
        assert_eq!(snap.negative.len(), 1);
    }

    #[tokio::test]
    async fn healthy_client_is_reused_within_ttl() {
        let connector = Arc::new(FlakyConnector {
            attempts: AtomicUsize::new(0),
            fail_first_n: 0,
        });
        let pool = McpClientPool::new(connector, Duration::from_secs(60), Duration::from_millis(10));
        pool.get("ctx-1", "srv").await.unwrap();
        pool.get("ctx-1", "srv").await.unwrap();
        let snap = pool.snapshot("ctx-1");
        assert_eq!(snap.cached.len(), 1);
    }

    #[tokio::test]
    async fn shutdown_clears_all_clients() {
        let connector = Arc::new(FlakyConnector {
            attempts: AtomicUsize::new(0),
            fail_first_n: 0,
        });
        let pool = McpClientPool::new(connector, Duration::from_secs(60), Duration::from_millis(10));
        pool.get("ctx-1", "srv").await.unwrap();
        pool.shutdown().await;
        assert_eq!(pool.snapshot("ctx-1").cached.len(), 0);
    }
}
