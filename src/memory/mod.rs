//! Memory Store (spec §4.3): tenant-scoped semantic memory over a shared
//! vector client.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{AgentError, ErrorKind};
use crate::types::MemoryNamespace;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryHit {
    pub text: String,
    pub metadata: serde_json::Map<String, serde_json::Value>,
    pub score: f32,
}

/// Process-singleton vector backend, injected via the Service Factory
/// (§4.3, §4.12, §5).
#[async_trait]
pub trait VectorClient: Send + Sync {
    async fn upsert(
        &self,
        namespace: &str,
        text: &str,
        metadata: serde_json::Map<String, serde_json::Value>,
    ) -> Result<(), AgentError>;

    async fn search(&self, namespace: &str, query: &str, k: usize) -> Result<Vec<MemoryHit>, AgentError>;
}

/// A cheap wrapper binding a namespace over the shared vector client.
/// Constructing one without a namespace is a startup misconfiguration.
#[derive(Clone)]
pub struct MemoryStore {
    client: Arc<dyn VectorClient>,
    namespace: MemoryNamespace,
}

impl MemoryStore {
    /// In production mode, an empty context id is rejected rather than
    /// silently defaulting to a shared namespace (§4.3).
    pub fn new(client: Arc<dyn VectorClient>, namespace: MemoryNamespace, production: bool) -> Result<Self, AgentError> {
        if production && namespace.context_id.is_empty() {
            tracing::error!("MemoryStore constructed with an empty context_id in production mode");
            return Err(AgentError::InvalidConfiguration(
                "MemoryStore requires a non-empty context_id namespace".to_string(),
            ));
        }
        Ok(Self { client, namespace })
    }

    fn namespaced(&self, context_id: &str) -> String {
        format!("{}:{}", context_id, self.namespace.collection)
    }

    pub async fn upsert(
        &self,
        text: &str,
        metadata: serde_json::Map<String, serde_json::Value>,
    ) -> Result<(), AgentError> {
        let ns = self.namespaced(&self.namespace.context_id);
        match self.client.upsert(&ns, text, metadata).await {
            Ok(()) => Ok(()),
            Err(e) => {
                tracing::warn!(error = %e, namespace = %ns, "memory upsert failed");
                Err(e)
            }
        }
    }

    /// On backend failure, returns empty and logs a degraded span event
    /// rather than propagating -- memory search is best-effort (§4.3, §7).
    pub async fn search(&self, query: &str, k: usize) -> Vec<MemoryHit> {
        let ns = self.namespaced(&self.namespace.context_id);
        match self.client.search(&ns, query, k).await {
            Ok(hits) => hits,
            Err(e) => {
                tracing::event!(
                    tracing::Level::WARN,
                    kind = ?ErrorKind::MemoryDegraded,
                    error = %e,
                    "memory search degraded"
                );
                Vec::new()
            }
        }
    }

    pub fn namespace(&self) -> &MemoryNamespace {
        &self.namespace
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FailingClient;

    #[async_trait]
    impl VectorClient for FailingClient {
        async fn upsert(
            &self,
            _namespace: &str,
            _text: &str,
            _metadata: serde_json::Map<String, serde_json::Value>,
        ) -> Result<(), AgentError> {
            Err(AgentError::new(ErrorKind::Internal, "backend down"))
        }

        async fn search(&self, _namespace: &str, _query: &str, _k: usize) -> Result<Vec<MemoryHit>, AgentError> {
            Err(AgentError::new(ErrorKind::Internal, "backend down"))
        }
    }

    #[derive(Default)]
    struct RecordingClient {
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl VectorClient for RecordingClient {
        async fn upsert(
            &self,
            namespace: &str,
            _text: &str,
            _metadata: serde_json::Map<String, serde_json::Value>,
        ) -> Result<(), AgentError> {
            self.calls.lock().unwrap().push(namespace.to_string());
            Ok(())
        }

        async fn search(&self, namespace: &str, _query: &str, _k: usize) -> Result<Vec<MemoryHit>, AgentError> {
            self.calls.lock().unwrap().push(namespace.to_string());
            Ok(Vec::new())
        }
    }

    #[test]
    fn empty_context_rejected_in_production() {
        let client = Arc::new(FailingClient);
        let ns = MemoryNamespace::new("", "collection");
        assert!(MemoryStore::new(client, ns, true).is_err());
    }

    #[tokio::test]
    async fn search_degrades_to_empty_on_failure() {
        let client = Arc::new(FailingClient);
        let ns = MemoryNamespace::new("ctx-1", "collection");
        let store = MemoryStore::new(client, ns, false).unwrap();
        let hits = store.search("anything", 5).await;
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn every_call_carries_the_context_namespace() {
        let client = Arc::new(RecordingClient::default());
        let ns = MemoryNamespace::new("ctx-42", "collection");
        let store = MemoryStore::new(client.clone(), ns, true).unwrap();
        store.upsert("hello", serde_json::Map::new()).await.unwrap();
        store.search("hello", 3).await;
        let calls = client.calls.lock().unwrap();
        assert!(calls.iter().all(|c| c.starts_with("ctx-42:")));
    }
}
