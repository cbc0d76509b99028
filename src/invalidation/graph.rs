//! Dependency Graph Module
//!
//! In-process parent-to-dependents mapping used for cascading invalidation.
//! Owned exclusively by the invalidation engine; never persisted, so the
//! graph is empty after a process restart and is not shared across backend
//! instances.

use std::collections::{HashMap, HashSet};

use tokio::sync::RwLock;

// == Dependency Graph ==
#[derive(Debug, Default)]
pub struct DependencyGraph {
    edges: RwLock<HashMap<String, HashSet<String>>>,
}

impl DependencyGraph {
    /// Creates an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that invalidating `parent` should also invalidate `child`.
    pub async fn register(&self, parent: &str, child: &str) {
        self.edges
            .write()
            .await
            .entry(parent.to_string())
            .or_default()
            .insert(child.to_string());
    }

    /// Removes a single edge; drops the parent once it has no dependents.
    pub async fn remove(&self, parent: &str, child: &str) {
        let mut edges = self.edges.write().await;
        if let Some(children) = edges.get_mut(parent) {
            children.remove(child);
            if children.is_empty() {
                edges.remove(parent);
            }
        }
    }

    /// Direct dependents of `parent` (one level, not transitive).
    pub async fn dependents_of(&self, parent: &str) -> Vec<String> {
        self.edges
            .read()
            .await
            .get(parent)
            .map(|children| children.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Number of parents with at least one dependent.
    pub async fn len(&self) -> usize {
        self.edges.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.edges.read().await.is_empty()
    }
}
