//! Trait seams for pluggable vector search backends.
//!
//! Each backend pairs one embedding model with the vector index built from
//! its features. Both halves are external collaborators supplied by the
//! host: the index search algorithm and the embedding model internals are
//! out of scope here. The registry holds them behind trait objects so the
//! dispatcher can fan out over a heterogeneous set.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::config::SearchConfig;
use crate::error::Result;
use crate::types::{BackendHit, ModelSelector, QueryInput, SearchModel};

/// One embedding-model + vector-index pair, treated as a read-only,
/// externally-owned resource for the duration of a request.
///
/// Implementations must be `Send + Sync`; the dispatcher queries several
/// backends concurrently under per-backend and global deadlines.
#[async_trait]
pub trait VectorSearchBackend: Send + Sync {
    /// Search the index for the `k` nearest items to `embedding`.
    ///
    /// Returned hits are in the index's native ranked order, best first,
    /// with ids unique within the list.
    ///
    /// # Errors
    ///
    /// Returns [`crate::SearchError::BackendUnavailable`] or
    /// [`crate::SearchError::BackendTimeout`]; the dispatcher absorbs
    /// either and proceeds with the remaining backends.
    async fn search(&self, embedding: &[f32], k: usize) -> Result<Vec<BackendHit>>;

    /// Which [`SearchModel`] this backend serves.
    fn model(&self) -> SearchModel;
}

/// Encodes a text or image query into the vector space of one model.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Encode `input` into a query vector.
    ///
    /// # Errors
    ///
    /// Returns [`crate::SearchError::EncodingFailed`] if the input cannot
    /// be encoded.
    async fn encode(&self, input: &QueryInput) -> Result<Vec<f32>>;
}

/// The encoder/index pair registered for one model.
#[derive(Clone)]
pub struct ModelBackend {
    /// Embedding provider for this model's vector space.
    pub encoder: Arc<dyn EmbeddingProvider>,
    /// The model's vector index.
    pub index: Arc<dyn VectorSearchBackend>,
}

/// Immutable map from [`SearchModel`] to its registered backend.
///
/// Built once at startup via [`BackendRegistry::builder`]; requests only
/// ever read from it.
#[derive(Clone, Default)]
pub struct BackendRegistry {
    backends: BTreeMap<SearchModel, ModelBackend>,
}

impl BackendRegistry {
    /// Start building a registry.
    pub fn builder() -> BackendRegistryBuilder {
        BackendRegistryBuilder::default()
    }

    /// Look up the backend registered for `model`.
    pub fn get(&self, model: SearchModel) -> Option<&ModelBackend> {
        self.backends.get(&model)
    }

    /// All registered models in stable (enum) order.
    pub fn registered(&self) -> Vec<SearchModel> {
        self.backends.keys().copied().collect()
    }

    /// Resolve a request's model selector against this registry and the
    /// enabled set in `config`.
    ///
    /// A model is selected only if it is registered here, enabled in
    /// `config.models`, and named by the selector. The result preserves
    /// stable (enum) order and may be empty.
    pub fn select(&self, selector: &ModelSelector, config: &SearchConfig) -> Vec<SearchModel> {
        self.backends
            .keys()
            .copied()
            .filter(|model| config.models.contains(model))
            .filter(|model| match selector {
                ModelSelector::All => true,
                ModelSelector::Only(models) => models.contains(model),
            })
            .collect()
    }
}

/// Builder for [`BackendRegistry`].
#[derive(Default)]
pub struct BackendRegistryBuilder {
    backends: BTreeMap<SearchModel, ModelBackend>,
}

impl BackendRegistryBuilder {
    /// Register a backend for `model`, replacing any previous registration.
    pub fn register(
        mut self,
        model: SearchModel,
        encoder: Arc<dyn EmbeddingProvider>,
        index: Arc<dyn VectorSearchBackend>,
    ) -> Self {
        self.backends.insert(model, ModelBackend { encoder, index });
        self
    }

    /// Finish building.
    pub fn build(self) -> BackendRegistry {
        BackendRegistry {
            backends: self.backends,
        }
    }
}
