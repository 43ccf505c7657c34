// Retriever module
// Embeds a question and finds the nearest portfolio documents


use std::sync::Arc;
use tracing::{debug, warn};

use crate::embeddings::EmbeddingClient;
use crate::index::EmbeddingIndex;

/// One retrieved piece of context, most similar first
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievedSnippet {
    pub text: String,
    pub source_label: String,
    pub distance: f32,
}

/// Similarity search over the embedding index.
///
/// Retrieval failures are deliberately swallowed: a question should
/// still get the no-data answer rather than an error page when the
/// embedding server or store hiccups.
pub struct Retriever {
    index: Arc<EmbeddingIndex>,
    embedder: Arc<EmbeddingClient>,
}

impl Retriever {
    #[inline]
    pub fn new(index: Arc<EmbeddingIndex>, embedder: Arc<EmbeddingClient>) -> Self {
        Self { index, embedder }
    }

    /// Return up to `n` document texts nearest to `query`, ordered by
    /// ascending distance. Returns an empty sequence when the index is
    /// empty or any underlying call fails.
    #[inline]
    pub async fn search(&self, query: &str, n: usize) -> Vec<RetrievedSnippet> {
        if n == 0 {
            return Vec::new();
        }

        // An empty index can answer without touching the embedding
        // server at all
        match self.index.count().await {
            Ok(0) => {
                debug!("Index is empty, nothing to retrieve");
                return Vec::new();
            }
            Ok(_) => {}
            Err(e) => {
                warn!("Failed to inspect index: {}", e);
                return Vec::new();
            }
        }

        let query_vector = match self.embedder.embed(query) {
            Ok(vector) => vector,
            Err(e) => {
                warn!("Failed to embed query: {}", e);
                return Vec::new();
            }
        };

        match self.index.search(&query_vector, n).await {
            Ok(matches) => {
                debug!("Retrieved {} snippets for query", matches.len());
                matches
                    .into_iter()
                    .map(|m| RetrievedSnippet {
                        text: m.metadata.content,
                        source_label: m.metadata.source_label,
                        distance: m.distance,
                    })
                    .collect()
            }
            Err(e) => {
                warn!("Vector search failed: {}", e);
                Vec::new()
            }
        }
    }
}
