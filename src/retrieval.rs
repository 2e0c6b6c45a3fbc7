//! Page-level retrieval and context assembly over built document indexes.

use std::sync::Arc;

use tracing::debug;

use crate::embeddings::EmbeddingProvider;
use crate::stores::IndexStore;
use crate::types::{DocumentId, RagError};

/// Retrieves relevant pages for a query and reconstructs their text as
/// tagged context blocks for generation input.
#[derive(Clone)]
pub struct Retriever {
    store: Arc<IndexStore>,
}

impl Retriever {
    pub fn new(store: Arc<IndexStore>) -> Self {
        Self { store }
    }

    fn embedder(&self) -> &Arc<dyn EmbeddingProvider> {
        self.store.embedder()
    }

    /// Returns the distinct pages owning the `top_k` chunks nearest to
    /// `query`, in rank order.
    ///
    /// The stored model name is checked against the active embedder before
    /// searching; a mismatch is a hard error rather than a silent quality
    /// regression. Ranks outside the chunk table (the "fewer neighbours than
    /// requested" sentinel case) are discarded, never treated as page 0.
    pub async fn top_pages(
        &self,
        id: &DocumentId,
        query: &str,
        top_k: usize,
    ) -> Result<Vec<u32>, RagError> {
        let metadata = self.store.load_metadata(id).await?;
        let active = self.embedder().model_name();
        if metadata.model_name != active {
            return Err(RagError::ModelMismatch {
                document: id.key(),
                stored: metadata.model_name,
                active: active.to_string(),
            });
        }

        let vectors = self.embedder().embed_batch(&[query.to_string()]).await?;
        let query_vector = vectors
            .first()
            .ok_or_else(|| RagError::Embedding("embedder returned no query vector".into()))?;

        let hits = self.store.search(id, query_vector, top_k).await?;
        let mut pages = Vec::new();
        for (rank, score) in hits {
            let Some(chunk) = metadata.chunks.get(rank) else {
                continue;
            };
            debug!(document = %id, rank, score, page = chunk.page, "retrieval hit");
            if !pages.contains(&chunk.page) {
                pages.push(chunk.page);
            }
        }
        Ok(pages)
    }

    /// Reconstructs tagged page text for the requested pages.
    ///
    /// For each page, that page's chunk texts are joined in chunk order with
    /// single spaces (overlap regions are duplicated, by construction of the
    /// chunker) and wrapped in page-number and page-text tags. Pages with no
    /// stored text are silently omitted. Output order follows the input
    /// order, so callers control presentation order.
    pub async fn assemble_context(
        &self,
        id: &DocumentId,
        pages: &[u32],
    ) -> Result<String, RagError> {
        let metadata = self.store.load_metadata(id).await?;

        let mut context = String::new();
        for &page in pages {
            let mut page_text = String::new();
            for chunk in metadata.chunks.iter().filter(|chunk| chunk.page == page) {
                if !page_text.is_empty() {
                    page_text.push(' ');
                }
                page_text.push_str(&chunk.text);
            }
            if page_text.is_empty() {
                continue;
            }
            context.push_str(&format!(
                "<PAGENUMBER>{page}</PAGENUMBER>\n<PAGETEXT>{page_text}</PAGETEXT>\n\n\n"
            ));
        }
        Ok(context)
    }
}
