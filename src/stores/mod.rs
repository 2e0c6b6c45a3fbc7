//! Per-document vector index storage.
//!
//! Each indexed document is persisted as a pair of artifacts under the
//! configured index root:
//!
//! ```text
//! <key>.index.sqlite   similarity index (sqlite-vec, insertion-ordered rows)
//! <key>.meta.json      DocumentMetadata: chunk descriptors parallel to rows
//! ```
//!
//! The pair is one unit: a document counts as indexed only when both files
//! exist, and the metadata's chunk order is the sole mapping from a search
//! rank back to its page. Builds write the index first and rename the
//! metadata into place last, so a concurrent reader never observes an index
//! without its matching metadata.

pub mod sqlite;

use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{error, info};

use crate::chunking::{chunk_text, clean_text};
use crate::config::IndexConfig;
use crate::embeddings::EmbeddingProvider;
use crate::types::{DocumentId, RagError};

pub use sqlite::DocumentIndex;

/// Descriptor for one indexed chunk; order matches index row order.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChunkMeta {
    /// 1-based page the chunk was cut from.
    pub page: u32,
    /// Byte offset of the chunk within the cleaned page text.
    pub offset: usize,
    pub text: String,
}

/// Metadata artifact persisted next to a document's index.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub document: String,
    pub model_name: String,
    pub dim: usize,
    pub vector_count: usize,
    pub chunks: Vec<ChunkMeta>,
}

/// Outcome of one document build.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BuildStatus {
    /// Index and metadata were (re)computed and persisted.
    Built,
    /// An index pair already existed and `overwrite` was false.
    Skipped,
}

#[derive(Clone, Debug)]
pub struct BuildReport {
    pub document: DocumentId,
    pub status: BuildStatus,
    /// Vectors persisted; zero for skipped builds.
    pub vectors: usize,
}

/// Builds, persists, and searches per-document vector indexes.
#[derive(Clone)]
pub struct IndexStore {
    config: IndexConfig,
    embedder: Arc<dyn EmbeddingProvider>,
}

impl IndexStore {
    pub fn new(config: IndexConfig, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self { config, embedder }
    }

    pub fn config(&self) -> &IndexConfig {
        &self.config
    }

    pub fn embedder(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.embedder
    }

    fn artifact_paths(&self, id: &DocumentId) -> (PathBuf, PathBuf) {
        let key = id.key();
        (
            self.config.index_root.join(format!("{key}.index.sqlite")),
            self.config.index_root.join(format!("{key}.meta.json")),
        )
    }

    /// Returns `true` when both artifacts of the pair exist.
    pub fn is_indexed(&self, id: &DocumentId) -> bool {
        let (index_path, meta_path) = self.artifact_paths(id);
        index_path.exists() && meta_path.exists()
    }

    /// Chunks, embeds, and persists one document's pages.
    ///
    /// With `overwrite` false an existing pair short-circuits to
    /// [`BuildStatus::Skipped`], which makes corpus rebuilds idempotent and
    /// cheap to re-run. Zero chunks surviving the page filter is
    /// [`RagError::NoContent`].
    pub async fn build(
        &self,
        id: &DocumentId,
        pages: &[String],
        overwrite: bool,
    ) -> Result<BuildReport, RagError> {
        let (index_path, meta_path) = self.artifact_paths(id);
        if !overwrite && index_path.exists() && meta_path.exists() {
            info!(document = %id, "index already exists, skipping build");
            return Ok(BuildReport {
                document: id.clone(),
                status: BuildStatus::Skipped,
                vectors: 0,
            });
        }
        fs::create_dir_all(&self.config.index_root).await?;

        let mut chunks = Vec::new();
        for (page_number, page) in pages.iter().enumerate() {
            let cleaned = clean_text(page);
            if cleaned.len() < self.config.min_chars_per_page {
                continue;
            }
            for window in chunk_text(&cleaned, self.config.chunk_len, self.config.chunk_overlap) {
                chunks.push(ChunkMeta {
                    page: (page_number + 1) as u32,
                    offset: window.offset,
                    text: window.text,
                });
            }
        }
        if chunks.is_empty() {
            return Err(RagError::NoContent(id.key()));
        }

        let texts: Vec<String> = chunks.iter().map(|chunk| chunk.text.clone()).collect();
        let vectors = self.embedder.embed_batch(&texts).await?;
        if vectors.len() != chunks.len() {
            return Err(RagError::Embedding(format!(
                "embedder returned {} vectors for {} chunks",
                vectors.len(),
                chunks.len()
            )));
        }
        let dim = vectors.first().map(|v| v.len()).unwrap_or(0);

        // Retire the old pair metadata-first: with the metadata gone, readers
        // treat the document as unindexed while the index is rewritten.
        if meta_path.exists() {
            fs::remove_file(&meta_path).await?;
        }

        let index_tmp = index_path.with_extension("sqlite.tmp");
        if index_tmp.exists() {
            fs::remove_file(&index_tmp).await?;
        }
        let index = DocumentIndex::create(&index_tmp).await?;
        index.add_vectors(&vectors).await?;
        index.close().await?;
        fs::rename(&index_tmp, &index_path).await?;

        let metadata = DocumentMetadata {
            document: id.key(),
            model_name: self.embedder.model_name().to_string(),
            dim,
            vector_count: chunks.len(),
            chunks,
        };
        let meta_tmp = meta_path.with_extension("json.tmp");
        let serialized = serde_json::to_string(&metadata)
            .map_err(|err| RagError::Storage(err.to_string()))?;
        fs::write(&meta_tmp, serialized).await?;
        fs::rename(&meta_tmp, &meta_path).await?;

        info!(
            document = %id,
            vectors = metadata.vector_count,
            dim,
            "built document index"
        );
        Ok(BuildReport {
            document: id.clone(),
            status: BuildStatus::Built,
            vectors: metadata.vector_count,
        })
    }

    /// Builds indexes for a whole corpus, one document at a time.
    ///
    /// A failing document is logged and skipped; the batch always runs to
    /// completion. Reports are returned for the documents that succeeded.
    pub async fn build_all(
        &self,
        documents: &[(DocumentId, Vec<String>)],
        overwrite: bool,
    ) -> Vec<BuildReport> {
        let mut reports = Vec::with_capacity(documents.len());
        for (id, pages) in documents {
            match self.build(id, pages, overwrite).await {
                Ok(report) => reports.push(report),
                Err(err) => {
                    error!(document = %id, error = %err, "failed to build index");
                }
            }
        }
        reports
    }

    /// Loads the metadata artifact on its own.
    pub async fn load_metadata(&self, id: &DocumentId) -> Result<DocumentMetadata, RagError> {
        let (index_path, meta_path) = self.artifact_paths(id);
        if !index_path.exists() || !meta_path.exists() {
            return Err(RagError::IndexNotFound(id.key()));
        }
        let raw = fs::read_to_string(&meta_path).await?;
        let metadata: DocumentMetadata =
            serde_json::from_str(&raw).map_err(|err| RagError::Storage(err.to_string()))?;
        if metadata.chunks.len() != metadata.vector_count {
            return Err(RagError::Storage(format!(
                "metadata for '{}' diverged: {} chunks vs vector_count {}",
                id.key(),
                metadata.chunks.len(),
                metadata.vector_count
            )));
        }
        Ok(metadata)
    }

    /// Opens a document's index together with its metadata.
    ///
    /// Partial presence of the pair is always an error, never silently
    /// tolerated, as is any divergence between stored rows and metadata.
    pub async fn load(
        &self,
        id: &DocumentId,
    ) -> Result<(DocumentIndex, DocumentMetadata), RagError> {
        let metadata = self.load_metadata(id).await?;
        let (index_path, _) = self.artifact_paths(id);
        let index = DocumentIndex::open(&index_path).await?;
        let stored = index.vector_count().await?;
        if stored != metadata.vector_count {
            return Err(RagError::Storage(format!(
                "index for '{}' diverged from metadata: {} vectors stored vs {} recorded",
                id.key(),
                stored,
                metadata.vector_count
            )));
        }
        Ok((index, metadata))
    }

    /// Searches a document's index, clamping `k` to its vector count.
    pub async fn search(
        &self,
        id: &DocumentId,
        query_vector: &[f32],
        k: usize,
    ) -> Result<Vec<(usize, f32)>, RagError> {
        let (index, metadata) = self.load(id).await?;
        index.search(query_vector, k.min(metadata.vector_count)).await
    }
}
