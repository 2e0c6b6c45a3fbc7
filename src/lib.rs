//! Retrieval-augmented query engine over per-company, per-year financial
//! filings.
//!
//! ```text
//! Filing acquisition ──► ingestion::ingest_corpus ──┐
//!                                                   │
//! Raw pages ──► chunking ──► embeddings ──► stores::IndexStore
//!                                                   │  (index + metadata pair
//!                                                   │   per document)
//! User query ──► engine::QueryEngine
//!                   ├─► llm (decomposition) ──► sub-queries
//!                   ├─► retrieval::Retriever per sub-query ──► tagged context
//!                   └─► llm (synthesis) ──► llm::extract ──► AnswerEnvelope
//! ```
//!
//! Each document owns an isolated index; similarity scores are never merged
//! across documents, only the retrieved pages are. Generation calls run
//! behind a bounded retry and a structural JSON repair layer, so a top-level
//! query degrades to an empty answer instead of erroring.

pub mod chunking;
pub mod config;
pub mod embeddings;
pub mod engine;
pub mod ingestion;
pub mod llm;
pub mod prompts;
pub mod retrieval;
pub mod stores;
pub mod types;

pub use config::{EngineConfig, IndexConfig, RetryPolicy};
pub use embeddings::{EmbeddingProvider, HttpEmbeddingProvider, MockEmbeddingProvider};
pub use engine::{AnswerEnvelope, CompanyRegistry, Decomposition, QueryEngine};
pub use llm::{CompletionProvider, Extracted, HttpCompletionProvider, extract_json};
pub use retrieval::Retriever;
pub use stores::{BuildReport, BuildStatus, DocumentMetadata, IndexStore};
pub use types::{DocumentId, RagError};
