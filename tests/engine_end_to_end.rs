//! End-to-end tests over the index store, retriever, and query engine using
//! deterministic mock embeddings and a scripted completion provider.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::tempdir;

use finrag::config::{EngineConfig, IndexConfig, RetryPolicy};
use finrag::embeddings::{EmbeddingProvider, MockEmbeddingProvider};
use finrag::engine::{CompanyRegistry, QueryEngine};
use finrag::llm::CompletionProvider;
use finrag::retrieval::Retriever;
use finrag::stores::{BuildStatus, IndexStore};
use finrag::types::{DocumentId, RagError};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn make_store(root: &std::path::Path) -> Arc<IndexStore> {
    init_tracing();
    Arc::new(IndexStore::new(
        IndexConfig::new(root),
        Arc::new(MockEmbeddingProvider::new()),
    ))
}

fn revenue_pages() -> Vec<String> {
    vec![
        "Total revenue was $50 billion for the fiscal year, an increase of twelve percent."
            .to_string(),
        "Forward looking statements legal proceedings litigation employees headcount offices."
            .to_string(),
    ]
}

/// Completion provider that replays canned responses and records every call.
struct ScriptedLlm {
    responses: Mutex<VecDeque<String>>,
    calls: Mutex<Vec<(String, String)>>,
}

impl ScriptedLlm {
    fn new(responses: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.iter().map(|s| s.to_string()).collect()),
            calls: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl CompletionProvider for ScriptedLlm {
    async fn complete(&self, system: &str, context: &str) -> Result<String, RagError> {
        self.calls
            .lock()
            .unwrap()
            .push((system.to_string(), context.to_string()));
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| RagError::Completion("script exhausted".into()))
    }
}

fn make_engine(store: Arc<IndexStore>, llm: Arc<ScriptedLlm>) -> QueryEngine {
    QueryEngine::new(
        store,
        llm,
        CompanyRegistry::default(),
        EngineConfig::default().with_retry(RetryPolicy::new(2, Duration::from_millis(1))),
    )
}

#[tokio::test]
async fn build_is_idempotent_without_overwrite() {
    let dir = tempdir().unwrap();
    let store = make_store(dir.path());
    let id = DocumentId::new("MSFT", 2023);

    let first = store.build(&id, &revenue_pages(), false).await.unwrap();
    assert_eq!(first.status, BuildStatus::Built);
    assert_eq!(first.vectors, 2);

    let meta_path = dir.path().join("MSFT_2023.meta.json");
    let before = std::fs::read_to_string(&meta_path).unwrap();

    let second = store.build(&id, &revenue_pages(), false).await.unwrap();
    assert_eq!(second.status, BuildStatus::Skipped);

    let after = std::fs::read_to_string(&meta_path).unwrap();
    assert_eq!(before, after, "skipped build must not touch artifacts");

    let third = store.build(&id, &revenue_pages(), true).await.unwrap();
    assert_eq!(third.status, BuildStatus::Built);
}

#[tokio::test]
async fn empty_document_is_no_content() {
    let dir = tempdir().unwrap();
    let store = make_store(dir.path());
    let id = DocumentId::new("MSFT", 2023);

    let pages = vec!["".to_string(), "cover".to_string()];
    let err = store.build(&id, &pages, false).await.unwrap_err();
    assert!(matches!(err, RagError::NoContent(_)));
    assert!(!store.is_indexed(&id));
}

#[tokio::test]
async fn build_all_continues_past_empty_documents() {
    let dir = tempdir().unwrap();
    let store = make_store(dir.path());

    let documents = vec![
        (DocumentId::new("MSFT", 2022), vec!["".to_string()]),
        (DocumentId::new("MSFT", 2023), revenue_pages()),
    ];
    let reports = store.build_all(&documents, false).await;

    // The empty document fails its build; the batch still finishes.
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].document, DocumentId::new("MSFT", 2023));
    assert_eq!(reports[0].status, BuildStatus::Built);
    assert!(!store.is_indexed(&DocumentId::new("MSFT", 2022)));
    assert!(store.is_indexed(&DocumentId::new("MSFT", 2023)));
}

#[tokio::test]
async fn loading_unbuilt_document_fails() {
    let dir = tempdir().unwrap();
    let store = make_store(dir.path());
    let err = store
        .load(&DocumentId::new("NVDA", 2024))
        .await
        .unwrap_err();
    assert!(matches!(err, RagError::IndexNotFound(_)));
}

#[tokio::test]
async fn search_clamps_k_to_vector_count() {
    let dir = tempdir().unwrap();
    let store = make_store(dir.path());
    let id = DocumentId::new("MSFT", 2023);
    store.build(&id, &revenue_pages(), false).await.unwrap();

    let embedder = MockEmbeddingProvider::new();
    let query = embedder
        .embed_batch(&["total revenue".to_string()])
        .await
        .unwrap();
    let hits = store.search(&id, &query[0], 100).await.unwrap();
    assert_eq!(hits.len(), 2, "never more hits than stored vectors");
}

#[tokio::test]
async fn chunk_metadata_round_trips_through_search() {
    let dir = tempdir().unwrap();
    let store = make_store(dir.path());
    let id = DocumentId::new("GOOGL", 2023);

    let pages = vec![
        "Cloud segment revenue grew substantially across enterprise customers this year."
            .to_string(),
        "Advertising remains the largest component of consolidated revenues for the period."
            .to_string(),
        "Research and development expenses increased driven by compensation and infrastructure."
            .to_string(),
    ];
    store.build(&id, &pages, false).await.unwrap();
    let (_, metadata) = store.load(&id).await.unwrap();
    assert_eq!(metadata.vector_count, metadata.chunks.len());
    assert_eq!(metadata.vector_count, 3);

    // Querying with a chunk's own text must rank that chunk first.
    let embedder = MockEmbeddingProvider::new();
    for (rank, chunk) in metadata.chunks.iter().enumerate() {
        let query = embedder.embed_batch(&[chunk.text.clone()]).await.unwrap();
        let hits = store
            .search(&id, &query[0], metadata.vector_count)
            .await
            .unwrap();
        assert_eq!(hits[0].0, rank, "self-query must return the chunk itself");
        assert!(hits[0].1 > 0.99, "self-similarity should be ~1.0");
    }
}

#[tokio::test]
async fn long_page_chunks_cover_the_whole_page() {
    let dir = tempdir().unwrap();
    let store = make_store(dir.path());
    let id = DocumentId::new("NVDA", 2023);

    let sentence = "Data center revenue reached record levels driven by accelerated computing. ";
    let page = sentence.repeat(20); // well beyond one 512-char window
    store.build(&id, &[page.clone()], false).await.unwrap();

    let metadata = store.load_metadata(&id).await.unwrap();
    assert!(metadata.chunks.len() > 1);
    assert_eq!(metadata.chunks[0].offset, 0);
    let cleaned_len = page.trim().len();
    let last = metadata.chunks.last().unwrap();
    assert_eq!(last.offset + last.text.len(), cleaned_len);
    for pair in metadata.chunks.windows(2) {
        assert_eq!(pair[1].offset - pair[0].offset, 512 - 50);
    }
}

#[tokio::test]
async fn retriever_finds_the_revenue_page() {
    let dir = tempdir().unwrap();
    let store = make_store(dir.path());
    let id = DocumentId::new("MSFT", 2023);
    store.build(&id, &revenue_pages(), false).await.unwrap();

    let retriever = Retriever::new(store.clone());
    let pages = retriever
        .top_pages(&id, "What was total revenue?", 1)
        .await
        .unwrap();
    assert_eq!(pages, vec![1]);

    let context = retriever.assemble_context(&id, &pages).await.unwrap();
    assert!(context.contains("<PAGENUMBER>1</PAGENUMBER>"));
    assert!(context.contains("Total revenue was $50 billion"));
}

#[tokio::test]
async fn assembler_omits_unknown_pages_and_keeps_input_order() {
    let dir = tempdir().unwrap();
    let store = make_store(dir.path());
    let id = DocumentId::new("MSFT", 2023);
    store.build(&id, &revenue_pages(), false).await.unwrap();

    let retriever = Retriever::new(store);
    let context = retriever.assemble_context(&id, &[2, 99, 1]).await.unwrap();
    assert!(!context.contains("<PAGENUMBER>99</PAGENUMBER>"));
    let page_two = context.find("<PAGENUMBER>2</PAGENUMBER>").unwrap();
    let page_one = context.find("<PAGENUMBER>1</PAGENUMBER>").unwrap();
    assert!(page_two < page_one, "output follows requested order");
}

#[tokio::test]
async fn mismatched_embedding_model_is_rejected() {
    struct Renamed(MockEmbeddingProvider);

    #[async_trait]
    impl EmbeddingProvider for Renamed {
        fn model_name(&self) -> &str {
            "mock-v2"
        }
        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
            self.0.embed_batch(texts).await
        }
    }

    let dir = tempdir().unwrap();
    let id = DocumentId::new("MSFT", 2023);
    make_store(dir.path())
        .build(&id, &revenue_pages(), false)
        .await
        .unwrap();

    // Same artifacts, different active model.
    let store = Arc::new(IndexStore::new(
        IndexConfig::new(dir.path()),
        Arc::new(Renamed(MockEmbeddingProvider::new())),
    ));
    let err = Retriever::new(store)
        .top_pages(&id, "total revenue", 1)
        .await
        .unwrap_err();
    assert!(matches!(err, RagError::ModelMismatch { .. }));
}

#[tokio::test]
async fn single_document_query_end_to_end() {
    let dir = tempdir().unwrap();
    let store = make_store(dir.path());
    store
        .build(&DocumentId::new("MSFT", 2023), &revenue_pages(), false)
        .await
        .unwrap();

    let llm = ScriptedLlm::new(&[
        r#"{"decomposition": false, "companies_year": ["microsoft_2023"], "queries": []}"#,
        r#"{"answer": "Total revenue was $50 billion.", "reasoning": "Stated on page 1.", "source": [{"company": "Microsoft", "year": 2023, "excerpt": "Total revenue was $50 billion", "page": 1}]}"#,
    ]);
    let engine = make_engine(store, llm.clone());

    let envelope = engine.answer("What was Microsoft's total revenue in 2023?").await;
    assert_eq!(envelope.answer, "Total revenue was $50 billion.");
    assert_eq!(envelope.reasoning, "Stated on page 1.");
    assert!(envelope.sub_queries.is_empty());
    assert_eq!(envelope.sources[0]["page"], 1);

    // The synthesis call must have seen page 1's tagged text as context.
    let calls = llm.calls();
    assert_eq!(calls.len(), 2);
    let (system, context) = &calls[1];
    assert!(system.contains("What was Microsoft's total revenue in 2023?"));
    assert!(context.contains("<PAGENUMBER>1</PAGENUMBER>"));
    assert!(context.contains("Total revenue was $50 billion"));
}

#[tokio::test]
async fn comparative_query_aggregates_both_documents() {
    let dir = tempdir().unwrap();
    let store = make_store(dir.path());
    store
        .build(
            &DocumentId::new("NVDA", 2023),
            &["Data center revenue grew to record levels on accelerated computing demand."
                .to_string()],
            false,
        )
        .await
        .unwrap();
    store
        .build(
            &DocumentId::new("GOOGL", 2023),
            &["Advertising revenues represented the majority of consolidated revenues."
                .to_string()],
            false,
        )
        .await
        .unwrap();

    let llm = ScriptedLlm::new(&[
        r#"{"decomposition": true, "companies_year": ["nvidia_2023", "google_2023"], "queries": ["What is NVIDIA's revenue in 2023?", "What is Google's revenue in 2023?"]}"#,
        r#"{"answer": "Both grew.", "reasoning": "Compared both filings.", "source": []}"#,
    ]);
    let engine = make_engine(store, llm.clone());

    let envelope = engine
        .answer("Compare NVIDIA and Google revenue in 2023")
        .await;
    assert_eq!(envelope.answer, "Both grew.");
    assert_eq!(envelope.sub_queries.len(), 2);

    let calls = llm.calls();
    let (_, context) = &calls[1];
    assert!(context.contains("Data center revenue"));
    assert!(context.contains("Advertising revenues"));
}

#[tokio::test]
async fn decomposition_length_mismatch_skips_unmatched_sub_queries() {
    let dir = tempdir().unwrap();
    let store = make_store(dir.path());
    store
        .build(&DocumentId::new("MSFT", 2023), &revenue_pages(), false)
        .await
        .unwrap();

    // Two sub-queries but only one company/year entry: the second is skipped,
    // the query still completes.
    let llm = ScriptedLlm::new(&[
        r#"{"decomposition": true, "companies_year": ["microsoft_2023"], "queries": ["What was Microsoft's revenue in 2023?", "What was Microsoft's revenue in 2024?"]}"#,
        r#"{"answer": "Revenue was $50 billion.", "reasoning": "", "source": []}"#,
    ]);
    let engine = make_engine(store, llm.clone());

    let envelope = engine.answer("Microsoft revenue 2023 vs 2024").await;
    assert_eq!(envelope.answer, "Revenue was $50 billion.");
    assert_eq!(envelope.sub_queries.len(), 2);
    assert_eq!(llm.calls().len(), 2, "no extra round trips for the skip");
}

#[tokio::test]
async fn unresolvable_single_target_yields_empty_envelope() {
    let dir = tempdir().unwrap();
    let store = make_store(dir.path());

    let llm = ScriptedLlm::new(&[
        r#"{"decomposition": false, "companies_year": ["acme_2023"], "queries": []}"#,
    ]);
    let engine = make_engine(store, llm);

    let envelope = engine.answer("What was Acme's revenue in 2023?").await;
    assert!(envelope.answer.is_empty());
    assert!(envelope.reasoning.is_empty());
    assert!(envelope.sub_queries.is_empty());
}

#[tokio::test]
async fn malformed_decomposition_retries_then_succeeds() {
    let dir = tempdir().unwrap();
    let store = make_store(dir.path());
    store
        .build(&DocumentId::new("MSFT", 2023), &revenue_pages(), false)
        .await
        .unwrap();

    let llm = ScriptedLlm::new(&[
        "I could not produce structured output, sorry.",
        r#"{"decomposition": false, "companies_year": ["microsoft_2023"], "queries": []}"#,
        r#"{"answer": "Revenue was $50 billion.", "reasoning": "", "source": []}"#,
    ]);
    let engine = make_engine(store, llm.clone());

    let envelope = engine.answer("What was Microsoft's total revenue in 2023?").await;
    assert_eq!(envelope.answer, "Revenue was $50 billion.");
    assert_eq!(llm.calls().len(), 3, "one retry plus the synthesis call");
}
