//! Query orchestration: decomposition, per-sub-query retrieval, context
//! aggregation, and answer synthesis.
//!
//! Decomposition exists because a single similarity search over one document
//! cannot answer cross-document comparative questions. Splitting by company
//! and year lets each sub-query retrieve against the correct isolated index;
//! similarity scores are never comparable across differently-built indexes,
//! so aggregation happens at the page/context level only.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, info, warn};

use crate::config::EngineConfig;
use crate::llm::{CompletionProvider, complete_structured};
use crate::prompts;
use crate::retrieval::Retriever;
use crate::stores::IndexStore;
use crate::types::{DocumentId, RagError};

/// Maps lowercase company names (as emitted by decomposition) to tickers.
#[derive(Clone, Debug)]
pub struct CompanyRegistry {
    tickers: HashMap<String, String>,
}

impl CompanyRegistry {
    pub fn new() -> Self {
        Self {
            tickers: HashMap::new(),
        }
    }

    #[must_use]
    pub fn with_company(mut self, name: impl Into<String>, ticker: impl Into<String>) -> Self {
        self.tickers.insert(name.into().to_lowercase(), ticker.into());
        self
    }

    /// Resolves a `"company_year"` pair into a document identifier.
    ///
    /// Unknown company names and non-numeric years (decomposition emits
    /// `"unknown"` when the query names no year) are resolution failures.
    pub fn resolve(&self, company_year: &str) -> Result<DocumentId, RagError> {
        let (company, year) = company_year.rsplit_once('_').ok_or_else(|| {
            RagError::InvalidDocument(format!("malformed company/year pair '{company_year}'"))
        })?;
        let year: u16 = year.parse().map_err(|_| {
            RagError::InvalidDocument(format!("unparsable year in '{company_year}'"))
        })?;
        let ticker = self.tickers.get(&company.to_lowercase()).ok_or_else(|| {
            RagError::InvalidDocument(format!("unknown company key '{company}'"))
        })?;
        Ok(DocumentId::new(ticker.clone(), year))
    }
}

impl Default for CompanyRegistry {
    /// The corpus the engine ships against: Alphabet, Microsoft, NVIDIA.
    fn default() -> Self {
        Self::new()
            .with_company("google", "GOOGL")
            .with_company("microsoft", "MSFT")
            .with_company("nvidia", "NVDA")
    }
}

/// Structured result of the decomposition step.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct Decomposition {
    #[serde(default)]
    pub decomposition: bool,
    #[serde(default)]
    pub companies_year: Vec<String>,
    #[serde(default)]
    pub queries: Vec<String>,
}

/// Structured result of the answer-synthesis step.
#[derive(Clone, Debug, Default, Deserialize)]
struct Synthesis {
    #[serde(default)]
    answer: String,
    #[serde(default)]
    reasoning: String,
    #[serde(default)]
    source: Value,
}

/// Externally visible result of one user query. Created fresh per query and
/// never mutated after return.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AnswerEnvelope {
    pub query: String,
    pub answer: String,
    pub reasoning: String,
    pub sub_queries: Vec<String>,
    pub sources: Value,
}

impl AnswerEnvelope {
    /// Envelope for queries that could not be answered at all.
    pub fn empty(query: &str) -> Self {
        Self {
            query: query.to_string(),
            answer: String::new(),
            reasoning: String::new(),
            sub_queries: Vec::new(),
            sources: Value::Null,
        }
    }
}

/// State machine over one user query: decompose, retrieve per sub-query,
/// aggregate context, synthesize a cited answer.
pub struct QueryEngine {
    retriever: Retriever,
    llm: Arc<dyn CompletionProvider>,
    registry: CompanyRegistry,
    config: EngineConfig,
}

impl QueryEngine {
    pub fn new(
        store: Arc<IndexStore>,
        llm: Arc<dyn CompletionProvider>,
        registry: CompanyRegistry,
        config: EngineConfig,
    ) -> Self {
        Self {
            retriever: Retriever::new(store),
            llm,
            registry,
            config,
        }
    }

    /// Answers one user query. Never returns an error: queries with no valid
    /// retrieval target or with exhausted generation retries degrade to an
    /// explicitly empty envelope.
    pub async fn answer(&self, query: &str) -> AnswerEnvelope {
        let plan = match complete_structured(
            self.llm.as_ref(),
            prompts::QUERY_DECOMPOSITION,
            query,
            &self.config.retry,
        )
        .await
        {
            Ok(value) => serde_json::from_value::<Decomposition>(value).unwrap_or_default(),
            Err(err) => {
                error!(query, error = %err, "query decomposition failed");
                return AnswerEnvelope::empty(query);
            }
        };

        let mut context = String::new();
        if plan.decomposition && !plan.queries.is_empty() {
            for (idx, sub_query) in plan.queries.iter().enumerate() {
                let Some(company_year) = plan.companies_year.get(idx) else {
                    warn!(
                        sub_query = %sub_query,
                        "companies_year has fewer entries than queries, skipping sub-query"
                    );
                    continue;
                };
                match self.retrieve_for(company_year, sub_query).await {
                    Ok(block) => context.push_str(&block),
                    Err(err) => {
                        warn!(sub_query = %sub_query, company_year = %company_year, error = %err, "skipping sub-query");
                    }
                }
            }
        } else {
            let Some(company_year) = plan.companies_year.first() else {
                error!(query, "no resolvable target for non-decomposed query");
                return AnswerEnvelope::empty(query);
            };
            match self.retrieve_for(company_year, query).await {
                Ok(block) => context = block,
                Err(err) => {
                    error!(query, company_year = %company_year, error = %err, "single-document retrieval failed");
                    return AnswerEnvelope::empty(query);
                }
            }
        }

        info!(
            query,
            sub_queries = plan.queries.len(),
            context_bytes = context.len(),
            "retrieval complete, synthesizing answer"
        );

        let synthesis = match complete_structured(
            self.llm.as_ref(),
            &prompts::answer_synthesis(query),
            &context,
            &self.config.retry,
        )
        .await
        {
            Ok(value) => serde_json::from_value::<Synthesis>(value).unwrap_or_default(),
            Err(err) => {
                error!(query, error = %err, "answer synthesis failed");
                Synthesis::default()
            }
        };

        AnswerEnvelope {
            query: query.to_string(),
            answer: synthesis.answer,
            reasoning: synthesis.reasoning,
            sub_queries: plan.queries,
            sources: synthesis.source,
        }
    }

    /// Resolves one company/year pair, retrieves its top pages, and returns
    /// the assembled context block in ascending page order.
    async fn retrieve_for(
        &self,
        company_year: &str,
        query_text: &str,
    ) -> Result<String, RagError> {
        let id = self.registry.resolve(company_year)?;
        let mut pages = self
            .retriever
            .top_pages(&id, query_text, self.config.top_k)
            .await?;
        pages.sort_unstable();
        self.retriever.assemble_context(&id, &pages).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn registry_resolves_known_companies() {
        let registry = CompanyRegistry::default();
        let id = registry.resolve("microsoft_2023").unwrap();
        assert_eq!(id, DocumentId::new("MSFT", 2023));
    }

    #[test]
    fn registry_rejects_unknown_company() {
        let err = CompanyRegistry::default().resolve("acme_2023").unwrap_err();
        assert!(matches!(err, RagError::InvalidDocument(_)));
    }

    #[test]
    fn registry_rejects_unparsable_year() {
        let registry = CompanyRegistry::default();
        assert!(registry.resolve("nvidia_unknown").is_err());
        assert!(registry.resolve("nodelimiter").is_err());
    }

    #[test]
    fn decomposition_deserializes_with_defaults() {
        let plan: Decomposition = serde_json::from_value(json!({
            "decomposition": false,
            "companies_year": ["microsoft_2023"],
            "queries": []
        }))
        .unwrap();
        assert!(!plan.decomposition);
        assert_eq!(plan.companies_year, vec!["microsoft_2023"]);
        assert!(plan.queries.is_empty());

        let sparse: Decomposition = serde_json::from_value(json!({})).unwrap();
        assert!(!sparse.decomposition);
        assert!(sparse.companies_year.is_empty());
    }

    #[test]
    fn comparative_decomposition_shape_parses() {
        let plan: Decomposition = serde_json::from_value(json!({
            "decomposition": true,
            "companies_year": ["nvidia_2023", "google_2023"],
            "queries": [
                "What is NVIDIA's revenue in 2023?",
                "What is Google's revenue in 2023?"
            ]
        }))
        .unwrap();
        assert!(plan.decomposition);
        assert_eq!(plan.companies_year.len(), 2);
        assert_eq!(plan.queries.len(), 2);
    }
}
