//! Core identifiers and the error taxonomy shared across the crate.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Identifies one filing: a company ticker plus the fiscal year it covers.
///
/// The identifier doubles as the storage key for the document's index and
/// metadata artifacts via [`DocumentId::key`].
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocumentId {
    pub ticker: String,
    pub year: u16,
}

impl DocumentId {
    pub fn new(ticker: impl Into<String>, year: u16) -> Self {
        Self {
            ticker: ticker.into(),
            year,
        }
    }

    /// Filesystem-safe key used to name persisted artifacts, e.g. `MSFT_2023`.
    pub fn key(&self) -> String {
        let safe: String = self
            .ticker
            .chars()
            .map(|c| if c.is_alphanumeric() { c } else { '_' })
            .collect();
        format!("{}_{}", safe, self.year)
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.ticker, self.year)
    }
}

/// Errors produced by the indexing and query pipeline.
///
/// Unit-of-work errors (one document, one sub-query) are contained and logged
/// by callers; only a non-decomposed query with no resolvable target degrades
/// a whole query, and then to an explicitly empty envelope.
#[derive(Debug, Error)]
pub enum RagError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("storage error: {0}")]
    Storage(String),

    #[error("embedding error: {0}")]
    Embedding(String),

    #[error("completion error: {0}")]
    Completion(String),

    /// A document yielded zero indexable chunks after page filtering.
    #[error("no indexable content in document '{0}'")]
    NoContent(String),

    /// Index or metadata artifact missing; the pair is treated as one unit.
    #[error("index not found for document '{0}'; build it first")]
    IndexNotFound(String),

    #[error("invalid document reference: {0}")]
    InvalidDocument(String),

    /// The active embedding model differs from the one the index was built
    /// with. Querying across models is a correctness bug, not a quality
    /// regression, so this is surfaced as a hard error.
    #[error(
        "embedding model mismatch for '{document}': index built with '{stored}', active model is '{active}'"
    )]
    ModelMismatch {
        document: String,
        stored: String,
        active: String,
    },

    #[error("structured output parse failed: {0}")]
    Parse(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn document_key_is_filesystem_safe() {
        let id = DocumentId::new("BRK.B", 2023);
        assert_eq!(id.key(), "BRK_B_2023");
        assert_eq!(DocumentId::new("MSFT", 2023).key(), "MSFT_2023");
    }

    #[test]
    fn display_includes_ticker_and_year() {
        assert_eq!(DocumentId::new("NVDA", 2024).to_string(), "NVDA_2024");
    }
}
