//! Seams to the document-acquisition and text-extraction collaborators, plus
//! the corpus ingest loop that drives them into the index store.

use async_trait::async_trait;
use std::ops::RangeInclusive;
use tracing::{error, info};

use crate::stores::{BuildReport, IndexStore};
use crate::types::{DocumentId, RagError};

/// Stable reference to one filing held by an acquisition service.
#[derive(Clone, Debug)]
pub struct FilingDescriptor {
    pub document: DocumentId,
    /// Opaque content reference understood by the issuing [`FilingSource`].
    pub reference: String,
}

/// Document-acquisition service: lists an entity's filings and fetches one
/// document by reference. Implemented outside this crate (e.g. against a
/// regulatory filing API).
#[async_trait]
pub trait FilingSource: Send + Sync {
    async fn list_filings(
        &self,
        entity: &str,
        form_type: &str,
        years: RangeInclusive<u16>,
    ) -> Result<Vec<FilingDescriptor>, RagError>;

    async fn fetch(&self, descriptor: &FilingDescriptor) -> Result<Vec<u8>, RagError>;
}

/// Text-extraction service: turns raw document bytes into page-ordered text.
pub trait PageExtractor: Send + Sync {
    fn extract_pages(&self, raw: &[u8]) -> Result<Vec<String>, RagError>;
}

/// Acquires, extracts, and indexes every filing the source lists for the
/// given entities.
///
/// One bad document never aborts the corpus: acquisition, extraction, and
/// build failures are logged per document and the loop moves on. Cancellation
/// is best-effort at document boundaries; a single index/metadata pair is
/// never left half-written.
pub async fn ingest_corpus(
    source: &dyn FilingSource,
    extractor: &dyn PageExtractor,
    store: &IndexStore,
    entities: &[String],
    form_type: &str,
    years: RangeInclusive<u16>,
    overwrite: bool,
) -> Vec<BuildReport> {
    let mut reports = Vec::new();
    for entity in entities {
        let filings = match source.list_filings(entity, form_type, years.clone()).await {
            Ok(filings) => filings,
            Err(err) => {
                error!(entity = %entity, error = %err, "failed to list filings");
                continue;
            }
        };
        info!(entity = %entity, filings = filings.len(), "listed filings");

        for descriptor in filings {
            if !overwrite && store.is_indexed(&descriptor.document) {
                info!(document = %descriptor.document, "already indexed, skipping fetch");
                continue;
            }
            let raw = match source.fetch(&descriptor).await {
                Ok(raw) => raw,
                Err(err) => {
                    error!(document = %descriptor.document, error = %err, "fetch failed");
                    continue;
                }
            };
            let pages = match extractor.extract_pages(&raw) {
                Ok(pages) => pages,
                Err(err) => {
                    error!(document = %descriptor.document, error = %err, "extraction failed");
                    continue;
                }
            };
            match store.build(&descriptor.document, &pages, overwrite).await {
                Ok(report) => reports.push(report),
                Err(err) => {
                    error!(document = %descriptor.document, error = %err, "index build failed");
                }
            }
        }
    }
    reports
}
