use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use super::builder::RelationshipBuilder;
use super::extractor::EntityExtractor;
use super::matcher::{ProductMatcher, ScrapedProduct, DEFAULT_MATCH_THRESHOLD};
use super::parser::{summarize, MatrixParser, MatrixSummary, ParseError};
use crate::graph::{GraphClient, GraphError, GraphStore};

/// Everything the pipeline needs to run, CLI- or caller-supplied.
#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    pub matrix_file: PathBuf,
    pub scraped_products: Option<PathBuf>,
    pub instance_id: Option<String>,
    pub api_url: Option<String>,
    pub api_key: Option<String>,
    pub match_threshold: f64,
    pub dry_run: bool,
}

impl ProcessorConfig {
    pub fn new(matrix_file: impl Into<PathBuf>) -> Self {
        Self {
            matrix_file: matrix_file.into(),
            scraped_products: None,
            instance_id: None,
            api_url: None,
            api_key: None,
            match_threshold: DEFAULT_MATCH_THRESHOLD,
            dry_run: false,
        }
    }
}

/// Final report for one pipeline run.
///
/// `success` is simply "no errors were recorded"; a run that wrote a
/// partial graph reports its counts alongside the errors that stopped
/// the rest.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ProcessingResult {
    pub success: bool,
    pub entities_created: usize,
    pub relationships_created: usize,
    pub products_matched: usize,
    pub products_unmatched: usize,
    pub errors: Vec<String>,
    pub processing_time_seconds: f64,
}

/// What a run over this file would produce, without touching the graph.
#[derive(Debug, Clone, Serialize)]
pub struct Preview {
    pub total_products: usize,
    pub entity_counts: BTreeMap<&'static str, usize>,
    pub estimated_relationships: usize,
    pub sample_products: Vec<String>,
    pub summary: MatrixSummary,
}

#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Graph(#[from] GraphError),
}

/// Orchestrates parse, extract, match and graph-write for one matrix
/// file.
pub struct MatrixProcessor {
    config: ProcessorConfig,
    store: Option<Arc<dyn GraphStore>>,
}

impl MatrixProcessor {
    #[must_use]
    pub fn new(config: ProcessorConfig) -> Self {
        Self {
            config,
            store: None,
        }
    }

    /// Use the given store instead of constructing an HTTP client from
    /// the config.
    #[must_use]
    pub fn with_store(mut self, store: Arc<dyn GraphStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Runs the full pipeline. Infallible at the signature: any fatal
    /// error becomes a failed [`ProcessingResult`].
    pub async fn process(&self) -> ProcessingResult {
        let started = Instant::now();
        let mut result = match self.run().await {
            Ok(result) => result,
            Err(e) => {
                tracing::error!(error = %e, "matrix processing failed");
                ProcessingResult {
                    errors: vec![e.to_string()],
                    ..ProcessingResult::default()
                }
            }
        };
        result.success = result.errors.is_empty();
        result.processing_time_seconds = started.elapsed().as_secs_f64();
        tracing::info!(
            success = result.success,
            entities = result.entities_created,
            relationships = result.relationships_created,
            elapsed = result.processing_time_seconds,
            "matrix processing finished"
        );
        result
    }

    async fn run(&self) -> Result<ProcessingResult, ProcessError> {
        let parser = MatrixParser::new(&self.config.matrix_file);
        let rows = parser.parse().await?;
        tracing::info!(products = rows.len(), "parsed matrix rows");

        let extractor = EntityExtractor::new();
        let extraction = extractor.extract_entities(&rows);

        let mut result = ProcessingResult::default();

        if let Some(matcher) = self.load_matcher().await {
            let report = matcher.match_report(&rows);
            result.products_matched = report.matched.len();
            result.products_unmatched = report.unmatched.len();
        }

        if self.config.dry_run {
            result.entities_created = extraction.entity_count;
            result.relationships_created =
                rows.iter().map(super::parser::MatrixRow::value_count).sum();
            tracing::info!("dry run, skipping graph writes");
            return Ok(result);
        }

        let store = self.resolve_store()?;
        let mut builder = RelationshipBuilder::new(store, extractor);
        let build = builder.build_from_rows(&rows).await;

        result.entities_created = build.entities_created;
        result.relationships_created = build.relationships_created;
        result.errors = build.errors;
        Ok(result)
    }

    /// Parse and extraction stats without touching the graph.
    pub async fn preview(&self) -> Result<Preview, ProcessError> {
        let rows = MatrixParser::new(&self.config.matrix_file).parse().await?;
        let extraction = EntityExtractor::new().extract_entities(&rows);

        Ok(Preview {
            total_products: rows.len(),
            entity_counts: EntityExtractor::entity_stats(&extraction),
            estimated_relationships: rows
                .iter()
                .map(super::parser::MatrixRow::value_count)
                .sum(),
            sample_products: rows
                .iter()
                .take(5)
                .map(|row| row.product_name.clone())
                .collect(),
            summary: summarize(&rows),
        })
    }

    fn resolve_store(&self) -> Result<Arc<dyn GraphStore>, GraphError> {
        if let Some(store) = &self.store {
            return Ok(store.clone());
        }

        let api_url = self
            .config
            .api_url
            .as_deref()
            .ok_or(GraphError::MissingConfig("api_url"))?;
        let api_key = self
            .config
            .api_key
            .as_deref()
            .ok_or(GraphError::MissingConfig("api_key"))?;
        let instance_id = self
            .config
            .instance_id
            .as_deref()
            .ok_or(GraphError::MissingConfig("instance_id"))?;

        let client = GraphClient::new(api_url, api_key, instance_id)?;
        Ok(Arc::new(client))
    }

    /// Loads scraped products if a file was configured. Missing or
    /// malformed files log a warning and match statistics are skipped.
    async fn load_matcher(&self) -> Option<ProductMatcher> {
        let path = self.config.scraped_products.as_ref()?;

        let contents = match tokio::fs::read_to_string(path).await {
            Ok(contents) => contents,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "could not read scraped products");
                return None;
            }
        };

        let products = match serde_json::from_str::<ScrapedFile>(&contents) {
            Ok(ScrapedFile::Bare(products)) => products,
            Ok(ScrapedFile::Wrapped { products }) => products,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "could not parse scraped products");
                return None;
            }
        };

        Some(ProductMatcher::new(products, self.config.match_threshold))
    }
}

/// Scraped product files come either as a bare array or wrapped in a
/// `products` object.
#[derive(serde::Deserialize)]
#[serde(untagged)]
enum ScrapedFile {
    Bare(Vec<ScrapedProduct>),
    Wrapped { products: Vec<ScrapedProduct> },
}
