//! Application-matrix pipeline: parse, extract, match, build, process.

pub mod builder;
pub mod extractor;
pub mod matcher;
pub mod parser;
pub mod processor;

pub use builder::{BuildResult, RelationshipBuilder};
pub use extractor::{EntityExtractor, ExtractionResult};
pub use matcher::{
    MatchReport, MatchType, ProductMatch, ProductMatcher, ScrapedProduct, DEFAULT_MATCH_THRESHOLD,
};
pub use parser::{summarize, MatrixParser, MatrixRow, MatrixSummary, ParseError};
pub use processor::{MatrixProcessor, Preview, ProcessError, ProcessingResult, ProcessorConfig};
