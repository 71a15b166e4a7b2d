pub mod entity;
pub mod error;
pub mod graph;
pub mod matrix;
pub mod relationship;

pub use entity::{Entity, EntityType, MATRIX_SOURCE};
pub use error::{Error, Result};
pub use graph::{GraphClient, GraphError, GraphStore, MemoryGraphStore};
pub use matrix::{
    EntityExtractor, MatrixParser, MatrixProcessor, MatrixRow, ProcessingResult, ProcessorConfig,
    ProductMatcher, RelationshipBuilder, ScrapedProduct,
};
pub use relationship::{Relationship, RelationshipType};
