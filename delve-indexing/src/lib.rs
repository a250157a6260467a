//! Delve Indexing - document cleaning and chunking
//!
//! Converts raw text into overlapping chunks that the retrieval store embeds.

pub mod document;
pub mod document_processor;

pub use document::Document;
pub use document_processor::*;
