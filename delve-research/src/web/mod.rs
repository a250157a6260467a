//! Web research: search/fetch collaborator, HTML extraction, query analysis
//! and the multi-round research engine

pub mod client;
pub mod extract;
pub mod query;
pub mod researcher;
pub mod types;

pub use client::{DuckDuckGoClient, WebClient};
pub use researcher::{format_research_for_prompt, WebResearcher};
pub use types::{ContentItem, SearchResult, WebResearchReport};
