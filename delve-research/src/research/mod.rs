//! Iterative research: the reasoning/acting loop, its text parsers,
//! parameter repair, answer synthesis and the high-level assistant

pub mod assistant;
pub mod params;
pub mod parser;
pub mod prompts;
pub mod react;
pub mod synthesizer;
pub mod types;

pub use assistant::{merge_reports, AnswerSource, ResearchAnswer, ResearchAssistant};
pub use react::{ReactConfig, ReactResearcher};
pub use synthesizer::ResearchSynthesizer;
pub use types::*;
