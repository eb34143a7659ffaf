//! Self-RAG Engine - Quality-gated Retrieval-Augmented Generation
//!
//! This crate implements the Self-RAG answering loop:
//! - Retrieve the top-k passages for a query
//! - Gate on passage relevance (1-10 rubric)
//! - Generate an answer from the passages
//! - Gate on groundedness, regenerating hallucinated answers
//! - Gate on helpfulness, rewriting the query when the answer does not help
//!
//! Graders fail closed: output that cannot be parsed never passes a gate.
//! Both cycles are bounded, so every run ends in an answer, an explicit
//! unanswerable outcome, or an upstream error.
//!
//! Author: hephaex@gmail.com

pub mod generate;
pub mod grading;
pub mod llm;
pub mod orchestrator;
pub mod parse;
pub mod prompts;
pub mod retrieve;
pub mod rewrite;
pub mod verdict;

pub use generate::Generator;
pub use grading::{DocRelevanceScorer, HallucinationChecker, HelpfulnessScorer};
pub use llm::{create_grader_client, create_llm_client, OllamaClient, OpenAiClient};
pub use orchestrator::{
    Budget, Node, RunDiagnostics, RunOutcome, SelfRagOrchestrator, UnanswerableReason,
};
pub use prompts::PromptBuilder;
pub use retrieve::PassageRetriever;
pub use rewrite::QueryRewriter;
pub use verdict::{
    GroundingVerdict, HelpfulnessGrade, HelpfulnessVerdict, RelevanceGrade, RelevanceVerdict,
};

pub use selfrag_core::{Completer, Passage, RagState, Retriever, SelfRagConfig, SelfRagError};
