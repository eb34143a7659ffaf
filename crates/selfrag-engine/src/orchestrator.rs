//! Self-RAG orchestrator
//!
//! Drives one run through the gated loop:
//!
//! ```text
//! Retrieve -> RelevanceGate -> Generate -> HallucinationGate -> HelpfulnessGate -> Success
//!                  |              ^               |                   |
//!                  v              +- hallucinated-+                   v
//!             Unanswerable                                         Rewrite -> Retrieve
//! ```
//!
//! Both cycles are bounded: regenerations and rewrites each have their own
//! ceiling, total node executions have a shared ceiling, and every external
//! call has a wall-clock budget. Hitting any of them ends the run as
//! `Unanswerable` with the bound that was exceeded.
//!
//! Author: hephaex@gmail.com

use crate::generate::Generator;
use crate::grading::{DocRelevanceScorer, HallucinationChecker, HelpfulnessScorer};
use crate::retrieve::PassageRetriever;
use crate::rewrite::QueryRewriter;
use crate::verdict::{GroundingVerdict, HelpfulnessVerdict, RelevanceVerdict};
use chrono::{DateTime, Utc};
use selfrag_core::{
    AttemptCounters, Completer, Passage, RagState, Result, Retriever, SelfRagConfig, SelfRagError,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::Instrument;
use uuid::Uuid;

// ============================================================================
// Nodes and Outcomes
// ============================================================================

/// Non-terminal states of the loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Node {
    Retrieve,
    RelevanceGate,
    Generate,
    HallucinationGate,
    HelpfulnessGate,
    Rewrite,
}

impl fmt::Display for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Retrieve => write!(f, "retrieve"),
            Self::RelevanceGate => write!(f, "relevance_gate"),
            Self::Generate => write!(f, "generate"),
            Self::HallucinationGate => write!(f, "hallucination_gate"),
            Self::HelpfulnessGate => write!(f, "helpfulness_gate"),
            Self::Rewrite => write!(f, "rewrite"),
        }
    }
}

/// A bound that ended a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "budget", rename_all = "snake_case")]
pub enum Budget {
    /// Total node executions
    Steps { limit: u32 },
    /// Hallucinated -> Generate edge
    Regenerations { limit: u32 },
    /// Unhelpful -> Rewrite edge
    Rewrites { limit: u32 },
    /// Wall-clock budget of one external call
    CallTimeout { node: Node, timeout_ms: u64 },
}

impl fmt::Display for Budget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Steps { limit } => write!(f, "step limit of {limit} reached"),
            Self::Regenerations { limit } => {
                write!(f, "answer still hallucinated after {limit} regenerations")
            }
            Self::Rewrites { limit } => {
                write!(f, "answer still unhelpful after {limit} query rewrites")
            }
            Self::CallTimeout { node, timeout_ms } => {
                write!(f, "{node} call exceeded {timeout_ms}ms")
            }
        }
    }
}

/// Why a run produced no answer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum UnanswerableReason {
    /// Retrieved passages scored below the relevance threshold
    IrrelevantContext {
        score: u8,
        explanation: Option<String>,
    },
    /// A retry, step or time bound was exhausted
    BudgetExceeded { budget: Budget },
}

impl fmt::Display for UnanswerableReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IrrelevantContext { score, .. } => {
                write!(f, "irrelevant context (score {score}/10)")
            }
            Self::BudgetExceeded { budget } => write!(f, "budget exceeded: {budget}"),
        }
    }
}

/// What happened during a run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunDiagnostics {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub elapsed_ms: u64,

    /// Nodes in execution order
    pub path: Vec<Node>,

    pub attempts: AttemptCounters,

    /// Query in effect when the run ended
    pub final_query: String,

    /// Most recent verdict of each gate
    pub relevance: Option<RelevanceVerdict>,
    pub grounding: Option<GroundingVerdict>,
    pub helpfulness: Option<HelpfulnessVerdict>,
}

impl RunDiagnostics {
    fn new(run_id: Uuid, query: &str) -> Self {
        Self {
            run_id,
            started_at: Utc::now(),
            elapsed_ms: 0,
            path: Vec::new(),
            attempts: AttemptCounters::default(),
            final_query: query.to_string(),
            relevance: None,
            grounding: None,
            helpfulness: None,
        }
    }

    /// How many times a node was executed
    pub fn visits(&self, node: Node) -> usize {
        self.path.iter().filter(|n| **n == node).count()
    }
}

/// Result of one run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RunOutcome {
    Success {
        answer: String,
        context: Vec<Passage>,
        diagnostics: RunDiagnostics,
    },
    Unanswerable {
        reason: UnanswerableReason,
        diagnostics: RunDiagnostics,
    },
}

impl RunOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    pub fn answer(&self) -> Option<&str> {
        match self {
            Self::Success { answer, .. } => Some(answer),
            Self::Unanswerable { .. } => None,
        }
    }

    pub fn reason(&self) -> Option<&UnanswerableReason> {
        match self {
            Self::Success { .. } => None,
            Self::Unanswerable { reason, .. } => Some(reason),
        }
    }

    pub fn diagnostics(&self) -> &RunDiagnostics {
        match self {
            Self::Success { diagnostics, .. } | Self::Unanswerable { diagnostics, .. } => {
                diagnostics
            }
        }
    }
}

// ============================================================================
// Orchestrator
// ============================================================================

enum Transition {
    Goto(Node),
    Succeed,
    Stop(UnanswerableReason),
}

impl Transition {
    fn budget(budget: Budget) -> Self {
        Self::Stop(UnanswerableReason::BudgetExceeded { budget })
    }
}

/// State owned by a single run
struct Run {
    state: RagState,
    diagnostics: RunDiagnostics,
    clock: Instant,
}

impl Run {
    fn new(run_id: Uuid, query: &str) -> Self {
        Self {
            state: RagState::new(query),
            diagnostics: RunDiagnostics::new(run_id, query),
            clock: Instant::now(),
        }
    }

    /// Close the run; `None` means the answer passed every gate
    fn finish(mut self, unanswerable: Option<UnanswerableReason>) -> RunOutcome {
        self.diagnostics.elapsed_ms = self.clock.elapsed().as_millis() as u64;
        self.diagnostics.attempts = self.state.attempts;
        self.diagnostics.final_query = self.state.query.clone();

        match unanswerable {
            Some(reason) => RunOutcome::Unanswerable {
                reason,
                diagnostics: self.diagnostics,
            },
            None => RunOutcome::Success {
                answer: self.state.answer,
                context: self.state.context,
                diagnostics: self.diagnostics,
            },
        }
    }
}

/// Quality-gated retrieval-augmented answering loop
///
/// Holds only shared, read-only collaborators, so one instance can serve
/// many concurrent runs.
pub struct SelfRagOrchestrator {
    retriever: PassageRetriever,
    relevance: DocRelevanceScorer,
    generator: Generator,
    hallucination: HallucinationChecker,
    helpfulness: HelpfulnessScorer,
    rewriter: QueryRewriter,
    config: SelfRagConfig,
}

impl SelfRagOrchestrator {
    /// Create an orchestrator that uses one model for everything
    pub fn new(
        retriever: Arc<dyn Retriever>,
        llm: Arc<dyn Completer>,
        config: SelfRagConfig,
    ) -> Self {
        Self::with_grader(retriever, llm.clone(), llm, config)
    }

    /// Create an orchestrator with a separate model for gates and rewriting
    pub fn with_grader(
        retriever: Arc<dyn Retriever>,
        generator_llm: Arc<dyn Completer>,
        grader_llm: Arc<dyn Completer>,
        config: SelfRagConfig,
    ) -> Self {
        Self {
            retriever: PassageRetriever::new(retriever, config.top_k),
            relevance: DocRelevanceScorer::new(grader_llm.clone())
                .with_threshold(config.relevance_threshold),
            generator: Generator::new(generator_llm),
            hallucination: HallucinationChecker::new(grader_llm.clone()),
            helpfulness: HelpfulnessScorer::new(grader_llm.clone())
                .with_pass_score(config.helpfulness_pass_score),
            rewriter: QueryRewriter::new(grader_llm, config.glossary.clone()),
            config,
        }
    }

    /// Answer a query
    ///
    /// Returns `Err` only for invalid input and upstream failures; every
    /// other ending is a [`RunOutcome`].
    pub async fn run(&self, query: &str) -> Result<RunOutcome> {
        let query = query.trim();
        if query.is_empty() {
            return Err(SelfRagError::ValidationError(
                "Query must not be empty".to_string(),
            ));
        }

        let run_id = Uuid::new_v4();
        let span = tracing::info_span!("self_rag_run", %run_id);
        self.execute(run_id, query).instrument(span).await
    }

    async fn execute(&self, run_id: Uuid, query: &str) -> Result<RunOutcome> {
        tracing::info!(query = %query, "Self-RAG run started");

        let mut run = Run::new(run_id, query);
        let mut node = Node::Retrieve;

        loop {
            if run.state.attempts.steps >= self.config.max_steps {
                tracing::warn!(limit = self.config.max_steps, "Step budget exhausted");
                return Ok(run.finish(Some(UnanswerableReason::BudgetExceeded {
                    budget: Budget::Steps {
                        limit: self.config.max_steps,
                    },
                })));
            }
            run.state.attempts.steps += 1;
            run.diagnostics.path.push(node);
            tracing::debug!(step = run.state.attempts.steps, %node, "Entering node");

            let unanswerable = match self.step(node, &mut run).await {
                Ok(Transition::Goto(next)) => {
                    node = next;
                    continue;
                }
                Ok(Transition::Succeed) => None,
                Ok(Transition::Stop(reason)) => Some(reason),
                Err(e) => {
                    tracing::error!(%node, error = %e, "Self-RAG run failed");
                    return Err(e);
                }
            };

            let outcome = run.finish(unanswerable);
            match &outcome {
                RunOutcome::Success { diagnostics, .. } => tracing::info!(
                    steps = diagnostics.attempts.steps,
                    elapsed_ms = diagnostics.elapsed_ms,
                    "Self-RAG run succeeded"
                ),
                RunOutcome::Unanswerable {
                    reason, diagnostics, ..
                } => tracing::info!(
                    steps = diagnostics.attempts.steps,
                    elapsed_ms = diagnostics.elapsed_ms,
                    "Self-RAG run unanswerable: {reason}"
                ),
            }
            return Ok(outcome);
        }
    }

    async fn step(&self, node: Node, run: &mut Run) -> Result<Transition> {
        let timeout = self.config.call_timeout();
        let timed_out = || {
            tracing::warn!(
                %node,
                timeout_ms = timeout.as_millis() as u64,
                "External call timed out"
            );
            Transition::budget(Budget::CallTimeout {
                node,
                timeout_ms: timeout.as_millis() as u64,
            })
        };

        match node {
            Node::Retrieve => {
                let Some(passages) =
                    bounded(timeout, self.retriever.retrieve(&run.state.query)).await?
                else {
                    return Ok(timed_out());
                };
                run.state.context = passages;
                Ok(Transition::Goto(Node::RelevanceGate))
            }

            Node::RelevanceGate => {
                let Some(verdict) = bounded(
                    timeout,
                    self.relevance.check(&run.state.query, &run.state.context),
                )
                .await?
                else {
                    return Ok(timed_out());
                };
                run.diagnostics.relevance = Some(verdict.clone());

                match verdict {
                    RelevanceVerdict::Relevant(_) => Ok(Transition::Goto(Node::Generate)),
                    RelevanceVerdict::Irrelevant(grade) => {
                        Ok(Transition::Stop(UnanswerableReason::IrrelevantContext {
                            score: grade.score,
                            explanation: grade.explanation,
                        }))
                    }
                }
            }

            Node::Generate => {
                let Some(answer) = bounded(
                    timeout,
                    self.generator
                        .generate(&run.state.query, &run.state.context),
                )
                .await?
                else {
                    return Ok(timed_out());
                };
                run.state.answer = answer;
                run.state.attempts.generations += 1;
                Ok(Transition::Goto(Node::HallucinationGate))
            }

            Node::HallucinationGate => {
                let Some(verdict) = bounded(
                    timeout,
                    self.hallucination
                        .check(&run.state.answer, &run.state.context),
                )
                .await?
                else {
                    return Ok(timed_out());
                };
                let grounded = verdict.is_grounded();
                run.diagnostics.grounding = Some(verdict);

                if grounded {
                    return Ok(Transition::Goto(Node::HelpfulnessGate));
                }

                let limit = self.config.max_regenerations;
                if run.state.attempts.regenerations >= limit {
                    tracing::warn!(limit, "Regeneration budget exhausted");
                    return Ok(Transition::budget(Budget::Regenerations { limit }));
                }
                run.state.attempts.regenerations += 1;
                tracing::info!(
                    attempt = run.state.attempts.regenerations,
                    "Answer hallucinated, regenerating"
                );
                Ok(Transition::Goto(Node::Generate))
            }

            Node::HelpfulnessGate => {
                let Some(verdict) = bounded(
                    timeout,
                    self.helpfulness.score(&run.state.query, &run.state.answer),
                )
                .await?
                else {
                    return Ok(timed_out());
                };
                let helpful = verdict.is_helpful();
                run.diagnostics.helpfulness = Some(verdict);

                if helpful {
                    return Ok(Transition::Succeed);
                }

                let limit = self.config.max_rewrites;
                if run.state.attempts.rewrites >= limit {
                    tracing::warn!(limit, "Rewrite budget exhausted");
                    return Ok(Transition::budget(Budget::Rewrites { limit }));
                }
                Ok(Transition::Goto(Node::Rewrite))
            }

            Node::Rewrite => {
                if bounded(timeout, self.rewriter.rewrite(&mut run.state))
                    .await?
                    .is_none()
                {
                    return Ok(timed_out());
                }
                run.state.attempts.rewrites += 1;
                Ok(Transition::Goto(Node::Retrieve))
            }
        }
    }
}

/// Await an external call under a wall-clock budget; `None` on timeout
async fn bounded<T>(
    timeout: Duration,
    call: impl Future<Output = Result<T>>,
) -> Result<Option<T>> {
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result.map(Some),
        Err(_) => Ok(None),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reason_display() {
        let irrelevant = UnanswerableReason::IrrelevantContext {
            score: 2,
            explanation: None,
        };
        assert_eq!(irrelevant.to_string(), "irrelevant context (score 2/10)");

        let budget = UnanswerableReason::BudgetExceeded {
            budget: Budget::CallTimeout {
                node: Node::Generate,
                timeout_ms: 500,
            },
        };
        assert_eq!(
            budget.to_string(),
            "budget exceeded: generate call exceeded 500ms"
        );
    }

    #[test]
    fn test_reason_serialization() {
        let reason = UnanswerableReason::BudgetExceeded {
            budget: Budget::Rewrites { limit: 2 },
        };
        let json = serde_json::to_value(&reason).unwrap();
        assert_eq!(json["reason"], "budget_exceeded");
        assert_eq!(json["budget"]["budget"], "rewrites");
        assert_eq!(json["budget"]["limit"], 2);
    }

    #[test]
    fn test_diagnostics_visits() {
        let mut diagnostics = RunDiagnostics::new(Uuid::new_v4(), "q");
        diagnostics.path = vec![
            Node::Retrieve,
            Node::RelevanceGate,
            Node::Generate,
            Node::HallucinationGate,
            Node::Generate,
        ];
        assert_eq!(diagnostics.visits(Node::Generate), 2);
        assert_eq!(diagnostics.visits(Node::Rewrite), 0);
    }

    #[test]
    fn test_finish_maps_ending_to_outcome() {
        let mut run = Run::new(Uuid::new_v4(), "q");
        run.state.answer = "a".to_string();
        run.state.attempts.steps = 5;
        let outcome = run.finish(None);
        assert_eq!(outcome.answer(), Some("a"));
        assert_eq!(outcome.diagnostics().attempts.steps, 5);

        let mut run = Run::new(Uuid::new_v4(), "q");
        run.state.answer = "stale".to_string();
        let reason = UnanswerableReason::BudgetExceeded {
            budget: Budget::Regenerations { limit: 3 },
        };
        let outcome = run.finish(Some(reason.clone()));
        assert!(!outcome.is_success());
        assert_eq!(outcome.answer(), None);
        assert_eq!(outcome.reason(), Some(&reason));
    }

    #[tokio::test]
    async fn test_bounded_timeout() {
        let slow = async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok::<_, SelfRagError>(1)
        };
        assert_eq!(bounded(Duration::from_millis(10), slow).await.unwrap(), None);

        let fast = async { Ok::<_, SelfRagError>(2) };
        assert_eq!(bounded(Duration::from_secs(1), fast).await.unwrap(), Some(2));

        let failing = async { Err::<u8, _>(SelfRagError::SearchError("down".into())) };
        assert!(bounded(Duration::from_secs(1), failing).await.is_err());
    }
}
