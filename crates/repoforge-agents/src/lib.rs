//! Planner, Answerer, Generator, Test Generator, Evaluator, Router,
//! Orchestrator, and Refinement Loop (`spec.md` §4.6–§4.13), plus the
//! explicit cache component backing the response and routing caches.

mod answerer;
mod cache;
mod error;
mod evaluator;
mod generator;
mod llm_json;
mod orchestrator;
mod planner;
mod refinement;
mod router;
mod test_generator;

pub use answerer::{answer, answer_stream, AnswerResult, Citation, Confidence};
pub use cache::Cache;
pub use error::{AgentError, Result};
pub use evaluator::{
    evaluate_generation, ControllerVerdict, Decision, EvaluationResult, ImprovedFile,
    ReviewerVerdict,
};
pub use generator::{generate, DiffEntry, GenerationResult};
pub use llm_json::{extract_string_field, parse_llm_json, LlmJson};
pub use orchestrator::{Orchestrator, OrchestratorResult, TestGenResultPayload, TestOutcome};
pub use planner::{decompose, should_decompose};
pub use refinement::{refine, IterationLogEntry, RefinementResult};
pub use router::{route, Action, RoutingDecision};
pub use test_generator::{generate_tests, GeneratedFile, TestGenRequest, TestGenResult};
