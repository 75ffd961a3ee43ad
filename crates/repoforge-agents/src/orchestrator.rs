//! Phased concurrent multi-agent execution with response caching
//! (`spec.md` §4.12), grounded on
//! `original_source/backend/app/services/orchestrator.py`.

use crate::answerer::{self, AnswerResult, Citation, Confidence};
use crate::cache::Cache;
use crate::evaluator::{self, Decision, EvaluationResult, ImprovedFile};
use crate::generator::{self, GenerationResult};
use crate::planner;
use crate::router::{self, Action, RoutingDecision};
use crate::test_generator::{self, TestGenRequest, TestGenResult};
use repoforge_index::Retriever;
use repoforge_providers::ChatChain;
use repoforge_repo::RepositoryManager;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;

const RESPONSE_CACHE_CAPACITY: usize = 200;
const RESPONSE_CACHE_TTL: Duration = Duration::from_secs(10 * 60);
const ROUTING_CACHE_CAPACITY: usize = 500;
const ROUTING_CACHE_TTL: Duration = Duration::from_secs(30 * 60);

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status")]
pub enum TestOutcome {
    Success(TestGenResultPayload),
    Skipped { reason: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestGenResultPayload {
    pub success: bool,
    pub tests: String,
    pub test_file_name: String,
    pub explanation: String,
    pub coverage_notes: String,
    pub source_files: Vec<String>,
    pub error: Option<String>,
}

impl From<TestGenResult> for TestGenResultPayload {
    fn from(r: TestGenResult) -> Self {
        Self {
            success: r.success,
            tests: r.tests,
            test_file_name: r.test_file_name,
            explanation: r.explanation,
            coverage_notes: r.coverage_notes,
            source_files: r.source_files,
            error: r.error,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorResult {
    pub routing: RoutingDecision,
    pub agents_used: Vec<String>,
    pub agents_skipped: Vec<String>,
    pub answer: Option<String>,
    pub citations: Option<Vec<Citation>>,
    pub explain: Option<AnswerResult>,
    pub generate: Option<GenerationResult>,
    pub test: Option<TestOutcome>,
    pub evaluation: Option<EvaluationResult>,
    pub evaluation_action: Option<Decision>,
    pub evaluation_improved_code: Option<Vec<ImprovedFile>>,
    pub confidence: Confidence,
    #[serde(default)]
    pub from_cache: bool,
}

pub struct Orchestrator {
    chat: Arc<ChatChain>,
    retriever: Arc<Retriever>,
    repo_manager: Arc<RepositoryManager>,
    response_cache: Cache<String, OrchestratorResult>,
    routing_cache: Cache<String, RoutingDecision>,
}

fn normalize_question(question: &str) -> String {
    question.trim().to_lowercase()
}

fn hash_key(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(parts.join("|").as_bytes());
    format!("{:x}", hasher.finalize())
}

impl Orchestrator {
    pub fn new(
        chat: Arc<ChatChain>,
        retriever: Arc<Retriever>,
        repo_manager: Arc<RepositoryManager>,
    ) -> Self {
        Self {
            chat,
            retriever,
            repo_manager,
            response_cache: Cache::new(RESPONSE_CACHE_CAPACITY, RESPONSE_CACHE_TTL),
            routing_cache: Cache::new(ROUTING_CACHE_CAPACITY, ROUTING_CACHE_TTL),
        }
    }

    /// Invalidates cached answers for a repo after a reindex changes its
    /// commit hash (`spec.md` §4.12: "cache invalidation ... explicit
    /// `invalidate_repo(repo_id)`").
    pub fn invalidate_repo(&self, repo_id: &str) {
        let prefix = format!("{repo_id}|");
        self.response_cache
            .invalidate_matching(|key| key.starts_with(&prefix));
    }

    pub async fn smart(&self, repo_id: &str, request: &str) -> OrchestratorResult {
        let commit_hash = self
            .repo_manager
            .get(repo_id)
            .await
            .map(|r| r.commit_hash)
            .unwrap_or_default();
        let normalized = normalize_question(request);
        let response_key = format!(
            "{repo_id}|{}",
            hash_key(&[repo_id, &normalized, &commit_hash])
        );

        if let Some(mut cached) = self.response_cache.get(&response_key) {
            cached.from_cache = true;
            return cached;
        }

        let result = self.smart_uncached(repo_id, request, &normalized).await;
        self.response_cache.put(response_key, result.clone());
        result
    }

    async fn route_cached(&self, request: &str, normalized: &str) -> RoutingDecision {
        let key = hash_key(&[normalized]);
        if let Some(cached) = self.routing_cache.get(&key) {
            return cached;
        }
        let decision = router::route(&self.chat, request, "").await;
        self.routing_cache.put(key, decision.clone());
        decision
    }

    async fn smart_uncached(
        &self,
        repo_id: &str,
        request: &str,
        normalized: &str,
    ) -> OrchestratorResult {
        let routing = self.route_cached(request, normalized).await;

        if routing.primary_action == Action::Refuse {
            return OrchestratorResult {
                routing: routing.clone(),
                agents_used: Vec::new(),
                agents_skipped: vec![
                    "EXPLAIN".to_string(),
                    "GENERATE".to_string(),
                    "TEST".to_string(),
                ],
                answer: Some("I cannot safely process this request.".to_string()),
                citations: None,
                explain: None,
                generate: None,
                test: None,
                evaluation: None,
                evaluation_action: None,
                evaluation_improved_code: None,
                confidence: Confidence::Low,
                from_cache: false,
            };
        }

        let wants_explain = matches!(routing.primary_action, Action::Explain | Action::Decompose)
            || routing.secondary_actions.contains(&Action::Explain);
        let wants_generate = routing.primary_action == Action::Generate
            || routing.secondary_actions.contains(&Action::Generate);
        let wants_test = routing.primary_action == Action::Test
            || routing.secondary_actions.contains(&Action::Test)
            || routing.parallel_agents.contains(&Action::Test);

        let do_decompose = routing.primary_action == Action::Decompose || routing.should_decompose;

        let (explain_result, generate_result) = if wants_explain || wants_generate {
            let explain_fut = async {
                if wants_explain {
                    Some(self.run_explain(repo_id, request, do_decompose).await)
                } else {
                    None
                }
            };
            let generate_fut = async {
                if wants_generate {
                    Some(generator::generate(&self.chat, &self.retriever, repo_id, request).await)
                } else {
                    None
                }
            };
            tokio::join!(explain_fut, generate_fut)
        } else {
            (None, None)
        };

        let defaulted_to_explain = !wants_explain && !wants_generate && !wants_test;
        let explain_result = if defaulted_to_explain {
            Some(self.run_explain(repo_id, request, false).await)
        } else {
            explain_result
        };

        let mut agents_used = Vec::new();
        if explain_result.is_some() {
            agents_used.push("EXPLAIN".to_string());
        }
        if generate_result.is_some() {
            agents_used.push("GENERATE".to_string());
        }

        let mut evaluation = None;
        let mut test_outcome = None;
        let mut agents_skipped = Vec::new();

        if let Some(generate) = &generate_result {
            if !generate.diffs.is_empty() {
                let eval_fut = evaluator::evaluate_generation(&self.chat, request, &generate.diffs);
                let test_fut = async {
                    if wants_test {
                        let req = TestGenRequest {
                            repo_id: repo_id.to_string(),
                            generated_code: generate
                                .diffs
                                .iter()
                                .map(|d| crate::test_generator::GeneratedFile {
                                    file_path: d.file_path.clone(),
                                    content: d.code.clone(),
                                })
                                .collect(),
                            ..Default::default()
                        };
                        Some(test_generator::generate_tests(&self.chat, &self.retriever, &req).await)
                    } else {
                        None
                    }
                };

                let (eval_result, speculative_test) = tokio::join!(eval_fut, test_fut);

                if eval_result.controller.decision == Decision::RequestRevision {
                    test_outcome = Some(TestOutcome::Skipped {
                        reason: "evaluator requested revision; discarding speculative test"
                            .to_string(),
                    });
                    agents_skipped.push("TEST".to_string());
                } else if let Some(test_result) = speculative_test {
                    agents_used.push("TEST".to_string());
                    test_outcome = Some(TestOutcome::Success(test_result.into()));
                }

                evaluation = Some(eval_result);
            }
        }

        if wants_test && generate_result.is_none() {
            let req = TestGenRequest {
                repo_id: repo_id.to_string(),
                custom_request: Some(request.to_string()),
                ..Default::default()
            };
            let result = test_generator::generate_tests(&self.chat, &self.retriever, &req).await;
            agents_used.push("TEST".to_string());
            test_outcome = Some(TestOutcome::Success(result.into()));
        }

        let evaluation_action = evaluation.as_ref().map(|e| e.controller.decision);
        let evaluation_improved_code = evaluation.as_ref().and_then(|e| {
            if e.controller.decision == Decision::MergeFeedback
                && !e.controller.improved_code_by_file.is_empty()
            {
                Some(e.controller.improved_code_by_file.clone())
            } else {
                None
            }
        });

        let (answer, citations, confidence) = if let Some(explain) = &explain_result {
            (
                Some(explain.answer.clone()),
                Some(explain.citations.clone()),
                explain.confidence,
            )
        } else if let Some(generate) = &generate_result {
            (Some(generate.plan.clone()), None, Confidence::High)
        } else {
            (None, None, Confidence::Low)
        };

        let mut used: Vec<String> = agents_used;
        used.sort();
        used.dedup();

        OrchestratorResult {
            routing,
            agents_used: used,
            agents_skipped,
            answer,
            citations,
            explain: explain_result,
            generate: generate_result,
            test: test_outcome,
            evaluation,
            evaluation_action,
            evaluation_improved_code,
            confidence,
            from_cache: false,
        }
    }

    async fn run_explain(&self, repo_id: &str, request: &str, decompose: bool) -> AnswerResult {
        if decompose {
            if let Some(sub_questions) = planner::decompose(&self.chat, request).await {
                return self.answer_decomposed(repo_id, request, &sub_questions).await;
            }
        }
        let chunks = self
            .retriever
            .retrieve(repo_id, request, repoforge_index::DEFAULT_K)
            .await
            .unwrap_or_default();
        answerer::answer(&self.chat, request, &chunks, "").await
    }

    async fn answer_decomposed(
        &self,
        repo_id: &str,
        original_request: &str,
        sub_questions: &[String],
    ) -> AnswerResult {
        let mut all_chunks = Vec::new();
        for sub in sub_questions {
            let chunks = self
                .retriever
                .retrieve(repo_id, sub, repoforge_index::DEFAULT_K)
                .await
                .unwrap_or_default();
            all_chunks.extend(chunks);
        }
        answerer::answer(&self.chat, original_request, &all_chunks, "").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_question_trims_and_lowercases() {
        assert_eq!(normalize_question("  What Is THIS?  "), "what is this?");
    }

    #[test]
    fn hash_key_is_deterministic() {
        let a = hash_key(&["repo", "question", "commit"]);
        let b = hash_key(&["repo", "question", "commit"]);
        assert_eq!(a, b);
    }

    #[test]
    fn hash_key_differs_on_input_change() {
        let a = hash_key(&["repo", "question", "commit1"]);
        let b = hash_key(&["repo", "question", "commit2"]);
        assert_ne!(a, b);
    }
}
