//! CareAtlas engine: the orchestrator behind `run(query) -> Response`.
//!
//! A query flows router -> agents (per the classifier's plan) -> aggregator.
//! The transition function is the plan itself: agents never point at each
//! other, they emit typed results and the orchestrator alone decides the
//! next node. The searcher gets one self-correction retry; every step lands
//! in the trace; agent failures and deadline misses mark the response
//! partial instead of aborting it.

pub mod aggregate;
pub mod retry;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::{info, warn};

use careatlas_agents::{
    DataAnalyst, GeoAnalyst, IntentClassifier, MedicalReasoner, Planner, SemanticSearcher,
};
use careatlas_core::config::EngineConfig;
use careatlas_core::corpus::CorpusStore;
use careatlas_core::error::{CoreError, CoreResult};
use careatlas_core::geo::SpatialIndex;
use careatlas_core::stubs::{InMemoryVectorIndex, StubEmbedder};
use careatlas_core::traits::{ChatModel, TextEmbedder, VectorIndex};
use careatlas_core::types::{
    ActionData, AgentKind, AgentResult, Facility, Flow, Plan, Response, TraceStep,
};

/// Maximum accepted query length, characters.
const MAX_QUERY_CHARS: usize = 2000;

/// Builder wiring the corpus snapshot and collaborators into an engine.
///
/// Collaborators default to the in-process stubs, so a bare
/// `EngineBuilder::new(snapshot).build().await` yields a fully working
/// engine with deterministic embeddings and no network dependencies.
pub struct EngineBuilder {
    snapshot: Vec<Facility>,
    config: EngineConfig,
    embedder: Option<Arc<dyn TextEmbedder>>,
    index: Option<Arc<dyn VectorIndex>>,
    chat: Option<Arc<dyn ChatModel>>,
}

impl EngineBuilder {
    pub fn new(snapshot: Vec<Facility>) -> Self {
        Self {
            snapshot,
            config: EngineConfig::default(),
            embedder: None,
            index: None,
            chat: None,
        }
    }

    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn embedder(mut self, embedder: Arc<dyn TextEmbedder>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    pub fn vector_index(mut self, index: Arc<dyn VectorIndex>) -> Self {
        self.index = Some(index);
        self
    }

    pub fn chat_model(mut self, chat: Arc<dyn ChatModel>) -> Self {
        self.chat = Some(chat);
        self
    }

    /// Build the corpus, indexes, classifier, and agents.
    ///
    /// Fatal on snapshot validation failure; everything later is
    /// per-request and recoverable.
    pub async fn build(self) -> CoreResult<QueryEngine> {
        let corpus = Arc::new(CorpusStore::from_snapshot(self.snapshot)?);
        let spatial = Arc::new(SpatialIndex::build(&corpus));
        let embedder: Arc<dyn TextEmbedder> = self
            .embedder
            .unwrap_or_else(|| Arc::new(StubEmbedder::new()));
        let index: Arc<dyn VectorIndex> = match self.index {
            Some(index) => index,
            None => Arc::new(InMemoryVectorIndex::build(&corpus, Arc::clone(&embedder)).await?),
        };

        let classifier = if self.config.embedding_classifier {
            IntentClassifier::with_embedder(
                Arc::clone(&embedder),
                self.chat.clone(),
                self.config.llm_fallback_threshold,
            )
            .await?
        } else {
            IntentClassifier::regex_only(self.chat.clone())
        };

        info!(
            facilities = corpus.len(),
            spatial = spatial.len(),
            model = embedder.model_id(),
            "engine ready"
        );

        Ok(QueryEngine {
            analyst: DataAnalyst::new(Arc::clone(&corpus)),
            searcher: SemanticSearcher::new(
                Arc::clone(&corpus),
                Arc::clone(&embedder),
                index,
                self.config.search_top_k,
            ),
            reasoner: MedicalReasoner::new(Arc::clone(&corpus), self.config.anomaly_seed),
            geo: GeoAnalyst::new(Arc::clone(&corpus), Arc::clone(&spatial)),
            planner: Planner::new(Arc::clone(&corpus), Arc::clone(&spatial)),
            classifier,
            chat: self.chat,
            config: self.config,
            corpus,
        })
    }
}

/// The query engine. Shared state (corpus, indexes) is read-only; one
/// engine serves concurrent callers.
pub struct QueryEngine {
    config: EngineConfig,
    corpus: Arc<CorpusStore>,
    classifier: IntentClassifier,
    analyst: DataAnalyst,
    searcher: SemanticSearcher,
    reasoner: MedicalReasoner,
    geo: GeoAnalyst,
    planner: Planner,
    chat: Option<Arc<dyn ChatModel>>,
}

impl QueryEngine {
    /// Number of facilities loaded.
    pub fn corpus_len(&self) -> usize {
        self.corpus.len()
    }

    /// Run one query through router, agents, and aggregator.
    pub async fn run(&self, query: &str) -> CoreResult<Response> {
        let query = query.trim();
        if query.is_empty() {
            return Err(CoreError::InvalidInput("empty query".to_string()));
        }
        if query.chars().count() > MAX_QUERY_CHARS {
            return Err(CoreError::InvalidInput(format!(
                "query exceeds {MAX_QUERY_CHARS} characters"
            )));
        }

        let started = Instant::now();
        let deadline = Duration::from_millis(self.config.plan_deadline_ms);
        let mut trace: Vec<TraceStep> = Vec::new();
        let mut partial = false;

        // Router node.
        let t0 = Instant::now();
        let plan = self.classifier.classify(query).await?;
        trace.push(TraceStep::new(
            "router",
            "classify_intent",
            ms(t0.elapsed()),
            format!(
                "intent={} confidence={:.2} agents=[{}] flow={:?}",
                plan.intent,
                plan.confidence,
                plan.agents
                    .iter()
                    .map(|a| a.as_str())
                    .collect::<Vec<_>>()
                    .join(", "),
                plan.flow
            ),
        ));

        // Agent nodes, in plan order. Parallel two-agent plans genuinely
        // overlap; anything else runs sequentially. Either way each agent
        // writes only its own slot in agent_results.
        let mut results: BTreeMap<String, AgentResult> = BTreeMap::new();
        if plan.flow == Flow::Parallel && plan.agents.len() == 2 {
            let (first, second) = (plan.agents[0], plan.agents[1]);
            let step_base = trace.len();
            let (a, b) = tokio::join!(
                self.invoke_agent(first, query, &plan, step_base, deadline, started),
                self.invoke_agent(second, query, &plan, step_base + 1, deadline, started),
            );
            for outcome in [a, b] {
                partial |= outcome.failed;
                trace.push(outcome.trace);
                results.insert(outcome.result.agent.as_str().to_string(), outcome.result);
            }
        } else {
            for &agent in &plan.agents {
                let step = trace.len();
                let outcome = self
                    .invoke_agent(agent, query, &plan, step, deadline, started)
                    .await;
                partial |= outcome.failed;
                trace.push(outcome.trace);
                results.insert(outcome.result.agent.as_str().to_string(), outcome.result);
            }
        }

        // Aggregator node.
        let t0 = Instant::now();
        let map_facilities = aggregate::merge_map_points(&results);
        let summary = match (&self.chat, self.config.synthesize_summaries) {
            (Some(chat), true) => aggregate::synthesize(
                chat.as_ref(),
                query,
                plan.intent.as_str(),
                &results,
                self.config.synthesis_budget_chars,
            )
            .await
            .unwrap_or_else(|| aggregate::fallback_summary(&results)),
            _ => aggregate::fallback_summary(&results),
        };
        trace.push(TraceStep::new(
            "aggregator",
            "synthesize_response",
            ms(t0.elapsed()),
            format!("{} map facilities merged", map_facilities.len()),
        ));

        let agents_used: Vec<String> = plan
            .agents
            .iter()
            .map(|a| a.as_str().to_string())
            .collect();
        Ok(Response {
            query: query.to_string(),
            intent: plan.intent,
            confidence: plan.confidence,
            agents_used,
            agent_results: results,
            map_facilities,
            summary,
            trace,
            total_duration_ms: ms(started.elapsed()),
            timestamp: Utc::now(),
            partial,
        })
    }

    /// Run one agent with the remaining plan budget. Failures and deadline
    /// misses become `Failed` results plus an errored trace step; the plan
    /// keeps going.
    async fn invoke_agent(
        &self,
        agent: AgentKind,
        query: &str,
        plan: &Plan,
        step: usize,
        deadline: Duration,
        started: Instant,
    ) -> AgentOutcome {
        let t0 = Instant::now();
        let remaining = deadline.saturating_sub(started.elapsed());
        if remaining.is_zero() {
            warn!(agent = agent.as_str(), "plan deadline exhausted before agent start");
            return AgentOutcome::failed(agent, t0, "deadline exceeded".to_string());
        }

        let run = async {
            match agent {
                AgentKind::Analyst => self.analyst.run(query, plan, step),
                AgentKind::Searcher => self.run_searcher(query, plan, step).await,
                AgentKind::Validator => self.reasoner.run(query, plan, step),
                AgentKind::Geo => self.geo.run(query, plan, step),
                AgentKind::Planner => self.planner.run(query, plan, step),
            }
        };

        match tokio::time::timeout(remaining, run).await {
            Ok(Ok(result)) => {
                let summary = aggregate::summarize(&result.data);
                let mut trace_step = TraceStep::new(
                    agent.as_str(),
                    result.data.name(),
                    ms(t0.elapsed()),
                    summary,
                );
                let failed = matches!(result.data, ActionData::Failed { .. });
                if let ActionData::Failed { error } = &result.data {
                    trace_step = trace_step.with_error(error.clone());
                }
                AgentOutcome {
                    result,
                    trace: trace_step,
                    failed,
                }
            }
            Ok(Err(err)) => {
                warn!(agent = agent.as_str(), %err, "agent failed");
                AgentOutcome::failed(agent, t0, err.to_string())
            }
            Err(_) => {
                warn!(agent = agent.as_str(), "agent timed out");
                AgentOutcome::failed(agent, t0, "deadline exceeded".to_string())
            }
        }
    }

    /// The searcher with its self-correction edge: when the filtered pass
    /// returns nothing, strip a geocodable location qualifier and retry
    /// exactly once without filters.
    async fn run_searcher(
        &self,
        query: &str,
        plan: &Plan,
        step: usize,
    ) -> CoreResult<AgentResult> {
        let first = self.searcher.run(query, plan, step).await?;
        let retry_query = match &first.data {
            ActionData::SemanticSearch { hits, filters, .. }
                if hits.is_empty() && !filters.is_empty() =>
            {
                retry::strip_location_qualifier(query)
                    .unwrap_or_else(|| query.to_string())
            }
            _ => return Ok(first),
        };

        info!(%retry_query, "semantic search empty with filters, retrying unfiltered");
        let mut second = self.searcher.search(&retry_query, false, step).await?;
        if let ActionData::SemanticSearch {
            retried_unfiltered, ..
        } = &mut second.data
        {
            *retried_unfiltered = true;
        }
        Ok(second)
    }
}

struct AgentOutcome {
    result: AgentResult,
    trace: TraceStep,
    failed: bool,
}

impl AgentOutcome {
    fn failed(agent: AgentKind, t0: Instant, error: String) -> Self {
        Self {
            result: AgentResult::new(agent, ActionData::Failed { error: error.clone() }),
            trace: TraceStep::new(agent.as_str(), "failed", ms(t0.elapsed()), "agent failed")
                .with_error(error),
            failed: true,
        }
    }
}

fn ms(duration: Duration) -> f64 {
    duration.as_secs_f64() * 1000.0
}
