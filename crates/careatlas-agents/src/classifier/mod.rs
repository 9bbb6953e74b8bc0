//! Intent classification: embedding similarity against calibrated
//! exemplars, a validated LLM fallback for low-confidence queries, a regex
//! fallback when no embedder is available, and multi-intent expansion.
//!
//! The classifier never fails a query; GENERAL is a valid catch-all and the
//! reported confidence never drops below the floor.

mod routing;

pub use routing::route;

use std::collections::HashMap;
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use tracing::{debug, warn};

use careatlas_core::config::constants::classify;
use careatlas_core::error::CoreResult;
use careatlas_core::extract;
use careatlas_core::stats::sigmoid;
use careatlas_core::traits::{cosine_similarity, ChatMessage, ChatModel, TextEmbedder};
use careatlas_core::types::{AgentKind, ExtractedParams, Flow, Intent, Plan};

static EXEMPLARS_JSON: &str = include_str!("../../data/intent_exemplars.json");
static PATTERNS_JSON: &str = include_str!("../../data/intent_patterns.json");

/// Regex fallback pattern sets, compiled once. GENERAL has none; it is the
/// zero-score catch-all.
static FALLBACK_PATTERNS: Lazy<Vec<(Intent, Vec<Regex>)>> = Lazy::new(|| {
    let raw: HashMap<String, Vec<String>> =
        serde_json::from_str(PATTERNS_JSON).expect("bundled intent_patterns.json is valid");
    let mut sets = Vec::with_capacity(raw.len());
    for intent in Intent::ALL {
        if let Some(patterns) = raw.get(intent.as_str()) {
            let compiled = patterns
                .iter()
                .map(|p| Regex::new(&p.to_lowercase()).expect("intent pattern compiles"))
                .collect();
            sets.push((intent, compiled));
        }
    }
    sets
});

fn exemplar_texts() -> HashMap<Intent, Vec<String>> {
    let raw: HashMap<String, Vec<String>> =
        serde_json::from_str(EXEMPLARS_JSON).expect("bundled intent_exemplars.json is valid");
    raw.into_iter()
        .filter_map(|(k, v)| Intent::parse(&k).map(|intent| (intent, v)))
        .collect()
}

const LLM_SYSTEM_PROMPT: &str = "You are a query classifier for a healthcare \
facility intelligence system. Classify the user's query into exactly one of \
these intents: COUNT, AGGREGATE, ANOMALY_DETECTION, VALIDATION, \
DISTANCE_QUERY, COVERAGE_GAP, MEDICAL_DESERT, SINGLE_POINT_FAILURE, \
FACILITY_LOOKUP, SERVICE_SEARCH, SPECIALTY_SEARCH, COMPARISON, PLANNING, \
GENERAL. Reply with a JSON object: {\"intent\": \"<LABEL>\", \"confidence\": \
<0.0-1.0>}. No other text.";

#[derive(Debug, Deserialize)]
struct LlmClassification {
    intent: String,
    confidence: f32,
}

/// The classifier. Owns precomputed exemplar embeddings when an embedder is
/// configured; otherwise runs the regex pipeline.
pub struct IntentClassifier {
    embedder: Option<Arc<dyn TextEmbedder>>,
    chat: Option<Arc<dyn ChatModel>>,
    /// Unit-norm exemplar embeddings per intent, frozen at construction.
    exemplars: Vec<(Intent, Vec<Vec<f32>>)>,
    llm_fallback_threshold: f32,
}

impl IntentClassifier {
    /// Build with the embedding pipeline: every exemplar is embedded once
    /// up front.
    pub async fn with_embedder(
        embedder: Arc<dyn TextEmbedder>,
        chat: Option<Arc<dyn ChatModel>>,
        llm_fallback_threshold: f32,
    ) -> CoreResult<Self> {
        let mut exemplars = Vec::new();
        for (intent, texts) in exemplar_texts() {
            let embedded = embedder.embed_batch(&texts).await?;
            exemplars.push((intent, embedded));
        }
        exemplars.sort_by_key(|(intent, _)| *intent);
        Ok(Self {
            embedder: Some(embedder),
            chat,
            exemplars,
            llm_fallback_threshold,
        })
    }

    /// Build without an embedder; classification uses the regex fallback.
    pub fn regex_only(chat: Option<Arc<dyn ChatModel>>) -> Self {
        Self {
            embedder: None,
            chat,
            exemplars: Vec::new(),
            llm_fallback_threshold: 0.45,
        }
    }

    /// Classify a query into an execution plan.
    pub async fn classify(&self, query: &str) -> CoreResult<Plan> {
        let params = extract_params(query);

        let (intent, confidence, scored) = match &self.embedder {
            Some(embedder) => {
                let scored = self.embedding_scores(embedder.as_ref(), query).await?;
                let top = scored.first().copied();
                match top {
                    Some((intent, s1)) => {
                        let s2 = scored.get(1).map(|&(_, s)| s).unwrap_or(0.0);
                        let gap = s1 - s2;
                        let confidence =
                            sigmoid(classify::GAIN * (gap - classify::MIDPOINT)) as f32;
                        (intent, confidence, scored)
                    }
                    None => (Intent::General, classify::CONFIDENCE_FLOOR, scored),
                }
            }
            None => {
                let (intent, confidence) = regex_classify(query);
                (intent, confidence, Vec::new())
            }
        };
        let mut intent = intent;
        let mut confidence = confidence.max(classify::CONFIDENCE_FLOOR);

        // LLM fallback for ambiguous queries; the reply is only trusted when
        // it names a valid label with enough self-reported confidence.
        if confidence < self.llm_fallback_threshold {
            if let Some((llm_intent, llm_conf)) = self.llm_classify(query).await {
                debug!(%llm_intent, llm_conf, "llm fallback accepted");
                intent = llm_intent;
                confidence = llm_conf.max(classify::CONFIDENCE_FLOOR);
            }
        }

        let (base_agents, mut flow) = route(intent);
        let mut agents: Vec<AgentKind> = base_agents.to_vec();

        // Multi-intent expansion: strong secondary intents with disjoint
        // agent sets join the plan.
        for &(candidate, score) in scored.iter().skip(1) {
            if score < classify::MULTI_INTENT_SIM || candidate == intent {
                continue;
            }
            let (candidate_agents, _) = route(candidate);
            if candidate_agents.iter().any(|a| agents.contains(a)) {
                continue;
            }
            agents.extend_from_slice(candidate_agents);
            flow = if candidate == Intent::Comparison || intent == Intent::Comparison {
                Flow::Parallel
            } else {
                Flow::Sequential
            };
            debug!(%candidate, score, "multi-intent expansion");
        }

        debug!(%intent, confidence, ?agents, ?flow, "classified");
        Ok(Plan {
            intent,
            confidence,
            agents,
            flow,
            params,
        })
    }

    /// Per-intent similarity scores, descending: mean of the top-2 exemplar
    /// similarities, robust to a single keyword spike.
    async fn embedding_scores(
        &self,
        embedder: &dyn TextEmbedder,
        query: &str,
    ) -> CoreResult<Vec<(Intent, f64)>> {
        let query_vec = embedder.embed(query).await?;
        let mut scored: Vec<(Intent, f64)> = self
            .exemplars
            .iter()
            .map(|(intent, vectors)| {
                let mut sims: Vec<f64> = vectors
                    .iter()
                    .map(|v| cosine_similarity(&query_vec, v))
                    .collect();
                sims.sort_by(|a, b| b.total_cmp(a));
                let top2 = &sims[..sims.len().min(2)];
                let score = top2.iter().sum::<f64>() / top2.len().max(1) as f64;
                (*intent, score)
            })
            .collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        Ok(scored)
    }

    async fn llm_classify(&self, query: &str) -> Option<(Intent, f32)> {
        let chat = self.chat.as_ref()?;
        let messages = [
            ChatMessage::system(LLM_SYSTEM_PROMPT),
            ChatMessage::user(query.to_string()),
        ];
        let reply = match chat.chat(&messages, 128, 0.1).await {
            Ok(reply) => reply,
            Err(err) => {
                warn!(%err, "llm intent fallback unavailable");
                return None;
            }
        };
        let parsed: LlmClassification = serde_json::from_str(strip_code_fences(&reply)).ok()?;
        let intent = Intent::parse(&parsed.intent)?;
        if parsed.confidence >= classify::LLM_MIN_CONFIDENCE {
            Some((intent, parsed.confidence.min(1.0)))
        } else {
            None
        }
    }
}

/// Extract the structured parameters every agent shares.
pub fn extract_params(query: &str) -> ExtractedParams {
    let specialty = extract::extract_specialty(query);
    let negated = specialty
        .map(|tag| {
            tag.keywords()
                .iter()
                .any(|kw| extract::is_negated(query, kw))
        })
        .unwrap_or(false);
    ExtractedParams {
        specialty,
        region: extract::extract_region(query),
        facility_type: extract::extract_facility_type(query),
        equipment: extract::extract_equipment(query),
        radius_km: extract::extract_radius_km(query),
        city_pair: extract::extract_city_pair(query),
        negated,
    }
}

/// Regex fallback: score every intent by pattern hits; ties break by intent
/// declaration order. Zero hits means GENERAL.
fn regex_classify(query: &str) -> (Intent, f32) {
    let lower = query.to_lowercase();
    let mut best: Option<(Intent, usize)> = None;
    let mut second = 0usize;
    for (intent, patterns) in FALLBACK_PATTERNS.iter() {
        let hits = patterns.iter().filter(|re| re.is_match(&lower)).count();
        if hits == 0 {
            continue;
        }
        match best {
            None => best = Some((*intent, hits)),
            Some((_, best_hits)) if hits > best_hits => {
                second = best_hits;
                best = Some((*intent, hits));
            }
            Some(_) => second = second.max(hits),
        }
    }
    match best {
        None => (Intent::General, 0.30),
        Some((intent, hits)) => {
            let confidence = if hits > second {
                (0.45 + 0.15 * hits as f32).min(0.90)
            } else {
                0.45
            };
            (intent, confidence)
        }
    }
}

fn strip_code_fences(reply: &str) -> &str {
    let trimmed = reply.trim();
    let without_open = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    without_open.strip_suffix("```").unwrap_or(without_open).trim()
}

#[cfg(test)]
mod tests {
    use super::*;
    use careatlas_core::stubs::{ScriptedChatModel, UnavailableChatModel};

    #[test]
    fn regex_path_classifies_the_seed_queries() {
        let cases = [
            ("How many hospitals offer cardiology?", Intent::Count),
            (
                "Facilities in Ashanti without orthopedic services",
                Intent::Count,
            ),
            ("Hospitals within 30 km of Tamale", Intent::DistanceQuery),
            ("facility with cardiac catheterization", Intent::FacilityLookup),
            (
                "Find suspicious facility capability claims",
                Intent::AnomalyDetection,
            ),
            (
                "Deploy a cardiology specialist across Ghana",
                Intent::Planning,
            ),
            ("good morning", Intent::General),
        ];
        for (query, want) in cases {
            let (got, confidence) = regex_classify(query);
            assert_eq!(got, want, "query: {query}");
            assert!(confidence >= classify::CONFIDENCE_FLOOR);
        }
    }

    #[test]
    fn regex_confidence_rises_with_unambiguous_hits() {
        let (intent, confidence) = regex_classify("How many hospitals offer cardiology?");
        assert_eq!(intent, Intent::Count);
        assert!(confidence >= 0.55, "got {confidence}");
    }

    #[tokio::test]
    async fn regex_only_classifier_produces_full_plans() {
        let classifier = IntentClassifier::regex_only(None);
        let plan = classifier
            .classify("How many hospitals offer cardiology?")
            .await
            .unwrap();
        assert_eq!(plan.intent, Intent::Count);
        assert_eq!(plan.agents, vec![AgentKind::Analyst]);
        assert_eq!(plan.flow, Flow::Single);
        assert_eq!(
            plan.params.specialty,
            Some(careatlas_core::types::Specialty::Cardiology)
        );
        assert!(!plan.params.negated);
    }

    #[tokio::test]
    async fn negation_is_detected_in_params() {
        let classifier = IntentClassifier::regex_only(None);
        let plan = classifier
            .classify("Facilities in Ashanti without orthopedic services")
            .await
            .unwrap();
        assert!(plan.params.negated);
        assert_eq!(plan.params.region.as_deref(), Some("Ashanti"));
    }

    #[tokio::test]
    async fn llm_fallback_accepts_valid_confident_labels() {
        let chat = Arc::new(ScriptedChatModel::single(
            r#"{"intent": "PLANNING", "confidence": 0.8}"#,
        ));
        let classifier = IntentClassifier::regex_only(Some(chat.clone()));
        // A query with no regex hits lands on GENERAL at 0.30, which is
        // below the fallback threshold.
        let plan = classifier.classify("hello there friend").await.unwrap();
        assert_eq!(plan.intent, Intent::Planning);
        assert_eq!(chat.calls(), 1);
    }

    #[tokio::test]
    async fn llm_fallback_rejects_invalid_and_diffident_replies() {
        for reply in [
            r#"{"intent": "SORCERY", "confidence": 0.9}"#,
            r#"{"intent": "PLANNING", "confidence": 0.3}"#,
            "not json at all",
        ] {
            let chat = Arc::new(ScriptedChatModel::single(reply));
            let classifier = IntentClassifier::regex_only(Some(chat));
            let plan = classifier.classify("hello there friend").await.unwrap();
            assert_eq!(plan.intent, Intent::General, "reply: {reply}");
        }
    }

    #[tokio::test]
    async fn llm_outage_degrades_to_regex_result() {
        let classifier =
            IntentClassifier::regex_only(Some(Arc::new(UnavailableChatModel)));
        let plan = classifier.classify("hello there friend").await.unwrap();
        assert_eq!(plan.intent, Intent::General);
        assert!(plan.confidence >= classify::CONFIDENCE_FLOOR);
    }

    #[test]
    fn code_fence_stripping() {
        assert_eq!(
            strip_code_fences("```json\n{\"a\":1}\n```"),
            "{\"a\":1}"
        );
        assert_eq!(strip_code_fences("{\"a\":1}"), "{\"a\":1}");
    }

    #[test]
    fn sigmoid_confidence_is_half_at_the_midpoint_gap() {
        let conf = sigmoid(classify::GAIN * (0.05 - classify::MIDPOINT));
        assert!((conf - 0.5).abs() < 1e-6);
    }
}
