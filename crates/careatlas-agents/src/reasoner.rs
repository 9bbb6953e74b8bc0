//! Medical reasoner: constraint validation, two-stage anomaly detection,
//! red-flag language scanning, coverage gaps, and the national
//! single-point-of-failure view.
//!
//! The two anomaly stages are ANDed: a facility is only reported when the
//! Isolation Forest isolates it *and* its Mahalanobis distance clears the
//! chi-square gate. Intersection keeps the false-positive rate low on a
//! corpus this small.

use std::collections::BTreeMap;
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, warn};

use careatlas_core::config::constants::stats as stat_consts;
use careatlas_core::corpus::CorpusStore;
use careatlas_core::error::{CoreError, CoreResult};
use careatlas_core::geocode::Gazetteer;
use careatlas_core::stats::{
    column_means, covariance, invert, mahalanobis_sq, standardize, IsolationForest,
};
use careatlas_core::types::{
    ActionData, AgentKind, AgentResult, AnomalyReport, Citation, ConstraintIssue,
    ConstraintIssueKind, Facility, FacilityRef, FeatureCounts, Intent, Plan, RedFlagHit,
    RedFlagReport, RegionGap, RiskLevel, Severity, Specialty, ValidationReport,
};

use crate::analyst::rare_specialty_entries;
use crate::knowledge::{red_flag_recommendation, PROCEDURE_REQUIREMENTS, RED_FLAG_PATTERNS};

/// Reports returned per action; totals always cover the full corpus.
const REPORT_CAP: usize = 20;

/// Fuzzy token-set threshold (percent) for equipment mentions and red-flag
/// specialty adjacency.
const FUZZY_THRESHOLD: f64 = 75.0;

/// Window width (words) for fuzzy scans.
const FUZZY_WINDOW: usize = 5;

static ANOMALY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"anomal|unusual|suspicious|outlier").expect("anomaly trigger"));
static RED_FLAG_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"red flag|temporary|visiting|camp|mission").expect("red flag trigger")
});
static GAP_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"desert|gap|coverage|underserved|cold.?spot").expect("gap trigger")
});
static SPOF_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"single point|few facilit|depend|rare").expect("spof trigger"));

pub struct MedicalReasoner {
    corpus: Arc<CorpusStore>,
    anomaly_seed: u64,
}

impl MedicalReasoner {
    pub fn new(corpus: Arc<CorpusStore>, anomaly_seed: u64) -> Self {
        Self {
            corpus,
            anomaly_seed,
        }
    }

    pub fn run(&self, query: &str, plan: &Plan, step: usize) -> CoreResult<AgentResult> {
        let lower = query.to_lowercase();
        let result = if plan.intent == Intent::AnomalyDetection || ANOMALY_RE.is_match(&lower) {
            self.detect_anomalies(step)
        } else if RED_FLAG_RE.is_match(&lower) {
            self.detect_red_flags(step)
        } else if plan.intent == Intent::CoverageGap
            || plan.intent == Intent::MedicalDesert
            || GAP_RE.is_match(&lower)
        {
            self.coverage_gaps(plan.params.specialty, step)
        } else if plan.intent == Intent::SinglePointFailure || SPOF_RE.is_match(&lower) {
            self.single_point_of_failure(step)
        } else {
            // VALIDATION intent and anything unmatched: full constraint pass.
            self.validate_all(step)
        };
        debug!(action = result.data.name(), "reasoner done");
        Ok(result)
    }

    // -----------------------------------------------------------------
    // Constraint validation
    // -----------------------------------------------------------------

    /// Validate one facility's claims against the procedure catalog.
    pub fn validate_facility(&self, facility: &Facility) -> ValidationReport {
        let haystack = facility.combined_text();
        let mut issues = Vec::new();

        for requirement in &PROCEDURE_REQUIREMENTS {
            if !requirement
                .claimed_by
                .iter()
                .any(|s| facility.has_specialty(*s))
            {
                continue;
            }
            for tag in requirement.required_equipment {
                let mentioned = tag
                    .keywords()
                    .iter()
                    .any(|kw| fuzzy_mentions(&haystack, kw));
                if !mentioned {
                    issues.push(ConstraintIssue {
                        kind: ConstraintIssueKind::MissingEquipment,
                        severity: Severity::High,
                        procedure: requirement.procedure.to_string(),
                        requirement: tag.as_str().to_string(),
                        message: format!(
                            "claims {} but no mention of required {}",
                            requirement.procedure, tag
                        ),
                    });
                }
            }
            // Capacity 0 means unknown and is not penalized.
            if facility.capacity > 0 && facility.capacity < requirement.min_beds {
                issues.push(ConstraintIssue {
                    kind: ConstraintIssueKind::InsufficientCapacity,
                    severity: Severity::Medium,
                    procedure: requirement.procedure.to_string(),
                    requirement: format!("min {} beds", requirement.min_beds),
                    message: format!(
                        "claims {} with only {} beds (needs {}+)",
                        requirement.procedure, facility.capacity, requirement.min_beds
                    ),
                });
            }
        }

        let confidence = confidence_score(facility.specialties.len(), &issues);
        ValidationReport {
            facility: FacilityRef::from_facility(facility),
            valid: issues.is_empty(),
            confidence,
            issues,
        }
    }

    fn validate_all(&self, step: usize) -> AgentResult {
        let mut flagged: Vec<ValidationReport> = self
            .corpus
            .all()
            .map(|f| self.validate_facility(f))
            .filter(|r| !r.valid)
            .collect();
        flagged.sort_by(|a, b| a.confidence.total_cmp(&b.confidence));

        let high = flagged
            .iter()
            .flat_map(|r| &r.issues)
            .filter(|i| i.severity == Severity::High)
            .count();
        let medium = flagged
            .iter()
            .flat_map(|r| &r.issues)
            .filter(|i| i.severity == Severity::Medium)
            .count();

        flagged.truncate(REPORT_CAP);
        let citations = flagged
            .iter()
            .map(|r| Citation {
                facility_id: r.facility.id.clone(),
                field: "specialties".to_string(),
                value: format!("{} issues", r.issues.len()),
                confidence: r.confidence,
                step_index: step,
            })
            .collect();

        let data = ActionData::Validation {
            total_checked: self.corpus.len(),
            high_severity: high,
            medium_severity: medium,
            flagged,
        };
        AgentResult::new(AgentKind::Validator, data).with_citations(citations)
    }

    // -----------------------------------------------------------------
    // Two-stage anomaly detection
    // -----------------------------------------------------------------

    fn detect_anomalies(&self, step: usize) -> AgentResult {
        let facilities: Vec<&Arc<Facility>> = self.corpus.all().collect();
        let raw: Vec<Vec<f64>> = facilities
            .iter()
            .map(|f| f.feature_vector().to_vec())
            .collect();
        let scaled = standardize(&raw);

        // Stage 1: Isolation Forest.
        let forest = IsolationForest::fit(&scaled, stat_consts::FOREST_TREES, self.anomaly_seed);
        let (scores, stage1) = forest.outliers(&scaled, stat_consts::CONTAMINATION);
        let stage1_count = stage1.iter().filter(|&&b| b).count();

        // Stage 2: Mahalanobis gate. Degenerate inputs skip the stage
        // rather than failing the scan.
        let mahalanobis: Option<Vec<f64>> = if scaled.len() < 6 {
            warn!(n = scaled.len(), "too few facilities for mahalanobis stage");
            None
        } else {
            match mahalanobis_distances(&scaled) {
                Ok(d) => Some(d),
                Err(CoreError::DegenerateFeatures(reason)) => {
                    warn!(%reason, "mahalanobis stage skipped");
                    None
                }
                Err(_) => None,
            }
        };
        let skipped = mahalanobis.is_none();

        let mut flagged = Vec::new();
        for (i, facility) in facilities.iter().enumerate() {
            if !stage1[i] {
                continue;
            }
            let d2 = mahalanobis.as_ref().map(|d| d[i]);
            if let Some(d2) = d2 {
                if d2 <= stat_consts::CHI2_975_6DF {
                    continue;
                }
            }
            flagged.push(AnomalyReport {
                facility: FacilityRef::from_facility(facility),
                iso_score: scores[i],
                mahalanobis_sq: d2,
                features: FeatureCounts::from_facility(facility),
                reasons: anomaly_reasons(facility),
            });
        }
        flagged.sort_by(|a, b| b.iso_score.total_cmp(&a.iso_score));
        flagged.truncate(REPORT_CAP);

        let citations = flagged
            .iter()
            .map(|r| Citation {
                facility_id: r.facility.id.clone(),
                field: "features".to_string(),
                value: r.reasons.join("; "),
                confidence: 0.8,
                step_index: step,
            })
            .collect();

        let data = ActionData::AnomalyScan {
            total_checked: facilities.len(),
            stage1_outliers: stage1_count,
            mahalanobis_skipped: skipped,
            flagged,
        };
        AgentResult::new(AgentKind::Validator, data).with_citations(citations)
    }

    // -----------------------------------------------------------------
    // Red flags
    // -----------------------------------------------------------------

    fn detect_red_flags(&self, step: usize) -> AgentResult {
        let mut flagged = Vec::new();
        for facility in self.corpus.all() {
            let text = facility.combined_text();
            let mut flags = Vec::new();
            for (category, patterns) in RED_FLAG_PATTERNS.iter() {
                for pattern in patterns {
                    if let Some(m) = pattern.find(&text) {
                        flags.push(RedFlagHit {
                            category: category.clone(),
                            pattern: pattern.as_str().to_string(),
                            matched_text: m.as_str().to_string(),
                            adjacent_specialty: adjacent_specialty(&text, m.start(), m.end()),
                        });
                    }
                }
            }
            if flags.is_empty() {
                continue;
            }
            let categories: Vec<&str> = flags.iter().map(|f| f.category.as_str()).collect();
            flagged.push(RedFlagReport {
                facility: FacilityRef::from_facility(facility),
                recommendation: red_flag_recommendation(&categories).to_string(),
                flags,
            });
        }
        flagged.sort_by(|a, b| b.flags.len().cmp(&a.flags.len()));
        flagged.truncate(REPORT_CAP);

        let citations = flagged
            .iter()
            .map(|r| Citation {
                facility_id: r.facility.id.clone(),
                field: "capabilities".to_string(),
                value: r
                    .flags
                    .first()
                    .map(|f| f.matched_text.clone())
                    .unwrap_or_default(),
                confidence: 0.7,
                step_index: step,
            })
            .collect();

        let data = ActionData::RedFlags {
            total_scanned: self.corpus.len(),
            flagged,
        };
        AgentResult::new(AgentKind::Validator, data).with_citations(citations)
    }

    // -----------------------------------------------------------------
    // Coverage gaps & single point of failure
    // -----------------------------------------------------------------

    /// Regions with too few facilities for a specialty. Severity:
    /// critical(0), high(1), medium(two or more but below the national
    /// median).
    fn coverage_gaps(&self, specialty: Option<Specialty>, step: usize) -> AgentResult {
        let regions = self.corpus.regions();
        let mut counts: BTreeMap<String, (usize, usize)> = BTreeMap::new();
        for region in &regions {
            counts.insert(region.clone(), (0, 0));
        }
        for f in self.corpus.all() {
            let Some(region) = &f.region else { continue };
            let entry = counts.entry(region.clone()).or_insert((0, 0));
            entry.1 += 1;
            let matches = match specialty {
                Some(tag) => f.has_specialty(tag),
                None => true,
            };
            if matches {
                entry.0 += 1;
            }
        }

        let mut specialty_counts: Vec<f64> =
            counts.values().map(|(c, _)| *c as f64).collect();
        specialty_counts.sort_by(|a, b| a.total_cmp(b));
        let median = careatlas_core::stats::percentile(&specialty_counts, 0.5).unwrap_or(0.0);

        let gazetteer = Gazetteer::shared();
        let mut gaps: Vec<RegionGap> = counts
            .iter()
            .filter_map(|(region, &(count, total))| {
                let severity = match count {
                    0 => RiskLevel::Critical,
                    1 => RiskLevel::High,
                    c if (c as f64) < median => RiskLevel::Medium,
                    _ => return None,
                };
                let centroid = gazetteer.region_centroid(region);
                Some(RegionGap {
                    region: region.clone(),
                    specialty_count: count,
                    total_facilities: total,
                    severity,
                    latitude: centroid.map(|c| c.0),
                    longitude: centroid.map(|c| c.1),
                })
            })
            .collect();
        gaps.sort_by_key(|g| g.specialty_count);

        let citations = gaps
            .iter()
            .take(REPORT_CAP)
            .filter_map(|g| {
                // Cite one representative facility per gap region, if any.
                self.corpus
                    .by_region(&g.region)
                    .first()
                    .map(|f| Citation {
                        facility_id: f.id.clone(),
                        field: "region".to_string(),
                        value: g.region.clone(),
                        confidence: 1.0,
                        step_index: step,
                    })
            })
            .collect();

        let data = ActionData::CoverageGaps {
            specialty,
            regions_analyzed: regions.len(),
            gaps,
        };
        AgentResult::new(AgentKind::Validator, data).with_citations(citations)
    }

    fn single_point_of_failure(&self, step: usize) -> AgentResult {
        let (rare, results) = rare_specialty_entries(&self.corpus);
        let citations = results
            .iter()
            .flat_map(|e| {
                e.facilities.iter().map(|f| Citation {
                    facility_id: f.id.clone(),
                    field: "specialties".to_string(),
                    value: e.specialty.as_str().to_string(),
                    confidence: 1.0,
                    step_index: step,
                })
            })
            .collect();
        let data = ActionData::RareSpecialties {
            rare_specialties: rare,
            results,
        };
        AgentResult::new(AgentKind::Validator, data).with_citations(citations)
    }
}

/// Diminishing-penalty confidence model.
///
/// No issues: `0.65 + 0.03 * specialties`, capped at 0.95. With issues the
/// penalties shrink as they accumulate (first high -0.15, second -0.10,
/// then -0.05 each; first medium -0.08, then -0.04 each), floored at 0.10.
fn confidence_score(num_specialties: usize, issues: &[ConstraintIssue]) -> f32 {
    if issues.is_empty() {
        return (0.65 + 0.03 * num_specialties as f32).min(0.95);
    }
    let mut penalty = 0.0f32;
    let mut high_seen = 0;
    let mut medium_seen = 0;
    for issue in issues {
        match issue.severity {
            Severity::High => {
                penalty += match high_seen {
                    0 => 0.15,
                    1 => 0.10,
                    _ => 0.05,
                };
                high_seen += 1;
            }
            Severity::Medium => {
                penalty += if medium_seen == 0 { 0.08 } else { 0.04 };
                medium_seen += 1;
            }
        }
    }
    (1.0 - penalty).clamp(0.10, 0.95)
}

/// Rule-based explanations attached to statistically flagged facilities.
fn anomaly_reasons(facility: &Facility) -> Vec<String> {
    let mut reasons = Vec::new();
    let f = facility;
    if f.procedures.len() > 10 && f.equipment.len() < 2 {
        reasons.push("procedures > 10 && equipment < 2".to_string());
    }
    if f.capacity > 0 && f.doctors > 0 && f.capacity as f64 / f.doctors as f64 > 50.0 {
        reasons.push("bed-to-doctor ratio > 50".to_string());
    }
    if f.specialties.len() > 8 {
        reasons.push("specialties > 8".to_string());
    }
    if f.procedures.len() > 15 && f.capacity < 20 {
        reasons.push("procedures > 15 && capacity < 20".to_string());
    }
    if reasons.is_empty() {
        reasons.push("confirmed by isolation forest and mahalanobis distance".to_string());
    }
    reasons
}

/// Squared Mahalanobis distance of every row from the column mean.
fn mahalanobis_distances(rows: &[Vec<f64>]) -> CoreResult<Vec<f64>> {
    let cov = covariance(rows)?;
    let inv = invert(&cov)?;
    let mean = column_means(rows);
    Ok(rows
        .iter()
        .map(|row| mahalanobis_sq(row, &mean, &inv))
        .collect())
}

/// Fuzzy containment: exact substring, or a sliding token window whose
/// token-set similarity clears the threshold. Catches "CT" inside
/// "CT scanner suite" and reordered phrases.
fn fuzzy_mentions(haystack: &str, phrase: &str) -> bool {
    let phrase_lower = phrase.to_lowercase();
    if careatlas_core::extract::contains_word(haystack, &phrase_lower) {
        return true;
    }
    let hay_words: Vec<&str> = haystack.split_whitespace().collect();
    let window = phrase_lower.split_whitespace().count().max(3);
    if hay_words.is_empty() {
        return false;
    }
    for start in 0..hay_words.len().saturating_sub(window - 1).max(1) {
        let end = (start + window).min(hay_words.len());
        let slice = hay_words[start..end].join(" ");
        if token_set_ratio(&phrase_lower, &slice) >= FUZZY_THRESHOLD {
            return true;
        }
    }
    false
}

/// Specialty named fuzzily within [`FUZZY_WINDOW`] words around a match.
fn adjacent_specialty(text: &str, match_start: usize, match_end: usize) -> Option<Specialty> {
    let before: Vec<&str> = text[..match_start].split_whitespace().collect();
    let after: Vec<&str> = text[match_end..].split_whitespace().collect();
    let mut window_words: Vec<&str> = Vec::new();
    window_words.extend(before.iter().rev().take(FUZZY_WINDOW).rev());
    window_words.extend(after.iter().take(FUZZY_WINDOW));
    let window = window_words.join(" ");

    for tag in Specialty::ALL {
        for keyword in tag.keywords() {
            if token_set_ratio(keyword, &window) >= FUZZY_THRESHOLD {
                return Some(tag);
            }
        }
    }
    None
}

/// Token-set similarity in [0, 100]: compares sorted unique-token strings,
/// giving full credit when one side's tokens are a subset of the other's.
/// Tokens are singularized so "ventilators" meets "ventilator".
fn token_set_ratio(a: &str, b: &str) -> f64 {
    let tokens = |s: &str| -> Vec<String> {
        let mut t: Vec<String> = s
            .to_lowercase()
            .split(|c: char| !c.is_ascii_alphanumeric())
            .filter(|w| !w.is_empty())
            .map(|w| {
                if w.len() > 3 && w.ends_with('s') && !w.ends_with("ss") {
                    w[..w.len() - 1].to_string()
                } else {
                    w.to_string()
                }
            })
            .collect();
        t.sort();
        t.dedup();
        t
    };
    let ta = tokens(a);
    let tb = tokens(b);
    if ta.is_empty() || tb.is_empty() {
        return 0.0;
    }
    let inter: Vec<String> = ta.iter().filter(|t| tb.contains(t)).cloned().collect();
    let joined_inter = inter.join(" ");
    let joined_a = ta.join(" ");
    let joined_b = tb.join(" ");
    let direct = strsim::normalized_levenshtein(&joined_a, &joined_b);
    let via_inter = if joined_inter.is_empty() {
        0.0
    } else {
        strsim::normalized_levenshtein(&joined_inter, &joined_a)
            .max(strsim::normalized_levenshtein(&joined_inter, &joined_b))
    };
    direct.max(via_inter) * 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_set_ratio_handles_subsets_and_reordering() {
        assert!(token_set_ratio("ct", "ct scanner") >= 75.0 || fuzzy_mentions("ct scanner suite", "ct"));
        assert!(token_set_ratio("operating theater", "theater operating") > 99.0);
        assert!(token_set_ratio("dialysis machine", "garden furniture") < 50.0);
    }

    #[test]
    fn fuzzy_mentions_exact_and_windowed() {
        assert!(fuzzy_mentions("modern icu with ventilators", "icu"));
        assert!(fuzzy_mentions(
            "two theatre operating rooms available",
            "operating theatre"
        ));
        assert!(!fuzzy_mentions("general outpatient consulting", "mri"));
    }

    #[test]
    fn confidence_no_issues_scales_with_claims() {
        assert!((confidence_score(0, &[]) - 0.65).abs() < 1e-6);
        assert!((confidence_score(5, &[]) - 0.80).abs() < 1e-6);
        assert!((confidence_score(20, &[]) - 0.95).abs() < 1e-6);
    }

    #[test]
    fn confidence_penalties_diminish() {
        let issue = |severity| ConstraintIssue {
            kind: ConstraintIssueKind::MissingEquipment,
            severity,
            procedure: "p".into(),
            requirement: "r".into(),
            message: "m".into(),
        };
        // One high: 1.0 - 0.15 = 0.85
        let one_high = confidence_score(3, &[issue(Severity::High)]);
        assert!((one_high - 0.85).abs() < 1e-6);
        // Three high: 1.0 - (0.15 + 0.10 + 0.05) = 0.70
        let three_high =
            confidence_score(3, &vec![issue(Severity::High); 3]);
        assert!((three_high - 0.70).abs() < 1e-6);
        // Two medium: 1.0 - (0.08 + 0.04) = 0.88
        let two_med = confidence_score(3, &vec![issue(Severity::Medium); 2]);
        assert!((two_med - 0.88).abs() < 1e-6);
        // Floor.
        let many = confidence_score(3, &vec![issue(Severity::High); 30]);
        assert!((many - 0.10).abs() < 1e-6);
    }
}
