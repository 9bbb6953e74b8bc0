//! Data analyst: structured queries over the corpus.
//!
//! Counts, aggregations, distributions, IQR ratio anomalies, and the
//! single-point-of-failure ranking. Negation-aware: "without orthopedics"
//! inverts the specialty mask.

use std::collections::BTreeMap;
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use careatlas_core::config::constants::stats as stat_consts;
use careatlas_core::corpus::CorpusStore;
use careatlas_core::error::CoreResult;
use careatlas_core::stats::percentile;
use careatlas_core::types::{
    ActionData, AgentKind, AgentResult, Citation, Facility, FacilityRef, FacilityType,
    FilterSummary, Intent, IqrStats, Plan, RatioAnomaly, RiskLevel, Specialty, SpofEntry,
};

/// Facilities echoed back per structured result; the count itself is always
/// computed over the full match set.
const RESULT_FACILITY_CAP: usize = 50;

static RATIO_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"bed.to.doctor|ratio|anomal").expect("ratio trigger"));
static SPOF_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"single point|few facilit|rare|depend").expect("spof trigger"));
static REGION_AGG_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"which region|per region|by region|most (hospitals|clinics|facilities)")
        .expect("region aggregation trigger")
});
static DISTRIBUTION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"distribution|breakdown").expect("distribution trigger"));
static COUNT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"how many|count|number of").expect("count trigger"));

pub struct DataAnalyst {
    corpus: Arc<CorpusStore>,
}

impl DataAnalyst {
    pub fn new(corpus: Arc<CorpusStore>) -> Self {
        Self { corpus }
    }

    pub fn run(&self, query: &str, plan: &Plan, step: usize) -> CoreResult<AgentResult> {
        let lower = query.to_lowercase();
        let params = &plan.params;

        let result = if plan.intent == Intent::AnomalyDetection || RATIO_RE.is_match(&lower) {
            self.ratio_anomalies(step)
        } else if plan.intent == Intent::SinglePointFailure || SPOF_RE.is_match(&lower) {
            self.single_point_of_failure(step)
        } else if REGION_AGG_RE.is_match(&lower) {
            self.region_aggregation(params.facility_type)
        } else if DISTRIBUTION_RE.is_match(&lower) {
            if lower.contains("specialt") {
                self.specialty_distribution()
            } else {
                self.region_aggregation(params.facility_type)
            }
        } else if plan.intent == Intent::Count
            || COUNT_RE.is_match(&lower)
            || params.specialty.is_some()
            || params.region.is_some()
            || params.facility_type.is_some()
        {
            self.count_facilities(params.specialty, params.negated, params.region.as_deref(), params.facility_type, step)
        } else {
            self.overview()
        };
        debug!(action = result.data.name(), count = result.data.count(), "analyst done");
        Ok(result)
    }

    /// COUNT with structured filters; a negated specialty selects the
    /// facilities *lacking* it.
    fn count_facilities(
        &self,
        specialty: Option<Specialty>,
        negated: bool,
        region: Option<&str>,
        facility_type: Option<FacilityType>,
        step: usize,
    ) -> AgentResult {
        let matched = self.corpus.filter(|f| {
            if let Some(tag) = specialty {
                let has = f.has_specialty(tag);
                if has == negated {
                    return false;
                }
            }
            if let Some(region) = region {
                if !facility_in_place(f, region) {
                    return false;
                }
            }
            if let Some(ftype) = facility_type {
                if f.facility_type != ftype {
                    return false;
                }
            }
            true
        });

        let citations = matched
            .iter()
            .take(RESULT_FACILITY_CAP)
            .map(|f| Citation {
                facility_id: f.id.clone(),
                field: if specialty.is_some() { "specialties" } else { "region" }.to_string(),
                value: specialty
                    .map(|s| s.as_str().to_string())
                    .or_else(|| region.map(str::to_string))
                    .unwrap_or_else(|| f.facility_type.to_string()),
                confidence: 1.0,
                step_index: step,
            })
            .collect();

        let data = ActionData::Count {
            count: matched.len(),
            filters: FilterSummary {
                specialty,
                region: region.map(str::to_string),
                facility_type,
                organization_type: None,
                negated,
            },
            facilities: matched
                .iter()
                .take(RESULT_FACILITY_CAP)
                .map(|f| FacilityRef::from_facility(f))
                .collect(),
        };
        AgentResult::new(AgentKind::Analyst, data).with_citations(citations)
    }

    fn region_aggregation(&self, facility_type: Option<FacilityType>) -> AgentResult {
        let mut counts: BTreeMap<String, usize> = BTreeMap::new();
        for f in self.corpus.all() {
            if let Some(ftype) = facility_type {
                if f.facility_type != ftype {
                    continue;
                }
            }
            let region = f.region.clone().unwrap_or_else(|| "Unknown".to_string());
            *counts.entry(region).or_default() += 1;
        }
        let top = counts.iter().max_by_key(|(_, &c)| c);
        let data = ActionData::RegionAggregation {
            top_region: top.map(|(r, _)| r.clone()),
            top_count: top.map(|(_, &c)| c).unwrap_or(0),
            aggregation: counts,
        };
        AgentResult::new(AgentKind::Analyst, data)
    }

    fn specialty_distribution(&self) -> AgentResult {
        let mut counts: BTreeMap<String, usize> = BTreeMap::new();
        for f in self.corpus.all() {
            for tag in &f.specialties {
                *counts.entry(tag.as_str().to_string()).or_default() += 1;
            }
        }
        let data = ActionData::SpecialtyDistribution {
            total_unique_specialties: counts.len(),
            distribution: counts,
        };
        AgentResult::new(AgentKind::Analyst, data)
    }

    /// IQR outliers on the bed-to-doctor ratio. The fence adapts to the
    /// data but never drops below the floor, which keeps sparse snapshots
    /// from flagging noise.
    fn ratio_anomalies(&self, step: usize) -> AgentResult {
        let rated: Vec<(&Arc<Facility>, f64)> = self
            .corpus
            .all()
            .filter(|f| f.doctors > 0 && f.capacity > 0)
            .map(|f| (f, f.capacity as f64 / f.doctors as f64))
            .collect();
        let ratios: Vec<f64> = rated.iter().map(|(_, r)| *r).collect();

        let q25 = percentile(&ratios, 0.25).unwrap_or(0.0);
        let q75 = percentile(&ratios, 0.75).unwrap_or(0.0);
        let iqr = q75 - q25;
        let threshold = (q75 + 1.5 * iqr).max(stat_consts::RATIO_FLOOR);

        let mut anomalies: Vec<RatioAnomaly> = rated
            .iter()
            .filter(|(_, ratio)| *ratio > threshold)
            .map(|(f, ratio)| {
                let mut reasons = vec![format!(
                    "bed-to-doctor ratio {ratio:.1} exceeds IQR fence {threshold:.1}"
                )];
                if *ratio > 50.0 {
                    reasons.push(format!("extreme bed-to-doctor ratio: {ratio:.0}"));
                }
                if f.doctors == 1 && f.capacity > 100 {
                    reasons.push(format!("a single doctor for {} beds", f.capacity));
                }
                RatioAnomaly {
                    facility: FacilityRef::from_facility(f),
                    capacity: f.capacity,
                    doctors: f.doctors,
                    ratio: *ratio,
                    reasons,
                }
            })
            .collect();
        anomalies.sort_by(|a, b| b.ratio.total_cmp(&a.ratio));

        let citations = anomalies
            .iter()
            .map(|a| Citation {
                facility_id: a.facility.id.clone(),
                field: "capacity/doctors".to_string(),
                value: format!("{:.1}", a.ratio),
                confidence: 0.9,
                step_index: step,
            })
            .collect();

        let data = ActionData::RatioAnomalies {
            threshold,
            iqr: IqrStats { q25, q75, iqr },
            anomalies,
        };
        AgentResult::new(AgentKind::Analyst, data).with_citations(citations)
    }

    /// Specialties carried by three or fewer facilities nationwide.
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
        AgentResult::new(AgentKind::Analyst, data).with_citations(citations)
    }

    /// Dataset overview, the fallback when nothing structured matched.
    fn overview(&self) -> AgentResult {
        let mut by_type: BTreeMap<String, usize> = BTreeMap::new();
        let mut ngos = 0usize;
        for f in self.corpus.all() {
            *by_type.entry(f.facility_type.to_string()).or_default() += 1;
            if f.organization_type.as_deref() == Some("ngo") || f.facility_type == FacilityType::Ngo
            {
                ngos += 1;
            }
        }
        let data = ActionData::Overview {
            total_facilities: self.corpus.len() - ngos,
            total_ngos: ngos,
            by_type,
        };
        AgentResult::new(AgentKind::Analyst, data)
    }
}

/// Specialties carried by three or fewer facilities, with the national risk
/// ranking. Shared with the medical reasoner, which reports the same
/// analysis at the validation stage.
pub(crate) fn rare_specialty_entries(
    corpus: &CorpusStore,
) -> (BTreeMap<String, usize>, Vec<SpofEntry>) {
    let mut by_specialty: BTreeMap<Specialty, Vec<&Arc<Facility>>> = BTreeMap::new();
    for f in corpus.all() {
        for tag in &f.specialties {
            by_specialty.entry(*tag).or_default().push(f);
        }
    }

    let mut rare = BTreeMap::new();
    let mut results = Vec::new();
    for (tag, facilities) in &by_specialty {
        let count = facilities.len();
        if count > 3 {
            continue;
        }
        rare.insert(tag.as_str().to_string(), count);
        let mut regions: Vec<String> = facilities
            .iter()
            .filter_map(|f| f.region.clone())
            .collect();
        regions.sort();
        regions.dedup();
        results.push(SpofEntry {
            specialty: *tag,
            facility_count: count,
            facilities: facilities
                .iter()
                .map(|f| FacilityRef::from_facility(f))
                .collect(),
            regions_covered: regions,
            risk_level: match count {
                0 | 1 => RiskLevel::Critical,
                2 => RiskLevel::High,
                _ => RiskLevel::Medium,
            },
        });
    }
    results.sort_by_key(|e| e.facility_count);
    (rare, results)
}

/// Region filter that also accepts a city match, so "Kumasi" works as a
/// location even though it is stored in the city field.
fn facility_in_place(f: &Facility, place: &str) -> bool {
    let wanted = place.to_lowercase();
    let region_hit = f
        .region
        .as_ref()
        .map(|r| {
            let r = r.to_lowercase();
            r.contains(&wanted) || wanted.contains(&r)
        })
        .unwrap_or(false);
    let city_hit = f
        .city
        .as_ref()
        .map(|c| c.to_lowercase().contains(&wanted))
        .unwrap_or(false);
    region_hit || city_hit
}
