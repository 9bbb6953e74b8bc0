//! Medical reasoner: constraint validation, the two-stage anomaly pipeline,
//! red flags, and coverage gaps.

use std::sync::Arc;

use careatlas_agents::classifier::extract_params;
use careatlas_agents::MedicalReasoner;
use careatlas_core::config::constants::stats as stat_consts;
use careatlas_core::corpus::CorpusStore;
use careatlas_core::types::{
    ActionData, AgentKind, ConstraintIssueKind, Flow, Intent, Plan, RiskLevel, Severity,
    Specialty,
};
use careatlas_testkit::{fixture_corpus, fixture_corpus_with_population, FacilityBuilder};

fn reasoner_for(corpus: Vec<careatlas_core::types::Facility>) -> MedicalReasoner {
    MedicalReasoner::new(Arc::new(CorpusStore::from_snapshot(corpus).unwrap()), 42)
}

fn plan_for(query: &str, intent: Intent) -> Plan {
    Plan {
        intent,
        confidence: 0.8,
        agents: vec![AgentKind::Validator],
        flow: Flow::Sequential,
        params: extract_params(query),
    }
}

#[test]
fn validation_flags_unsupported_claims() {
    let query = "Validate facility claims";
    let result = reasoner_for(fixture_corpus())
        .run(query, &plan_for(query, Intent::Validation), 0)
        .unwrap();
    match result.data {
        ActionData::Validation {
            total_checked,
            flagged,
            high_severity,
            ..
        } => {
            assert_eq!(total_checked, 13);
            assert!(high_severity > 0);
            // The wonder clinic claims neurosurgery, cardiology, oncology
            // and more with no equipment text at all.
            let wonder = flagged
                .iter()
                .find(|r| r.facility.id.as_str() == "hohoe-wonder")
                .expect("wonder clinic must be flagged");
            assert!(!wonder.valid);
            assert!(wonder
                .issues
                .iter()
                .any(|i| i.kind == ConstraintIssueKind::MissingEquipment
                    && i.severity == Severity::High));
            assert!(wonder
                .issues
                .iter()
                .any(|i| i.kind == ConstraintIssueKind::InsufficientCapacity));
            // Flagged list is sorted least-confident first.
            for pair in flagged.windows(2) {
                assert!(pair[0].confidence <= pair[1].confidence);
            }
            assert!(wonder.confidence >= 0.10);
        }
        other => panic!("unexpected action {}", other.name()),
    }
}

#[test]
fn validation_accepts_well_equipped_claims() {
    let reasoner = reasoner_for(fixture_corpus());
    let corpus = CorpusStore::from_snapshot(fixture_corpus()).unwrap();
    let eye = corpus
        .get(&careatlas_core::types::FacilityId::new("cape-eye"))
        .unwrap();
    // Ophthalmology with a surgical microscope and ophthalmoscope on file.
    let report = reasoner.validate_facility(eye);
    assert!(report.valid, "issues: {:?}", report.issues);
    assert!(report.confidence >= 0.65);
}

#[test]
fn two_stage_anomaly_flags_the_planted_outlier() {
    let query = "Find suspicious facility capability claims";
    let result = reasoner_for(fixture_corpus_with_population(30))
        .run(query, &plan_for(query, Intent::AnomalyDetection), 0)
        .unwrap();
    match result.data {
        ActionData::AnomalyScan {
            total_checked,
            stage1_outliers,
            mahalanobis_skipped,
            flagged,
        } => {
            assert_eq!(total_checked, 43);
            assert!(!mahalanobis_skipped);
            // AND logic: everything reported passed both stages.
            assert!(flagged.len() <= stage1_outliers);
            for report in &flagged {
                let d2 = report.mahalanobis_sq.expect("stage 2 ran");
                assert!(d2 > stat_consts::CHI2_975_6DF, "{} d2={d2}", report.facility.name);
            }
            let wonder = flagged
                .iter()
                .find(|r| r.facility.id.as_str() == "hohoe-wonder")
                .expect("planted outlier must be flagged");
            assert!(wonder
                .reasons
                .iter()
                .any(|r| r == "procedures > 15 && capacity < 20"));
            assert!(wonder.reasons.iter().any(|r| r == "specialties > 8"));
        }
        other => panic!("unexpected action {}", other.name()),
    }
}

#[test]
fn mahalanobis_is_skipped_below_six_facilities() {
    let small: Vec<_> = fixture_corpus().into_iter().take(5).collect();
    let query = "detect anomalies";
    let result = reasoner_for(small)
        .run(query, &plan_for(query, Intent::AnomalyDetection), 0)
        .unwrap();
    match result.data {
        ActionData::AnomalyScan {
            mahalanobis_skipped,
            flagged,
            stage1_outliers,
            ..
        } => {
            assert!(mahalanobis_skipped);
            // Stage 1 results pass through unfiltered.
            assert_eq!(flagged.len().min(20), flagged.len());
            assert!(flagged.len() <= stage1_outliers.max(1));
            for report in &flagged {
                assert!(report.mahalanobis_sq.is_none());
            }
        }
        other => panic!("unexpected action {}", other.name()),
    }
}

#[test]
fn red_flags_catch_outreach_language() {
    let query = "Which facilities show red flag language?";
    let result = reasoner_for(fixture_corpus())
        .run(query, &plan_for(query, Intent::Validation), 0)
        .unwrap();
    match result.data {
        ActionData::RedFlags {
            total_scanned,
            flagged,
        } => {
            assert_eq!(total_scanned, 13);
            let outreach = flagged
                .iter()
                .find(|r| r.facility.id.as_str() == "bolga-outreach")
                .expect("the NGO fixture carries red-flag phrasing");
            let categories: Vec<&str> =
                outreach.flags.iter().map(|f| f.category.as_str()).collect();
            assert!(categories.contains(&"visiting_specialist"));
            assert!(categories.contains(&"temporary_service"));
            assert!(categories.contains(&"vague_claim"));
            assert!(outreach.recommendation.contains("visiting specialists"));
            // "visiting specialist program for cardiology" puts cardiology
            // inside the adjacency window.
            assert!(outreach
                .flags
                .iter()
                .any(|f| f.adjacent_specialty == Some(Specialty::Cardiology)));
        }
        other => panic!("unexpected action {}", other.name()),
    }
}

#[test]
fn coverage_gaps_grade_by_count() {
    let query = "Where are the coverage gaps for dialysis?";
    let result = reasoner_for(fixture_corpus())
        .run(query, &plan_for(query, Intent::CoverageGap), 0)
        .unwrap();
    match result.data {
        ActionData::CoverageGaps {
            specialty,
            regions_analyzed,
            gaps,
        } => {
            assert_eq!(specialty, Some(Specialty::Dialysis));
            assert_eq!(regions_analyzed, 7);
            // Dialysis exists only in Greater Accra (and the Volta wonder
            // clinic); every other region is a zero-count critical gap.
            let ashanti = gaps.iter().find(|g| g.region == "Ashanti").unwrap();
            assert_eq!(ashanti.specialty_count, 0);
            assert_eq!(ashanti.severity, RiskLevel::Critical);
            assert!(ashanti.latitude.is_some());
            // Sorted emptiest-first.
            for pair in gaps.windows(2) {
                assert!(pair[0].specialty_count <= pair[1].specialty_count);
            }
        }
        other => panic!("unexpected action {}", other.name()),
    }
}
