//! Medical domain knowledge: the advanced-procedure constraint catalog,
//! the keyword lists driving search-weight boosts, and the red-flag
//! pattern sets (loaded from a version-controlled data file).

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;

use careatlas_core::types::{EquipmentTag, Specialty};

/// Requirements a facility must plausibly meet before its claim to an
/// advanced procedure is believed.
#[derive(Debug, Clone)]
pub struct ProcedureRequirement {
    /// Human-readable procedure name.
    pub procedure: &'static str,
    /// Specialty tags that imply a claim to this procedure.
    pub claimed_by: &'static [Specialty],
    /// Equipment that must be mentioned somewhere in the facility's text.
    pub required_equipment: &'static [EquipmentTag],
    /// Minimum plausible bed count.
    pub min_beds: u32,
}

/// The closed constraint catalog: six advanced procedures.
pub const PROCEDURE_REQUIREMENTS: [ProcedureRequirement; 6] = [
    ProcedureRequirement {
        procedure: "neurosurgery",
        claimed_by: &[Specialty::Neurosurgery],
        required_equipment: &[
            EquipmentTag::Ct,
            EquipmentTag::Mri,
            EquipmentTag::Icu,
            EquipmentTag::OperatingTheater,
        ],
        min_beds: 50,
    },
    ProcedureRequirement {
        procedure: "cardiac surgery",
        claimed_by: &[Specialty::Cardiology],
        required_equipment: &[
            EquipmentTag::CardiacCatheterization,
            EquipmentTag::Icu,
            EquipmentTag::Ventilator,
        ],
        min_beds: 100,
    },
    ProcedureRequirement {
        procedure: "cataract surgery",
        claimed_by: &[Specialty::Ophthalmology],
        required_equipment: &[EquipmentTag::Ophthalmoscope, EquipmentTag::SurgicalMicroscope],
        min_beds: 5,
    },
    ProcedureRequirement {
        procedure: "dialysis",
        claimed_by: &[Specialty::Dialysis],
        required_equipment: &[EquipmentTag::DialysisMachine],
        min_beds: 10,
    },
    ProcedureRequirement {
        procedure: "orthopedic surgery",
        claimed_by: &[Specialty::Orthopedics],
        required_equipment: &[EquipmentTag::XRay, EquipmentTag::OperatingTheater],
        min_beds: 30,
    },
    ProcedureRequirement {
        procedure: "oncology",
        claimed_by: &[Specialty::Oncology],
        required_equipment: &[
            EquipmentTag::Ct,
            EquipmentTag::RadiationTherapy,
            EquipmentTag::Laboratory,
        ],
        min_beds: 50,
    },
];

/// Keywords that mark a query as clinical (procedures/equipment); each hit
/// boosts the `clinical_detail` vector's fusion weight.
pub const CLINICAL_KEYWORDS: [&str; 20] = [
    "procedure",
    "equipment",
    "surgery",
    "operation",
    "device",
    "machine",
    "scanner",
    "theater",
    "operating",
    "diagnostic",
    "ct scan",
    "mri",
    "x-ray",
    "ultrasound",
    "laboratory",
    "icu",
    "nicu",
    "ventilator",
    "oxygen",
    "catheterization",
];

/// Keywords that mark a query as specialty-seeking; each hit boosts the
/// `specialties_context` vector's fusion weight.
pub const SPECIALTY_KEYWORDS: [&str; 18] = [
    "specialty",
    "specialties",
    "specialist",
    "cardiology",
    "ophthalmology",
    "orthopedic",
    "pediatric",
    "obstetric",
    "gynecology",
    "neurosurgery",
    "oncology",
    "dermatology",
    "psychiatry",
    "dentistry",
    "dental",
    "urology",
    "dialysis",
    "emergency",
];

static RED_FLAGS_JSON: &str = include_str!("../data/red_flags.json");

/// Compiled red-flag pattern sets keyed by category.
pub static RED_FLAG_PATTERNS: Lazy<Vec<(String, Vec<Regex>)>> = Lazy::new(|| {
    let raw: HashMap<String, Vec<String>> =
        serde_json::from_str(RED_FLAGS_JSON).expect("bundled red_flags.json is valid");
    let mut sets: Vec<(String, Vec<Regex>)> = raw
        .into_iter()
        .map(|(category, patterns)| {
            let compiled = patterns
                .iter()
                .map(|p| Regex::new(p).expect("red-flag pattern compiles"))
                .collect();
            (category, compiled)
        })
        .collect();
    sets.sort_by(|a, b| a.0.cmp(&b.0));
    sets
});

/// Reviewer guidance attached to a red-flag report, by dominant category.
pub fn red_flag_recommendation(categories: &[&str]) -> &'static str {
    if categories.contains(&"visiting_specialist") {
        "Likely relies on visiting specialists - verify permanent staffing"
    } else if categories.contains(&"temporary_service") {
        "Appears to offer temporary or camp-based services, not permanent capability"
    } else if categories.contains(&"vague_claim") {
        "Contains vague capability claims - verify specific procedures"
    } else {
        "Review flagged language patterns"
    }
}
