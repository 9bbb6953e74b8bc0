//! The facility record and its closed vocabulary (specialties, equipment
//! tags, facility types).
//!
//! Specialty tags form a closed set of 15; equipment recognition runs over a
//! closed set of 13 keyword tags while the underlying free-form strings are
//! preserved verbatim on the record.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::constants::ghana;

/// Opaque, corpus-unique facility identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FacilityId(String);

impl FacilityId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FacilityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for FacilityId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Canonical medical specialty tags. Closed set of 15.
///
/// Declared in extraction-priority order: when a query mentions keywords of
/// several specialties the first declared match wins, so the general tag
/// sits last and never shadows a specific one ("cataract surgery" is
/// ophthalmology, not general surgery).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Specialty {
    Cardiology,
    Neurosurgery,
    Oncology,
    Orthopedics,
    Ophthalmology,
    Obstetrics,
    Pediatrics,
    Dialysis,
    Emergency,
    Dermatology,
    Psychiatry,
    Dentistry,
    Ent,
    Urology,
    GeneralSurgery,
}

impl Specialty {
    /// All 15 tags, in extraction-priority order.
    pub const ALL: [Specialty; 15] = [
        Specialty::Cardiology,
        Specialty::Neurosurgery,
        Specialty::Oncology,
        Specialty::Orthopedics,
        Specialty::Ophthalmology,
        Specialty::Obstetrics,
        Specialty::Pediatrics,
        Specialty::Dialysis,
        Specialty::Emergency,
        Specialty::Dermatology,
        Specialty::Psychiatry,
        Specialty::Dentistry,
        Specialty::Ent,
        Specialty::Urology,
        Specialty::GeneralSurgery,
    ];

    /// Canonical snake_case wire form.
    pub fn as_str(&self) -> &'static str {
        match self {
            Specialty::Cardiology => "cardiology",
            Specialty::Neurosurgery => "neurosurgery",
            Specialty::Oncology => "oncology",
            Specialty::Orthopedics => "orthopedics",
            Specialty::Ophthalmology => "ophthalmology",
            Specialty::Obstetrics => "obstetrics",
            Specialty::Pediatrics => "pediatrics",
            Specialty::Dialysis => "dialysis",
            Specialty::Emergency => "emergency",
            Specialty::Dermatology => "dermatology",
            Specialty::Psychiatry => "psychiatry",
            Specialty::Dentistry => "dentistry",
            Specialty::Ent => "ent",
            Specialty::Urology => "urology",
            Specialty::GeneralSurgery => "general_surgery",
        }
    }

    /// Parse the canonical wire form.
    pub fn parse(s: &str) -> Option<Specialty> {
        Specialty::ALL.iter().copied().find(|t| t.as_str() == s)
    }

    /// Keywords that signal this specialty in free text. Matched with word
    /// boundaries by the extractors.
    pub fn keywords(&self) -> &'static [&'static str] {
        match self {
            Specialty::Cardiology => &["cardiology", "cardiac", "heart", "cardiovascular"],
            Specialty::Neurosurgery => &["neurosurgery", "neurosurgical", "brain surgery"],
            Specialty::Oncology => &["oncology", "cancer", "chemotherapy", "tumor", "tumour"],
            Specialty::Orthopedics => &["orthopedic", "orthopaedic", "fracture", "bone", "joint"],
            Specialty::Ophthalmology => &["ophthalmology", "ophthalmic", "eye", "cataract", "retina"],
            Specialty::Obstetrics => &["obstetric", "gynecology", "maternal", "maternity", "antenatal"],
            Specialty::Pediatrics => &["pediatric", "paediatric", "children", "child", "neonatal"],
            Specialty::Dialysis => &["dialysis", "nephrology", "renal", "kidney"],
            Specialty::Emergency => &["emergency", "trauma", "accident", "casualty"],
            Specialty::Dermatology => &["dermatology", "dermatological", "skin"],
            Specialty::Psychiatry => &["psychiatry", "psychiatric", "mental health"],
            Specialty::Dentistry => &["dental", "dentist", "dentistry", "tooth", "teeth"],
            Specialty::Ent => &["ent", "otolaryngology", "ear nose", "audiology"],
            Specialty::Urology => &["urology", "urological", "prostate", "urinary"],
            Specialty::GeneralSurgery => &["general surgery", "surgical", "surgery", "operation"],
        }
    }
}

impl fmt::Display for Specialty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Recognized equipment keywords. Closed set of 13.
///
/// The underlying equipment strings on a facility stay free-form; these tags
/// only drive recognition (constraint checks, capability scoring, equipment
/// distribution planning).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum EquipmentTag {
    Ct,
    Mri,
    Ultrasound,
    XRay,
    Icu,
    OperatingTheater,
    DialysisMachine,
    Ventilator,
    Laboratory,
    CardiacCatheterization,
    SurgicalMicroscope,
    Ophthalmoscope,
    RadiationTherapy,
}

impl EquipmentTag {
    pub const ALL: [EquipmentTag; 13] = [
        EquipmentTag::Ct,
        EquipmentTag::Mri,
        EquipmentTag::Ultrasound,
        EquipmentTag::XRay,
        EquipmentTag::Icu,
        EquipmentTag::OperatingTheater,
        EquipmentTag::DialysisMachine,
        EquipmentTag::Ventilator,
        EquipmentTag::Laboratory,
        EquipmentTag::CardiacCatheterization,
        EquipmentTag::SurgicalMicroscope,
        EquipmentTag::Ophthalmoscope,
        EquipmentTag::RadiationTherapy,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EquipmentTag::Ct => "CT",
            EquipmentTag::Mri => "MRI",
            EquipmentTag::Ultrasound => "ultrasound",
            EquipmentTag::XRay => "X-ray",
            EquipmentTag::Icu => "ICU",
            EquipmentTag::OperatingTheater => "operating_theater",
            EquipmentTag::DialysisMachine => "dialysis_machine",
            EquipmentTag::Ventilator => "ventilator",
            EquipmentTag::Laboratory => "laboratory",
            EquipmentTag::CardiacCatheterization => "cardiac_catheterization",
            EquipmentTag::SurgicalMicroscope => "surgical_microscope",
            EquipmentTag::Ophthalmoscope => "ophthalmoscope",
            EquipmentTag::RadiationTherapy => "radiation_therapy",
        }
    }

    /// Spellings that count as a mention of this tag in free text.
    pub fn keywords(&self) -> &'static [&'static str] {
        match self {
            EquipmentTag::Ct => &["ct", "ct scan", "ct scanner"],
            EquipmentTag::Mri => &["mri"],
            EquipmentTag::Ultrasound => &["ultrasound", "sonograph"],
            EquipmentTag::XRay => &["x-ray", "xray", "x ray"],
            EquipmentTag::Icu => &["icu", "intensive care"],
            EquipmentTag::OperatingTheater => {
                &["operating theater", "operating theatre", "operating room"]
            }
            EquipmentTag::DialysisMachine => &["dialysis machine", "dialysis"],
            EquipmentTag::Ventilator => &["ventilator"],
            EquipmentTag::Laboratory => &["laboratory", "lab"],
            EquipmentTag::CardiacCatheterization => {
                &["cardiac catheterization", "catheterization", "cath lab"]
            }
            EquipmentTag::SurgicalMicroscope => {
                &["surgical microscope", "operating microscope"]
            }
            EquipmentTag::Ophthalmoscope => &["ophthalmoscope"],
            EquipmentTag::RadiationTherapy => &["radiation therapy", "radiotherapy"],
        }
    }
}

impl fmt::Display for EquipmentTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Facility type classification.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum FacilityType {
    Hospital,
    Clinic,
    HealthCenter,
    Pharmacy,
    Ngo,
    Laboratory,
    Dentist,
    Other,
}

impl FacilityType {
    /// Lenient parse covering the spellings seen in snapshots ("farmacy" is
    /// a recurring source typo).
    pub fn parse(s: &str) -> FacilityType {
        match s.trim().to_ascii_lowercase().as_str() {
            "hospital" => FacilityType::Hospital,
            "clinic" => FacilityType::Clinic,
            "health_center" | "health center" | "health centre" => FacilityType::HealthCenter,
            "pharmacy" | "farmacy" => FacilityType::Pharmacy,
            "ngo" => FacilityType::Ngo,
            "laboratory" | "lab" => FacilityType::Laboratory,
            "dentist" | "dental" => FacilityType::Dentist,
            _ => FacilityType::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FacilityType::Hospital => "hospital",
            FacilityType::Clinic => "clinic",
            FacilityType::HealthCenter => "health_center",
            FacilityType::Pharmacy => "pharmacy",
            FacilityType::Ngo => "ngo",
            FacilityType::Laboratory => "laboratory",
            FacilityType::Dentist => "dentist",
            FacilityType::Other => "other",
        }
    }
}

impl fmt::Display for FacilityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One healthcare facility or NGO from the corpus snapshot.
///
/// Immutable after load. A capacity or doctor count of zero means unknown.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Facility {
    pub id: FacilityId,
    pub name: String,
    pub city: Option<String>,
    pub region: Option<String>,
    pub facility_type: FacilityType,
    /// Free-form organization tag ("facility", "ngo", ...).
    pub organization_type: Option<String>,
    pub specialties: BTreeSet<Specialty>,
    /// Free-form procedure strings, preserved verbatim.
    pub procedures: Vec<String>,
    /// Free-form equipment strings, preserved verbatim.
    pub equipment: Vec<String>,
    /// Free-form capability strings, preserved verbatim.
    pub capabilities: Vec<String>,
    /// Bed count; 0 = unknown.
    pub capacity: u32,
    /// Doctor count; 0 = unknown.
    pub doctors: u32,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

impl Facility {
    /// Coordinates, present only when both components exist and fall inside
    /// Ghana's bounding box. Facilities without valid coordinates are
    /// excluded from every spatial operation.
    pub fn coords(&self) -> Option<(f64, f64)> {
        let (lat, lng) = (self.latitude?, self.longitude?);
        if in_ghana_bbox(lat, lng) {
            Some((lat, lng))
        } else {
            None
        }
    }

    pub fn has_specialty(&self, specialty: Specialty) -> bool {
        self.specialties.contains(&specialty)
    }

    /// Lowercased concatenation of every free-text field, the haystack for
    /// equipment-tag and red-flag scanning.
    pub fn combined_text(&self) -> String {
        let mut text = String::new();
        for part in self
            .procedures
            .iter()
            .chain(self.equipment.iter())
            .chain(self.capabilities.iter())
        {
            text.push_str(part);
            text.push(' ');
        }
        text.to_lowercase()
    }

    /// Whether the facility's free text mentions the given equipment tag.
    pub fn has_equipment_tag(&self, tag: EquipmentTag) -> bool {
        let haystack = self.combined_text();
        tag.keywords()
            .iter()
            .any(|kw| crate::extract::contains_word(&haystack, kw))
    }

    /// Feature vector for anomaly detection:
    /// (|specialties|, |procedures|, |equipment|, |capabilities|, capacity, doctors).
    pub fn feature_vector(&self) -> [f64; 6] {
        [
            self.specialties.len() as f64,
            self.procedures.len() as f64,
            self.equipment.len() as f64,
            self.capabilities.len() as f64,
            self.capacity as f64,
            self.doctors as f64,
        ]
    }

    /// Index-time text for the `full_document` vector.
    pub fn document_text(&self) -> String {
        let mut parts = vec![format!("Name: {}", self.name)];
        let org = self.organization_type.as_deref().unwrap_or("facility");
        parts.push(format!("Type: {} ({})", org, self.facility_type));
        let location: Vec<&str> = [self.city.as_deref(), self.region.as_deref()]
            .into_iter()
            .flatten()
            .collect();
        if !location.is_empty() {
            parts.push(format!("Location: {}", location.join(", ")));
        }
        if !self.specialties.is_empty() {
            let tags: Vec<&str> = self.specialties.iter().map(|s| s.as_str()).collect();
            parts.push(format!("Medical Specialties: {}", tags.join(", ")));
        }
        if !self.procedures.is_empty() {
            parts.push(format!("Procedures: {}", self.procedures.join("; ")));
        }
        if !self.equipment.is_empty() {
            parts.push(format!("Equipment: {}", self.equipment.join("; ")));
        }
        if !self.capabilities.is_empty() {
            parts.push(format!("Capabilities: {}", self.capabilities.join("; ")));
        }
        if self.doctors > 0 {
            parts.push(format!("Number of Doctors: {}", self.doctors));
        }
        if self.capacity > 0 {
            parts.push(format!("Bed Capacity: {}", self.capacity));
        }
        parts.join("\n")
    }

    /// Index-time text for the `clinical_detail` vector.
    pub fn clinical_text(&self) -> String {
        let mut parts = Vec::new();
        if !self.procedures.is_empty() {
            parts.push(format!("Procedures: {}", self.procedures.join("; ")));
        }
        if !self.equipment.is_empty() {
            parts.push(format!("Equipment: {}", self.equipment.join("; ")));
        }
        if !self.capabilities.is_empty() {
            parts.push(format!("Capabilities: {}", self.capabilities.join("; ")));
        }
        if parts.is_empty() {
            format!("{} medical facility", self.name)
        } else {
            parts.join(" | ")
        }
    }

    /// Index-time text for the `specialties_context` vector.
    pub fn specialty_text(&self) -> String {
        let org = self.organization_type.as_deref().unwrap_or("facility");
        let specs = if self.specialties.is_empty() {
            "general".to_string()
        } else {
            self.specialties
                .iter()
                .map(|s| s.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        };
        format!(
            "{} is a {} ({}) with specialties: {}",
            self.name, org, self.facility_type, specs
        )
    }
}

/// Whether a coordinate pair falls inside Ghana's bounding box.
pub fn in_ghana_bbox(lat: f64, lng: f64) -> bool {
    lat >= ghana::LAT_RANGE.0
        && lat <= ghana::LAT_RANGE.1
        && lng >= ghana::LNG_RANGE.0
        && lng <= ghana::LNG_RANGE.1
}
