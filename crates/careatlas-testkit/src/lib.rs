//! Shared test fixtures: a facility builder, a small but fully featured
//! synthetic corpus, and a table-driven embedder for classifier tests.
//!
//! All engine and agent tests run against stubs; nothing here touches the
//! network or model files.

use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;

use careatlas_core::config::constants::EMBEDDING_DIM;
use careatlas_core::error::CoreResult;
use careatlas_core::traits::TextEmbedder;
use careatlas_core::types::{Facility, FacilityId, FacilityType, Specialty};

/// Fluent builder for test facilities.
pub struct FacilityBuilder {
    facility: Facility,
}

impl FacilityBuilder {
    pub fn new(id: &str, name: &str) -> Self {
        Self {
            facility: Facility {
                id: FacilityId::new(id),
                name: name.to_string(),
                city: None,
                region: None,
                facility_type: FacilityType::Clinic,
                organization_type: Some("facility".to_string()),
                specialties: BTreeSet::new(),
                procedures: Vec::new(),
                equipment: Vec::new(),
                capabilities: Vec::new(),
                capacity: 0,
                doctors: 0,
                latitude: None,
                longitude: None,
            },
        }
    }

    pub fn city(mut self, city: &str) -> Self {
        self.facility.city = Some(city.to_string());
        self
    }

    pub fn region(mut self, region: &str) -> Self {
        self.facility.region = Some(region.to_string());
        self
    }

    pub fn facility_type(mut self, ftype: FacilityType) -> Self {
        self.facility.facility_type = ftype;
        self
    }

    pub fn organization(mut self, org: &str) -> Self {
        self.facility.organization_type = Some(org.to_string());
        self
    }

    pub fn specialties(mut self, tags: &[Specialty]) -> Self {
        self.facility.specialties = tags.iter().copied().collect();
        self
    }

    pub fn procedures(mut self, items: &[&str]) -> Self {
        self.facility.procedures = items.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn equipment(mut self, items: &[&str]) -> Self {
        self.facility.equipment = items.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn capabilities(mut self, items: &[&str]) -> Self {
        self.facility.capabilities = items.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn beds_and_doctors(mut self, capacity: u32, doctors: u32) -> Self {
        self.facility.capacity = capacity;
        self.facility.doctors = doctors;
        self
    }

    pub fn at(mut self, lat: f64, lng: f64) -> Self {
        self.facility.latitude = Some(lat);
        self.facility.longitude = Some(lng);
        self
    }

    pub fn build(self) -> Facility {
        self.facility
    }
}

/// A 13-facility corpus covering every scenario the end-to-end suite
/// exercises: cardiology hospitals for counting, an Ashanti negation case,
/// a Tamale cluster for radius queries, a cataract clinic, a planted
/// anomaly, and an NGO with red-flag language.
pub fn fixture_corpus() -> Vec<Facility> {
    use Specialty::*;
    vec![
        FacilityBuilder::new("korle-bu", "Korle Bu Teaching Hospital")
            .city("Accra")
            .region("Greater Accra")
            .facility_type(FacilityType::Hospital)
            .specialties(&[Cardiology, GeneralSurgery, Emergency, Neurosurgery])
            .procedures(&["cardiac catheterization", "open heart surgery", "craniotomy"])
            .equipment(&["CT scanner", "MRI unit", "ICU beds", "operating theater", "ventilators"])
            .capabilities(&["24/7 emergency care", "cardiac catheterization lab"])
            .beds_and_doctors(2000, 250)
            .at(5.6037, -0.1870)
            .build(),
        FacilityBuilder::new("komfo-anokye", "Komfo Anokye Teaching Hospital")
            .city("Kumasi")
            .region("Ashanti")
            .facility_type(FacilityType::Hospital)
            .specialties(&[Cardiology, Orthopedics, Pediatrics])
            .procedures(&["fracture repair", "joint replacement"])
            .equipment(&["X-ray machine", "operating theater", "ICU"])
            .beds_and_doctors(1200, 150)
            .at(6.6885, -1.6244)
            .build(),
        FacilityBuilder::new("tamale-teaching", "Tamale Teaching Hospital")
            .city("Tamale")
            .region("Northern")
            .facility_type(FacilityType::Hospital)
            .specialties(&[Cardiology, Obstetrics])
            .procedures(&["caesarean section"])
            .equipment(&["ultrasound", "operating theatre"])
            .beds_and_doctors(800, 90)
            .at(9.4034, -0.8393)
            .build(),
        FacilityBuilder::new("tamale-west", "Tamale West Clinic")
            .city("Tamale")
            .region("Northern")
            .specialties(&[Pediatrics])
            .beds_and_doctors(30, 4)
            .at(9.4500, -0.8500)
            .build(),
        FacilityBuilder::new("savelugu", "Savelugu Health Centre")
            .city("Savelugu")
            .region("Northern")
            .facility_type(FacilityType::HealthCenter)
            .specialties(&[Obstetrics])
            .beds_and_doctors(15, 2)
            .at(9.6200, -0.8300)
            .build(),
        FacilityBuilder::new("obuasi-ortho", "Obuasi Orthopedic Clinic")
            .city("Obuasi")
            .region("Ashanti")
            .specialties(&[Orthopedics])
            .equipment(&["X-ray machine", "casting materials"])
            .beds_and_doctors(40, 6)
            .at(6.2060, -1.6630)
            .build(),
        FacilityBuilder::new("bekwai-general", "Bekwai Municipal Clinic")
            .city("Bekwai")
            .region("Ashanti")
            .specialties(&[GeneralSurgery])
            .beds_and_doctors(25, 3)
            .at(6.4581, -1.5740)
            .build(),
        FacilityBuilder::new("cape-eye", "Cape Coast Eye Clinic")
            .city("Cape Coast")
            .region("Central")
            .specialties(&[Ophthalmology])
            .procedures(&["cataract surgery"])
            .equipment(&["surgical microscope", "ophthalmoscope"])
            .beds_and_doctors(12, 2)
            .at(5.1036, -1.2466)
            .build(),
        FacilityBuilder::new("accra-renal", "Accra Renal Centre")
            .city("Accra")
            .region("Greater Accra")
            .specialties(&[Specialty::Dialysis])
            .equipment(&["dialysis machines", "reverse osmosis plant"])
            .beds_and_doctors(18, 3)
            .at(5.6200, -0.1700)
            .build(),
        FacilityBuilder::new("wa-regional", "Wa Regional Hospital")
            .city("Wa")
            .region("Upper West")
            .facility_type(FacilityType::Hospital)
            .specialties(&[Emergency, Obstetrics])
            .beds_and_doctors(300, 25)
            .at(10.0601, -2.5099)
            .build(),
        FacilityBuilder::new("hohoe-wonder", "Hohoe Wonder Clinic")
            .city("Hohoe")
            .region("Volta")
            .specialties(&[
                Cardiology,
                Neurosurgery,
                Oncology,
                Orthopedics,
                Ophthalmology,
                Obstetrics,
                Pediatrics,
                Specialty::Dialysis,
                GeneralSurgery,
                Emergency,
            ])
            .procedures(&[
                "appendectomy", "craniotomy", "chemotherapy", "radiotherapy",
                "cataract surgery", "joint replacement", "dialysis", "bypass surgery",
                "transplant", "endoscopy", "colonoscopy", "biopsy", "amputation",
                "skin graft", "hernia repair", "tonsillectomy", "angioplasty",
                "valve replacement", "laminectomy", "hysterectomy",
            ])
            .beds_and_doctors(5, 1)
            .at(7.1500, 0.4730)
            .build(),
        FacilityBuilder::new("ho-psych", "Ho Psychiatric Hospital")
            .city("Ho")
            .region("Volta")
            .facility_type(FacilityType::Hospital)
            .specialties(&[Psychiatry])
            .beds_and_doctors(120, 10)
            .at(6.6000, 0.4680)
            .build(),
        FacilityBuilder::new("bolga-outreach", "Bolgatanga Health Outreach")
            .city("Bolgatanga")
            .region("Upper East")
            .facility_type(FacilityType::Ngo)
            .organization("ngo")
            .specialties(&[Obstetrics])
            .capabilities(&[
                "mobile clinic covering surrounding districts",
                "visiting specialist program for cardiology",
                "world-class comprehensive care",
            ])
            .beds_and_doctors(0, 0)
            .at(10.7863, -0.8522)
            .build(),
    ]
}

/// The fixture corpus plus `extra` unremarkable clinics spread across the
/// country. Anomaly-detection tests need this: with only a handful of
/// facilities the squared Mahalanobis distance is bounded by (n-1)^2/n and
/// can never clear the chi-square gate, so the planted outlier only
/// separates once a realistic population surrounds it.
pub fn fixture_corpus_with_population(extra: usize) -> Vec<Facility> {
    let mut corpus = fixture_corpus();
    let rotation = [
        Specialty::Obstetrics,
        Specialty::Pediatrics,
        Specialty::GeneralSurgery,
        Specialty::Dentistry,
    ];
    for i in 0..extra {
        let lat = 5.0 + (i as f64 * 0.17) % 6.0;
        let lng = -2.8 + (i as f64 * 0.23) % 3.6;
        let mut builder = FacilityBuilder::new(
            &format!("clinic-{i:03}"),
            &format!("District Clinic {i:03}"),
        )
        .region(["Northern", "Ashanti", "Volta", "Central", "Eastern"][i % 5])
        .specialties(&rotation[..1 + i % 2])
        .beds_and_doctors(10 + (i as u32 % 7) * 4, 2 + (i as u32 % 3))
        .at(lat, lng);
        if i % 3 == 0 {
            builder = builder.equipment(&["ultrasound", "delivery kit"]);
        }
        if i % 4 == 0 {
            builder = builder.procedures(&["antenatal care", "minor suturing"]);
        }
        corpus.push(builder.build());
    }
    corpus
}

/// Table-driven embedder: exact texts map to fixed vectors, everything else
/// falls back to a deterministic hash direction. Lets tests place queries
/// and exemplars precisely in embedding space.
pub struct FixedEmbedder {
    table: HashMap<String, Vec<f32>>,
}

impl FixedEmbedder {
    pub fn new(table: HashMap<String, Vec<f32>>) -> Self {
        Self { table }
    }

    /// Unit vector along one axis; distinct axes are orthogonal.
    pub fn axis(i: usize) -> Vec<f32> {
        let mut v = vec![0.0; EMBEDDING_DIM];
        v[i % EMBEDDING_DIM] = 1.0;
        v
    }

    /// Unit vector between two axes: cosine 0.7071 against either axis.
    pub fn diagonal(i: usize, j: usize) -> Vec<f32> {
        let mut v = vec![0.0; EMBEDDING_DIM];
        let w = std::f32::consts::FRAC_1_SQRT_2;
        v[i % EMBEDDING_DIM] = w;
        v[j % EMBEDDING_DIM] = w;
        v
    }

    fn fallback(text: &str) -> Vec<f32> {
        let mut state: u64 = 0xcbf29ce484222325;
        for b in text.bytes() {
            state ^= b as u64;
            state = state.wrapping_mul(0x100000001b3);
        }
        let mut v = Vec::with_capacity(EMBEDDING_DIM);
        for _ in 0..EMBEDDING_DIM {
            state = state.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            v.push((((state >> 11) as f64 / (1u64 << 53) as f64) as f32) * 2.0 - 1.0);
        }
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        for x in &mut v {
            *x /= norm;
        }
        v
    }
}

#[async_trait]
impl TextEmbedder for FixedEmbedder {
    async fn embed(&self, text: &str) -> CoreResult<Vec<f32>> {
        Ok(self
            .table
            .get(text)
            .cloned()
            .unwrap_or_else(|| Self::fallback(text)))
    }

    fn model_id(&self) -> &str {
        "fixed-table-v1"
    }
}
