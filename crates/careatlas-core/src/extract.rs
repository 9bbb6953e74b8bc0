//! Query-text extractors shared by every agent.
//!
//! All keyword matching is word-boundary aware: "wa" must not match inside
//! "nkawkaw" and "ct" must not match inside "doctor". Region extraction
//! prefers the longest match so "Upper East" beats "Eastern".

use once_cell::sync::Lazy;
use regex::Regex;

use crate::types::{EquipmentTag, FacilityType, Specialty};

/// Ghana's 16 administrative regions, longest names first so multi-word
/// regions win over their substrings.
pub const REGIONS: [&str; 16] = [
    "Greater Accra",
    "Western North",
    "Upper East",
    "Upper West",
    "North East",
    "Bono East",
    "Ashanti",
    "Western",
    "Central",
    "Eastern",
    "Northern",
    "Volta",
    "Bono",
    "Ahafo",
    "Savannah",
    "Oti",
];

/// Major cities recognized in query text, longest names first ("Cape Coast"
/// must match before any single-word city could).
pub const CITIES: [&str; 21] = [
    "Cape Coast",
    "Bolgatanga",
    "Koforidua",
    "Takoradi",
    "Techiman",
    "Navrongo",
    "Sunyani",
    "Nkawkaw",
    "Winneba",
    "Sekondi",
    "Kumasi",
    "Tamale",
    "Obuasi",
    "Tarkwa",
    "Accra",
    "Hohoe",
    "Yendi",
    "Bawku",
    "Tema",
    "Wa",
    "Ho",
];

/// Negation triggers. A tag mentioned within six tokens after one of these
/// is treated as negated ("without orthopedic services").
const NEGATION_TRIGGERS: [&str; 9] = [
    "not", "without", "no", "lacking", "absence", "absent", "missing", "don't", "doesn't",
];

/// Window (in tokens) a negation trigger reaches forward.
const NEGATION_WINDOW: usize = 6;

static RADIUS_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\d+(?:\.\d+)?)\s*(?:km|kilometer|kilometre)").expect("radius pattern")
});

static CITY_PAIR_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:between|from)\s+([A-Za-z][A-Za-z ]*?)\s+(?:and|to)\s+([A-Za-z][A-Za-z ]*?)(?:\s*\?|\s*$|,)")
        .expect("city pair pattern")
});

/// Whether `needle` occurs in `haystack` bounded by non-alphanumeric
/// characters on both sides. Both inputs are expected lowercased; the
/// needle may contain spaces.
pub fn contains_word(haystack: &str, needle: &str) -> bool {
    if needle.is_empty() {
        return false;
    }
    let hay = haystack.as_bytes();
    let mut from = 0;
    while let Some(pos) = haystack[from..].find(needle) {
        let start = from + pos;
        let end = start + needle.len();
        let left_ok = start == 0 || !hay[start - 1].is_ascii_alphanumeric();
        let right_ok = end == hay.len() || !hay[end].is_ascii_alphanumeric();
        if left_ok && right_ok {
            return true;
        }
        from = start + 1;
    }
    false
}

/// First specialty whose keywords appear in the text, scanning tags in
/// priority order (specific specialties before general surgery).
pub fn extract_specialty(text: &str) -> Option<Specialty> {
    let lower = text.to_lowercase();
    Specialty::ALL
        .into_iter()
        .find(|tag| tag.keywords().iter().any(|kw| contains_word(&lower, kw)))
}

/// Region or city mentioned in the text, longest match first.
pub fn extract_region(text: &str) -> Option<String> {
    let lower = text.to_lowercase();
    for region in REGIONS {
        if contains_word(&lower, &region.to_lowercase()) {
            return Some(region.to_string());
        }
    }
    for city in CITIES {
        if contains_word(&lower, &city.to_lowercase()) {
            return Some(city.to_string());
        }
    }
    None
}

/// Facility type mentioned in the text, if any.
pub fn extract_facility_type(text: &str) -> Option<FacilityType> {
    let lower = text.to_lowercase();
    for (kw, ftype) in [
        ("hospital", FacilityType::Hospital),
        ("clinic", FacilityType::Clinic),
        ("health center", FacilityType::HealthCenter),
        ("health centre", FacilityType::HealthCenter),
        ("pharmacy", FacilityType::Pharmacy),
        ("pharmacies", FacilityType::Pharmacy),
        ("ngo", FacilityType::Ngo),
        ("laboratory", FacilityType::Laboratory),
        ("dentist", FacilityType::Dentist),
    ] {
        // Allow a plural 's' by also checking the bare keyword stem.
        if contains_word(&lower, kw) || contains_word(&lower, &format!("{kw}s")) {
            return Some(ftype);
        }
    }
    None
}

/// Equipment tag mentioned in the text, if any.
pub fn extract_equipment(text: &str) -> Option<EquipmentTag> {
    let lower = text.to_lowercase();
    EquipmentTag::ALL
        .into_iter()
        .find(|tag| tag.keywords().iter().any(|kw| contains_word(&lower, kw)))
}

/// Whether `tag_keyword` appears within [`NEGATION_WINDOW`] tokens after a
/// negation trigger. `tag_keyword` may be multi-word; the check runs on its
/// first token (sufficient for the keyword lists used here).
pub fn is_negated(text: &str, tag_keyword: &str) -> bool {
    let lower = text.to_lowercase();
    let tokens: Vec<&str> = lower
        .split(|c: char| !c.is_ascii_alphanumeric() && c != '\'')
        .filter(|t| !t.is_empty())
        .collect();
    let first = match tag_keyword.split_whitespace().next() {
        Some(t) => t.to_lowercase(),
        None => return false,
    };
    for (i, token) in tokens.iter().enumerate() {
        if !NEGATION_TRIGGERS.contains(token) {
            continue;
        }
        let window_end = (i + 1 + NEGATION_WINDOW).min(tokens.len());
        if tokens[i + 1..window_end]
            .iter()
            .any(|t| t.starts_with(first.as_str()))
        {
            return true;
        }
    }
    false
}

/// Radius in kilometers mentioned in the text ("within 30 km").
pub fn extract_radius_km(text: &str) -> Option<f64> {
    RADIUS_RE
        .captures(&text.to_lowercase())
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

/// A "between A and B" / "from A to B" city pair, trimmed but unvalidated;
/// callers geocode both names and fail explicitly on a miss.
pub fn extract_city_pair(text: &str) -> Option<(String, String)> {
    let lower = text.to_lowercase();
    let caps = CITY_PAIR_RE.captures(&lower)?;
    let a = caps.get(1)?.as_str().trim().to_string();
    let b = caps.get(2)?.as_str().trim().to_string();
    if a.is_empty() || b.is_empty() {
        None
    } else {
        Some((a, b))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn word_boundary_rejects_substrings() {
        assert!(contains_word("hospitals in wa today", "wa"));
        assert!(!contains_word("hospitals in nkawkaw", "wa"));
        assert!(!contains_word("the doctor is in", "ct"));
        assert!(contains_word("ct scanner available", "ct"));
    }

    #[test]
    fn specialty_extraction_prefers_specific_over_general() {
        assert_eq!(
            extract_specialty("clinics doing cataract surgery"),
            Some(Specialty::Ophthalmology)
        );
        assert_eq!(
            extract_specialty("general surgery wards"),
            Some(Specialty::GeneralSurgery)
        );
        assert_eq!(extract_specialty("midwife availability"), None);
    }

    #[test]
    fn region_extraction_longest_match_first() {
        assert_eq!(
            extract_region("deserts in Upper East please"),
            Some("Upper East".to_string())
        );
        assert_eq!(
            extract_region("hospitals near cape coast"),
            Some("Cape Coast".to_string())
        );
        // "Ho" must not fire inside "hospital".
        assert_eq!(extract_region("hospital count"), None);
    }

    #[test]
    fn region_extraction_is_idempotent() {
        let q = "clinics in Ashanti region";
        let first = extract_region(q).unwrap();
        assert_eq!(extract_region(&first), Some(first.clone()));
    }

    #[test]
    fn negation_window_is_six_tokens() {
        assert!(is_negated(
            "facilities in Ashanti without orthopedic services",
            "orthopedic"
        ));
        assert!(is_negated("clinics that do not offer dialysis", "dialysis"));
        // Trigger too far back: seven tokens between "no" and the tag.
        assert!(!is_negated(
            "no one knows whether any of those big facilities offer dialysis",
            "dialysis"
        ));
        assert!(!is_negated("hospitals with cardiology", "cardiology"));
    }

    #[test]
    fn radius_parsing() {
        assert_eq!(extract_radius_km("within 30 km of Tamale"), Some(30.0));
        assert_eq!(extract_radius_km("within 12.5km"), Some(12.5));
        assert_eq!(extract_radius_km("near Tamale"), None);
    }

    #[test]
    fn city_pair_parsing() {
        assert_eq!(
            extract_city_pair("distance between Accra and Kumasi"),
            Some(("accra".into(), "kumasi".into()))
        );
        assert_eq!(
            extract_city_pair("how far from Cape Coast to Tamale?"),
            Some(("cape coast".into(), "tamale".into()))
        );
        assert_eq!(extract_city_pair("how far is it"), None);
    }
}
