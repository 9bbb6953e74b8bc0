//! The searcher's self-correction edge.
//!
//! A filtered search that returns nothing usually means the location filter
//! was too restrictive. The retry strips a trailing location qualifier and
//! runs once more without filters. Stripping is conservative: only a
//! qualifier the gazetteer actually recognizes is removed, so "surgery in
//! the morning" survives untouched.

use careatlas_core::geocode::Gazetteer;

/// Strip a trailing ` in X` / ` near X` qualifier when `X` geocodes.
/// Returns `None` when there is nothing safe to strip.
pub fn strip_location_qualifier(query: &str) -> Option<String> {
    for marker in [" in ", " near "] {
        if let Some(pos) = query.to_lowercase().rfind(marker) {
            let place = query[pos + marker.len()..].trim().trim_end_matches('?');
            if !place.is_empty() && Gazetteer::shared().geocode(place).is_some() {
                let stripped = query[..pos].trim();
                if !stripped.is_empty() {
                    return Some(stripped.to_string());
                }
            }
        }
    }
    None
}
