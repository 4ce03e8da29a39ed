//! Location-hint resolution to internal region ids.
//!
//! Upstream offers carry location as a postal code and/or a free-text
//! label ("75 - Paris", "Grand Lyon", "34 - MONTPELLIER"). Resolution
//! derives a department code from the hint and asks a [`RegionLookup`]
//! collaborator for the region id, memoizing every answer for the
//! lifetime of the connector instance.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::traits::RegionLookup;

/// Known city names (accent-folded, lowercase) and their department code.
/// Used as the last resolution rule, by substring match in the label.
const CITY_DEPARTMENTS: &[(&str, &str)] = &[
    ("paris", "75"),
    ("marseille", "13"),
    ("lyon", "69"),
    ("toulouse", "31"),
    ("nice", "06"),
    ("nantes", "44"),
    ("montpellier", "34"),
    ("strasbourg", "67"),
    ("bordeaux", "33"),
    ("lille", "59"),
    ("rennes", "35"),
    ("reims", "51"),
    ("toulon", "83"),
    ("saint-etienne", "42"),
    ("le havre", "76"),
    ("grenoble", "38"),
    ("dijon", "21"),
    ("angers", "49"),
    ("nimes", "30"),
    ("clermont-ferrand", "63"),
    ("aix-en-provence", "13"),
    ("brest", "29"),
    ("tours", "37"),
    ("limoges", "87"),
    ("amiens", "80"),
    ("annecy", "74"),
    ("metz", "57"),
    ("nancy", "54"),
    ("rouen", "76"),
    ("orleans", "45"),
    ("caen", "14"),
    ("pau", "64"),
    ("perpignan", "66"),
    ("besancon", "25"),
    ("mulhouse", "68"),
    ("fort-de-france", "972"),
    ("pointe-a-pitre", "971"),
    ("saint-denis de la reunion", "974"),
    ("cayenne", "973"),
];

/// Map a department code to its INSEE region code.
///
/// Covers metropolitan departments (including Corsica, reachable both as
/// `2A`/`2B` and as the postal-derived `20`) and the overseas departments.
fn region_of_department(code: &str) -> Option<i32> {
    let region = match code {
        "01" | "03" | "07" | "15" | "26" | "38" | "42" | "43" | "63" | "69" | "73" | "74" => 84,
        "02" | "59" | "60" | "62" | "80" => 32,
        "04" | "05" | "06" | "13" | "83" | "84" => 93,
        "08" | "10" | "51" | "52" | "54" | "55" | "57" | "67" | "68" | "88" => 44,
        "09" | "11" | "12" | "30" | "31" | "32" | "34" | "46" | "48" | "65" | "66" | "81" | "82" => {
            76
        }
        "14" | "27" | "50" | "61" | "76" => 28,
        "16" | "17" | "19" | "23" | "24" | "33" | "40" | "47" | "64" | "79" | "86" | "87" => 75,
        "18" | "28" | "36" | "37" | "41" | "45" => 24,
        "21" | "25" | "39" | "58" | "70" | "71" | "89" | "90" => 27,
        "22" | "29" | "35" | "56" => 53,
        "2A" | "2B" | "20" => 94,
        "44" | "49" | "53" | "72" | "85" => 52,
        "75" | "77" | "78" | "91" | "92" | "93" | "94" | "95" => 11,
        "971" => 1,
        "972" => 2,
        "973" => 3,
        "974" => 4,
        "976" => 6,
        _ => return None,
    };
    Some(region)
}

/// Built-in [`RegionLookup`] backed by the static department table.
///
/// Stands in when no external lookup collaborator (e.g. a database
/// repository) is injected.
#[derive(Debug, Default, Clone, Copy)]
pub struct StaticRegionLookup;

impl RegionLookup for StaticRegionLookup {
    async fn find_by_code(&self, code: &str) -> Option<i32> {
        region_of_department(code)
    }
}

/// Resolves location hints to region ids, memoized per connector instance.
///
/// Rule order: postal-code-derived department, leading department code in
/// the label, then known-city substring match. The first rule whose
/// lookup yields a region wins; no match is `None`, never an error.
#[derive(Debug, Clone)]
pub struct RegionResolver<L: RegionLookup> {
    lookup: L,
    /// Department code → resolved region (or `None` for known misses).
    /// Never evicted within a run.
    cache: Arc<Mutex<HashMap<String, Option<i32>>>>,
}

impl<L: RegionLookup> RegionResolver<L> {
    pub fn new(lookup: L) -> Self {
        Self {
            lookup,
            cache: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub async fn resolve(&self, postal_code: Option<&str>, label: Option<&str>) -> Option<i32> {
        let candidates = [
            postal_code.and_then(department_from_postal),
            label.and_then(department_from_label),
            label.and_then(department_from_city),
        ];

        for code in candidates.into_iter().flatten() {
            if let Some(region) = self.lookup_cached(&code).await {
                return Some(region);
            }
        }
        None
    }

    async fn lookup_cached(&self, code: &str) -> Option<i32> {
        {
            let cache = self.lock_cache();
            if let Some(cached) = cache.get(code) {
                return *cached;
            }
        }

        let resolved = self.lookup.find_by_code(code).await;
        self.lock_cache().insert(code.to_string(), resolved);
        resolved
    }

    fn lock_cache(&self) -> std::sync::MutexGuard<'_, HashMap<String, Option<i32>>> {
        self.cache
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Department code from a postal code: two leading digits, or three for
/// the overseas `97x`/`98x` ranges.
fn department_from_postal(postal: &str) -> Option<String> {
    let postal = postal.trim();
    if postal.len() < 2 || !postal.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if (postal.starts_with("97") || postal.starts_with("98")) && postal.len() >= 3 {
        Some(postal[..3].to_string())
    } else {
        Some(postal[..2].to_string())
    }
}

/// Leading department code in a free-text label ("75 - Paris", "2A - Ajaccio").
fn department_from_label(label: &str) -> Option<String> {
    let token: String = label
        .trim()
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric())
        .collect();

    let upper = token.to_ascii_uppercase();
    if upper == "2A" || upper == "2B" {
        return Some(upper);
    }
    if (token.len() == 2 || token.len() == 3) && token.bytes().all(|b| b.is_ascii_digit()) {
        return Some(token);
    }
    None
}

/// Known-city substring match in a free-text label.
fn department_from_city(label: &str) -> Option<String> {
    let folded = fold_accents(label);
    CITY_DEPARTMENTS
        .iter()
        .find(|(city, _)| folded.contains(city))
        .map(|(_, dept)| (*dept).to_string())
}

/// Lowercase and strip the accents that occur in French place names.
fn fold_accents(text: &str) -> String {
    text.to_lowercase()
        .chars()
        .map(|c| match c {
            'à' | 'â' | 'ä' => 'a',
            'é' | 'è' | 'ê' | 'ë' => 'e',
            'î' | 'ï' => 'i',
            'ô' | 'ö' => 'o',
            'ù' | 'û' | 'ü' => 'u',
            'ç' => 'c',
            other => other,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::MockRegionLookup;

    #[test]
    fn test_department_from_postal() {
        assert_eq!(department_from_postal("75001"), Some("75".into()));
        assert_eq!(department_from_postal("13008"), Some("13".into()));
        // Overseas departments use three digits.
        assert_eq!(department_from_postal("97200"), Some("972".into()));
        assert_eq!(department_from_postal("97400"), Some("974".into()));
        // Corsica postal codes start with 20.
        assert_eq!(department_from_postal("20090"), Some("20".into()));
        assert_eq!(department_from_postal(""), None);
        assert_eq!(department_from_postal("ABCDE"), None);
    }

    #[test]
    fn test_department_from_label() {
        assert_eq!(department_from_label("75 - Paris"), Some("75".into()));
        assert_eq!(department_from_label("2A - Ajaccio"), Some("2A".into()));
        assert_eq!(department_from_label("974 - Saint-Denis"), Some("974".into()));
        assert_eq!(department_from_label("Paris"), None);
        assert_eq!(department_from_label("7 sur 7"), None);
    }

    #[test]
    fn test_department_from_city() {
        assert_eq!(department_from_city("Grand Lyon"), Some("69".into()));
        assert_eq!(department_from_city("NÎMES"), Some("30".into()));
        assert_eq!(department_from_city("Bassin d'emploi inconnu"), None);
    }

    #[test]
    fn test_static_lookup_covers_metropole_and_overseas() {
        assert_eq!(region_of_department("75"), Some(11));
        assert_eq!(region_of_department("69"), Some(84));
        assert_eq!(region_of_department("2A"), Some(94));
        assert_eq!(region_of_department("20"), Some(94));
        assert_eq!(region_of_department("972"), Some(2));
        assert_eq!(region_of_department("999"), None);
    }

    #[tokio::test]
    async fn test_resolve_prefers_postal_code() {
        let resolver = RegionResolver::new(StaticRegionLookup);
        // Postal says Marseille even though the label names Paris.
        let region = resolver.resolve(Some("13008"), Some("Paris")).await;
        assert_eq!(region, Some(93));
    }

    #[tokio::test]
    async fn test_resolve_falls_back_to_label_then_city() {
        let resolver = RegionResolver::new(StaticRegionLookup);
        assert_eq!(resolver.resolve(None, Some("75 - Paris")).await, Some(11));
        assert_eq!(
            resolver.resolve(None, Some("Métropole de Toulouse")).await,
            Some(76)
        );
        assert_eq!(resolver.resolve(None, Some("Teleworking")).await, None);
        assert_eq!(resolver.resolve(None, None).await, None);
    }

    #[tokio::test]
    async fn test_resolve_memoizes_lookups() {
        let lookup = MockRegionLookup::with_mapping(&[("75", 11)]);
        let resolver = RegionResolver::new(lookup.clone());

        for _ in 0..5 {
            assert_eq!(resolver.resolve(Some("75001"), None).await, Some(11));
        }

        assert_eq!(lookup.calls(), vec!["75".to_string()]);
    }

    #[tokio::test]
    async fn test_resolve_memoizes_misses_too() {
        let lookup = MockRegionLookup::with_mapping(&[]);
        let resolver = RegionResolver::new(lookup.clone());

        for _ in 0..3 {
            assert_eq!(resolver.resolve(Some("75001"), None).await, None);
        }

        assert_eq!(lookup.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_unresolved_overseas_collectivity_is_none() {
        let resolver = RegionResolver::new(StaticRegionLookup);
        // Saint-Pierre-et-Miquelon has no region in the table.
        assert_eq!(resolver.resolve(Some("97500"), None).await, None);
    }
}
