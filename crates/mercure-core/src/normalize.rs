//! Mapping of raw upstream records into [`JobOffer`]s.
//!
//! Upstream free-text fields are heterogeneous: salary comes as French
//! prose ("Annuel de 35 000,00 Euros sur 12 mois"), dates are sometimes
//! missing or in the future, and most fields can be absent entirely.
//! Normalization resolves all of that to deterministic values; only two
//! conditions reject a record outright.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde_json::Value;

use crate::error::AppError;
use crate::offer::JobOffer;
use crate::region::RegionResolver;
use crate::traits::RegionLookup;

const FALLBACK_TITLE: &str = "Intitulé non précisé";
const FALLBACK_COMPANY: &str = "Entreprise non précisée";
const FALLBACK_DESCRIPTION: &str = "Description non disponible";
const FALLBACK_LOCATION: &str = "France";

/// Keywords detected as technologies in title + description.
/// Plain words only; `c++`, `c#` and `.net` are handled separately since
/// word boundaries cannot express them.
const TECH_KEYWORDS: &[&str] = &[
    "javascript",
    "typescript",
    "postgresql",
    "elasticsearch",
    "kubernetes",
    "mongodb",
    "rabbitmq",
    "terraform",
    "symfony",
    "laravel",
    "angular",
    "svelte",
    "jquery",
    "django",
    "spring",
    "hibernate",
    "flutter",
    "android",
    "jenkins",
    "gitlab",
    "ansible",
    "graphql",
    "webpack",
    "postgres",
    "mariadb",
    "golang",
    "mysql",
    "oracle",
    "redis",
    "kafka",
    "spark",
    "hadoop",
    "docker",
    "python",
    "kotlin",
    "scala",
    "swift",
    "react",
    "flask",
    "rails",
    "linux",
    "devops",
    "azure",
    "html",
    "sass",
    "java",
    "ruby",
    "rust",
    "node",
    "php",
    "vue",
    "sql",
    "aws",
    "gcp",
    "git",
    "css",
    "ios",
    "go",
];

const SPECIAL_TECHS: &[&str] = &["c++", "c#", ".net"];

/// Why a raw record was dropped. Non-fatal: the run continues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    MissingId,
    NoTechnologies,
}

impl RejectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectReason::MissingId => "missing id",
            RejectReason::NoTechnologies => "no technologies detected",
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Normalizer for raw upstream records. Compiled once per connector.
#[derive(Debug, Clone)]
pub struct FieldNormalizer {
    tech_pattern: Regex,
    amount_pattern: Regex,
    monthly_pattern: Regex,
    months_pattern: Regex,
    range_pattern: Regex,
}

impl FieldNormalizer {
    pub fn new() -> Result<Self, AppError> {
        let tech_alternation = TECH_KEYWORDS.join("|");
        Ok(Self {
            tech_pattern: compile(&format!(r"(?i)\b(?:{tech_alternation})\b"))?,
            // "35 000,00" (spaced thousands) or "2500.50"
            amount_pattern: compile(
                r"\d{1,3}(?:[ \u{a0}]\d{3})+(?:[.,]\d+)?|\d+(?:[.,]\d+)?",
            )?,
            monthly_pattern: compile(r"(?i)\bmensuel\b")?,
            months_pattern: compile(r"(?i)\bsur\s+(\d{1,2})\s+mois\b")?,
            range_pattern: compile(r"\bà\b")?,
        })
    }

    /// Map one raw record to a [`JobOffer`], or reject it.
    ///
    /// The only rejection rules are a missing identifier and an empty
    /// detected technology set; everything else falls back.
    pub async fn normalize<L: RegionLookup>(
        &self,
        raw: &Value,
        regions: &RegionResolver<L>,
        now: DateTime<Utc>,
    ) -> Result<JobOffer, RejectReason> {
        let Some(external_id) = record_id(raw) else {
            return Err(RejectReason::MissingId);
        };

        let title = text_field(raw.get("intitule"), FALLBACK_TITLE);
        let company = text_field(
            raw.get("entreprise").and_then(|e| e.get("nom")),
            FALLBACK_COMPANY,
        );
        let description = text_field(raw.get("description"), FALLBACK_DESCRIPTION);

        let technologies = self.detect_technologies(&format!("{title} {description}"));
        if technologies.is_empty() {
            return Err(RejectReason::NoTechnologies);
        }

        let place = raw.get("lieuTravail");
        let location_label = place.and_then(|p| p.get("libelle")).and_then(Value::as_str);
        let postal_code = place
            .and_then(|p| p.get("codePostal"))
            .and_then(Value::as_str);
        let location = location_label
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(FALLBACK_LOCATION)
            .to_string();

        let region_id = regions.resolve(postal_code, location_label).await;

        let salary_text = raw
            .get("salaire")
            .and_then(|s| s.get("libelle"))
            .and_then(Value::as_str)
            .unwrap_or_default();
        let (salary_min_k, salary_max_k) = self.parse_salary(salary_text);

        let posted_at = parse_posted_date(
            raw.get("dateCreation").and_then(Value::as_str),
            now,
        );

        let source_url = raw
            .get("origineOffre")
            .and_then(|o| o.get("urlOrigine"))
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from);

        Ok(JobOffer {
            external_id,
            title,
            company,
            description,
            technologies,
            location,
            region_id,
            salary_min_k,
            salary_max_k,
            experience_level: None,
            source_url,
            posted_at,
        })
    }

    fn detect_technologies(&self, text: &str) -> BTreeSet<String> {
        let mut found: BTreeSet<String> = self
            .tech_pattern
            .find_iter(text)
            .map(|m| m.as_str().to_lowercase())
            .collect();

        let lower = text.to_lowercase();
        for special in SPECIAL_TECHS {
            if lower.contains(special) {
                found.insert((*special).to_string());
            }
        }
        found
    }

    /// Parse salary free text into annual bounds in thousands of euros.
    ///
    /// "X à Y Euros" → (X, Y); a single amount → (X, X). `Mensuel`
    /// amounts are annualized: × 12, or × N when "sur N mois" is present.
    /// The "sur N mois" clause is stripped before amount extraction so
    /// its N is never mistaken for a salary bound. Unparsable text yields
    /// (None, None), never an error.
    pub fn parse_salary(&self, text: &str) -> (Option<i32>, Option<i32>) {
        if text.trim().is_empty() {
            return (None, None);
        }

        let monthly = self.monthly_pattern.is_match(text);
        let months = self
            .months_pattern
            .captures(text)
            .and_then(|c| c.get(1))
            .and_then(|m| m.as_str().parse::<u32>().ok());
        let stripped = self.months_pattern.replace_all(text, " ");

        let amounts: Vec<f64> = self
            .amount_pattern
            .find_iter(&stripped)
            .filter_map(|m| parse_amount(m.as_str()))
            .take(2)
            .collect();

        let factor = if monthly {
            f64::from(months.unwrap_or(12))
        } else {
            1.0
        };
        let to_thousands = |amount: f64| (amount * factor / 1000.0).round() as i32;

        match amounts.as_slice() {
            [] => (None, None),
            [single] => (Some(to_thousands(*single)), Some(to_thousands(*single))),
            [low, high, ..] if self.range_pattern.is_match(&stripped) => {
                (Some(to_thousands(*low)), Some(to_thousands(*high)))
            }
            [first, ..] => (Some(to_thousands(*first)), Some(to_thousands(*first))),
        }
    }
}

fn compile(pattern: &str) -> Result<Regex, AppError> {
    Regex::new(pattern).map_err(|e| AppError::Config(format!("invalid pattern: {e}")))
}

/// Upstream ids are strings, but be tolerant of numeric ids.
fn record_id(raw: &Value) -> Option<String> {
    match raw.get("id") {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    }
}

fn text_field(value: Option<&Value>, fallback: &str) -> String {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(fallback)
        .to_string()
}

/// "35 000,00" → 35000.0
fn parse_amount(text: &str) -> Option<f64> {
    let cleaned: String = text
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '\u{a0}')
        .map(|c| if c == ',' { '.' } else { c })
        .collect();
    cleaned.parse::<f64>().ok()
}

/// Posted date from the upstream creation timestamp; missing, unparsable,
/// or future dates all collapse to `now`.
fn parse_posted_date(raw: Option<&str>, now: DateTime<Utc>) -> DateTime<Utc> {
    raw.and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|d| d.with_timezone(&Utc))
        .filter(|d| *d <= now)
        .unwrap_or(now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::region::StaticRegionLookup;
    use crate::testutil::make_raw_offer;

    fn normalizer() -> FieldNormalizer {
        FieldNormalizer::new().unwrap()
    }

    fn resolver() -> RegionResolver<StaticRegionLookup> {
        RegionResolver::new(StaticRegionLookup)
    }

    // ---- salary ----

    #[test]
    fn test_salary_annual_range() {
        let (min, max) = normalizer().parse_salary("40000 à 50000 Euros par an");
        assert_eq!((min, max), (Some(40), Some(50)));
    }

    #[test]
    fn test_salary_monthly_single_value() {
        // 2500 × 12 / 1000 = 30
        let (min, max) = normalizer().parse_salary("2500 € Mensuel");
        assert_eq!((min, max), (Some(30), Some(30)));
    }

    #[test]
    fn test_salary_monthly_with_explicit_months() {
        // 3000 × 13 / 1000 = 39
        let (min, max) = normalizer().parse_salary("3000 € Mensuel sur 13 mois");
        assert_eq!((min, max), (Some(39), Some(39)));
    }

    #[test]
    fn test_salary_missing_or_unparsable() {
        let n = normalizer();
        assert_eq!(n.parse_salary(""), (None, None));
        assert_eq!(n.parse_salary("   "), (None, None));
        assert_eq!(n.parse_salary("Selon profil"), (None, None));
    }

    #[test]
    fn test_salary_annual_with_months_clause_ignores_the_clause() {
        // "sur 12 mois" must not contribute a bound, and the amount is
        // already annual so no multiplier applies.
        let (min, max) = normalizer().parse_salary("Annuel de 35 000,00 Euros sur 12 mois");
        assert_eq!((min, max), (Some(35), Some(35)));
    }

    #[test]
    fn test_salary_spaced_thousands_and_range() {
        let (min, max) =
            normalizer().parse_salary("Annuel de 32 000,00 Euros à 38 000,00 Euros sur 12 mois");
        assert_eq!((min, max), (Some(32), Some(38)));
    }

    #[test]
    fn test_salary_decimals_are_rounded_not_truncated() {
        // 2583.33 × 12 = 30999.96 → 31
        let (min, max) = normalizer().parse_salary("2583,33 € Mensuel");
        assert_eq!((min, max), (Some(31), Some(31)));
        // 35 500,00 → 35.5 → 36
        let (min, max) = normalizer().parse_salary("Annuel de 35 500,00 Euros");
        assert_eq!((min, max), (Some(36), Some(36)));
    }

    #[test]
    fn test_salary_monthly_range() {
        let (min, max) = normalizer().parse_salary("Mensuel de 2000,00 Euros à 2500,00 Euros");
        assert_eq!((min, max), (Some(24), Some(30)));
    }

    // ---- technologies ----

    #[test]
    fn test_detects_plain_keywords() {
        let techs = normalizer().detect_technologies("Développeur Java / Python confirmé");
        assert!(techs.contains("java"));
        assert!(techs.contains("python"));
        assert_eq!(techs.len(), 2);
    }

    #[test]
    fn test_javascript_does_not_also_count_as_java() {
        let techs = normalizer().detect_technologies("Développeur JavaScript");
        assert!(techs.contains("javascript"));
        assert!(!techs.contains("java"));
    }

    #[test]
    fn test_detects_special_tokens() {
        let techs = normalizer().detect_technologies("Ingénieur C++ / C# sur plateforme .NET");
        assert!(techs.contains("c++"));
        assert!(techs.contains("c#"));
        assert!(techs.contains(".net"));
    }

    #[test]
    fn test_go_requires_word_boundary() {
        let techs = normalizer().detect_technologies("Expert Django");
        assert!(techs.contains("django"));
        assert!(!techs.contains("go"));
    }

    // ---- full record ----

    #[tokio::test]
    async fn test_normalize_happy_path() {
        let raw = make_raw_offer("ABC123", "Développeur Rust", "Backend Rust et PostgreSQL");
        let now = Utc::now();
        let offer = normalizer()
            .normalize(&raw, &resolver(), now)
            .await
            .unwrap();

        assert_eq!(offer.external_id, "ABC123");
        assert_eq!(offer.title, "Développeur Rust");
        assert!(offer.technologies.contains("rust"));
        assert!(offer.technologies.contains("postgresql"));
        assert_eq!(offer.experience_level, None);
        assert!(offer.posted_at <= now);
    }

    #[tokio::test]
    async fn test_normalize_rejects_missing_id() {
        let raw = serde_json::json!({
            "intitule": "Développeur Java",
            "description": "Du Java."
        });
        let err = normalizer()
            .normalize(&raw, &resolver(), Utc::now())
            .await
            .unwrap_err();
        assert_eq!(err, RejectReason::MissingId);
    }

    #[tokio::test]
    async fn test_normalize_rejects_empty_technology_set() {
        let raw = make_raw_offer("XYZ", "Boulanger", "Fabrication de pain artisanal");
        let err = normalizer()
            .normalize(&raw, &resolver(), Utc::now())
            .await
            .unwrap_err();
        assert_eq!(err, RejectReason::NoTechnologies);
    }

    #[tokio::test]
    async fn test_normalize_applies_fallbacks() {
        let raw = serde_json::json!({
            "id": "F1",
            "description": "Stack Python et Docker."
        });
        let offer = normalizer()
            .normalize(&raw, &resolver(), Utc::now())
            .await
            .unwrap();

        assert_eq!(offer.title, FALLBACK_TITLE);
        assert_eq!(offer.company, FALLBACK_COMPANY);
        assert_eq!(offer.location, FALLBACK_LOCATION);
        assert_eq!(offer.region_id, None);
        assert_eq!((offer.salary_min_k, offer.salary_max_k), (None, None));
        assert_eq!(offer.source_url, None);
    }

    #[tokio::test]
    async fn test_normalize_resolves_region_from_postal_code() {
        let mut raw = make_raw_offer("R1", "Dev Python", "Python");
        raw["lieuTravail"] = serde_json::json!({
            "libelle": "75 - Paris",
            "codePostal": "75011"
        });
        let offer = normalizer()
            .normalize(&raw, &resolver(), Utc::now())
            .await
            .unwrap();
        assert_eq!(offer.region_id, Some(11));
        assert_eq!(offer.location, "75 - Paris");
    }

    #[tokio::test]
    async fn test_future_posted_date_collapses_to_now() {
        let mut raw = make_raw_offer("D1", "Dev Java", "Java");
        raw["dateCreation"] = serde_json::json!("2099-01-01T00:00:00Z");
        let now = Utc::now();
        let offer = normalizer().normalize(&raw, &resolver(), now).await.unwrap();
        assert_eq!(offer.posted_at, now);
    }

    #[tokio::test]
    async fn test_unparsable_posted_date_collapses_to_now() {
        let mut raw = make_raw_offer("D2", "Dev Java", "Java");
        raw["dateCreation"] = serde_json::json!("hier");
        let now = Utc::now();
        let offer = normalizer().normalize(&raw, &resolver(), now).await.unwrap();
        assert_eq!(offer.posted_at, now);
    }

    #[tokio::test]
    async fn test_valid_posted_date_is_kept() {
        let mut raw = make_raw_offer("D3", "Dev Java", "Java");
        raw["dateCreation"] = serde_json::json!("2025-06-01T08:30:00Z");
        let now = Utc::now();
        let offer = normalizer().normalize(&raw, &resolver(), now).await.unwrap();
        assert_eq!(
            offer.posted_at,
            DateTime::parse_from_rfc3339("2025-06-01T08:30:00Z")
                .unwrap()
                .with_timezone(&Utc)
        );
    }

    #[tokio::test]
    async fn test_numeric_id_is_accepted() {
        let raw = serde_json::json!({
            "id": 184093,
            "intitule": "Dev PHP",
            "description": "Symfony"
        });
        let offer = normalizer()
            .normalize(&raw, &resolver(), Utc::now())
            .await
            .unwrap();
        assert_eq!(offer.external_id, "184093");
    }
}
