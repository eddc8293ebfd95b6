//! Rule-based classification tier
//!
//! A compiled, versioned table of word-boundary-anchored keyword rules
//! plus person-name-shape patterns. Keywords must match whole tokens:
//! a surname like "Boardman" must never trip the "board" organization
//! keyword. Rules are checked in fixed priority order: organization
//! keywords, then location keywords, then name-shape patterns. Keyword
//! evidence always outranks shape evidence, and the terminal default is
//! unknown, never person.

use regex::Regex;

use entigraph_core::{ClassificationTier, EntityType, Result};

use crate::{ClassifyTier, TierOutcome};

/// Rule table revision; bump when the keyword lists change
pub const RULE_TABLE_VERSION: &str = "2025.1";

const ORGANIZATION_KEYWORDS: &[&str] = &[
    "foundation",
    "inc",
    "incorporated",
    "llc",
    "llp",
    "ltd",
    "limited",
    "corp",
    "corporation",
    "company",
    "co",
    "group",
    "holdings",
    "partners",
    "associates",
    "capital",
    "fund",
    "trust",
    "bank",
    "institute",
    "institution",
    "university",
    "college",
    "school",
    "academy",
    "church",
    "ministry",
    "agency",
    "bureau",
    "committee",
    "council",
    "commission",
    "society",
    "association",
    "club",
    "enterprises",
    "ventures",
    "airlines",
    "airways",
    "magazine",
    "press",
    "media",
];

const LOCATION_KEYWORDS: &[&str] = &[
    "island",
    "islands",
    "beach",
    "bay",
    "harbor",
    "harbour",
    "lake",
    "river",
    "mountain",
    "valley",
    "city",
    "town",
    "village",
    "county",
    "state",
    "province",
    "republic",
    "kingdom",
    "airport",
    "airfield",
    "ranch",
    "palace",
    "castle",
    "avenue",
    "street",
    "boulevard",
    "plaza",
    "square",
    "park",
    "coast",
    "peninsula",
];

const HONORIFICS: &[&str] = &[
    "mr", "mrs", "ms", "miss", "dr", "prof", "professor", "sir", "dame", "lady", "lord", "judge",
    "senator", "gov", "governor", "rev", "capt", "captain", "col", "gen",
];

// ============================================================================
// Rule Table
// ============================================================================

/// Compiled keyword and shape rules
pub struct RuleTable {
    version: &'static str,
    organization: Regex,
    location: Regex,
    last_first: Regex,
    honorific: Regex,
    two_token_name: Regex,
}

impl RuleTable {
    /// The current rule table revision
    pub fn current() -> Self {
        Self {
            version: RULE_TABLE_VERSION,
            organization: keyword_regex(ORGANIZATION_KEYWORDS),
            location: keyword_regex(LOCATION_KEYWORDS),
            // "Boardman, Samantha" / "Maxwell, Ghislaine"
            last_first: Regex::new(r"^[A-Z][A-Za-z'\-]+,\s*[A-Z][A-Za-z'\-\.]*").expect("pattern"),
            honorific: keyword_regex(HONORIFICS),
            // Two or three capitalized tokens with nothing else
            two_token_name: Regex::new(
                r"^[A-Z][a-z'\-]+(?:\s+[A-Z]\.?)?(?:\s+[A-Z][a-z'\-]+){1,2}$",
            )
            .expect("pattern"),
        }
    }

    pub fn version(&self) -> &'static str {
        self.version
    }

    /// Apply the table in priority order. Keyword rules run first so
    /// structural evidence can never be overridden by a generic
    /// name-shape match.
    pub fn evaluate(&self, name: &str) -> Option<TierOutcome> {
        if self.organization.is_match(name) {
            return Some(TierOutcome::new(
                EntityType::Organization,
                0.85,
                format!("organization keyword match (rules {})", self.version),
            ));
        }

        if self.location.is_match(name) {
            return Some(TierOutcome::new(
                EntityType::Location,
                0.8,
                format!("location keyword match (rules {})", self.version),
            ));
        }

        if self.last_first.is_match(name) {
            return Some(TierOutcome::new(
                EntityType::Person,
                0.75,
                "last-comma-first name shape".to_string(),
            ));
        }

        if self.honorific.is_match(name) {
            return Some(TierOutcome::new(
                EntityType::Person,
                0.8,
                "honorific prefix".to_string(),
            ));
        }

        if self.two_token_name.is_match(name) {
            // Generic shape evidence only; deliberately weak
            return Some(TierOutcome::new(
                EntityType::Person,
                0.55,
                "capitalized multi-token name shape".to_string(),
            ));
        }

        None
    }
}

/// Compile a keyword list into a single case-insensitive, word-boundary
/// anchored alternation. Never raw substring matching.
fn keyword_regex(keywords: &[&str]) -> Regex {
    let alternation = keywords.join("|");
    Regex::new(&format!(r"(?i)\b(?:{alternation})\b")).expect("keyword pattern")
}

// ============================================================================
// Rule Tier
// ============================================================================

/// The lowest, deterministic classification tier
pub struct RuleTier {
    table: RuleTable,
}

impl RuleTier {
    pub fn new(table: RuleTable) -> Self {
        Self { table }
    }

    pub fn table(&self) -> &RuleTable {
        &self.table
    }
}

impl Default for RuleTier {
    fn default() -> Self {
        Self::new(RuleTable::current())
    }
}

#[async_trait::async_trait]
impl ClassifyTier for RuleTier {
    async fn classify(&self, name: &str, _context: Option<&str>) -> Result<Option<TierOutcome>> {
        Ok(self.table.evaluate(name))
    }

    fn tier(&self) -> ClassificationTier {
        ClassificationTier::Rules
    }

    fn name(&self) -> &str {
        "rules"
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn evaluate(name: &str) -> Option<TierOutcome> {
        RuleTable::current().evaluate(name)
    }

    #[test]
    fn test_organization_keyword() {
        let outcome = evaluate("Clinton Foundation").unwrap();
        assert_eq!(outcome.entity_type, EntityType::Organization);
        assert!(outcome.confidence >= 0.75);
    }

    #[test]
    fn test_location_keyword() {
        let outcome = evaluate("Little St. James Island").unwrap();
        assert_eq!(outcome.entity_type, EntityType::Location);
    }

    #[test]
    fn test_word_boundary_prevents_substring_collision() {
        // "Boardman" contains "board" but must never classify as an
        // organization; the comma shape identifies a person.
        let outcome = evaluate("Boardman, Samantha").unwrap();
        assert_eq!(outcome.entity_type, EntityType::Person);
    }

    #[test]
    fn test_last_comma_first_shape() {
        let outcome = evaluate("Maxwell, Ghislaine").unwrap();
        assert_eq!(outcome.entity_type, EntityType::Person);
        assert!(outcome.reasoning.contains("name shape"));
    }

    #[test]
    fn test_keyword_outranks_shape() {
        // Comma shape present, but the organization keyword wins
        let outcome = evaluate("Foundation, Clinton").unwrap();
        assert_eq!(outcome.entity_type, EntityType::Organization);
    }

    #[test]
    fn test_honorific_prefix() {
        let outcome = evaluate("Dr Henry Kissinger").unwrap();
        assert_eq!(outcome.entity_type, EntityType::Person);
    }

    #[test]
    fn test_two_token_shape_is_weak_person_evidence() {
        let outcome = evaluate("Jeffrey Epstein").unwrap();
        assert_eq!(outcome.entity_type, EntityType::Person);
        assert!(outcome.confidence < 0.7);
    }

    #[test]
    fn test_unmatched_name_yields_nothing() {
        // The terminal default belongs to the caller and is unknown,
        // never person.
        assert!(evaluate("xj9").is_none());
        assert!(evaluate("lowercase name").is_none());
    }

    #[test]
    fn test_suffix_inside_word_does_not_match() {
        // "Coventry" contains "co"; token anchoring must reject it
        assert!(evaluate("Coventry").is_none());
    }

    #[test]
    fn test_rule_table_versioned() {
        assert_eq!(RuleTable::current().version(), RULE_TABLE_VERSION);
    }
}
