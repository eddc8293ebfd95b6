//! Local NER classification tier
//!
//! An in-process named-entity pass over the name (and context when
//! present): lexicon lookups over whole tokens plus a few biography-style
//! context cues. Runs entirely locally, so it sits between the external
//! model tier and the rule table in the fallback chain.
//!
//! Label conflict rule: when the same name carries both a person-label
//! and an organization-label span, the person label takes priority. This
//! resolves the common ambiguity where a surname collides with an
//! organization-like token.

use std::collections::HashSet;

use entigraph_core::{ClassificationTier, EntityType, Result};

use crate::{ClassifyTier, TierOutcome};

const GIVEN_NAMES: &[&str] = &[
    "alan", "alexander", "andrew", "anna", "anne", "anthony", "barbara", "bill", "brian",
    "charles", "christine", "claire", "daniel", "david", "donald", "edward", "elizabeth", "emily",
    "eric", "frank", "george", "ghislaine", "helen", "henry", "jack", "james", "jane", "jean",
    "jeffrey", "jennifer", "john", "joseph", "katherine", "kevin", "laura", "leslie", "linda",
    "margaret", "maria", "mark", "mary", "michael", "naomi", "nicholas", "nicole", "patricia",
    "paul", "peter", "richard", "robert", "samantha", "sarah", "sophie", "stephen", "susan",
    "thomas", "virginia", "william",
];

const PLACE_NAMES: &[&str] = &[
    "london", "paris", "manhattan", "florida", "california", "texas", "virginia", "miami",
    "monaco", "geneva", "zurich", "nassau", "bermuda", "tortola", "marrakech", "santa fe",
    "palm beach", "new york", "new mexico", "los angeles", "las vegas", "saint tropez",
    "united states", "united kingdom", "france", "england", "scotland", "morocco", "bahamas",
];

const ORG_MARKERS: &[&str] = &[
    "foundation", "corp", "inc", "llc", "ltd", "university", "bank", "airlines", "holdings",
    "institute", "trust", "fund", "agency",
];

const PERSON_CONTEXT_CUES: &[&str] = &[
    " he ", " she ", " his ", " her ", "born ", "aged ", "married", "biography", "attorney",
    "billionaire", "financier", "socialite", "professor",
];

const ORG_CONTEXT_CUES: &[&str] = &[
    "headquartered", "founded in", "subsidiary", "nonprofit", "non-profit", "the firm",
    "the company", "shareholders",
];

const LOCATION_CONTEXT_CUES: &[&str] = &[
    "located in", "located at", "north of", "south of", "capital of", "an island", "the estate",
    "the property", "airstrip",
];

// ============================================================================
// Local NER Tier
// ============================================================================

/// Lexicon-backed local NER pass
pub struct LocalNerTier {
    given_names: HashSet<&'static str>,
    place_names: HashSet<&'static str>,
    org_markers: HashSet<&'static str>,
}

impl LocalNerTier {
    pub fn new() -> Self {
        Self {
            given_names: GIVEN_NAMES.iter().copied().collect(),
            place_names: PLACE_NAMES.iter().copied().collect(),
            org_markers: ORG_MARKERS.iter().copied().collect(),
        }
    }

    /// Label the name from its own tokens. Whole-token lookups only.
    fn label_name(&self, name: &str) -> LabelSet {
        let lowered = name.to_lowercase();
        let tokens: Vec<&str> = lowered
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .collect();

        let mut labels = LabelSet::default();

        for token in &tokens {
            if self.given_names.contains(token) {
                labels.person = true;
            }
            if self.org_markers.contains(token) {
                labels.organization = true;
            }
        }

        // Place names may span tokens ("palm beach"), so probe the full
        // lowered name and each bigram against the lexicon.
        if self.place_names.contains(lowered.trim()) {
            labels.location = true;
        }
        for pair in tokens.windows(2) {
            if self.place_names.contains(pair.join(" ").as_str()) {
                labels.location = true;
            }
        }
        for token in &tokens {
            if self.place_names.contains(token) {
                labels.location = true;
            }
        }

        labels
    }

    /// Weak cues from free-text context, consulted only when the name
    /// itself was inconclusive.
    fn label_context(&self, context: &str) -> LabelSet {
        let lowered = context.to_lowercase();
        LabelSet {
            person: PERSON_CONTEXT_CUES.iter().any(|cue| lowered.contains(cue)),
            organization: ORG_CONTEXT_CUES.iter().any(|cue| lowered.contains(cue)),
            location: LOCATION_CONTEXT_CUES.iter().any(|cue| lowered.contains(cue)),
        }
    }
}

impl Default for LocalNerTier {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct LabelSet {
    person: bool,
    organization: bool,
    location: bool,
}

impl LabelSet {
    fn is_empty(&self) -> bool {
        !(self.person || self.organization || self.location)
    }

    /// Deterministic conflict resolution: person outranks organization,
    /// organization outranks location.
    fn resolve(&self) -> Option<(EntityType, &'static str)> {
        if self.person && self.organization {
            return Some((
                EntityType::Person,
                "person label takes priority over organization label",
            ));
        }
        if self.organization {
            return Some((EntityType::Organization, "organization lexicon match"));
        }
        if self.person {
            return Some((EntityType::Person, "given-name lexicon match"));
        }
        if self.location {
            return Some((EntityType::Location, "place-name lexicon match"));
        }
        None
    }
}

#[async_trait::async_trait]
impl ClassifyTier for LocalNerTier {
    async fn classify(&self, name: &str, context: Option<&str>) -> Result<Option<TierOutcome>> {
        let labels = self.label_name(name);

        if let Some((entity_type, reason)) = labels.resolve() {
            return Ok(Some(TierOutcome::new(entity_type, 0.7, reason)));
        }

        if labels.is_empty() {
            if let Some(ctx) = context {
                if let Some((entity_type, reason)) = self.label_context(ctx).resolve() {
                    return Ok(Some(TierOutcome::new(
                        entity_type,
                        0.6,
                        format!("{reason} (from context)"),
                    )));
                }
            }
        }

        Ok(None)
    }

    fn tier(&self) -> ClassificationTier {
        ClassificationTier::LocalNer
    }

    fn name(&self) -> &str {
        "local_ner"
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    async fn classify(name: &str, context: Option<&str>) -> Option<TierOutcome> {
        LocalNerTier::new().classify(name, context).await.unwrap()
    }

    #[tokio::test]
    async fn test_given_name_lookup() {
        let outcome = classify("Ghislaine Maxwell", None).await.unwrap();
        assert_eq!(outcome.entity_type, EntityType::Person);
    }

    #[tokio::test]
    async fn test_person_label_beats_organization_label() {
        // "James" is a given name and "Foundation" an org marker; the
        // person label wins by rule.
        let outcome = classify("James Foundation", None).await.unwrap();
        assert_eq!(outcome.entity_type, EntityType::Person);
        assert!(outcome.reasoning.contains("priority"));
    }

    #[tokio::test]
    async fn test_multiword_place_name() {
        let outcome = classify("Palm Beach", None).await.unwrap();
        assert_eq!(outcome.entity_type, EntityType::Location);
    }

    #[tokio::test]
    async fn test_context_cue_used_when_name_inconclusive() {
        let outcome = classify(
            "Wexner",
            Some("A billionaire financier, he was born in 1937."),
        )
        .await
        .unwrap();
        assert_eq!(outcome.entity_type, EntityType::Person);
        assert!(outcome.reasoning.contains("context"));
    }

    #[tokio::test]
    async fn test_unknown_token_falls_through() {
        assert!(classify("Zeteticon", None).await.is_none());
    }

    #[tokio::test]
    async fn test_whole_token_lookup_only() {
        // "Jamestown" contains "james" but is not the token "james"
        let outcome = classify("Jamestown", None).await;
        assert!(outcome.is_none() || outcome.unwrap().entity_type != EntityType::Person);
    }
}
