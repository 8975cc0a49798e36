//! Pattern-Based Extractor
//!
//! A dependency-light extraction capability driven by regular expressions:
//! capitalized phrases become entities, four-digit years become temporal
//! entities, and co-occurrence within a unit becomes a weak relationship.
//! Useful for tests and offline runs; production deployments should point
//! at an NLP-backed extractor.

use async_trait::async_trait;
use regex::Regex;
use std::collections::BTreeSet;

use super::{EntityExtractor, ExtractionConfig};
use crate::domain::{EntityType, ExtractedEntity, ExtractedRelationship, Extraction};
use crate::error::{EngineError, EngineResult};

/// Regex-driven extraction capability.
#[derive(Debug)]
pub struct PatternExtractor {
    phrase_re: Regex,
    year_re: Regex,
    config: ExtractionConfig,
}

impl PatternExtractor {
    pub fn new() -> Self {
        Self::with_config(ExtractionConfig::default())
    }

    pub fn with_config(config: ExtractionConfig) -> Self {
        Self {
            // One or more capitalized words, e.g. "Guido van Rossum" matches
            // "Guido" and "Rossum" runs; multiword runs are kept whole.
            phrase_re: Regex::new(r"\b([A-Z][a-zA-Z]+(?:\s+[A-Z][a-zA-Z]+)*)\b")
                .expect("static regex"),
            year_re: Regex::new(r"\b(1[0-9]{3}|20[0-9]{2})\b").expect("static regex"),
            config,
        }
    }

    fn first_sentence(text: &str) -> &str {
        let end = text
            .find(['.', '!', '?'])
            .map_or(text.len(), |i| (i + 1).min(text.len()));
        text[..end].trim()
    }
}

impl Default for PatternExtractor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EntityExtractor for PatternExtractor {
    async fn extract(&self, text: &str) -> EngineResult<Extraction> {
        if text.trim().is_empty() {
            return Err(EngineError::Extraction("empty text unit".to_string()));
        }

        let context = Self::first_sentence(text);

        // BTreeSet keeps candidate order deterministic across runs.
        let phrases: BTreeSet<&str> = self
            .phrase_re
            .find_iter(text)
            .map(|m| m.as_str())
            .filter(|p| p.len() > 2)
            .collect();
        let years: BTreeSet<&str> = self.year_re.find_iter(text).map(|m| m.as_str()).collect();

        let mut entities: Vec<ExtractedEntity> = Vec::new();
        for phrase in &phrases {
            entities.push(ExtractedEntity {
                title: (*phrase).to_string(),
                entity_type: if phrase.contains(' ') {
                    EntityType::Person
                } else {
                    EntityType::Concept
                },
                description: format!("{phrase}: {context}"),
                weight: 1.0,
            });
        }
        for year in &years {
            entities.push(ExtractedEntity {
                title: (*year).to_string(),
                entity_type: EntityType::Temporal,
                description: format!("Year {year} mentioned: {context}"),
                weight: 1.0,
            });
        }
        entities.truncate(self.config.max_entities);

        // Co-occurrence edges: every phrase relates to every year in the
        // same unit, and adjacent phrases relate to each other.
        let mut relationships: Vec<ExtractedRelationship> = Vec::new();
        for phrase in &phrases {
            for year in &years {
                relationships.push(ExtractedRelationship {
                    source_title: (*phrase).to_string(),
                    target_title: (*year).to_string(),
                    relationship_type: "mentioned_with".to_string(),
                    description: format!("{phrase} mentioned in the context of {year}"),
                    weight: 0.5,
                });
            }
        }
        let phrase_list: Vec<&str> = phrases.iter().copied().collect();
        for pair in phrase_list.windows(2) {
            relationships.push(ExtractedRelationship {
                source_title: pair[0].to_string(),
                target_title: pair[1].to_string(),
                relationship_type: "co_occurs_with".to_string(),
                description: format!("{} and {} appear together", pair[0], pair[1]),
                weight: 0.5,
            });
        }

        Ok(Extraction {
            entities,
            relationships,
        })
    }

    fn name(&self) -> &'static str {
        "pattern"
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_extracts_phrases_and_years() {
        let extractor = PatternExtractor::new();
        let result = extractor
            .extract("Albert Einstein was born in 1879.")
            .await
            .unwrap();

        let titles: Vec<&str> = result.entities.iter().map(|e| e.title.as_str()).collect();
        assert!(titles.contains(&"Albert Einstein"));
        assert!(titles.contains(&"1879"));

        // Phrase/year co-occurrence becomes a relationship.
        assert!(
            result
                .relationships
                .iter()
                .any(|r| r.source_title == "Albert Einstein" && r.target_title == "1879")
        );
    }

    #[tokio::test]
    async fn test_empty_text_is_an_extraction_error() {
        let extractor = PatternExtractor::new();
        let err = extractor.extract("   ").await.unwrap_err();
        assert!(matches!(err, EngineError::Extraction(_)));
    }

    #[tokio::test]
    async fn test_deterministic_across_calls() {
        let extractor = PatternExtractor::new();
        let text = "Rust and Python were compared by Graydon Hoare in 2010.";
        let a = extractor.extract(text).await.unwrap();
        let b = extractor.extract(text).await.unwrap();
        let titles = |x: &Extraction| {
            x.entities
                .iter()
                .map(|e| e.title.clone())
                .collect::<Vec<_>>()
        };
        assert_eq!(titles(&a), titles(&b));
        assert_eq!(a.relationships.len(), b.relationships.len());
    }

    #[tokio::test]
    async fn test_respects_max_entities() {
        let extractor = PatternExtractor::with_config(ExtractionConfig {
            max_entities: 2,
            ..ExtractionConfig::default()
        });
        let result = extractor
            .extract("Alice met Bob and Carol near Dover in 1999 and 2001.")
            .await
            .unwrap();
        assert!(result.entities.len() <= 2);
    }
}
