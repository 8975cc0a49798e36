//! Query Ranking
//!
//! Scores entities, text units, and communities against a query embedding
//! with cosine similarity and assembles ranked, truncated facet results.
//! Facets the caller disabled are never scored. Tie-break order is part of
//! the contract:
//!
//! - entities: score desc, then occurrence count desc, then title
//! - text units: score desc, then unit id asc
//! - communities: score desc, then community id asc

use std::cmp::Ordering;

use crate::domain::{
    Community, Entity, ScoredCommunity, ScoredEntity, ScoredTextUnit, TextUnit,
};
use crate::rag::embedding::cosine_similarity;

fn score_desc(a: f32, b: f32) -> Ordering {
    b.partial_cmp(&a).unwrap_or(Ordering::Equal)
}

/// Rank entities by similarity to the query embedding.
pub fn rank_entities<'a, I>(query: &[f32], entities: I, top_k: usize) -> Vec<ScoredEntity>
where
    I: IntoIterator<Item = &'a Entity>,
{
    let mut scored: Vec<ScoredEntity> = entities
        .into_iter()
        .map(|entity| ScoredEntity {
            score: cosine_similarity(query, &entity.embedding),
            entity: entity.clone(),
        })
        .collect();

    scored.sort_by(|a, b| {
        score_desc(a.score, b.score)
            .then_with(|| b.entity.occurrence_count.cmp(&a.entity.occurrence_count))
            .then_with(|| a.entity.title.cmp(&b.entity.title))
    });
    scored.truncate(top_k);
    scored
}

/// Rank text units by similarity to the query embedding.
pub fn rank_text_units<'a, I>(query: &[f32], units: I, top_k: usize) -> Vec<ScoredTextUnit>
where
    I: IntoIterator<Item = &'a TextUnit>,
{
    let mut scored: Vec<ScoredTextUnit> = units
        .into_iter()
        .map(|unit| ScoredTextUnit {
            score: cosine_similarity(query, &unit.embedding),
            text_unit: unit.clone(),
        })
        .collect();

    scored.sort_by(|a, b| {
        score_desc(a.score, b.score).then_with(|| a.text_unit.id.cmp(&b.text_unit.id))
    });
    scored.truncate(top_k);
    scored
}

/// Rank communities by similarity between the query embedding and each
/// community's summary embedding.
pub fn rank_communities<'a, I>(query: &[f32], communities: I, top_k: usize) -> Vec<ScoredCommunity>
where
    I: IntoIterator<Item = &'a Community>,
{
    let mut scored: Vec<ScoredCommunity> = communities
        .into_iter()
        .map(|community| ScoredCommunity {
            score: cosine_similarity(query, &community.embedding),
            community: community.clone(),
        })
        .collect();

    scored.sort_by(|a, b| {
        score_desc(a.score, b.score).then_with(|| a.community.id.cmp(&b.community.id))
    });
    scored.truncate(top_k);
    scored
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::EntityType;

    fn entity(id: u64, title: &str, occurrences: u64, embedding: Vec<f32>) -> Entity {
        Entity {
            id,
            title: title.to_string(),
            entity_type: EntityType::Concept,
            description: String::new(),
            occurrence_count: occurrences,
            embedding,
            embedding_samples: 1,
            source_text_unit_ids: Vec::new(),
            created_at: "2024-01-01T00:00:00Z".to_string(),
        }
    }

    fn unit(id: u64, embedding: Vec<f32>) -> TextUnit {
        TextUnit {
            id,
            document_id: 1,
            sequence: 0,
            content: format!("unit {id}"),
            embedding,
            entity_ids: Vec::new(),
        }
    }

    #[test]
    fn test_entities_sorted_descending() {
        let query = vec![1.0, 0.0];
        let entities = vec![
            entity(1, "far", 1, vec![0.0, 1.0]),
            entity(2, "near", 1, vec![1.0, 0.0]),
            entity(3, "mid", 1, vec![1.0, 1.0]),
        ];

        let ranked = rank_entities(&query, &entities, 10);
        assert_eq!(ranked[0].entity.title, "near");
        assert_eq!(ranked[1].entity.title, "mid");
        assert_eq!(ranked[2].entity.title, "far");

        for pair in ranked.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
        for r in &ranked {
            assert!((-1.0..=1.0).contains(&r.score));
        }
    }

    #[test]
    fn test_entity_tie_breaks() {
        let query = vec![1.0, 0.0];
        // Identical embeddings: occurrence count decides, then title.
        let entities = vec![
            entity(1, "zeta", 2, vec![1.0, 0.0]),
            entity(2, "alpha", 2, vec![1.0, 0.0]),
            entity(3, "beta", 9, vec![1.0, 0.0]),
        ];

        let ranked = rank_entities(&query, &entities, 10);
        assert_eq!(ranked[0].entity.title, "beta");
        assert_eq!(ranked[1].entity.title, "alpha");
        assert_eq!(ranked[2].entity.title, "zeta");
    }

    #[test]
    fn test_text_unit_tie_break_by_id() {
        let query = vec![1.0];
        let units = vec![unit(9, vec![1.0]), unit(3, vec![1.0]), unit(5, vec![1.0])];
        let ranked = rank_text_units(&query, &units, 10);
        let ids: Vec<u64> = ranked.iter().map(|r| r.text_unit.id).collect();
        assert_eq!(ids, vec![3, 5, 9]);
    }

    #[test]
    fn test_top_k_truncates() {
        let query = vec![1.0];
        let units: Vec<TextUnit> = (0..20).map(|i| unit(i, vec![1.0])).collect();
        assert_eq!(rank_text_units(&query, &units, 5).len(), 5);
        assert!(rank_text_units(&query, &units, 0).is_empty());
    }

    #[test]
    fn test_unembedded_items_score_zero() {
        let query = vec![1.0, 0.0];
        let entities = vec![entity(1, "empty", 1, vec![])];
        let ranked = rank_entities(&query, &entities, 10);
        assert_eq!(ranked[0].score, 0.0);
    }
}
