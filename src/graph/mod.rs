//! Knowledge Graph Store
//!
//! The per-session entity/relationship graph and the merge pass that folds
//! transient extractions into it. Merging is a read-then-write critical
//! section; the owning session serializes calls through its write lock.

pub mod community;

use std::collections::{BTreeMap, HashMap};
use tracing::debug;

use crate::domain::{Entity, EntityKey, Extraction, Relationship, RelationshipKey};

/// Upper bound on merged description evidence, in characters.
pub const DEFAULT_MAX_DESCRIPTION_LEN: usize = 2048;

/// Ceiling for accumulated relationship weights.
pub const DEFAULT_WEIGHT_CAP: f32 = 10.0;

// =============================================================================
// Merge Input/Output
// =============================================================================

/// One text unit's extraction output, ready to merge. Entity embeddings are
/// parallel to `extraction.entities`; an empty vector marks a unit whose
/// embedding failed and contributes no sample to the mean.
#[derive(Debug, Clone)]
pub struct MergeUnit {
    pub text_unit_id: u64,
    pub extraction: Extraction,
    pub entity_embeddings: Vec<Vec<f32>>,
}

/// Counters and link information produced by one merge pass.
#[derive(Debug, Default)]
pub struct MergeOutcome {
    /// Extracted entity records processed (not distinct entities).
    pub entities_merged: u64,
    /// Extracted relationship records resolved onto edges.
    pub relationships_merged: u64,
    /// Relationship records dropped: unresolvable endpoint or self-loop.
    pub relationships_rejected: u64,
    /// text unit id -> entity ids extracted from it, for back-linking.
    pub unit_entity_links: HashMap<u64, Vec<u64>>,
}

// =============================================================================
// Knowledge Graph
// =============================================================================

/// Deduplicated entity/relationship graph for one session.
#[derive(Debug)]
pub struct KnowledgeGraph {
    entity_ids: HashMap<EntityKey, u64>,
    entities: BTreeMap<u64, Entity>,
    relationship_ids: HashMap<RelationshipKey, u64>,
    relationships: BTreeMap<u64, Relationship>,
    next_entity_id: u64,
    next_relationship_id: u64,
    max_description_len: usize,
    weight_cap: f32,
}

impl KnowledgeGraph {
    pub fn new(max_description_len: usize, weight_cap: f32) -> Self {
        Self {
            entity_ids: HashMap::new(),
            entities: BTreeMap::new(),
            relationship_ids: HashMap::new(),
            relationships: BTreeMap::new(),
            next_entity_id: 1,
            next_relationship_id: 1,
            max_description_len,
            weight_cap,
        }
    }

    // -------------------------------------------------------------------------
    // Accessors
    // -------------------------------------------------------------------------

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    pub fn relationship_count(&self) -> usize {
        self.relationships.len()
    }

    pub fn get_entity(&self, id: u64) -> Option<&Entity> {
        self.entities.get(&id)
    }

    pub fn get_entity_by_key(&self, key: &EntityKey) -> Option<&Entity> {
        self.entity_ids.get(key).and_then(|id| self.entities.get(id))
    }

    /// Entities in ascending id order.
    pub fn entities(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values()
    }

    /// Relationships in ascending id order.
    pub fn relationships(&self) -> impl Iterator<Item = &Relationship> {
        self.relationships.values()
    }

    // -------------------------------------------------------------------------
    // Merge Pass
    // -------------------------------------------------------------------------

    /// Merge a batch of per-unit extractions into the graph.
    ///
    /// Entities are upserted first so relationship endpoints introduced in
    /// this same pass always resolve; a relationship whose endpoints still
    /// cannot be resolved is dropped and counted, never an error.
    pub fn merge_extractions(&mut self, units: &[MergeUnit]) -> MergeOutcome {
        let mut outcome = MergeOutcome::default();

        // Pass 1: entities.
        for unit in units {
            let links = outcome
                .unit_entity_links
                .entry(unit.text_unit_id)
                .or_default();

            for (i, candidate) in unit.extraction.entities.iter().enumerate() {
                let embedding: &[f32] = unit.entity_embeddings.get(i).map_or(&[], Vec::as_slice);
                let id = self.upsert_entity(
                    &candidate.title,
                    candidate.entity_type.clone(),
                    &candidate.description,
                    embedding,
                    unit.text_unit_id,
                );
                outcome.entities_merged += 1;
                if !links.contains(&id) {
                    links.push(id);
                }
            }
        }

        // Pass 2: relationships, endpoints resolved against the whole graph
        // (which now includes this pass's entities).
        for unit in units {
            for candidate in &unit.extraction.relationships {
                let source = self.resolve_title(&candidate.source_title);
                let target = self.resolve_title(&candidate.target_title);

                let (Some(source_id), Some(target_id)) = (source, target) else {
                    outcome.relationships_rejected += 1;
                    continue;
                };

                match RelationshipKey::ordered(source_id, target_id, &candidate.relationship_type)
                {
                    Some(key) => {
                        self.upsert_relationship(key, &candidate.description, candidate.weight);
                        outcome.relationships_merged += 1;
                    }
                    None => {
                        // Self-loop.
                        outcome.relationships_rejected += 1;
                    }
                }
            }
        }

        debug!(
            entities = outcome.entities_merged,
            relationships = outcome.relationships_merged,
            rejected = outcome.relationships_rejected,
            "merge pass complete"
        );

        outcome
    }

    /// Resolve an extracted title against the graph, ignoring the type tag:
    /// relationship endpoints carry titles only. The lowest entity id wins
    /// when the same normalized title exists under several types.
    fn resolve_title(&self, title: &str) -> Option<u64> {
        let normalized = crate::domain::graph::normalize_title(title);
        self.entity_ids
            .iter()
            .filter(|(key, _)| key.title == normalized)
            .map(|(_, id)| *id)
            .min()
    }

    fn upsert_entity(
        &mut self,
        title: &str,
        entity_type: crate::domain::EntityType,
        description: &str,
        embedding: &[f32],
        text_unit_id: u64,
    ) -> u64 {
        let key = EntityKey::new(title, entity_type.clone());

        if let Some(&id) = self.entity_ids.get(&key) {
            let entity = self
                .entities
                .get_mut(&id)
                .expect("entity id map out of sync");
            entity.occurrence_count += 1;
            append_evidence(&mut entity.description, description, self.max_description_len);
            fold_embedding(
                &mut entity.embedding,
                &mut entity.embedding_samples,
                embedding,
            );
            if !entity.source_text_unit_ids.contains(&text_unit_id) {
                entity.source_text_unit_ids.push(text_unit_id);
            }
            return id;
        }

        let id = self.next_entity_id;
        self.next_entity_id += 1;

        let mut entity = Entity {
            id,
            title: title.trim().to_string(),
            entity_type,
            description: String::new(),
            occurrence_count: 1,
            embedding: Vec::new(),
            embedding_samples: 0,
            source_text_unit_ids: vec![text_unit_id],
            created_at: chrono::Utc::now().to_rfc3339(),
        };
        append_evidence(&mut entity.description, description, self.max_description_len);
        fold_embedding(&mut entity.embedding, &mut entity.embedding_samples, embedding);

        self.entity_ids.insert(key, id);
        self.entities.insert(id, entity);
        id
    }

    fn upsert_relationship(&mut self, key: RelationshipKey, description: &str, weight: f32) {
        if let Some(&id) = self.relationship_ids.get(&key) {
            let rel = self
                .relationships
                .get_mut(&id)
                .expect("relationship id map out of sync");
            rel.occurrence_count += 1;
            rel.weight = (rel.weight + weight).min(self.weight_cap);
            append_evidence(&mut rel.description, description, self.max_description_len);
            return;
        }

        let id = self.next_relationship_id;
        self.next_relationship_id += 1;

        let mut rel = Relationship {
            id,
            source_id: key.source_id,
            target_id: key.target_id,
            relationship_type: key.relationship_type.clone(),
            description: String::new(),
            weight: weight.min(self.weight_cap),
            occurrence_count: 1,
            created_at: chrono::Utc::now().to_rfc3339(),
        };
        append_evidence(&mut rel.description, description, self.max_description_len);

        self.relationship_ids.insert(key, id);
        self.relationships.insert(id, rel);
    }
}

impl Default for KnowledgeGraph {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_DESCRIPTION_LEN, DEFAULT_WEIGHT_CAP)
    }
}

// =============================================================================
// Evidence and Embedding Folding
// =============================================================================

/// Append a piece of description evidence, keeping total length under
/// `max_len` by truncating the oldest evidence first. Evidence already
/// present verbatim is not appended again.
fn append_evidence(merged: &mut String, evidence: &str, max_len: usize) {
    let evidence = evidence.trim();
    if evidence.is_empty() || merged.contains(evidence) {
        return;
    }

    if !merged.is_empty() {
        merged.push('\n');
    }
    merged.push_str(evidence);

    if merged.chars().count() > max_len {
        let excess = merged.chars().count() - max_len;
        let cut: usize = merged.chars().take(excess).map(char::len_utf8).sum();
        merged.drain(..cut);
    }
}

/// Fold a new embedding into the running mean. Empty or mismatched samples
/// are skipped; the first sample sets the dimensionality.
fn fold_embedding(mean: &mut Vec<f32>, samples: &mut u32, new: &[f32]) {
    if new.is_empty() {
        return;
    }
    if mean.is_empty() {
        *mean = new.to_vec();
        *samples = 1;
        return;
    }
    if mean.len() != new.len() {
        return;
    }

    let n = *samples as f32;
    for (m, x) in mean.iter_mut().zip(new) {
        *m = (*m * n + x) / (n + 1.0);
    }
    *samples += 1;
}

// =============================================================================
// Tests
// =============================================================================
